use super::*;
use chrono::TimeZone;
use tm_core::StepKey;
use tm_migrate::{AppliedStep, Direction, LedgerEntry, LockRecord, PendingStep};

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn sample() -> Status {
    Status {
        applied: vec![AppliedStep {
            key: StepKey::new(1),
            description: "sample_data".to_string(),
            applied_at: at(0),
            reversible: true,
            last_failure: None,
        }],
        pending: vec![PendingStep {
            key: StepKey::new(2),
            description: "sample_index".to_string(),
            reversible: true,
            last_failure: Some(FailureRecord {
                key: StepKey::new(2),
                direction: Direction::Up,
                cause: "index build timed out".to_string(),
                failed_at: at(60),
            }),
        }],
        unknown: vec![LedgerEntry {
            key: StepKey::new(9),
            description: "retired".to_string(),
            applied_at: at(0),
        }],
        lock: None,
    }
}

#[test]
fn table_shows_every_section() {
    let lines = status_lines(&sample());
    let text = lines.join("\n");

    assert!(lines[1].contains("applied") && lines[1].contains("sample_data"));
    assert!(lines[2].contains("pending") && lines[2].contains("sample_index"));
    assert!(text.contains("last up failed at 2023-11-14 22:14:20: index build timed out"));
    assert!(lines[3].contains("unknown") && lines[3].contains("not in this binary"));
    assert!(text.contains("Lock: free"));
    assert!(text.ends_with("1 applied, 1 pending, 1 unknown"));
}

#[test]
fn held_lock_is_reported() {
    let mut status = sample();
    status.lock = Some(LockRecord {
        owner: "deploy-7".to_string(),
        acquired_at: at(0),
    });
    let text = status_lines(&status).join("\n");
    assert!(text.contains("Lock: held by 'deploy-7' since 2023-11-14 22:13:20"));
}
