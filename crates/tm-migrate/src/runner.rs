//! The runner: lock, plan, execute, release.
//!
//! Each run takes the migration lock, reads the ledger, plans, and executes
//! the plan step by step. The ledger is written after each step's action
//! succeeds, so a failure leaves every earlier step recorded and nothing
//! recorded for the failed one. The lock is released whatever the outcome.

use crate::cancel::CancelToken;
use crate::error::{MigrateError, MigrateResult};
use crate::ledger::{FailureRecord, Ledger};
use crate::lock::MigrationLock;
use crate::plan::{plan_down, plan_up, Direction, Plan, RollbackTarget};
use crate::status::Status;
use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tm_core::{Config, Registry, StepKey, StepSet};
use tm_db::DocumentStore;

/// Lifecycle of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    LockAcquired,
    Planning,
    Executing,
    Completed,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::LockAcquired => "lock_acquired",
            RunState::Planning => "planning",
            RunState::Executing => "executing",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub direction: Direction,
    /// Keys executed, in execution order
    pub executed: Vec<StepKey>,
    pub final_state: RunState,
}

impl RunReport {
    /// Whether the run found nothing to do
    pub fn is_noop(&self) -> bool {
        self.executed.is_empty()
    }
}

/// Where the runner keeps its records and who it claims to be
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    pub ledger_collection: String,
    pub failure_collection: String,
    pub lock_collection: String,
    /// Readable start of the lock owner id; see [`owner_id`]
    pub owner_prefix: Option<String>,
    pub stale_after: Duration,
}

impl RunnerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ledger_collection: config.ledger_collection.clone(),
            failure_collection: config.failure_collection.clone(),
            lock_collection: config.lock_collection.clone(),
            owner_prefix: config.lock.owner_prefix.clone(),
            stale_after: config.lock_stale_after(),
        }
    }
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self::from_config(&Config::named("tidemark"))
    }
}

/// Prefix used when none is configured
pub const DEFAULT_OWNER_PREFIX: &str = "tidemark";

/// Lock owner id unique to this runner instance.
///
/// The process id and a random suffix are always appended, so two processes
/// started from the same configuration never share an owner and cannot both
/// pass the same-owner re-entry check.
pub fn owner_id(prefix: &str) -> String {
    format!("{prefix}-{}-{}", std::process::id(), uuid::Uuid::new_v4())
}

enum Request {
    Up,
    Down(RollbackTarget),
}

/// Applies registered steps to one target database
pub struct Runner {
    registry: Arc<Registry>,
    store: Arc<dyn DocumentStore>,
    ledger: Ledger,
    lock: MigrationLock,
    owner: String,
    stale_after: Duration,
    cancel: CancelToken,
    state: Mutex<RunState>,
}

impl Runner {
    pub fn new(registry: Arc<Registry>, store: Arc<dyn DocumentStore>) -> Self {
        Self::with_options(registry, store, RunnerOptions::default())
    }

    pub fn with_options(
        registry: Arc<Registry>,
        store: Arc<dyn DocumentStore>,
        options: RunnerOptions,
    ) -> Self {
        let ledger = Ledger::new(
            Arc::clone(&store),
            options.ledger_collection,
            options.failure_collection,
        );
        let lock = MigrationLock::new(Arc::clone(&store), options.lock_collection);
        Self {
            registry,
            store,
            ledger,
            lock,
            owner: owner_id(
                options
                    .owner_prefix
                    .as_deref()
                    .unwrap_or(DEFAULT_OWNER_PREFIX),
            ),
            stale_after: options.stale_after,
            cancel: CancelToken::new(),
            state: Mutex::new(RunState::Idle),
        }
    }

    /// Replace the runner's cancellation token with a shared one
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn lock(&self) -> &MigrationLock {
        &self.lock
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// State reached by the most recent run
    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply every pending step in ascending key order.
    pub async fn run_up(&self) -> MigrateResult<RunReport> {
        self.run(Request::Up).await
    }

    /// Revert every applied step with a key greater than `target`, in
    /// descending order. `StepKey::ORIGIN` reverts everything.
    pub async fn run_down_to(&self, target: StepKey) -> MigrateResult<RunReport> {
        self.run(Request::Down(RollbackTarget::To(target))).await
    }

    /// Revert the `steps` most recently applied steps.
    pub async fn run_down(&self, steps: usize) -> MigrateResult<RunReport> {
        self.run(Request::Down(RollbackTarget::Steps(steps))).await
    }

    /// What `run_up` would do now. Does not take the lock.
    pub async fn plan_up(&self) -> MigrateResult<Plan> {
        let steps = self.registry.freeze();
        let applied = self.ledger.applied_keys().await?;
        Ok(plan_up(&steps, &applied))
    }

    /// What a rollback would do now. Does not take the lock.
    pub async fn plan_down(&self, target: RollbackTarget) -> MigrateResult<Plan> {
        let steps = self.registry.freeze();
        let applied = self.ledger.applied_keys().await?;
        plan_down(&steps, &applied, target)
    }

    pub async fn plan_down_to(&self, target: StepKey) -> MigrateResult<Plan> {
        self.plan_down(RollbackTarget::To(target)).await
    }

    /// Applied, pending, and unknown steps plus the current lock holder.
    ///
    /// Read-only; works while another runner holds the lock.
    pub async fn status(&self) -> MigrateResult<Status> {
        let steps = self.registry.freeze();
        let applied = self.ledger.applied().await?;
        let failures = self.ledger.failures().await?;
        let lock = self.lock.current().await?;
        Ok(Status::build(&steps, applied, failures, lock))
    }

    async fn run(&self, request: Request) -> MigrateResult<RunReport> {
        self.transition(RunState::Idle);
        let steps = self.registry.freeze();

        if let Err(e) = self.lock.acquire(&self.owner, self.stale_after).await {
            self.transition(RunState::Failed);
            return Err(e);
        }
        self.transition(RunState::LockAcquired);

        let outcome = self.plan_and_execute(&steps, request).await;
        self.transition(if outcome.is_ok() {
            RunState::Completed
        } else {
            RunState::Failed
        });

        let released = self.lock.release(&self.owner).await;
        match (outcome, released) {
            (Ok(report), Ok(())) => Ok(report),
            (Ok(report), Err(e)) => {
                log::error!(
                    "Executed {} step(s) but could not release the migration lock",
                    report.executed.len()
                );
                self.transition(RunState::Failed);
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(release_err)) => {
                log::error!("Failed to release migration lock: {release_err}");
                Err(e)
            }
        }
    }

    async fn plan_and_execute(&self, steps: &StepSet, request: Request) -> MigrateResult<RunReport> {
        self.transition(RunState::Planning);
        let applied = self.ledger.applied_keys().await?;
        let plan = match request {
            Request::Up => plan_up(steps, &applied),
            Request::Down(target) => plan_down(steps, &applied, target)?,
        };

        if plan.is_empty() {
            log::info!("Nothing to migrate {}", plan.direction());
            return Ok(RunReport {
                direction: plan.direction(),
                executed: Vec::new(),
                final_state: RunState::Completed,
            });
        }

        self.transition(RunState::Executing);
        let executed = self.execute(&plan).await?;
        Ok(RunReport {
            direction: plan.direction(),
            executed,
            final_state: RunState::Completed,
        })
    }

    async fn execute(&self, plan: &Plan) -> MigrateResult<Vec<StepKey>> {
        let direction = plan.direction();
        let mut executed = Vec::with_capacity(plan.len());

        for step in plan.steps() {
            if self.cancel.is_cancelled() {
                log::warn!(
                    "Cancelled after {} of {} step(s)",
                    executed.len(),
                    plan.len()
                );
                return Err(MigrateError::Cancelled {
                    completed: executed.len(),
                    planned: plan.len(),
                });
            }

            let key = step.key();
            let action = match direction {
                Direction::Up => step.up(),
                Direction::Down => step.down().ok_or_else(|| MigrateError::IrreversibleStep {
                    key,
                    description: step.description().to_string(),
                })?,
            };

            log::info!("Running {direction} {key} ({})", step.description());
            if let Err(cause) = action.run(self.store.as_ref()).await {
                log::error!("Step {key} failed during {direction}: {cause}");
                let record = FailureRecord {
                    key,
                    direction,
                    cause: cause.to_string(),
                    failed_at: Utc::now(),
                };
                if let Err(e) = self.ledger.record_failure(&record).await {
                    log::warn!("Could not record failure of step {key}: {e}");
                }
                return Err(MigrateError::StepFailed {
                    key,
                    direction,
                    cause,
                });
            }

            match direction {
                Direction::Up => {
                    self.ledger
                        .mark_applied(key, step.description(), Utc::now())
                        .await?
                }
                Direction::Down => self.ledger.mark_reverted(key).await?,
            }
            self.ledger.clear_failure(key).await?;
            executed.push(key);
        }

        Ok(executed)
    }

    fn transition(&self, next: RunState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        log::debug!("Runner {}: {} -> {}", self.owner, *state, next);
        *state = next;
    }
}

#[cfg(test)]
#[path = "runner_test.rs"]
mod tests;
