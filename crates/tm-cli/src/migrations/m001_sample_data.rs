//! Seed the sample collection with one document.

use futures::future::BoxFuture;
use serde_json::json;
use tm_core::{register_step, ActionResult, CoreResult, Registry};
use tm_db::{into_document, DocumentStore, Filter};

use super::SAMPLE_COLLECTION;

pub(super) fn register(registry: &Registry) -> CoreResult<()> {
    register_step!(registry, up, down)
}

fn up(db: &dyn DocumentStore) -> BoxFuture<'_, ActionResult> {
    Box::pin(async move {
        db.insert_one(SAMPLE_COLLECTION, into_document(json!({"a": "b"}))?)
            .await?;
        Ok(())
    })
}

fn down(db: &dyn DocumentStore) -> BoxFuture<'_, ActionResult> {
    Box::pin(async move {
        db.delete_many(SAMPLE_COLLECTION, &Filter::eq("a", "b"))
            .await?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tm_core::{Action, StepKey};
    use tm_db::DuckDbStore;

    #[tokio::test]
    async fn up_and_down_round_trip() {
        let registry = Registry::new();
        register(&registry).unwrap();
        let step = registry.get(StepKey::new(1)).unwrap();
        assert_eq!(step.description(), "sample_data");

        let db = DuckDbStore::in_memory().unwrap();
        step.up().run(&db).await.unwrap();
        let docs = db.find(SAMPLE_COLLECTION, &Filter::all()).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].get("a"), Some(&json!("b")));

        step.down().unwrap().run(&db).await.unwrap();
        assert!(db
            .find(SAMPLE_COLLECTION, &Filter::all())
            .await
            .unwrap()
            .is_empty());
    }
}
