//! Index the sample collection on `a`.

use futures::future::BoxFuture;
use tm_core::{register_step, ActionResult, CoreResult, Registry};
use tm_db::{DocumentStore, IndexSpec};

use super::SAMPLE_COLLECTION;

const INDEX_NAME: &str = "test_idx_2";

pub(super) fn register(registry: &Registry) -> CoreResult<()> {
    register_step!(registry, up, down)
}

fn up(db: &dyn DocumentStore) -> BoxFuture<'_, ActionResult> {
    Box::pin(async move {
        db.ensure_index(SAMPLE_COLLECTION, &IndexSpec::new(INDEX_NAME, ["a"]))
            .await?;
        Ok(())
    })
}

fn down(db: &dyn DocumentStore) -> BoxFuture<'_, ActionResult> {
    Box::pin(async move {
        db.drop_index(SAMPLE_COLLECTION, INDEX_NAME).await?;
        Ok(())
    })
}
