//! Migrations compiled into the `tm` binary.
//!
//! Each file's numeric prefix is its step key. Add a module here and a call
//! in [`register_all`] to ship a new migration.

use tm_core::{CoreResult, Registry};

mod m001_sample_data;
mod m002_sample_index;

/// Collection the sample migrations operate on
pub(crate) const SAMPLE_COLLECTION: &str = "test-global";

/// Register every bundled migration
pub(crate) fn register_all(registry: &Registry) -> CoreResult<()> {
    m001_sample_data::register(registry)?;
    m002_sample_index::register(registry)?;
    Ok(())
}
