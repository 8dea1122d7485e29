pub mod listings;
pub mod row_source;

use crate::application::use_cases::sql_guard::SafeQuery;
use crate::domain::error::Result;
use crate::domain::listing::ResultSet;
use async_trait::async_trait;

pub use listings::ListingStore;
pub use row_source::SqliteRowSource;

/// Read side used by the pipeline. Only guarded statements reach it.
#[async_trait]
pub trait RowSource: Send + Sync {
    async fn query_rows(&self, query: &SafeQuery) -> Result<ResultSet>;
}
