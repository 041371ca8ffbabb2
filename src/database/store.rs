use async_trait::async_trait;
use serde_json::Value;

use crate::database::manager::DatabaseError;
use crate::database::record::Record;
use crate::filter::FilterData;
use crate::rls::ResourceType;

/// Data-access collaborator behind the request mediator.
///
/// Stores execute whatever `FilterData` they are handed; row-level
/// constraints are already folded into it by the time it arrives.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Short backend label for logs and `/health`
    fn backend(&self) -> &'static str;

    async fn find(&self, resource: ResourceType, filter: FilterData) -> Result<Vec<Record>, DatabaseError>;

    /// Count rows matching `where_clause`, ignoring paging
    async fn count(&self, resource: ResourceType, where_clause: Option<Value>) -> Result<i64, DatabaseError>;

    async fn find_by_id(&self, resource: ResourceType, id: &str) -> Result<Option<Record>, DatabaseError>;

    /// Persist a new record; the store assigns `id` and timestamps
    async fn insert(&self, resource: ResourceType, record: Record) -> Result<Record, DatabaseError>;

    /// Apply `changes` to an existing record; `None` when the id is unknown
    async fn update(&self, resource: ResourceType, id: &str, changes: Record) -> Result<Option<Record>, DatabaseError>;

    /// Remove a record, returning it; `None` when the id is unknown
    async fn delete(&self, resource: ResourceType, id: &str) -> Result<Option<Record>, DatabaseError>;

    async fn health_check(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}
