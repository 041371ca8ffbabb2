use super::resource::ResourceType;
use crate::database::record::Record;
use crate::types::Operation;

/// Per-request input to policy evaluation. Built by the mediator for one
/// inbound call and dropped once the response is produced.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub requester_id: String,
    pub requester_role: String,
    pub resource: ResourceType,
    pub operation: Operation,
    /// Fetched record for get/update/delete, or the payload for create
    pub target_record: Option<Record>,
}

impl RequestContext {
    pub fn new(
        requester_id: impl Into<String>,
        requester_role: impl Into<String>,
        resource: ResourceType,
        operation: Operation,
    ) -> Self {
        Self {
            requester_id: requester_id.into(),
            requester_role: requester_role.into(),
            resource,
            operation,
            target_record: None,
        }
    }

    pub fn with_record(mut self, record: Record) -> Self {
        self.target_record = Some(record);
        self
    }
}
