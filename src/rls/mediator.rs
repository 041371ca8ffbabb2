use std::sync::Arc;

use super::audit::{AuditEntry, AuditSink};
use super::constraint::QueryConstraint;
use super::context::RequestContext;
use super::decision::{AccessDecision, DenyReason};
use super::evaluator::evaluate;
use super::registry::{PolicyRegistry, RegistryHandle};
use super::resource::ResourceType;
use crate::database::{DataStore, DatabaseError, Record};
use crate::filter::FilterData;

/// Per-request failures surfaced by the mediator. Denials are ordinary
/// values here; only `Store` represents something going wrong.
#[derive(Debug, thiserror::Error)]
pub enum MediatorError {
    #[error("Access denied: {0}")]
    Forbidden(DenyReason),

    #[error("{} not found", .0.singular())]
    NotFound(ResourceType),

    #[error(transparent)]
    Store(#[from] DatabaseError),
}

#[derive(Debug)]
pub struct ListOutcome {
    pub data: Vec<Record>,
    /// Rows visible under the constraint, ignoring paging
    pub total: i64,
    pub rls_applied: bool,
}

#[derive(Debug)]
pub struct RecordOutcome {
    pub data: Record,
    pub rls_applied: bool,
}

/// Decision and delegation point between handlers and the data store.
///
/// Resolves the policy for each call from a registry snapshot, evaluates it,
/// reports the decision to the audit sink and only then touches the store.
#[derive(Clone)]
pub struct RequestMediator {
    registry: Arc<RegistryHandle>,
    store: Arc<dyn DataStore>,
    audit: Arc<dyn AuditSink>,
}

impl RequestMediator {
    pub fn new(registry: Arc<RegistryHandle>, store: Arc<dyn DataStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { registry, store, audit }
    }

    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    pub fn store(&self) -> &dyn DataStore {
        self.store.as_ref()
    }

    /// Callers take one registry snapshot per operation and pass it to every
    /// decision that operation makes.
    fn decide(&self, registry: &PolicyRegistry, ctx: &RequestContext) -> AccessDecision {
        let policy = registry.resolve(&ctx.requester_role, ctx.resource, ctx.operation.class());
        let decision = evaluate(&policy, ctx);
        self.audit.record(&AuditEntry::new(ctx, &decision));
        decision
    }

    /// List with the row constraint ANDed onto the caller's query.
    /// A match-nothing constraint short-circuits without a store round trip.
    pub async fn list(&self, ctx: &RequestContext, query: FilterData) -> Result<ListOutcome, MediatorError> {
        let decision = self.decide(&self.registry.snapshot(), ctx);
        deny_to_error(&decision)?;

        let constraint = QueryConstraint::from_decision(&decision);
        if constraint.matches_nothing() {
            return Ok(ListOutcome {
                data: vec![],
                total: 0,
                rls_applied: decision.policy_applied,
            });
        }

        let query = constraint.apply(query);
        let total = self.store.count(ctx.resource, query.where_clause.clone()).await?;
        let data = self.store.find(ctx.resource, query).await?;

        Ok(ListOutcome {
            data,
            total,
            rls_applied: decision.policy_applied,
        })
    }

    /// Fetch then decide. Anything the requester may not see is reported as
    /// not found, so existence of inaccessible records is never revealed.
    pub async fn get(&self, ctx: RequestContext, id: &str) -> Result<RecordOutcome, MediatorError> {
        let record = self
            .store
            .find_by_id(ctx.resource, id)
            .await?
            .ok_or(MediatorError::NotFound(ctx.resource))?;

        let ctx = ctx.with_record(record);
        let decision = self.decide(&self.registry.snapshot(), &ctx);
        let Some(record) = ctx.target_record else {
            return Err(MediatorError::NotFound(ctx.resource));
        };
        if !decision.permits(&record) {
            return Err(MediatorError::NotFound(ctx.resource));
        }

        Ok(RecordOutcome {
            data: record,
            rls_applied: decision.policy_applied,
        })
    }

    /// Ownership-scoped creates are checked against the payload itself
    pub async fn create(&self, ctx: RequestContext, payload: Record) -> Result<RecordOutcome, MediatorError> {
        let ctx = ctx.with_record(payload);
        let decision = self.decide(&self.registry.snapshot(), &ctx);
        deny_to_error(&decision)?;

        let payload = ctx.target_record.unwrap_or_default();
        let data = self.store.insert(ctx.resource, payload).await?;
        Ok(RecordOutcome {
            data,
            rls_applied: decision.policy_applied,
        })
    }

    /// The existing record must be writable, and so must the record as it
    /// would look afterwards: an owner cannot hand a row to someone else.
    pub async fn update(&self, ctx: RequestContext, id: &str, changes: Record) -> Result<RecordOutcome, MediatorError> {
        let resource = ctx.resource;
        let existing = self
            .store
            .find_by_id(resource, id)
            .await?
            .ok_or(MediatorError::NotFound(resource))?;
        let merged = existing.merged_with(&changes);

        let registry = self.registry.snapshot();
        let decision = self.decide(&registry, &ctx.clone().with_record(existing));
        deny_to_error(&decision)?;
        let after = self.decide(&registry, &ctx.with_record(merged));
        deny_to_error(&after)?;

        let data = self
            .store
            .update(resource, id, changes)
            .await?
            .ok_or(MediatorError::NotFound(resource))?;
        Ok(RecordOutcome {
            data,
            rls_applied: decision.policy_applied,
        })
    }

    pub async fn delete(&self, ctx: RequestContext, id: &str) -> Result<RecordOutcome, MediatorError> {
        let resource = ctx.resource;
        let existing = self
            .store
            .find_by_id(resource, id)
            .await?
            .ok_or(MediatorError::NotFound(resource))?;

        let decision = self.decide(&self.registry.snapshot(), &ctx.with_record(existing));
        deny_to_error(&decision)?;

        let data = self
            .store
            .delete(resource, id)
            .await?
            .ok_or(MediatorError::NotFound(resource))?;
        Ok(RecordOutcome {
            data,
            rls_applied: decision.policy_applied,
        })
    }
}

fn deny_to_error(decision: &AccessDecision) -> Result<(), MediatorError> {
    if decision.is_denied() {
        return Err(MediatorError::Forbidden(decision.reason.unwrap_or(DenyReason::DenyAll)));
    }
    Ok(())
}
