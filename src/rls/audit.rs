//! Audit hook for access decisions.
//!
//! The mediator reports every decision here and never looks at the result;
//! where the entries end up is the sink's business.

use super::context::RequestContext;
use super::decision::{AccessDecision, DenyReason, Outcome};
use super::resource::ResourceType;
use crate::types::Operation;

/// What the sink gets to see about one decision
#[derive(Debug, Clone)]
pub struct AuditEntry<'a> {
    pub requester_id: &'a str,
    pub requester_role: &'a str,
    pub resource: ResourceType,
    pub operation: Operation,
    pub record_id: Option<String>,
    pub decision: &'a AccessDecision,
}

impl<'a> AuditEntry<'a> {
    pub fn new(ctx: &'a RequestContext, decision: &'a AccessDecision) -> Self {
        Self {
            requester_id: &ctx.requester_id,
            requester_role: &ctx.requester_role,
            resource: ctx.resource,
            operation: ctx.operation,
            record_id: ctx.target_record.as_ref().and_then(|r| r.id()),
            decision,
        }
    }
}

pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditEntry<'_>);
}

/// Emits one structured event per decision under `fieldops::audit`
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: &AuditEntry<'_>) {
        let d = entry.decision;
        let outcome = match d.outcome {
            Outcome::AllowAll => "ALLOW_ALL",
            Outcome::AllowFiltered => "ALLOW_FILTERED",
            Outcome::Deny => "DENY",
        };
        let reason = d.reason.map(|r| r.as_str()).unwrap_or("");
        let record_id = entry.record_id.as_deref().unwrap_or("");

        if d.reason == Some(DenyReason::MissingOwnerField) {
            tracing::warn!(
                target: "fieldops::audit",
                requester = entry.requester_id,
                role = entry.requester_role,
                resource = %entry.resource,
                operation = %entry.operation,
                record_id,
                policy = %d.policy,
                "record has no usable owner value; access denied"
            );
            return;
        }

        tracing::info!(
            target: "fieldops::audit",
            requester = entry.requester_id,
            role = entry.requester_role,
            resource = %entry.resource,
            operation = %entry.operation,
            record_id,
            policy = %d.policy,
            outcome,
            reason,
            rls_applied = d.policy_applied,
            "access decision"
        );
    }
}

#[derive(Debug, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _entry: &AuditEntry<'_>) {}
}
