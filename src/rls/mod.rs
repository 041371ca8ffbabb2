//! Row-level security: policy table, evaluation and request mediation.

pub mod audit;
pub mod constraint;
pub mod context;
pub mod decision;
pub mod error;
pub mod evaluator;
pub mod mediator;
pub mod policy;
pub mod registry;
pub mod resource;

pub use audit::{AuditEntry, AuditSink, NoopAuditSink, TracingAuditSink};
pub use constraint::{to_query_constraint, QueryConstraint};
pub use context::RequestContext;
pub use decision::{AccessDecision, DenyReason, FilterPredicate, Outcome};
pub use error::ConfigurationError;
pub use evaluator::evaluate;
pub use mediator::{ListOutcome, MediatorError, RecordOutcome, RequestMediator};
pub use policy::{Policy, PolicyKind};
pub use registry::{OperationScope, PolicyRegistry, RegistryHandle};
pub use resource::{FieldKind, ResourceType, SYSTEM_FIELDS};
