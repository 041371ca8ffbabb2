use serde_json::Value;

use super::context::RequestContext;
use super::decision::{identity_matches, AccessDecision, DenyReason, FilterPredicate};
use super::policy::{Policy, PolicyKind};
use crate::database::record::Record;
use crate::types::{Operation, OperationClass, Role};

/// Decide what `ctx` may do under `policy`.
///
/// Pure: no I/O, no shared state, so the same inputs always yield the same
/// decision. Expected denials are returned as `Outcome::Deny`, never as errors.
pub fn evaluate(policy: &Policy, ctx: &RequestContext) -> AccessDecision {
    let decision = match policy.kind {
        PolicyKind::DenyAll => match ctx.operation.class() {
            OperationClass::Read => AccessDecision::filtered(policy, FilterPredicate::MatchNothing),
            OperationClass::Write => AccessDecision::deny(policy, DenyReason::DenyAll),
        },
        PolicyKind::AllRecords | PolicyKind::PublicResource => AccessDecision::allow_all(policy),
        PolicyKind::MinimumRole => evaluate_minimum_role(policy, ctx),
        PolicyKind::OwnRecordsOnly => evaluate_ownership(policy, ctx),
    };

    tracing::debug!(
        policy = %policy.name,
        role = %ctx.requester_role,
        resource = %ctx.resource,
        operation = %ctx.operation,
        outcome = ?decision.outcome,
        "rls decision"
    );

    decision
}

fn evaluate_minimum_role(policy: &Policy, ctx: &RequestContext) -> AccessDecision {
    let requester_rank = Role::parse(&ctx.requester_role).map(|r| r.rank()).unwrap_or(0);
    match policy.minimum_role {
        Some(required) if requester_rank >= required.rank() => AccessDecision::allow_all(policy),
        _ => AccessDecision::deny(policy, DenyReason::InsufficientRole),
    }
}

fn evaluate_ownership(policy: &Policy, ctx: &RequestContext) -> AccessDecision {
    // Registry validation guarantees an owner field; fail closed if it is absent anyway.
    let Some(field) = policy.owner_field.as_deref() else {
        return match ctx.operation.class() {
            OperationClass::Read => AccessDecision::filtered(policy, FilterPredicate::MatchNothing),
            OperationClass::Write => AccessDecision::deny(policy, DenyReason::MissingOwnerField),
        };
    };

    match (ctx.operation, ctx.target_record.as_ref()) {
        (Operation::List, _) | (Operation::Get, None) => {
            AccessDecision::filtered(policy, FilterPredicate::owner(field, &ctx.requester_id))
        }
        (_, Some(record)) => check_owner(policy, field, record, &ctx.requester_id),
        (_, None) => AccessDecision::deny(policy, DenyReason::NotOwner),
    }
}

fn check_owner(policy: &Policy, field: &str, record: &Record, requester_id: &str) -> AccessDecision {
    match record.get(field) {
        None | Some(Value::Null) => AccessDecision::deny(policy, DenyReason::MissingOwnerField),
        Some(v @ (Value::String(_) | Value::Number(_))) => {
            if identity_matches(v, requester_id) {
                AccessDecision::allow_all(policy)
            } else {
                AccessDecision::deny(policy, DenyReason::NotOwner)
            }
        }
        Some(_) => AccessDecision::deny(policy, DenyReason::MissingOwnerField),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rls::decision::Outcome;
    use crate::rls::resource::ResourceType;
    use serde_json::json;

    fn ctx(role: &str, id: &str, op: Operation) -> RequestContext {
        RequestContext::new(id, role, ResourceType::Invoices, op)
    }

    fn record(v: Value) -> Record {
        Record::from_value(v).unwrap()
    }

    fn own_invoices() -> Policy {
        Policy::new(Role::Customer, ResourceType::Invoices, PolicyKind::OwnRecordsOnly)
            .named("own_invoices_only")
            .owned_by("customer_id")
    }

    #[test]
    fn deny_all_filters_reads_to_nothing() {
        let p = Policy::new(Role::Technician, ResourceType::Contracts, PolicyKind::DenyAll);
        let d = evaluate(&p, &ctx("technician", "7", Operation::List));
        assert_eq!(d.outcome, Outcome::AllowFiltered);
        assert_eq!(d.filter_predicate, Some(FilterPredicate::MatchNothing));
        assert!(d.policy_applied);
    }

    #[test]
    fn deny_all_denies_every_write() {
        let p = Policy::new(Role::Technician, ResourceType::Contracts, PolicyKind::DenyAll);
        for op in [Operation::Create, Operation::Update, Operation::Delete] {
            let d = evaluate(&p, &ctx("technician", "7", op).with_record(record(json!({"id": "c1"}))));
            assert_eq!(d.outcome, Outcome::Deny);
            assert_eq!(d.reason, Some(DenyReason::DenyAll));
        }
    }

    #[test]
    fn default_policy_fails_closed() {
        let p = Policy::default_deny("technician", ResourceType::Contracts);
        assert_eq!(evaluate(&p, &ctx("technician", "7", Operation::List)).outcome, Outcome::AllowFiltered);
        assert_eq!(evaluate(&p, &ctx("technician", "7", Operation::Create)).outcome, Outcome::Deny);
    }

    #[test]
    fn all_records_is_applied_and_ignores_requester() {
        let p = Policy::new(Role::Admin, ResourceType::Contracts, PolicyKind::AllRecords);
        let rec = record(json!({"id": "c1", "customer_id": "someone-else"}));
        for op in [Operation::List, Operation::Get, Operation::Update, Operation::Delete] {
            let d = evaluate(&p, &ctx("admin", "1", op).with_record(rec.clone()));
            assert_eq!(d.outcome, Outcome::AllowAll);
            assert!(d.policy_applied);
        }
    }

    #[test]
    fn public_resource_is_allowed_but_not_applied() {
        let p = Policy::new(Role::Dispatcher, ResourceType::Inventory, PolicyKind::PublicResource);
        let list = evaluate(&p, &ctx("dispatcher", "3", Operation::List));
        assert_eq!(list.outcome, Outcome::AllowAll);
        assert!(!list.policy_applied);
        let create = evaluate(&p, &ctx("dispatcher", "3", Operation::Create));
        assert_eq!(create.outcome, Outcome::AllowAll);
    }

    #[test]
    fn own_records_list_yields_owner_predicate() {
        let d = evaluate(&own_invoices(), &ctx("customer", "42", Operation::List));
        assert_eq!(d.outcome, Outcome::AllowFiltered);
        assert_eq!(d.filter_predicate, Some(FilterPredicate::owner("customer_id", "42")));
        assert_eq!(d.policy, "own_invoices_only");
    }

    #[test]
    fn own_records_get_matching_record_is_allowed() {
        let c = ctx("customer", "42", Operation::Get).with_record(record(json!({"id": "i1", "customer_id": 42})));
        assert_eq!(evaluate(&own_invoices(), &c).outcome, Outcome::AllowAll);
    }

    #[test]
    fn own_records_get_other_owner_is_denied() {
        let c = ctx("customer", "42", Operation::Get).with_record(record(json!({"id": "i2", "customer_id": 99})));
        let d = evaluate(&own_invoices(), &c);
        assert_eq!(d.outcome, Outcome::Deny);
        assert_eq!(d.reason, Some(DenyReason::NotOwner));
    }

    #[test]
    fn own_records_missing_owner_field_is_denied_not_panicking() {
        for rec in [json!({"id": "i3"}), json!({"id": "i3", "customer_id": null}), json!({"id": "i3", "customer_id": [42]})] {
            let c = ctx("customer", "42", Operation::Update).with_record(record(rec));
            let d = evaluate(&own_invoices(), &c);
            assert_eq!(d.outcome, Outcome::Deny);
            assert_eq!(d.reason, Some(DenyReason::MissingOwnerField));
        }
    }

    #[test]
    fn own_records_write_without_target_is_denied() {
        let d = evaluate(&own_invoices(), &ctx("customer", "42", Operation::Delete));
        assert_eq!(d.outcome, Outcome::Deny);
    }

    #[test]
    fn own_records_policy_without_owner_field_fails_closed() {
        let mut p = own_invoices();
        p.owner_field = None;
        assert_eq!(
            evaluate(&p, &ctx("customer", "42", Operation::List)).filter_predicate,
            Some(FilterPredicate::MatchNothing)
        );
        assert_eq!(evaluate(&p, &ctx("customer", "42", Operation::Create)).outcome, Outcome::Deny);
    }

    #[test]
    fn minimum_role_compares_ranks() {
        let p = Policy::new(Role::Dispatcher, ResourceType::Invoices, PolicyKind::MinimumRole).at_least(Role::Manager);
        assert_eq!(evaluate(&p, &ctx("admin", "1", Operation::List)).outcome, Outcome::AllowAll);
        assert_eq!(evaluate(&p, &ctx("manager", "1", Operation::Update)).outcome, Outcome::AllowAll);
        let d = evaluate(&p, &ctx("dispatcher", "1", Operation::List));
        assert_eq!(d.outcome, Outcome::Deny);
        assert_eq!(d.reason, Some(DenyReason::InsufficientRole));
        assert_eq!(evaluate(&p, &ctx("intern", "1", Operation::List)).outcome, Outcome::Deny);
    }

    #[test]
    fn evaluation_is_idempotent() {
        let c = ctx("customer", "42", Operation::Get).with_record(record(json!({"id": "i1", "customer_id": "42"})));
        let p = own_invoices();
        assert_eq!(evaluate(&p, &c), evaluate(&p, &c));
    }
}
