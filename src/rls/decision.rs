use serde::Serialize;
use serde_json::Value;
use std::fmt;

use super::policy::Policy;
use crate::database::record::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    AllowAll,
    AllowFiltered,
    Deny,
}

/// Why an evaluation produced `DENY` (or a match-nothing filter)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    DenyAll,
    NotOwner,
    /// The target record has no usable value in the configured owner field
    MissingOwnerField,
    InsufficientRole,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::DenyAll => "deny_all",
            DenyReason::NotOwner => "not_owner",
            DenyReason::MissingOwnerField => "missing_owner_field",
            DenyReason::InsufficientRole => "insufficient_role",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row condition produced by a filtered decision. Knows nothing about SQL;
/// see `QueryConstraint` for the persistence-facing form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterPredicate {
    MatchNothing,
    FieldEquals { field: String, value: String },
}

impl FilterPredicate {
    pub fn owner(field: &str, requester_id: &str) -> Self {
        FilterPredicate::FieldEquals {
            field: field.to_string(),
            value: requester_id.to_string(),
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        match self {
            FilterPredicate::MatchNothing => false,
            FilterPredicate::FieldEquals { field, value } => record
                .get(field)
                .map(|v| identity_matches(v, value))
                .unwrap_or(false),
        }
    }
}

/// Compare a stored owner value against a requester identity.
/// Strings compare textually, numbers by their decimal rendering; nothing else matches.
pub fn identity_matches(stored: &Value, requester_id: &str) -> bool {
    match stored {
        Value::String(s) => s == requester_id,
        Value::Number(n) => n.to_string() == requester_id,
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessDecision {
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_predicate: Option<FilterPredicate>,
    pub policy_applied: bool,
    /// Name of the policy consulted, for audit
    pub policy: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
}

impl AccessDecision {
    pub fn allow_all(policy: &Policy) -> Self {
        Self {
            outcome: Outcome::AllowAll,
            filter_predicate: None,
            policy_applied: policy.kind.marks_applied(),
            policy: policy.name.clone(),
            reason: None,
        }
    }

    pub fn filtered(policy: &Policy, predicate: FilterPredicate) -> Self {
        let reason = match predicate {
            FilterPredicate::MatchNothing => Some(DenyReason::DenyAll),
            FilterPredicate::FieldEquals { .. } => None,
        };
        Self {
            outcome: Outcome::AllowFiltered,
            filter_predicate: Some(predicate),
            policy_applied: policy.kind.marks_applied(),
            policy: policy.name.clone(),
            reason,
        }
    }

    pub fn deny(policy: &Policy, reason: DenyReason) -> Self {
        Self {
            outcome: Outcome::Deny,
            filter_predicate: None,
            policy_applied: policy.kind.marks_applied(),
            policy: policy.name.clone(),
            reason: Some(reason),
        }
    }

    pub fn is_denied(&self) -> bool {
        self.outcome == Outcome::Deny
    }

    /// Whether a single fetched record is visible under this decision
    pub fn permits(&self, record: &Record) -> bool {
        match self.outcome {
            Outcome::AllowAll => true,
            Outcome::Deny => false,
            Outcome::AllowFiltered => self
                .filter_predicate
                .as_ref()
                .map(|p| p.matches(record))
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identity_matching_rules() {
        assert!(identity_matches(&json!("42"), "42"));
        assert!(identity_matches(&json!(42), "42"));
        assert!(!identity_matches(&json!(42.5), "42"));
        assert!(!identity_matches(&json!(null), "42"));
        assert!(!identity_matches(&json!(true), "true"));
        assert!(!identity_matches(&json!({"id": "42"}), "42"));
    }

    #[test]
    fn predicate_matches_records() {
        let rec = Record::from_value(json!({"id": "a", "customer_id": 42})).unwrap();
        assert!(FilterPredicate::owner("customer_id", "42").matches(&rec));
        assert!(!FilterPredicate::owner("customer_id", "99").matches(&rec));
        assert!(!FilterPredicate::owner("missing", "42").matches(&rec));
        assert!(!FilterPredicate::MatchNothing.matches(&rec));
    }

    #[test]
    fn decision_serializes_with_wire_names() {
        let policy = Policy::default_deny("technician", crate::rls::ResourceType::Contracts);
        let d = AccessDecision::filtered(&policy, FilterPredicate::MatchNothing);
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["outcome"], "ALLOW_FILTERED");
        assert_eq!(v["policyApplied"], true);
        assert_eq!(v["filterPredicate"]["type"], "match_nothing");
    }
}
