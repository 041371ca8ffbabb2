use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::ConfigurationError;
use super::resource::ResourceType;
use crate::types::Role;

/// The closed set of row-level policy kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    DenyAll,
    AllRecords,
    OwnRecordsOnly,
    PublicResource,
    MinimumRole,
}

impl PolicyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::DenyAll => "deny_all",
            PolicyKind::AllRecords => "all_records",
            PolicyKind::OwnRecordsOnly => "own_records_only",
            PolicyKind::PublicResource => "public_resource",
            PolicyKind::MinimumRole => "minimum_role",
        }
    }

    pub fn is_owner_scoped(&self) -> bool {
        matches!(self, PolicyKind::OwnRecordsOnly)
    }

    /// Whether a decision under this kind reports `rlsApplied = true`.
    /// Only `public_resource` is reported as unrestricted.
    pub fn marks_applied(&self) -> bool {
        !matches!(self, PolicyKind::PublicResource)
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deny_all" => Ok(PolicyKind::DenyAll),
            "all_records" => Ok(PolicyKind::AllRecords),
            "own_records_only" => Ok(PolicyKind::OwnRecordsOnly),
            "public_resource" => Ok(PolicyKind::PublicResource),
            "minimum_role" => Ok(PolicyKind::MinimumRole),
            other => Err(ConfigurationError::UnknownKind(other.to_string())),
        }
    }
}

/// Access rule for one (role, resource) pair and operation class.
/// Immutable once it is part of a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Policy {
    pub name: String,
    pub role: String,
    pub resource: ResourceType,
    pub kind: PolicyKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_role: Option<Role>,
    /// False for the implicit fallback returned when nothing is registered
    pub explicit: bool,
}

impl Policy {
    pub fn new(role: Role, resource: ResourceType, kind: PolicyKind) -> Self {
        Self {
            name: kind.as_str().to_string(),
            role: role.as_str().to_string(),
            resource,
            kind,
            owner_field: None,
            minimum_role: None,
            explicit: true,
        }
    }

    /// Fallback for any (role, resource, class) with no registered entry
    pub fn default_deny(role: &str, resource: ResourceType) -> Self {
        Self {
            name: PolicyKind::DenyAll.as_str().to_string(),
            role: role.to_string(),
            resource,
            kind: PolicyKind::DenyAll,
            owner_field: None,
            minimum_role: None,
            explicit: false,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn owned_by(mut self, field: impl Into<String>) -> Self {
        self.owner_field = Some(field.into());
        self
    }

    pub fn at_least(mut self, role: Role) -> Self {
        self.minimum_role = Some(role);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_round_trip() {
        for kind in [
            PolicyKind::DenyAll,
            PolicyKind::AllRecords,
            PolicyKind::OwnRecordsOnly,
            PolicyKind::PublicResource,
            PolicyKind::MinimumRole,
        ] {
            assert_eq!(kind.as_str().parse::<PolicyKind>().unwrap(), kind);
        }
        assert!("admin_bypass".parse::<PolicyKind>().is_err());
    }

    #[test]
    fn only_public_resource_is_unapplied() {
        assert!(PolicyKind::DenyAll.marks_applied());
        assert!(PolicyKind::AllRecords.marks_applied());
        assert!(PolicyKind::OwnRecordsOnly.marks_applied());
        assert!(PolicyKind::MinimumRole.marks_applied());
        assert!(!PolicyKind::PublicResource.marks_applied());
    }

    #[test]
    fn default_deny_is_not_explicit() {
        let p = Policy::default_deny("technician", ResourceType::Contracts);
        assert_eq!(p.kind, PolicyKind::DenyAll);
        assert!(!p.explicit);
        assert_eq!(p.name, "deny_all");
    }
}
