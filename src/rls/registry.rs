use arc_swap::ArcSwap;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::error::ConfigurationError;
use super::policy::{Policy, PolicyKind};
use super::resource::ResourceType;
use crate::types::{OperationClass, Role};

/// Field-service policy table shipped with the binary
const BUILTIN_POLICIES: &str = include_str!("../../config/policies.yaml");

/// Which operation classes a registered entry covers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationScope {
    Read,
    Write,
    #[default]
    All,
}

impl OperationScope {
    fn classes(&self) -> &'static [OperationClass] {
        match self {
            OperationScope::Read => &[OperationClass::Read],
            OperationScope::Write => &[OperationClass::Write],
            OperationScope::All => &[OperationClass::Read, OperationClass::Write],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyFile {
    policies: Vec<PolicyEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyEntry {
    role: String,
    resources: Vec<String>,
    #[serde(default)]
    operations: OperationScope,
    kind: String,
    owner_field: Option<String>,
    minimum_role: Option<String>,
    name: Option<String>,
}

type PolicyKey = (Role, ResourceType, OperationClass);

/// Immutable lookup table from (role, resource, operation class) to policy
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    policies: BTreeMap<PolicyKey, Policy>,
}

impl PolicyRegistry {
    pub fn builder() -> PolicyRegistryBuilder {
        PolicyRegistryBuilder::default()
    }

    /// Registry with no entries: every lookup falls back to deny_all
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builtin() -> Result<Self, ConfigurationError> {
        Self::from_yaml_str(BUILTIN_POLICIES)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigurationError> {
        let file: PolicyFile = serde_yaml::from_str(raw)?;
        let mut builder = Self::builder();

        for entry in file.policies {
            let role = Role::parse(&entry.role)
                .ok_or_else(|| ConfigurationError::UnknownRole(entry.role.clone()))?;
            let kind: PolicyKind = entry.kind.parse()?;
            let minimum_role = entry
                .minimum_role
                .as_deref()
                .map(|r| Role::parse(r).ok_or_else(|| ConfigurationError::UnknownRole(r.to_string())))
                .transpose()?;

            if entry.resources.is_empty() {
                return Err(ConfigurationError::EmptyResourceList);
            }

            for resource_name in &entry.resources {
                let resource: ResourceType = resource_name.parse()?;
                let mut policy = Policy::new(role, resource, kind);
                if let Some(name) = &entry.name {
                    policy = policy.named(name.clone());
                }
                policy.owner_field = entry.owner_field.clone();
                policy.minimum_role = minimum_role;
                builder = builder.register(policy, entry.operations);
            }
        }

        builder.build()
    }

    /// Look up the policy for a request. Unknown roles and unregistered
    /// triples resolve to the implicit deny_all policy.
    pub fn resolve(&self, role: &str, resource: ResourceType, class: OperationClass) -> Policy {
        Role::parse(role)
            .and_then(|r| self.policies.get(&(r, resource, class)))
            .cloned()
            .unwrap_or_else(|| Policy::default_deny(role, resource))
    }

    /// As `resolve`, but with an untyped resource name. Unknown resources are
    /// a wiring defect rather than something to default.
    pub fn resolve_named(
        &self,
        role: &str,
        resource: &str,
        class: OperationClass,
    ) -> Result<Policy, ConfigurationError> {
        let resource: ResourceType = resource.parse()?;
        Ok(self.resolve(role, resource, class))
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Registered rows in (role, resource, class) order
    pub fn describe(&self) -> Vec<(OperationClass, &Policy)> {
        self.policies.iter().map(|((_, _, class), p)| (*class, p)).collect()
    }
}

#[derive(Debug, Default)]
pub struct PolicyRegistryBuilder {
    entries: Vec<(Policy, OperationScope)>,
}

impl PolicyRegistryBuilder {
    pub fn register(mut self, policy: Policy, scope: OperationScope) -> Self {
        self.entries.push((policy, scope));
        self
    }

    pub fn build(self) -> Result<PolicyRegistry, ConfigurationError> {
        let mut policies = BTreeMap::new();

        for (policy, scope) in self.entries {
            let role = Role::parse(&policy.role)
                .ok_or_else(|| ConfigurationError::UnknownRole(policy.role.clone()))?;
            validate(&policy)?;

            for class in scope.classes() {
                let key = (role, policy.resource, *class);
                if policies.contains_key(&key) {
                    return Err(ConfigurationError::DuplicatePolicy {
                        role: policy.role.clone(),
                        resource: policy.resource.to_string(),
                        class: *class,
                    });
                }
                policies.insert(key, policy.clone());
            }
        }

        Ok(PolicyRegistry { policies })
    }
}

fn validate(policy: &Policy) -> Result<(), ConfigurationError> {
    if policy.kind.is_owner_scoped() {
        let field = policy.owner_field.as_deref().ok_or_else(|| ConfigurationError::MissingOwnerField {
            policy: policy.name.clone(),
            role: policy.role.clone(),
            resource: policy.resource.to_string(),
        })?;
        if !policy.resource.has_field(field) {
            return Err(ConfigurationError::UnknownOwnerField {
                field: field.to_string(),
                resource: policy.resource.to_string(),
            });
        }
    }
    if policy.kind == PolicyKind::MinimumRole && policy.minimum_role.is_none() {
        return Err(ConfigurationError::MissingMinimumRole {
            policy: policy.name.clone(),
            role: policy.role.clone(),
            resource: policy.resource.to_string(),
        });
    }
    Ok(())
}

/// Shared, atomically replaceable registry.
///
/// Requests take a `snapshot()` once and evaluate against it, so a reload
/// in the middle of a request is never observed half-applied.
pub struct RegistryHandle {
    current: ArcSwap<PolicyRegistry>,
    source: Option<PathBuf>,
}

impl RegistryHandle {
    pub fn new(registry: PolicyRegistry) -> Self {
        Self {
            current: ArcSwap::from_pointee(registry),
            source: None,
        }
    }

    /// Load from a file and remember the path for later reloads
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, ConfigurationError> {
        let path = path.into();
        let registry = PolicyRegistry::from_path(&path)?;
        tracing::info!("Loaded {} policies from {}", registry.len(), path.display());
        Ok(Self {
            current: ArcSwap::from_pointee(registry),
            source: Some(path),
        })
    }

    pub fn snapshot(&self) -> Arc<PolicyRegistry> {
        self.current.load_full()
    }

    pub fn replace(&self, registry: PolicyRegistry) {
        self.current.store(Arc::new(registry));
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Re-read the source file. On error the current table stays in place.
    pub fn reload(&self) -> Result<usize, ConfigurationError> {
        let registry = match &self.source {
            Some(path) => PolicyRegistry::from_path(path)?,
            None => PolicyRegistry::builtin()?,
        };
        let count = registry.len();
        self.replace(registry);
        tracing::info!("Policy registry reloaded ({} entries)", count);
        Ok(count)
    }
}
