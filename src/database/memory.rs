use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::CONFIG;
use crate::database::manager::DatabaseError;
use crate::database::record::Record;
use crate::database::store::DataStore;
use crate::filter::filter_order::FilterOrder;
use crate::filter::{matcher, FilterData};
use crate::rls::ResourceType;

/// In-process store used by tests and `serve --memory`.
///
/// Rows keep insertion order per resource; the where-language is evaluated
/// by `filter::matcher` with the same semantics the SQL generator uses.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<ResourceType, Vec<Record>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixture format: `{ "<resource>": [ { ..row.. }, ... ], ... }`
    pub fn from_fixture_str(json: &str) -> Result<Self, DatabaseError> {
        let doc: Value = serde_json::from_str(json).map_err(|e| DatabaseError::Fixture(e.to_string()))?;
        let Value::Object(collections) = doc else {
            return Err(DatabaseError::Fixture("top level must be an object".to_string()));
        };

        let mut tables: HashMap<ResourceType, Vec<Record>> = HashMap::new();
        for (name, rows) in collections {
            let resource: ResourceType = name
                .parse()
                .map_err(|e: crate::rls::ConfigurationError| DatabaseError::Fixture(e.to_string()))?;
            let Value::Array(rows) = rows else {
                return Err(DatabaseError::Fixture(format!("{} must be an array", name)));
            };
            let mut records = Vec::with_capacity(rows.len());
            for row in rows {
                let record = Record::from_value(row).map_err(|e| DatabaseError::Fixture(e.to_string()))?;
                if record.id().is_none() {
                    return Err(DatabaseError::Fixture(format!("{} row without id", name)));
                }
                records.push(record);
            }
            tables.insert(resource, records);
        }

        Ok(Self {
            tables: RwLock::new(tables),
        })
    }

    pub fn from_fixture_path(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| DatabaseError::Fixture(format!("{}: {}", path.display(), e)))?;
        let store = Self::from_fixture_str(&json)?;
        tracing::info!("Loaded fixtures from {}", path.display());
        Ok(store)
    }

    fn matching<'a>(rows: &'a [Record], where_clause: Option<&Value>) -> Result<Vec<&'a Record>, DatabaseError> {
        let Some(where_clause) = where_clause else {
            return Ok(rows.iter().collect());
        };
        let mut out = Vec::new();
        for row in rows {
            if matcher::matches(where_clause, row)? {
                out.push(row);
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn find(&self, resource: ResourceType, filter: FilterData) -> Result<Vec<Record>, DatabaseError> {
        let tables = self.tables.read().await;
        let rows = tables.get(&resource).map(Vec::as_slice).unwrap_or_default();
        let mut found: Vec<Record> = Self::matching(rows, filter.where_clause.as_ref())?
            .into_iter()
            .cloned()
            .collect();
        drop(tables);

        if let Some(order) = &filter.order {
            matcher::sort_records(&mut found, &FilterOrder::validate_and_parse(order)?);
        }

        let offset = filter.offset.unwrap_or(0).max(0) as usize;
        let max_limit = CONFIG.filter.max_limit.unwrap_or(i32::MAX);
        let limit = filter.limit.map(|l| l.clamp(0, max_limit) as usize).unwrap_or(usize::MAX);
        let mut page: Vec<Record> = found.into_iter().skip(offset).take(limit).collect();

        if let Some(select) = filter.select.filter(|cols| !cols.iter().any(|c| c == "*")) {
            page = page
                .into_iter()
                .map(|r| {
                    let mut projected = Record::new();
                    for col in &select {
                        if let Some(v) = r.get(col) {
                            projected.set(col.clone(), v.clone());
                        }
                    }
                    projected
                })
                .collect();
        }
        Ok(page)
    }

    async fn count(&self, resource: ResourceType, where_clause: Option<Value>) -> Result<i64, DatabaseError> {
        let tables = self.tables.read().await;
        let rows = tables.get(&resource).map(Vec::as_slice).unwrap_or_default();
        Ok(Self::matching(rows, where_clause.as_ref())?.len() as i64)
    }

    async fn find_by_id(&self, resource: ResourceType, id: &str) -> Result<Option<Record>, DatabaseError> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(&resource)
            .and_then(|rows| rows.iter().find(|r| r.id().as_deref() == Some(id)))
            .cloned())
    }

    async fn insert(&self, resource: ResourceType, mut record: Record) -> Result<Record, DatabaseError> {
        record.stamp_created(Uuid::new_v4().to_string());
        let mut tables = self.tables.write().await;
        tables.entry(resource).or_default().push(record.clone());
        Ok(record)
    }

    async fn update(&self, resource: ResourceType, id: &str, changes: Record) -> Result<Option<Record>, DatabaseError> {
        let mut tables = self.tables.write().await;
        let Some(row) = tables
            .get_mut(&resource)
            .and_then(|rows| rows.iter_mut().find(|r| r.id().as_deref() == Some(id)))
        else {
            return Ok(None);
        };
        let mut merged = row.merged_with(&changes);
        merged.stamp_updated();
        *row = merged.clone();
        Ok(Some(merged))
    }

    async fn delete(&self, resource: ResourceType, id: &str) -> Result<Option<Record>, DatabaseError> {
        let mut tables = self.tables.write().await;
        let Some(rows) = tables.get_mut(&resource) else {
            return Ok(None);
        };
        Ok(rows
            .iter()
            .position(|r| r.id().as_deref() == Some(id))
            .map(|idx| rows.remove(idx)))
    }
}
