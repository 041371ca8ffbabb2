use async_trait::async_trait;
use serde_json::Value;
use sqlx::{postgres::PgArguments, PgPool, Row};
use std::time::Instant;
use uuid::Uuid;

use crate::config::CONFIG;
use crate::database::manager::{DatabaseError, DatabaseManager};
use crate::database::record::Record;
use crate::database::store::DataStore;
use crate::filter::types::SqlResult;
use crate::filter::{Filter, FilterData};
use crate::rls::ResourceType;

type PgQuery<'q> = sqlx::query::Query<'q, sqlx::Postgres, PgArguments>;

/// Postgres-backed store. Rows come back through `row_to_json` so no
/// per-table structs are needed.
pub struct PgStore {
    manager: DatabaseManager,
}

impl PgStore {
    pub fn new(manager: DatabaseManager) -> Self {
        Self { manager }
    }

    fn pool(&self) -> &PgPool {
        self.manager.pool()
    }

    async fn fetch_records(&self, sql: &SqlResult) -> Result<Vec<Record>, DatabaseError> {
        let wrapped = format!("SELECT row_to_json(t) AS row FROM ({}) t", sql.query);
        let started = Instant::now();
        let mut q = sqlx::query(&wrapped);
        for p in sql.params.iter() {
            q = bind_param_query(q, p);
        }
        let rows = q.fetch_all(self.pool()).await?;
        log_query(&wrapped, started);
        rows.into_iter().map(row_to_record).collect()
    }

    async fn fetch_optional(&self, query: &str, params: &[Value]) -> Result<Option<Record>, DatabaseError> {
        let started = Instant::now();
        let mut q = sqlx::query(query);
        for p in params {
            q = bind_param_query(q, p);
        }
        let row = q.fetch_optional(self.pool()).await?;
        log_query(query, started);
        row.map(row_to_record).transpose()
    }
}

#[async_trait]
impl DataStore for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn find(&self, resource: ResourceType, filter_data: FilterData) -> Result<Vec<Record>, DatabaseError> {
        let mut filter = Filter::new(resource.table_name())?;
        filter.assign(filter_data)?;
        self.fetch_records(&filter.to_sql()?).await
    }

    async fn count(&self, resource: ResourceType, where_clause: Option<Value>) -> Result<i64, DatabaseError> {
        let mut filter = Filter::new(resource.table_name())?;
        if let Some(where_clause) = where_clause {
            filter.where_clause(where_clause)?;
        }
        let sql = filter.to_count_sql()?;

        let mut q = sqlx::query(&sql.query);
        for p in sql.params.iter() {
            q = bind_param_query(q, p);
        }
        let row = q.fetch_one(self.pool()).await?;
        let count: i64 = row.try_get("count")?;
        Ok(count)
    }

    async fn find_by_id(&self, resource: ResourceType, id: &str) -> Result<Option<Record>, DatabaseError> {
        let query = format!(
            "SELECT row_to_json(t) AS row FROM (SELECT * FROM \"{}\" WHERE \"id\" = $1) t",
            resource.table_name()
        );
        self.fetch_optional(&query, &[Value::String(id.to_string())]).await
    }

    async fn insert(&self, resource: ResourceType, record: Record) -> Result<Record, DatabaseError> {
        let mut columns = vec!["\"id\"".to_string()];
        let mut params = vec![Value::String(Uuid::new_v4().to_string())];
        // nulls are left to the column default; a text-typed NULL parameter
        // does not coerce into numeric/boolean/jsonb columns
        for (k, v) in record.fields().iter().filter(|(_, v)| !v.is_null()) {
            columns.push(format!("\"{}\"", k));
            params.push(v.clone());
        }
        let placeholders: Vec<String> = (1..=params.len()).map(|i| format!("${}", i)).collect();

        // created_at/updated_at come from column defaults
        let query = format!(
            "WITH ins AS (INSERT INTO \"{}\" ({}) VALUES ({}) RETURNING *) SELECT row_to_json(ins) AS row FROM ins",
            resource.table_name(),
            columns.join(", "),
            placeholders.join(", ")
        );
        self.fetch_optional(&query, &params)
            .await?
            .ok_or_else(|| DatabaseError::QueryError("insert returned no row".to_string()))
    }

    async fn update(&self, resource: ResourceType, id: &str, changes: Record) -> Result<Option<Record>, DatabaseError> {
        let mut assignments = vec!["\"updated_at\" = now()".to_string()];
        let mut params = Vec::with_capacity(changes.fields().len() + 1);
        for (k, v) in changes.fields() {
            if v.is_null() {
                assignments.push(format!("\"{}\" = NULL", k));
                continue;
            }
            params.push(v.clone());
            assignments.push(format!("\"{}\" = ${}", k, params.len()));
        }
        params.push(Value::String(id.to_string()));

        let query = format!(
            "WITH upd AS (UPDATE \"{}\" SET {} WHERE \"id\" = ${} RETURNING *) SELECT row_to_json(upd) AS row FROM upd",
            resource.table_name(),
            assignments.join(", "),
            params.len()
        );
        self.fetch_optional(&query, &params).await
    }

    async fn delete(&self, resource: ResourceType, id: &str) -> Result<Option<Record>, DatabaseError> {
        let query = format!(
            "WITH del AS (DELETE FROM \"{}\" WHERE \"id\" = $1 RETURNING *) SELECT row_to_json(del) AS row FROM del",
            resource.table_name()
        );
        self.fetch_optional(&query, &[Value::String(id.to_string())]).await
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        self.manager.health_check().await
    }
}

fn row_to_record(row: sqlx::postgres::PgRow) -> Result<Record, DatabaseError> {
    let value: Value = row.try_get("row")?;
    Record::from_value(value).map_err(|e| DatabaseError::QueryError(e.to_string()))
}

fn log_query(query: &str, started: Instant) {
    let elapsed = started.elapsed();
    if CONFIG.database.enable_query_logging {
        tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, "{}", query);
    }
    if CONFIG.database.enable_slow_query_warning
        && elapsed.as_millis() as u64 > CONFIG.database.slow_query_threshold_ms
    {
        tracing::warn!(elapsed_ms = elapsed.as_millis() as u64, "Slow query: {}", query);
    }
}

fn bind_param_query<'q>(q: PgQuery<'q>, v: &'q Value) -> PgQuery<'q> {
    match v {
        Value::Null => {
            let none: Option<String> = None;
            q.bind(none)
        }
        Value::Bool(b) => q.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else if let Some(f) = n.as_f64() {
                q.bind(f)
            } else {
                q.bind(n.to_string())
            }
        }
        Value::String(s) => q.bind(s),
        // where-clause arrays are expanded into placeholders before binding;
        // arrays reaching here are column values (JSONB)
        Value::Array(_) | Value::Object(_) => q.bind(v),
    }
}
