use serde_json::{json, Value};

use super::decision::{AccessDecision, FilterPredicate};
use crate::database::record::Record;
use crate::filter::FilterData;

/// Persistence-facing form of a row filter.
///
/// Renders into the same JSON where-language callers use for search, so the
/// data layer treats it as one more AND-ed clause and never needs to know
/// where it came from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryConstraint {
    predicate: Option<FilterPredicate>,
}

pub fn to_query_constraint(predicate: &FilterPredicate) -> QueryConstraint {
    QueryConstraint {
        predicate: Some(predicate.clone()),
    }
}

impl QueryConstraint {
    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn from_decision(decision: &AccessDecision) -> Self {
        decision
            .filter_predicate
            .as_ref()
            .map(to_query_constraint)
            .unwrap_or_default()
    }

    pub fn matches_nothing(&self) -> bool {
        matches!(self.predicate, Some(FilterPredicate::MatchNothing))
    }

    pub fn to_where(&self) -> Option<Value> {
        self.predicate.as_ref().map(|p| match p {
            // empty $in renders as 1=0 in SQL and matches nothing in memory
            FilterPredicate::MatchNothing => json!({ "id": { "$in": [] } }),
            FilterPredicate::FieldEquals { field, value } => json!({ field.as_str(): { "$eq": value } }),
        })
    }

    /// AND this constraint onto a caller-supplied filter, leaving select,
    /// order and paging untouched
    pub fn apply(&self, mut filter: FilterData) -> FilterData {
        let Some(constraint) = self.to_where() else {
            return filter;
        };
        filter.where_clause = Some(match filter.where_clause.take() {
            None | Some(Value::Null) => constraint,
            Some(caller) => json!({ "$and": [caller, constraint] }),
        });
        filter
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.predicate.as_ref().map(|p| p.matches(record)).unwrap_or(true)
    }
}
