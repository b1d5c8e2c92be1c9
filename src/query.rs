//! Query expressions and their raw (identity-level) results.

use crate::types::{Record, RecordIdentity};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Comparison applied by an attribute filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOp {
    Equal,
    NotEqual,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Filter on one attribute value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttributeFilter {
    pub attribute: String,
    pub op: FilterOp,
    pub value: Value,
}

impl AttributeFilter {
    pub fn new(attribute: impl Into<String>, op: FilterOp, value: Value) -> Self {
        Self {
            attribute: attribute.into(),
            op,
            value,
        }
    }

    pub fn equal(attribute: impl Into<String>, value: Value) -> Self {
        Self::new(attribute, FilterOp::Equal, value)
    }

    /// Whether `record` passes this filter. A missing attribute compares as null.
    pub fn matches(&self, record: &Record) -> bool {
        let actual = record.attribute(&self.attribute).unwrap_or(&Value::Null);
        match self.op {
            FilterOp::Equal => actual == &self.value,
            FilterOp::NotEqual => actual != &self.value,
            FilterOp::Gt => compare_values(actual, &self.value) == Some(Ordering::Greater),
            FilterOp::Gte => matches!(
                compare_values(actual, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::Lt => compare_values(actual, &self.value) == Some(Ordering::Less),
            FilterOp::Lte => matches!(
                compare_values(actual, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpecifier {
    pub attribute: String,
    pub order: SortOrder,
}

impl SortSpecifier {
    pub fn ascending(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            order: SortOrder::Ascending,
        }
    }

    pub fn descending(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            order: SortOrder::Descending,
        }
    }
}

/// Order two attribute values of the same JSON kind. Null sorts first;
/// values of different kinds are incomparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, _) => Some(Ordering::Less),
        (_, Value::Null) => Some(Ordering::Greater),
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Order records by a list of sort specifiers (stable).
pub fn sort_records(records: &mut [&Record], sort: &[SortSpecifier]) {
    if sort.is_empty() {
        return;
    }
    records.sort_by(|a, b| {
        for spec in sort {
            let left = a.attribute(&spec.attribute).unwrap_or(&Value::Null);
            let right = b.attribute(&spec.attribute).unwrap_or(&Value::Null);
            let ordering = compare_values(left, right).unwrap_or(Ordering::Equal);
            let ordering = match spec.order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

/// A query against a source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum QueryExpression {
    FindRecord {
        record: RecordIdentity,
    },
    FindRecords {
        #[serde(rename = "type")]
        record_type: String,
        #[serde(default)]
        filter: Vec<AttributeFilter>,
        #[serde(default)]
        sort: Vec<SortSpecifier>,
    },
    FindRelatedRecord {
        record: RecordIdentity,
        relationship: String,
    },
    FindRelatedRecords {
        record: RecordIdentity,
        relationship: String,
    },
}

impl QueryExpression {
    pub fn find_record(record: RecordIdentity) -> Self {
        QueryExpression::FindRecord { record }
    }

    pub fn find_records(record_type: impl Into<String>) -> Self {
        QueryExpression::FindRecords {
            record_type: record_type.into(),
            filter: Vec::new(),
            sort: Vec::new(),
        }
    }

    pub fn find_related_record(record: RecordIdentity, relationship: impl Into<String>) -> Self {
        QueryExpression::FindRelatedRecord {
            record,
            relationship: relationship.into(),
        }
    }

    pub fn find_related_records(record: RecordIdentity, relationship: impl Into<String>) -> Self {
        QueryExpression::FindRelatedRecords {
            record,
            relationship: relationship.into(),
        }
    }

    /// Add a filter term. Only collection queries filter; others are unchanged.
    pub fn filter(mut self, term: AttributeFilter) -> Self {
        if let QueryExpression::FindRecords { filter, .. } = &mut self {
            filter.push(term);
        }
        self
    }

    /// Add a sort term. Only collection queries sort; others are unchanged.
    pub fn sort(mut self, term: SortSpecifier) -> Self {
        if let QueryExpression::FindRecords { sort, .. } = &mut self {
            sort.push(term);
        }
        self
    }

    /// Whether the query yields a collection.
    pub fn is_many(&self) -> bool {
        matches!(
            self,
            QueryExpression::FindRecords { .. } | QueryExpression::FindRelatedRecords { .. }
        )
    }
}

/// Identity-level query result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryResult {
    Record(Option<RecordIdentity>),
    Records(Vec<RecordIdentity>),
}

impl QueryResult {
    pub fn into_identities(self) -> Vec<RecordIdentity> {
        match self {
            QueryResult::Record(Some(identity)) => vec![identity],
            QueryResult::Record(None) => Vec::new(),
            QueryResult::Records(identities) => identities,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn person(id: &str, name: &str, age: i64) -> Record {
        Record::new(RecordIdentity::new("person", id))
            .with_attribute("name", json!(name))
            .with_attribute("age", json!(age))
    }

    #[test]
    fn test_filter_ops() {
        let paul = person("1", "Paul", 40);

        assert!(AttributeFilter::equal("name", json!("Paul")).matches(&paul));
        assert!(AttributeFilter::new("name", FilterOp::NotEqual, json!("Eve")).matches(&paul));
        assert!(AttributeFilter::new("age", FilterOp::Gt, json!(30)).matches(&paul));
        assert!(AttributeFilter::new("age", FilterOp::Gte, json!(40)).matches(&paul));
        assert!(!AttributeFilter::new("age", FilterOp::Lt, json!(40)).matches(&paul));
        assert!(AttributeFilter::new("age", FilterOp::Lte, json!(40.0)).matches(&paul));
        // mismatched kinds never satisfy an ordering filter
        assert!(!AttributeFilter::new("name", FilterOp::Gt, json!(1)).matches(&paul));
    }

    #[test]
    fn test_missing_attribute_is_null() {
        let record = Record::new(RecordIdentity::new("person", "1"));
        assert!(AttributeFilter::equal("name", Value::Null).matches(&record));
    }

    #[test]
    fn test_sort_records() {
        let a = person("1", "Paul", 40);
        let b = person("2", "Eve", 30);
        let c = person("3", "Adam", 40);
        let mut records = vec![&a, &b, &c];

        sort_records(
            &mut records,
            &[SortSpecifier::descending("age"), SortSpecifier::ascending("name")],
        );

        let ids: Vec<_> = records.iter().map(|r| r.identity.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "1", "2"]);
    }

    #[test]
    fn test_filter_only_applies_to_collections() {
        let query = QueryExpression::find_record(RecordIdentity::new("person", "1"))
            .filter(AttributeFilter::equal("name", json!("Paul")));
        assert_eq!(
            query,
            QueryExpression::find_record(RecordIdentity::new("person", "1"))
        );
        assert!(QueryExpression::find_records("person").is_many());
        assert!(!query.is_many());
    }
}
