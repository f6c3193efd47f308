//! Filtered, ordered and limited collection queries.

use std::cmp::Ordering;

use serde_json::Value;

use super::{Document, StoredDocument};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl FilterOp {
    pub fn parse(op: &str) -> Result<Self> {
        match op {
            "==" => Ok(FilterOp::Eq),
            "!=" => Ok(FilterOp::Ne),
            "<" => Ok(FilterOp::Lt),
            "<=" => Ok(FilterOp::Le),
            ">" => Ok(FilterOp::Gt),
            ">=" => Ok(FilterOp::Ge),
            other => Err(Error::InvalidArgument(format!(
                "Unsupported filter operator '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    /// A document without the field never matches, whatever the operator.
    pub fn matches(&self, doc: &Document) -> bool {
        let Some(actual) = doc.get(&self.field) else {
            return false;
        };
        let ord = same_type_cmp(actual, &self.value);
        let equal = actual == &self.value || ord == Some(Ordering::Equal);
        match self.op {
            FilterOp::Eq => equal,
            FilterOp::Ne => !equal,
            FilterOp::Lt => ord == Some(Ordering::Less),
            FilterOp::Le => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
            FilterOp::Gt => ord == Some(Ordering::Greater),
            FilterOp::Ge => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: &str, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Apply filters, ordering and limit. Ordering by a field drops documents
    /// that lack it; ties keep id order.
    pub fn apply(&self, docs: impl IntoIterator<Item = StoredDocument>) -> Vec<StoredDocument> {
        let mut matched: Vec<StoredDocument> = docs
            .into_iter()
            .filter(|doc| self.filters.iter().all(|f| f.matches(&doc.data)))
            .collect();

        if let Some((field, direction)) = &self.order_by {
            matched.retain(|doc| doc.data.contains_key(field));
            matched.sort_by(|a, b| {
                let ord = total_cmp(&a.data[field], &b.data[field]);
                match direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            });
        }

        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }
        matched
    }
}

/// Comparison between values of the same JSON type; `None` across types.
fn same_type_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Sort order: by type rank first, then by value within a type.
fn total_cmp(a: &Value, b: &Value) -> Ordering {
    type_rank(a)
        .cmp(&type_rank(b))
        .then_with(|| same_type_cmp(a, b).unwrap_or(Ordering::Equal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, data: Value) -> StoredDocument {
        StoredDocument {
            id: id.to_string(),
            data: data.as_object().cloned().unwrap(),
        }
    }

    fn docs() -> Vec<StoredDocument> {
        vec![
            doc("a", json!({ "userId": "1", "totalScore": 10 })),
            doc("b", json!({ "userId": "2", "totalScore": 30 })),
            doc("c", json!({ "userId": "1", "totalScore": 25.0 })),
            doc("d", json!({ "userId": "1" })),
        ]
    }

    fn ids(result: &[StoredDocument]) -> Vec<&str> {
        result.iter().map(|d| d.id.as_str()).collect()
    }

    #[test]
    fn parses_operators() {
        assert_eq!(FilterOp::parse("<=").unwrap(), FilterOp::Le);
        assert!(FilterOp::parse("~=").is_err());
    }

    #[test]
    fn equality_and_ordering_filters() {
        let q = Query::new().filter("userId", FilterOp::Eq, "1");
        assert_eq!(ids(&q.apply(docs())), vec!["a", "c", "d"]);

        let q = Query::new().filter("totalScore", FilterOp::Ge, 25);
        assert_eq!(ids(&q.apply(docs())), vec!["b", "c"]);

        let q = Query::new().filter("totalScore", FilterOp::Ne, 10);
        assert_eq!(ids(&q.apply(docs())), vec!["b", "c"]);
    }

    #[test]
    fn no_cross_type_comparison() {
        let q = Query::new().filter("userId", FilterOp::Eq, 1);
        assert!(q.apply(docs()).is_empty());
        let q = Query::new().filter("userId", FilterOp::Lt, 5);
        assert!(q.apply(docs()).is_empty());
    }

    #[test]
    fn order_and_limit() {
        let q = Query::new()
            .order_by("totalScore", Direction::Desc)
            .limit(2);
        assert_eq!(ids(&q.apply(docs())), vec!["b", "c"]);

        let q = Query::new().order_by("totalScore", Direction::Asc);
        assert_eq!(ids(&q.apply(docs())), vec!["a", "c", "b"]);
    }
}
