//! Filter / sort / limit / projection over JSON documents.

use chrono::{DateTime, FixedOffset};
use serde_json::{Map, Value};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    /// Field is present and not null.
    Exists(String),
    In(String, Vec<Value>),
}

impl Filter {
    fn matches(&self, doc: &Value) -> bool {
        match self {
            Filter::Eq(path, v) => field(doc, path).is_some_and(|f| compare(f, v) == Some(Ordering::Equal)),
            Filter::Gte(path, v) => field(doc, path)
                .and_then(|f| compare(f, v))
                .is_some_and(|o| o != Ordering::Less),
            Filter::Lt(path, v) => field(doc, path)
                .and_then(|f| compare(f, v))
                .is_some_and(|o| o == Ordering::Less),
            Filter::Lte(path, v) => field(doc, path)
                .and_then(|f| compare(f, v))
                .is_some_and(|o| o != Ordering::Greater),
            Filter::Exists(path) => field(doc, path).is_some_and(|f| !f.is_null()),
            Filter::In(path, vs) => field(doc, path)
                .is_some_and(|f| vs.iter().any(|v| compare(f, v) == Some(Ordering::Equal))),
        }
    }
}

/// A find query. Built with the chained helpers:
///
/// ```ignore
/// Query::new()
///     .eq("pumpName", "Pompa Sunter Utara")
///     .range("capturedAt", start, end)
///     .sort("capturedAt", Order::Asc)
///     .limit(500)
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub sort: Vec<(String, Order)>,
    pub limit: Option<usize>,
    pub projection: Option<Vec<String>>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, f: Filter) -> Self {
        self.filters.push(f);
        self
    }

    pub fn eq(self, path: &str, v: impl Into<Value>) -> Self {
        self.filter(Filter::Eq(path.to_string(), v.into()))
    }

    /// Half-open `[start, end)` range on `path`.
    pub fn range(self, path: &str, start: impl Into<Value>, end: impl Into<Value>) -> Self {
        self.filter(Filter::Gte(path.to_string(), start.into()))
            .filter(Filter::Lt(path.to_string(), end.into()))
    }

    pub fn sort(mut self, path: &str, order: Order) -> Self {
        self.sort.push((path.to_string(), order));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn project(mut self, fields: &[&str]) -> Self {
        self.projection = Some(fields.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(doc))
    }

    /// The same filters without sort, limit or projection.
    pub fn filters_only(&self) -> Query {
        Query {
            filters: self.filters.clone(),
            ..Query::default()
        }
    }

    /// Applies sort, limit and projection to already-filtered documents.
    /// Sorting is stable, so equal keys keep insertion order.
    pub fn finish(&self, mut docs: Vec<Value>) -> Vec<Value> {
        if !self.sort.is_empty() {
            docs.sort_by(|a, b| {
                for (path, order) in &self.sort {
                    let ord = order_fields(field(a, path), field(b, path), *order);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        if let Some(n) = self.limit {
            docs.truncate(n);
        }

        match &self.projection {
            Some(fields) => docs.into_iter().map(|d| project(&d, fields)).collect(),
            None => docs,
        }
    }
}

/// Resolves a dotted path (`pump.name`) inside a document.
pub fn field<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |cur, key| cur.get(key))
}

/// Orders two JSON scalars. Numbers compare numerically; strings that both
/// parse as RFC 3339 compare as instants (fractional-second widths differ
/// between writers, so plain string order is wrong); other strings compare
/// lexicographically. Mixed or non-scalar types are incomparable.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => match (parse_instant(x), parse_instant(y)) {
            (Some(tx), Some(ty)) => Some(tx.cmp(&ty)),
            _ => Some(x.cmp(y)),
        },
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn parse_instant(s: &str) -> Option<DateTime<FixedOffset>> {
    // Cheap pre-check keeps plain names from hitting the parser.
    if s.len() < 20 || !s.as_bytes()[0].is_ascii_digit() {
        return None;
    }
    DateTime::parse_from_rfc3339(s).ok()
}

/// Missing values sort last in either direction; incomparable ones tie.
fn order_fields(a: Option<&Value>, b: Option<&Value>, order: Order) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => {
            let ord = compare(x, y).unwrap_or(Ordering::Equal);
            match order {
                Order::Asc => ord,
                Order::Desc => ord.reverse(),
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn project(doc: &Value, fields: &[String]) -> Value {
    let mut out = Map::new();
    for path in fields {
        if let Some(v) = field(doc, path) {
            out.insert(path.clone(), v.clone());
        }
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_range_on_timestamps_ignores_fraction_width() {
        let q = Query::new().range("t", "2024-01-01T10:00:00Z", "2024-01-01T11:00:00Z");
        assert!(q.matches(&json!({"t": "2024-01-01T10:00:00.500Z"})));
        assert!(q.matches(&json!({"t": "2024-01-01T10:00:00Z"})));
        assert!(!q.matches(&json!({"t": "2024-01-01T11:00:00Z"})));
        assert!(!q.matches(&json!({"t": "2024-01-01T09:59:59.999+00:00"})));
    }

    #[test]
    fn test_eq_and_missing_field() {
        let q = Query::new().eq("pump.name", "A");
        assert!(q.matches(&json!({"pump": {"name": "A"}})));
        assert!(!q.matches(&json!({"pump": {}})));
        assert!(!q.matches(&json!({})));
    }

    #[test]
    fn test_sort_limit_project() {
        let docs = vec![
            json!({"n": "a", "v": 1.5}),
            json!({"n": "b", "v": 3}),
            json!({"n": "c"}),
            json!({"n": "d", "v": 2}),
        ];
        let out = Query::new()
            .sort("v", Order::Desc)
            .limit(3)
            .project(&["n"])
            .finish(docs);
        assert_eq!(out, vec![json!({"n": "b"}), json!({"n": "d"}), json!({"n": "a"})]);
    }

    #[test]
    fn test_in_and_exists() {
        let q = Query::new()
            .filter(Filter::In("k".into(), vec![json!(1), json!(2)]))
            .filter(Filter::Exists("x".into()));
        assert!(q.matches(&json!({"k": 2, "x": 0})));
        assert!(!q.matches(&json!({"k": 2, "x": null})));
        assert!(!q.matches(&json!({"k": 3, "x": 0})));
    }
}
