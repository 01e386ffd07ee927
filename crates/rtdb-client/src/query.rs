//! Query-string builder for filtered reads and streams
//!
//! The REST protocol expects filter values as JSON literals, so string
//! bounds are quoted and numeric bounds are not:
//!
//! ```
//! use rtdb_client::QueryBuilder;
//!
//! let query = QueryBuilder::new().order_by("priority").start_at(2).end_at(4);
//! assert_eq!(
//!     query.to_pairs(),
//!     vec![
//!         ("orderBy".to_string(), "\"priority\"".to_string()),
//!         ("startAt".to_string(), "2".to_string()),
//!         ("endAt".to_string(), "4".to_string()),
//!     ]
//! );
//! ```

use serde_json::Value;
use url::Url;

/// Filter and formatting options appended to a request URL
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryBuilder {
    order_by: Option<String>,
    start_at: Option<Value>,
    end_at: Option<Value>,
    equal_to: Option<Value>,
    limit_to_first: Option<u32>,
    limit_to_last: Option<u32>,
    shallow: bool,
    print: Option<String>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Order by a child key, or by `$key`, `$value`, `$priority`
    #[must_use]
    pub fn order_by(mut self, key: impl Into<String>) -> Self {
        self.order_by = Some(key.into());
        self
    }

    #[must_use]
    pub fn start_at(mut self, value: impl Into<Value>) -> Self {
        self.start_at = Some(value.into());
        self
    }

    #[must_use]
    pub fn end_at(mut self, value: impl Into<Value>) -> Self {
        self.end_at = Some(value.into());
        self
    }

    #[must_use]
    pub fn equal_to(mut self, value: impl Into<Value>) -> Self {
        self.equal_to = Some(value.into());
        self
    }

    #[must_use]
    pub fn limit_to_first(mut self, count: u32) -> Self {
        self.limit_to_first = Some(count);
        self
    }

    #[must_use]
    pub fn limit_to_last(mut self, count: u32) -> Self {
        self.limit_to_last = Some(count);
        self
    }

    /// Return only the keys one level below the path (values become `true`)
    #[must_use]
    pub fn shallow(mut self, shallow: bool) -> Self {
        self.shallow = shallow;
        self
    }

    /// Response formatting, e.g. `pretty` or `silent`
    #[must_use]
    pub fn print(mut self, format: impl Into<String>) -> Self {
        self.print = Some(format.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.to_pairs().is_empty()
    }

    /// Query parameters in the order the protocol documents them
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(key) = &self.order_by {
            pairs.push(("orderBy".to_string(), Value::from(key.as_str()).to_string()));
        }
        let bounds = [
            ("startAt", &self.start_at),
            ("endAt", &self.end_at),
            ("equalTo", &self.equal_to),
        ];
        for (name, value) in bounds {
            if let Some(value) = value {
                pairs.push((name.to_string(), value.to_string()));
            }
        }
        if let Some(count) = self.limit_to_first {
            pairs.push(("limitToFirst".to_string(), count.to_string()));
        }
        if let Some(count) = self.limit_to_last {
            pairs.push(("limitToLast".to_string(), count.to_string()));
        }
        if self.shallow {
            pairs.push(("shallow".to_string(), "true".to_string()));
        }
        if let Some(format) = &self.print {
            pairs.push(("print".to_string(), format.clone()));
        }
        pairs
    }

    /// Append these parameters to `url`
    pub fn apply(&self, url: &mut Url) {
        let pairs = self.to_pairs();
        if pairs.is_empty() {
            return;
        }
        let mut query = url.query_pairs_mut();
        for (name, value) in &pairs {
            query.append_pair(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_query() {
        let query = QueryBuilder::new();
        assert!(query.is_empty());

        let mut url = Url::parse("http://localhost/todos.json").unwrap();
        query.apply(&mut url);
        assert_eq!(url.as_str(), "http://localhost/todos.json");
    }

    #[test]
    fn test_string_bounds_are_quoted() {
        let query = QueryBuilder::new().order_by("$key").start_at("Exe");
        assert_eq!(
            query.to_pairs(),
            vec![
                ("orderBy".to_string(), "\"$key\"".to_string()),
                ("startAt".to_string(), "\"Exe\"".to_string()),
            ]
        );
    }

    #[test]
    fn test_limits_and_flags() {
        let query = QueryBuilder::new()
            .order_by("$value")
            .equal_to(true)
            .limit_to_first(5)
            .limit_to_last(2)
            .shallow(true)
            .print("pretty");
        assert_eq!(
            query.to_pairs(),
            vec![
                ("orderBy".to_string(), "\"$value\"".to_string()),
                ("equalTo".to_string(), "true".to_string()),
                ("limitToFirst".to_string(), "5".to_string()),
                ("limitToLast".to_string(), "2".to_string()),
                ("shallow".to_string(), "true".to_string()),
                ("print".to_string(), "pretty".to_string()),
            ]
        );
    }

    #[test]
    fn test_apply_encodes_values() {
        let mut url = Url::parse("http://localhost/todos.json?auth=abc").unwrap();
        QueryBuilder::new()
            .order_by("priority")
            .start_at(2)
            .apply(&mut url);
        assert_eq!(
            url.as_str(),
            "http://localhost/todos.json?auth=abc&orderBy=%22priority%22&startAt=2"
        );
    }
}
