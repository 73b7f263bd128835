use std::borrow::Cow;

use chrono::{DateTime, Utc};

use super::sort::SortDirection;

/// Runtime value of a record field as seen by the list pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Empty,
    Text(String),
    Number(f64),
    Date(DateTime<Utc>),
    Bool(bool),
    List(Vec<String>),
}

impl FieldValue {
    /// `true` unless the value is missing, blank text or an empty list.
    pub fn is_present(&self) -> bool {
        match self {
            FieldValue::Empty => false,
            FieldValue::Text(s) => !s.trim().is_empty(),
            FieldValue::List(items) => !items.is_empty(),
            _ => true,
        }
    }

    /// Text the search filter looks into. Only textual values are searchable.
    pub fn searchable_text(&self) -> Option<Cow<'_, str>> {
        match self {
            FieldValue::Text(s) => Some(Cow::Borrowed(s.as_str())),
            FieldValue::List(items) => Some(Cow::Owned(items.join(", "))),
            _ => None,
        }
    }

    /// Exact equality against a categorical filter value.
    /// For list values a single matching element is enough.
    pub fn equals_filter(&self, value: &str) -> bool {
        match self {
            FieldValue::Empty => false,
            FieldValue::Text(s) => s == value,
            FieldValue::Number(n) => value.trim().parse::<f64>().map(|v| v == *n).unwrap_or(false),
            FieldValue::Date(d) => d.date_naive().to_string() == value || d.to_rfc3339() == value,
            FieldValue::Bool(b) => value.eq_ignore_ascii_case(if *b { "true" } else { "false" }),
            FieldValue::List(items) => items.iter().any(|item| item == value),
        }
    }

    /// Human-readable rendering used by exports.
    pub fn display(&self) -> String {
        match self {
            FieldValue::Empty => String::new(),
            FieldValue::Text(s) => s.clone(),
            FieldValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Date(d) => d.format("%d/%m/%Y").to_string(),
            FieldValue::Bool(true) => "Sim".to_string(),
            FieldValue::Bool(false) => "Não".to_string(),
            FieldValue::List(items) => items.join(", "),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Empty)
    }
}

impl From<i32> for FieldValue {
    fn from(n: i32) -> Self {
        FieldValue::Number(f64::from(n))
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Number(n as f64)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(d: DateTime<Utc>) -> Self {
        FieldValue::Date(d)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(items: Vec<String>) -> Self {
        FieldValue::List(items)
    }
}

/// A row a manager lists. `id` must be unique within a result set.
pub trait ListRecord {
    fn id(&self) -> &str;

    /// Value of a named field; unknown names yield `FieldValue::Empty`.
    fn field(&self, name: &str) -> FieldValue;
}

/// Per-manager constants: which fields are searched, filtered and sorted.
#[derive(Debug, Clone, Copy)]
pub struct ListSpec {
    pub search_fields: &'static [&'static str],
    pub filter_fields: &'static [&'static str],
    /// Fields accepted only as "has a value" conditions
    pub required_fields: &'static [&'static str],
    pub sort_fields: &'static [&'static str],
    /// Field the date range filter applies to
    pub date_field: &'static str,
    pub default_sort: (&'static str, SortDirection),
    pub page_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_presence() {
        assert!(!FieldValue::Empty.is_present());
        assert!(!FieldValue::from("  ").is_present());
        assert!(!FieldValue::List(vec![]).is_present());
        assert!(FieldValue::from(false).is_present());
        assert!(FieldValue::from(Some("x")).is_present());
        assert!(!FieldValue::from(None::<String>).is_present());
    }

    #[test]
    fn test_equals_filter() {
        assert!(FieldValue::from("documento").equals_filter("documento"));
        assert!(!FieldValue::from("Documento").equals_filter("documento"));
        assert!(FieldValue::from(true).equals_filter("true"));
        assert!(FieldValue::from(3).equals_filter("3"));
        assert!(FieldValue::List(vec!["Saúde".into(), "Educação".into()]).equals_filter("Saúde"));
        let date = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert!(FieldValue::from(date).equals_filter("2024-05-01"));
        assert!(!FieldValue::Empty.equals_filter(""));
    }

    #[test]
    fn test_display() {
        assert_eq!(FieldValue::from(30).display(), "30");
        assert_eq!(FieldValue::from(-8.25).display(), "-8.25");
        assert_eq!(FieldValue::from(true).display(), "Sim");
        let date = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(FieldValue::from(date).display(), "01/05/2024");
        assert_eq!(
            FieldValue::List(vec!["a".into(), "b".into()]).display(),
            "a, b"
        );
    }
}
