use std::cmp::Ordering;

use super::record::{FieldValue, ListRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub key: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(key: impl Into<String>, direction: SortDirection) -> Self {
        SortSpec {
            key: key.into(),
            direction,
        }
    }
}

/// Precomputed comparison key; text is lower-cased once per record.
#[derive(Debug, Clone, PartialEq)]
enum SortKey {
    Empty,
    Bool(bool),
    Number(f64),
    Date(i64),
    Text(String),
}

impl SortKey {
    fn rank(&self) -> u8 {
        match self {
            SortKey::Empty => 0,
            SortKey::Bool(_) => 1,
            SortKey::Number(_) => 2,
            SortKey::Date(_) => 3,
            SortKey::Text(_) => 4,
        }
    }
}

impl From<FieldValue> for SortKey {
    fn from(value: FieldValue) -> Self {
        match value {
            FieldValue::Empty => SortKey::Empty,
            FieldValue::Bool(b) => SortKey::Bool(b),
            FieldValue::Number(n) => SortKey::Number(n),
            FieldValue::Date(d) => SortKey::Date(d.timestamp_millis()),
            FieldValue::Text(s) => SortKey::Text(s.to_lowercase()),
            FieldValue::List(items) => SortKey::Text(items.join(", ").to_lowercase()),
        }
    }
}

fn compare_keys(a: &SortKey, b: &SortKey) -> Ordering {
    match (a, b) {
        (SortKey::Text(x), SortKey::Text(y)) => x.cmp(y),
        (SortKey::Number(x), SortKey::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (SortKey::Date(x), SortKey::Date(y)) => x.cmp(y),
        (SortKey::Bool(x), SortKey::Bool(y)) => x.cmp(y),
        _ => a.rank().cmp(&b.rank()),
    }
}

/// Stable sort: records with equal keys keep their input order.
pub fn sort_records<R: ListRecord>(records: &mut Vec<&R>, sort: &SortSpec) {
    let mut keyed: Vec<(SortKey, &R)> = records
        .drain(..)
        .map(|r| (SortKey::from(r.field(&sort.key)), r))
        .collect();

    keyed.sort_by(|(a, _), (b, _)| {
        let ord = compare_keys(a, b);
        match sort.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    });

    records.extend(keyed.into_iter().map(|(_, r)| r));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::test_support::{doc, Doc};
    use chrono::{TimeZone, Utc};

    fn sorted<'a>(docs: &'a [Doc], key: &str, direction: SortDirection) -> Vec<&'a str> {
        let mut refs: Vec<&Doc> = docs.iter().collect();
        sort_records(&mut refs, &SortSpec::new(key, direction));
        refs.iter().map(|d| d.id.as_str()).collect()
    }

    fn sample() -> Vec<Doc> {
        vec![
            doc("a", "beta", "imagem", 2, "2024-03-01"),
            doc("b", "Alpha", "documento", 10, "2024-01-01"),
            doc("c", "gamma", "imagem", 2, "2024-02-01"),
            doc("d", "ALPHA", "video", 1, "2024-01-01"),
        ]
    }

    #[test]
    fn test_text_sort_is_case_insensitive() {
        let docs = sample();
        assert_eq!(sorted(&docs, "title", SortDirection::Asc), vec!["b", "d", "a", "c"]);
        assert_eq!(sorted(&docs, "title", SortDirection::Desc), vec!["c", "a", "b", "d"]);
    }

    #[test]
    fn test_numeric_sort() {
        let docs = sample();
        // 10 sorts after 2 numerically, not lexically
        assert_eq!(sorted(&docs, "priority", SortDirection::Asc), vec!["d", "a", "c", "b"]);
    }

    #[test]
    fn test_date_sort() {
        let docs = sample();
        assert_eq!(sorted(&docs, "created_at", SortDirection::Desc), vec!["a", "c", "b", "d"]);
    }

    #[test]
    fn test_stability_on_equal_keys() {
        let docs = sample();
        // a and c share priority 2; b and d share a date
        let asc = sorted(&docs, "priority", SortDirection::Asc);
        let a = asc.iter().position(|id| *id == "a").unwrap();
        let c = asc.iter().position(|id| *id == "c").unwrap();
        assert!(a < c);

        let desc = sorted(&docs, "created_at", SortDirection::Desc);
        let b = desc.iter().position(|id| *id == "b").unwrap();
        let d = desc.iter().position(|id| *id == "d").unwrap();
        assert!(b < d);

        let by_type = sorted(&docs, "type", SortDirection::Asc);
        assert_eq!(by_type, vec!["b", "a", "c", "d"]);
    }

    #[test]
    fn test_unknown_key_keeps_order() {
        let docs = sample();
        assert_eq!(sorted(&docs, "nope", SortDirection::Desc), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_compare_keys_mixed() {
        let compare_values = |a: FieldValue, b: FieldValue| compare_keys(&SortKey::from(a), &SortKey::from(b));
        let date = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            compare_values(FieldValue::Empty, FieldValue::from("x")),
            Ordering::Less
        );
        assert_eq!(
            compare_values(FieldValue::from(date), FieldValue::from(date)),
            Ordering::Equal
        );
        assert_eq!(
            compare_values(FieldValue::from(false), FieldValue::from(true)),
            Ordering::Less
        );
    }
}
