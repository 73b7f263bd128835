use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use unicode_normalization::UnicodeNormalization;

use crate::error::{AppError, AppResult};

use super::record::{ListRecord, ListSpec};

/// Filter value meaning "this filter is disabled".
pub const ALL: &str = "all";

/// Text comparison policy shared by every manager's search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextMatch {
    /// Lower-case both sides; accents are significant.
    #[default]
    CaseInsensitive,
    /// Lower-case and strip combining marks (NFD), so "orcamento" finds "ORÇAMENTO".
    FoldDiacritics,
}

impl TextMatch {
    pub fn normalize(self, text: &str) -> String {
        match self {
            TextMatch::CaseInsensitive => text.to_lowercase(),
            TextMatch::FoldDiacritics => text
                .nfd()
                .filter(|c| !('\u{0300}'..='\u{036f}').contains(c))
                .collect::<String>()
                .to_lowercase(),
        }
    }

    pub fn contains(self, haystack: &str, needle: &str) -> bool {
        self.normalize(haystack).contains(&self.normalize(needle))
    }
}

/// Inclusive creation-date window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    /// Parses RFC 3339 timestamps or plain `YYYY-MM-DD` dates.
    /// A plain `to` date covers the whole day. Returns `None` when both are empty.
    pub fn parse(from: &str, to: &str) -> AppResult<Option<Self>> {
        let from = parse_bound(from, NaiveTime::MIN)?;
        let to = parse_bound(to, NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN))?;
        if from.is_none() && to.is_none() {
            return Ok(None);
        }
        if let (Some(f), Some(t)) = (from, to) {
            if f > t {
                return Err(AppError::invalid("date_from must not be after date_to"));
            }
        }
        Ok(Some(DateRange { from, to }))
    }

    pub fn contains(&self, at: &DateTime<Utc>) -> bool {
        self.from.map_or(true, |f| *at >= f) && self.to.map_or(true, |t| *at <= t)
    }
}

fn parse_bound(raw: &str, day_time: NaiveTime) -> AppResult<Option<DateTime<Utc>>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|d| Some(Utc.from_utc_datetime(&d.and_time(day_time))))
        .map_err(|_| AppError::invalid(format!("invalid date: {}", raw)))
}

/// Filter state of a list view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListFilter {
    pub search: String,
    /// field name -> selected value; `ALL` or empty disables the entry
    pub categorical: BTreeMap<String, String>,
    pub date_range: Option<DateRange>,
    /// Fields that must hold a non-empty value
    pub required: Vec<String>,
}

impl ListFilter {
    pub fn search(needle: impl Into<String>) -> Self {
        ListFilter {
            search: needle.into(),
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.categorical.insert(field.into(), value.into());
        self
    }

    /// Categorical entries that actually constrain the result.
    pub fn active_filters(&self) -> impl Iterator<Item = (&str, &str)> {
        self.categorical
            .iter()
            .filter(|(_, v)| !is_sentinel(v))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `true` when no part of the filter constrains the input.
    pub fn is_passthrough(&self) -> bool {
        self.search.trim().is_empty()
            && self.active_filters().next().is_none()
            && self.date_range.is_none()
            && self.required.is_empty()
    }

    pub fn matches_search<R: ListRecord>(&self, record: &R, spec: &ListSpec, policy: TextMatch) -> bool {
        let needle = self.search.trim();
        if needle.is_empty() {
            return true;
        }
        let needle = policy.normalize(needle);
        spec.search_fields.iter().any(|field| {
            record
                .field(field)
                .searchable_text()
                .map_or(false, |text| policy.normalize(&text).contains(&needle))
        })
    }

    pub fn matches_categorical<R: ListRecord>(&self, record: &R) -> bool {
        self.active_filters()
            .all(|(field, value)| record.field(field).equals_filter(value))
    }

    pub fn matches_extra<R: ListRecord>(&self, record: &R, spec: &ListSpec) -> bool {
        let in_range = match &self.date_range {
            Some(range) => match record.field(spec.date_field) {
                super::FieldValue::Date(at) => range.contains(&at),
                _ => false,
            },
            None => true,
        };
        in_range && self.required.iter().all(|f| record.field(f).is_present())
    }

    pub fn matches<R: ListRecord>(&self, record: &R, spec: &ListSpec, policy: TextMatch) -> bool {
        self.matches_search(record, spec, policy)
            && self.matches_categorical(record)
            && self.matches_extra(record, spec)
    }

    /// Rejects filters on fields the manager does not expose.
    pub fn validate(&self, spec: &ListSpec) -> AppResult<()> {
        for (field, _) in self.active_filters() {
            if !spec.filter_fields.contains(&field) {
                return Err(AppError::invalid(format!("unknown filter field: {}", field)));
            }
        }
        for field in &self.required {
            let field = field.as_str();
            if !spec.required_fields.contains(&field)
                && !spec.filter_fields.contains(&field)
                && !spec.search_fields.contains(&field)
            {
                return Err(AppError::invalid(format!("unknown required field: {}", field)));
            }
        }
        Ok(())
    }
}

pub fn is_sentinel(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value == ALL
}

/// Keeps the records matching `filter`, preserving input order.
pub fn apply<'a, R, I>(records: I, filter: &ListFilter, spec: &ListSpec, policy: TextMatch) -> Vec<&'a R>
where
    R: ListRecord + 'a,
    I: IntoIterator<Item = &'a R>,
{
    if filter.is_passthrough() {
        return records.into_iter().collect();
    }
    records
        .into_iter()
        .filter(|r| filter.matches(*r, spec, policy))
        .collect()
}
