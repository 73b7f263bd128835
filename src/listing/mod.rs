//! In-memory list-view pipeline shared by every manager:
//! filter -> stable sort -> paginate.

pub mod batch;
pub mod filter;
pub mod page;
pub mod record;
pub mod selection;
pub mod sort;

pub use batch::{run_sequential, BatchOutcome};
pub use filter::{DateRange, ListFilter, TextMatch, ALL};
pub use page::{paginate, Page};
pub use record::{FieldValue, ListRecord, ListSpec};
pub use selection::{SelectionScope, SelectionSet};
pub use sort::{SortDirection, SortSpec};

use crate::error::{AppError, AppResult};

/// Complete list-view state for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub filter: ListFilter,
    pub sort: SortSpec,
    /// 1-indexed
    pub page: usize,
}

impl ListQuery {
    /// First page, no filters, the manager's default ordering.
    pub fn for_spec(spec: &ListSpec) -> Self {
        let (key, direction) = spec.default_sort;
        ListQuery {
            filter: ListFilter::default(),
            sort: SortSpec::new(key, direction),
            page: 1,
        }
    }

    pub fn validate(&self, spec: &ListSpec) -> AppResult<()> {
        if !spec.sort_fields.contains(&self.sort.key.as_str()) {
            return Err(AppError::invalid(format!("unknown sort key: {}", self.sort.key)));
        }
        self.filter.validate(spec)
    }
}

/// Filtered and sorted records, unpaginated. Exports work on this.
pub fn filter_and_sort<'a, R: ListRecord>(
    records: &'a [R],
    query: &ListQuery,
    spec: &ListSpec,
    policy: TextMatch,
) -> Vec<&'a R> {
    let mut matched = filter::apply(records, &query.filter, spec, policy);
    sort::sort_records(&mut matched, &query.sort);
    matched
}

/// Runs the whole pipeline. Pure: identical inputs give identical output.
pub fn run<'a, R: ListRecord>(
    records: &'a [R],
    query: &ListQuery,
    spec: &ListSpec,
    policy: TextMatch,
) -> Page<&'a R> {
    let matched = filter_and_sort(records, query, spec, policy);
    paginate(&matched, query.page, spec.page_size)
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub struct Doc {
        pub id: String,
        pub title: String,
        pub doc_type: String,
        pub priority: i32,
        pub created_at: chrono::DateTime<Utc>,
    }

    pub fn doc(id: &str, title: &str, doc_type: &str, priority: i32, date: &str) -> Doc {
        let day = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
        Doc {
            id: id.to_string(),
            title: title.to_string(),
            doc_type: doc_type.to_string(),
            priority,
            created_at: Utc.from_utc_datetime(&day.and_hms_opt(12, 0, 0).unwrap()),
        }
    }

    impl ListRecord for Doc {
        fn id(&self) -> &str {
            &self.id
        }

        fn field(&self, name: &str) -> FieldValue {
            match name {
                "title" => self.title.clone().into(),
                "type" => self.doc_type.clone().into(),
                "priority" => self.priority.into(),
                "created_at" => self.created_at.into(),
                _ => FieldValue::Empty,
            }
        }
    }

    pub const DOC_SPEC: ListSpec = ListSpec {
        search_fields: &["title"],
        filter_fields: &["type", "priority"],
        required_fields: &[],
        sort_fields: &["title", "type", "priority", "created_at"],
        date_field: "created_at",
        default_sort: ("created_at", SortDirection::Desc),
        page_size: 2,
    };
}
