use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::listing::{FieldValue, ListRecord, ListSpec, SortDirection};

/// Row of `hero_carousel`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CarouselImageModel {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub image_url: String,
    pub order_index: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const CAROUSEL_COLUMNS: &str =
    "id::text, title, description, image_url, order_index, active, created_at, updated_at";

pub const CAROUSEL_SPEC: ListSpec = ListSpec {
    search_fields: &["title", "description"],
    filter_fields: &["active"],
    required_fields: &[],
    sort_fields: &["order_index", "title", "created_at"],
    date_field: "created_at",
    default_sort: ("order_index", SortDirection::Asc),
    page_size: 9,
};

impl ListRecord for CarouselImageModel {
    fn id(&self) -> &str {
        &self.id
    }

    fn field(&self, name: &str) -> FieldValue {
        match name {
            "title" => self.title.as_str().into(),
            "description" => self.description.clone().into(),
            "image_url" => self.image_url.as_str().into(),
            "order_index" => self.order_index.into(),
            "active" => self.active.into(),
            "created_at" => self.created_at.into(),
            "updated_at" => self.updated_at.into(),
            _ => FieldValue::Empty,
        }
    }
}

/// Pairs each id with its new `order_index` (0-based, in the given order).
/// Duplicate ids are rejected so no two images share a position.
pub fn reorder_plan(ids: &[String]) -> Result<Vec<(String, i32)>, String> {
    let mut seen = std::collections::HashSet::new();
    let mut plan = Vec::with_capacity(ids.len());
    for (index, id) in ids.iter().enumerate() {
        let id = id.trim();
        if id.is_empty() {
            return Err("empty id in reorder list".to_string());
        }
        if !seen.insert(id) {
            return Err(format!("duplicate id in reorder list: {}", id));
        }
        let index = i32::try_from(index).map_err(|_| "reorder list too long".to_string())?;
        plan.push((id.to_string(), index));
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reorder_plan() {
        let ids = vec!["c".to_string(), "a".to_string(), "b".to_string()];
        assert_eq!(
            reorder_plan(&ids).unwrap(),
            vec![("c".to_string(), 0), ("a".to_string(), 1), ("b".to_string(), 2)]
        );
    }

    #[test]
    fn test_reorder_plan_rejects_duplicates() {
        let ids = vec!["a".to_string(), "a".to_string()];
        assert!(reorder_plan(&ids).is_err());
        assert!(reorder_plan(&["".to_string()]).is_err());
    }
}
