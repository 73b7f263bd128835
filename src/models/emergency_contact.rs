use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{AppError, AppResult};
use crate::export::{bool_cell, ExportColumn};
use crate::listing::{FieldValue, ListRecord, ListSpec, SortDirection};
use crate::validate;

/// Row of `emergency_contacts`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EmergencyContactModel {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub description: Option<String>,
    /// 1 (highest) ..= 10
    pub priority: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const CONTACT_COLUMNS: &str =
    "id::text, name, phone, description, priority, active, created_at, updated_at";

pub const CONTACT_SPEC: ListSpec = ListSpec {
    search_fields: &["name", "phone", "description"],
    filter_fields: &["active", "priority"],
    required_fields: &[],
    sort_fields: &["priority", "name", "created_at"],
    date_field: "created_at",
    default_sort: ("priority", SortDirection::Asc),
    page_size: 10,
};

pub const PRIORITY_RANGE: std::ops::RangeInclusive<i32> = 1..=10;

impl ListRecord for EmergencyContactModel {
    fn id(&self) -> &str {
        &self.id
    }

    fn field(&self, name: &str) -> FieldValue {
        match name {
            "name" => self.name.as_str().into(),
            "phone" => self.phone.as_str().into(),
            "description" => self.description.clone().into(),
            "priority" => self.priority.into(),
            "active" => self.active.into(),
            "created_at" => self.created_at.into(),
            "updated_at" => self.updated_at.into(),
            _ => FieldValue::Empty,
        }
    }
}

/// Validated input for create and update.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactInput {
    pub name: String,
    pub phone: String,
    pub description: Option<String>,
    pub priority: i32,
    pub active: bool,
}

impl ContactInput {
    pub fn new(
        name: &str,
        phone: &str,
        description: &str,
        priority: i32,
        active: bool,
    ) -> AppResult<Self> {
        let name = name.trim();
        let phone = phone.trim();
        if name.is_empty() {
            return Err(AppError::invalid("name is required"));
        }
        if phone.is_empty() {
            return Err(AppError::invalid("phone is required"));
        }
        if !validate::is_phone(phone) {
            return Err(AppError::invalid(format!("invalid phone number: {}", phone)));
        }
        if !PRIORITY_RANGE.contains(&priority) {
            return Err(AppError::invalid("priority must be between 1 and 10"));
        }
        let description = validate::optional(description);
        Ok(Self {
            name: name.to_string(),
            phone: phone.to_string(),
            description,
            priority,
            active,
        })
    }
}

pub fn export_columns() -> Vec<ExportColumn<EmergencyContactModel>> {
    vec![
        ExportColumn { key: "name", header: "Nome", value: |r| r.name.clone() },
        ExportColumn { key: "phone", header: "Telefone", value: |r| r.phone.clone() },
        ExportColumn {
            key: "description",
            header: "Descrição",
            value: |r| r.description.clone().unwrap_or_default(),
        },
        ExportColumn { key: "priority", header: "Prioridade", value: |r| r.priority.to_string() },
        ExportColumn { key: "active", header: "Activo", value: |r| bool_cell(r.active) },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_input() {
        let input = ContactInput::new(" Bombeiros ", "+244 923 000 111", "  ", 1, true).unwrap();
        assert_eq!(input.name, "Bombeiros");
        assert_eq!(input.description, None);
    }

    #[test]
    fn test_contact_input_rejects() {
        assert!(ContactInput::new("", "113", "", 1, true).is_err());
        assert!(ContactInput::new("Polícia", "", "", 1, true).is_err());
        assert!(ContactInput::new("Polícia", "abc", "", 1, true).is_err());
        assert!(ContactInput::new("Polícia", "113", "", 0, true).is_err());
        assert!(ContactInput::new("Polícia", "113", "", 11, true).is_err());
        assert!(ContactInput::new("Polícia", "113", "", 10, true).is_ok());
    }
}
