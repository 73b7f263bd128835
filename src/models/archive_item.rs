use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{AppError, AppResult};
use crate::export::{bool_cell, date_cell, slug, ExportColumn};
use crate::listing::{FieldValue, ListRecord, ListSpec, SortDirection};
use crate::validate::optional;

/// Row of `acervo_digital`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ArchiveItemModel {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    /// `type` column: documento | imagem | video | audio
    pub item_type: String,
    pub category: Option<String>,
    pub department: String,
    pub file_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub is_public: bool,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const ARCHIVE_COLUMNS: &str = "id::text, title, description, type AS item_type, category, department, \
     file_url, thumbnail_url, file_size, mime_type, is_public, author_id::text, created_at, updated_at";

pub const ARCHIVE_ITEM_TYPES: &[&str] = &["documento", "imagem", "video", "audio"];

pub const ARCHIVE_SPEC: ListSpec = ListSpec {
    search_fields: &["title", "description", "department", "category"],
    filter_fields: &["item_type", "department", "category", "is_public"],
    required_fields: &[],
    sort_fields: &["title", "item_type", "department", "file_size", "created_at", "updated_at"],
    date_field: "created_at",
    default_sort: ("created_at", SortDirection::Desc),
    page_size: 12,
};

impl ListRecord for ArchiveItemModel {
    fn id(&self) -> &str {
        &self.id
    }

    fn field(&self, name: &str) -> FieldValue {
        match name {
            "title" => self.title.as_str().into(),
            "description" => self.description.clone().into(),
            "item_type" => self.item_type.as_str().into(),
            "category" => self.category.clone().into(),
            "department" => self.department.as_str().into(),
            "file_url" => self.file_url.clone().into(),
            "file_size" => self.file_size.into(),
            "mime_type" => self.mime_type.clone().into(),
            "is_public" => self.is_public.into(),
            "created_at" => self.created_at.into(),
            "updated_at" => self.updated_at.into(),
            _ => FieldValue::Empty,
        }
    }
}

impl ArchiveItemModel {
    /// Human-readable size, e.g. `1.5 MB`.
    pub fn size_label(&self) -> String {
        match self.file_size {
            Some(bytes) if bytes > 0 => format_size(bytes),
            _ => String::new(),
        }
    }
}

/// Validated metadata for create and update.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveInput {
    pub title: String,
    pub description: Option<String>,
    pub item_type: String,
    pub category: Option<String>,
    pub department: String,
    pub is_public: bool,
}

impl ArchiveInput {
    pub fn new(
        title: &str,
        description: &str,
        item_type: &str,
        category: &str,
        department: &str,
        is_public: bool,
    ) -> AppResult<Self> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::invalid("title is required"));
        }
        let item_type = item_type.trim();
        if !ARCHIVE_ITEM_TYPES.contains(&item_type) {
            return Err(AppError::invalid(format!("invalid item type: {}", item_type)));
        }
        let department = department.trim();
        if department.is_empty() {
            return Err(AppError::invalid("department is required"));
        }
        Ok(Self {
            title: title.to_string(),
            description: optional(description),
            item_type: item_type.to_string(),
            category: optional(category),
            department: department.to_string(),
            is_public,
        })
    }

    /// Object key prefix for files of this item.
    pub fn storage_prefix(&self) -> String {
        match slug(&self.department) {
            s if s.is_empty() => "geral".to_string(),
            s => s,
        }
    }
}

/// Title for a file uploaded without one: the name without its extension.
pub fn title_from_file_name(file_name: &str) -> String {
    let name = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name).trim();
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.trim().is_empty() => stem.trim().to_string(),
        _ => name.to_string(),
    }
}

pub fn format_size(bytes: i64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

pub fn export_columns() -> Vec<ExportColumn<ArchiveItemModel>> {
    vec![
        ExportColumn { key: "title", header: "Título", value: |r| r.title.clone() },
        ExportColumn { key: "item_type", header: "Tipo", value: |r| r.item_type.clone() },
        ExportColumn { key: "department", header: "Departamento", value: |r| r.department.clone() },
        ExportColumn {
            key: "category",
            header: "Categoria",
            value: |r| r.category.clone().unwrap_or_default(),
        },
        ExportColumn {
            key: "description",
            header: "Descrição",
            value: |r| r.description.clone().unwrap_or_default(),
        },
        ExportColumn { key: "file_size", header: "Tamanho", value: |r| r.size_label() },
        ExportColumn { key: "is_public", header: "Público", value: |r| bool_cell(r.is_public) },
        ExportColumn { key: "created_at", header: "Data de Criação", value: |r| date_cell(&r.created_at) },
    ]
}
