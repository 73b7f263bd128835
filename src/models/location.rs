use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{AppError, AppResult};
use crate::export::{bool_cell, ExportColumn};
use crate::listing::{FieldValue, ListRecord, ListSpec, SortDirection};
use crate::validate::{self, optional};

/// Row of `municipality_locations`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LocationModel {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub location_type: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub opening_hours: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const LOCATION_COLUMNS: &str = "id::text, name, description, latitude, longitude, \
     type AS location_type, address, phone, email, opening_hours, active, created_at, updated_at";

pub const LOCATION_SPEC: ListSpec = ListSpec {
    search_fields: &["name", "description", "address"],
    filter_fields: &["location_type", "active"],
    required_fields: &[],
    sort_fields: &["name", "location_type", "created_at"],
    date_field: "created_at",
    default_sort: ("name", SortDirection::Asc),
    page_size: 10,
};

impl ListRecord for LocationModel {
    fn id(&self) -> &str {
        &self.id
    }

    fn field(&self, name: &str) -> FieldValue {
        match name {
            "name" => self.name.as_str().into(),
            "description" => self.description.clone().into(),
            "latitude" => self.latitude.into(),
            "longitude" => self.longitude.into(),
            "location_type" => self.location_type.as_str().into(),
            "address" => self.address.clone().into(),
            "phone" => self.phone.clone().into(),
            "email" => self.email.clone().into(),
            "opening_hours" => self.opening_hours.clone().into(),
            "active" => self.active.into(),
            "created_at" => self.created_at.into(),
            "updated_at" => self.updated_at.into(),
            _ => FieldValue::Empty,
        }
    }
}

/// Validated input for create and update.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationInput {
    pub name: String,
    pub description: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub location_type: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub opening_hours: Option<String>,
    pub active: bool,
}

impl LocationInput {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &str,
        description: &str,
        latitude: f64,
        longitude: f64,
        location_type: &str,
        address: &str,
        phone: &str,
        email: &str,
        opening_hours: &str,
        active: bool,
    ) -> AppResult<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::invalid("name is required"));
        }
        let location_type = location_type.trim();
        if location_type.is_empty() {
            return Err(AppError::invalid("type is required"));
        }
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(AppError::invalid("latitude must be between -90 and 90"));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(AppError::invalid("longitude must be between -180 and 180"));
        }
        let email = optional(email);
        if let Some(e) = &email {
            if !validate::is_email(e) {
                return Err(AppError::invalid(format!("invalid email: {}", e)));
            }
        }
        Ok(Self {
            name: name.to_string(),
            description: optional(description),
            latitude,
            longitude,
            location_type: location_type.to_string(),
            address: optional(address),
            phone: optional(phone),
            email,
            opening_hours: optional(opening_hours),
            active,
        })
    }
}

pub fn export_columns() -> Vec<ExportColumn<LocationModel>> {
    vec![
        ExportColumn { key: "name", header: "Nome", value: |r| r.name.clone() },
        ExportColumn { key: "location_type", header: "Tipo", value: |r| r.location_type.clone() },
        ExportColumn { key: "latitude", header: "Latitude", value: |r| format!("{:.6}", r.latitude) },
        ExportColumn { key: "longitude", header: "Longitude", value: |r| format!("{:.6}", r.longitude) },
        ExportColumn {
            key: "address",
            header: "Endereço",
            value: |r| r.address.clone().unwrap_or_default(),
        },
        ExportColumn { key: "phone", header: "Telefone", value: |r| r.phone.clone().unwrap_or_default() },
        ExportColumn { key: "email", header: "Email", value: |r| r.email.clone().unwrap_or_default() },
        ExportColumn {
            key: "opening_hours",
            header: "Horário",
            value: |r| r.opening_hours.clone().unwrap_or_default(),
        },
        ExportColumn { key: "active", header: "Activo", value: |r| bool_cell(r.active) },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(lat: f64, lon: f64) -> AppResult<LocationInput> {
        LocationInput::new("Hospital", "", lat, lon, "hospital", "Rua 1", "", "", "", true)
    }

    #[test]
    fn test_coordinates() {
        assert!(input(-13.83, 15.8).is_ok());
        assert!(input(90.0, 180.0).is_ok());
        assert!(input(90.5, 0.0).is_err());
        assert!(input(0.0, -180.1).is_err());
        assert!(input(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_optional_fields() {
        let loc = input(0.0, 0.0).unwrap();
        assert_eq!(loc.address.as_deref(), Some("Rua 1"));
        assert_eq!(loc.phone, None);
        assert!(LocationInput::new("X", "", 0.0, 0.0, "escola", "", "", "nope", "", true).is_err());
        assert!(LocationInput::new("X", "", 0.0, 0.0, "", "", "", "", "", true).is_err());
    }
}
