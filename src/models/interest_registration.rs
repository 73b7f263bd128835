use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{AppError, AppResult};
use crate::export::{bool_cell, date_cell, slug, ExportColumn};
use crate::listing::{FieldValue, ListRecord, ListSpec, SortDirection, ALL};
use crate::validate;

/// Row of `interest_registrations`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct InterestRegistrationModel {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub profession: Option<String>,
    pub experience_years: Option<i32>,
    pub areas_of_interest: Vec<String>,
    pub additional_info: Option<String>,
    pub terms_accepted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const REGISTRATION_COLUMNS: &str = "id::text, full_name, email, phone, profession, experience_years, \
     areas_of_interest, additional_info, terms_accepted, created_at, updated_at";

/// `areas_of_interest` matches when any element equals the filter value.
/// `phone` and `profession` only take part as `require_fields`.
pub const REGISTRATION_SPEC: ListSpec = ListSpec {
    search_fields: &["full_name", "email", "profession", "areas_of_interest"],
    filter_fields: &["areas_of_interest", "terms_accepted"],
    required_fields: &["phone", "profession"],
    sort_fields: &["full_name", "email", "experience_years", "created_at"],
    date_field: "created_at",
    default_sort: ("created_at", SortDirection::Desc),
    page_size: 15,
};

impl ListRecord for InterestRegistrationModel {
    fn id(&self) -> &str {
        &self.id
    }

    fn field(&self, name: &str) -> FieldValue {
        match name {
            "full_name" => self.full_name.as_str().into(),
            "email" => self.email.as_str().into(),
            "phone" => self.phone.clone().into(),
            "profession" => self.profession.clone().into(),
            "experience_years" => self.experience_years.into(),
            "areas_of_interest" => self.areas_of_interest.clone().into(),
            "additional_info" => self.additional_info.clone().into(),
            "terms_accepted" => self.terms_accepted.into(),
            "created_at" => self.created_at.into(),
            "updated_at" => self.updated_at.into(),
            _ => FieldValue::Empty,
        }
    }
}

/// Validated public registration.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationInput {
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub profession: Option<String>,
    pub experience_years: Option<i32>,
    pub areas_of_interest: Vec<String>,
    pub additional_info: Option<String>,
}

impl RegistrationInput {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        full_name: &str,
        email: &str,
        phone: &str,
        profession: &str,
        experience_years: i32,
        areas_of_interest: &[String],
        additional_info: &str,
        terms_accepted: bool,
    ) -> AppResult<Self> {
        if !terms_accepted {
            return Err(AppError::invalid("terms must be accepted"));
        }
        let full_name = full_name.trim();
        if full_name.is_empty() {
            return Err(AppError::invalid("full_name is required"));
        }
        let email = validate::email("email", email)?;
        if !(0..=80).contains(&experience_years) {
            return Err(AppError::invalid("experience_years must be between 0 and 80"));
        }
        let mut areas: Vec<String> = Vec::new();
        for area in areas_of_interest {
            let area = area.trim();
            if !area.is_empty() && !areas.iter().any(|a| a == area) {
                areas.push(area.to_string());
            }
        }
        if areas.is_empty() {
            return Err(AppError::invalid("at least one area of interest is required"));
        }
        Ok(Self {
            full_name: full_name.to_string(),
            email,
            phone: validate::optional(phone),
            profession: validate::optional(profession),
            experience_years: Some(experience_years).filter(|y| *y > 0),
            areas_of_interest: areas,
            additional_info: validate::optional(additional_info),
        })
    }
}

/// `registros-interesse[-<area>]`
pub fn export_base_name(area: Option<&str>) -> String {
    match area.map(str::trim).filter(|a| !a.is_empty() && *a != ALL) {
        Some(area) => format!("registros-interesse-{}", slug(area)),
        None => "registros-interesse".to_string(),
    }
}

pub fn export_columns() -> Vec<ExportColumn<InterestRegistrationModel>> {
    vec![
        ExportColumn { key: "name", header: "Nome Completo", value: |r| r.full_name.clone() },
        ExportColumn { key: "email", header: "Email", value: |r| r.email.clone() },
        ExportColumn { key: "phone", header: "Telefone", value: |r| r.phone.clone().unwrap_or_default() },
        ExportColumn {
            key: "profession",
            header: "Profissão",
            value: |r| r.profession.clone().unwrap_or_default(),
        },
        ExportColumn {
            key: "experience",
            header: "Anos de Experiência",
            value: |r| r.experience_years.map(|y| y.to_string()).unwrap_or_default(),
        },
        ExportColumn {
            key: "areas",
            header: "Áreas de Interesse",
            value: |r| r.areas_of_interest.join(", "),
        },
        ExportColumn {
            key: "additional_info",
            header: "Informações Adicionais",
            value: |r| r.additional_info.clone().unwrap_or_default(),
        },
        ExportColumn {
            key: "terms_accepted",
            header: "Termos Aceites",
            value: |r| bool_cell(r.terms_accepted),
        },
        ExportColumn { key: "created_at", header: "Data de Registro", value: |r| date_cell(&r.created_at) },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::build_table;
    use crate::listing::{self, ListFilter, ListQuery, TextMatch};

    fn registration(id: &str, name: &str, areas: &[&str], phone: Option<&str>) -> InterestRegistrationModel {
        let now = Utc::now();
        InterestRegistrationModel {
            id: id.into(),
            full_name: name.into(),
            email: format!("{}@example.ao", id),
            phone: phone.map(String::from),
            profession: None,
            experience_years: Some(3),
            areas_of_interest: areas.iter().map(|a| a.to_string()).collect(),
            additional_info: None,
            terms_accepted: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_input_requires_terms() {
        let areas = vec!["Saúde".to_string()];
        assert!(RegistrationInput::new("Ana", "ana@x.ao", "", "", 0, &areas, "", false).is_err());
        let ok = RegistrationInput::new("Ana", "ana@x.ao", "", "", 0, &areas, "", true).unwrap();
        assert_eq!(ok.experience_years, None);
        assert!(RegistrationInput::new("Ana", "ana@x.ao", "", "", 0, &[], "", true).is_err());
    }

    #[test]
    fn test_input_dedupes_areas() {
        let areas = vec!["Saúde".to_string(), " Saúde ".to_string(), "Educação".to_string()];
        let input = RegistrationInput::new("Ana", "ana@x.ao", "", "", 2, &areas, "", true).unwrap();
        assert_eq!(input.areas_of_interest, vec!["Saúde", "Educação"]);
    }

    #[test]
    fn test_export_base_name() {
        assert_eq!(export_base_name(None), "registros-interesse");
        assert_eq!(export_base_name(Some("all")), "registros-interesse");
        assert_eq!(export_base_name(Some("Educação")), "registros-interesse-educacao");
    }

    #[test]
    fn test_area_and_phone_filters() {
        let rows = vec![
            registration("1", "Ana", &["Saúde", "Educação"], Some("923")),
            registration("2", "Rui", &["Saúde"], None),
            registration("3", "Eva", &["Cultura"], Some("924")),
        ];
        let mut query = ListQuery::for_spec(&REGISTRATION_SPEC);
        query.filter = ListFilter::default().with_filter("areas_of_interest", "Saúde");
        query.filter.required.push("phone".into());
        let matched = listing::filter_and_sort(&rows, &query, &REGISTRATION_SPEC, TextMatch::CaseInsensitive);
        let ids: Vec<&str> = matched.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1"]);
    }

    #[test]
    fn test_phone_is_presence_only() {
        let mut query = ListQuery::for_spec(&REGISTRATION_SPEC);
        query.filter = ListFilter::default().with_filter("phone", "923000000");
        assert!(query.validate(&REGISTRATION_SPEC).is_err());

        query.filter = ListFilter::default();
        query.filter.required = vec!["phone".into(), "profession".into()];
        assert!(query.validate(&REGISTRATION_SPEC).is_ok());
    }

    #[test]
    fn test_selected_fields_export() {
        let row = registration("1", "Ana", &["Saúde", "Educação"], None);
        let table = build_table(&[&row], &export_columns(), &["areas".into(), "name".into()]).unwrap();
        assert_eq!(table.headers, vec!["Nome Completo", "Áreas de Interesse"]);
        assert_eq!(table.rows[0], vec!["Ana", "Saúde, Educação"]);
    }
}
