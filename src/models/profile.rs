use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::access::{Capabilities, Role};
use crate::listing::{FieldValue, ListRecord, ListSpec, SortDirection};

/// Row of `profiles`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProfileModel {
    pub id: String,
    pub user_id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub role: Option<String>,
    pub setor_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const PROFILE_COLUMNS: &str =
    "id::text, user_id::text, email, full_name, role, setor_id::text, created_at, updated_at";

pub const PROFILE_SPEC: ListSpec = ListSpec {
    search_fields: &["email", "full_name"],
    filter_fields: &["role", "setor_id"],
    required_fields: &[],
    sort_fields: &["email", "full_name", "role", "created_at"],
    date_field: "created_at",
    default_sort: ("created_at", SortDirection::Desc),
    page_size: 20,
};

impl ProfileModel {
    pub fn capabilities(&self) -> Capabilities {
        Capabilities::new(Role::from_profile(self.role.as_deref()), self.setor_id.clone())
    }
}

impl ListRecord for ProfileModel {
    fn id(&self) -> &str {
        &self.user_id
    }

    fn field(&self, name: &str) -> FieldValue {
        match name {
            "email" => self.email.as_str().into(),
            "full_name" => self.full_name.clone().into(),
            "role" => self.role.clone().into(),
            "setor_id" => self.setor_id.clone().into(),
            "created_at" => self.created_at.into(),
            "updated_at" => self.updated_at.into(),
            _ => FieldValue::Empty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Sector;

    fn profile(role: Option<&str>, setor: Option<&str>) -> ProfileModel {
        let now = Utc::now();
        ProfileModel {
            id: "p1".into(),
            user_id: "u1".into(),
            email: "ana@chipindo.gov.ao".into(),
            full_name: Some("Ana".into()),
            role: role.map(String::from),
            setor_id: setor.map(String::from),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_capabilities_from_profile() {
        let caps = profile(Some("educacao"), Some("s-1")).capabilities();
        assert_eq!(caps.role, Role::Sector(Sector::Educacao));
        assert_eq!(caps.current_sector(), Some("s-1"));
        assert_eq!(profile(None, None).capabilities().role, Role::User);
    }

    #[test]
    fn test_list_id_is_user_id() {
        assert_eq!(profile(None, None).id(), "u1");
    }
}
