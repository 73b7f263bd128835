//! Roles, sectors and the menu-item access policy.
//!
//! A [`Capabilities`] value is derived once per request from the caller's
//! profile and passed to every service; nothing here reads global state.

use std::fmt;
use std::str::FromStr;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sector {
    Educacao,
    Saude,
    Agricultura,
    SectorMineiro,
    DesenvolvimentoEconomico,
    Cultura,
    Tecnologia,
    EnergiaAgua,
}

impl Sector {
    pub const ALL: [Sector; 8] = [
        Sector::Educacao,
        Sector::Saude,
        Sector::Agricultura,
        Sector::SectorMineiro,
        Sector::DesenvolvimentoEconomico,
        Sector::Cultura,
        Sector::Tecnologia,
        Sector::EnergiaAgua,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            Sector::Educacao => "educacao",
            Sector::Saude => "saude",
            Sector::Agricultura => "agricultura",
            Sector::SectorMineiro => "sector-mineiro",
            Sector::DesenvolvimentoEconomico => "desenvolvimento-economico",
            Sector::Cultura => "cultura",
            Sector::Tecnologia => "tecnologia",
            Sector::EnergiaAgua => "energia-agua",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Sector::Educacao => "Educação",
            Sector::Saude => "Saúde",
            Sector::Agricultura => "Agricultura",
            Sector::SectorMineiro => "Setor Mineiro",
            Sector::DesenvolvimentoEconomico => "Desenvolvimento Económico",
            Sector::Cultura => "Cultura",
            Sector::Tecnologia => "Tecnologia",
            Sector::EnergiaAgua => "Energia e Água",
        }
    }

    /// Accepts `setor-mineiro` as an alias of `sector-mineiro`.
    pub fn from_slug(slug: &str) -> Option<Sector> {
        let slug = slug.trim();
        if slug == "setor-mineiro" {
            return Some(Sector::SectorMineiro);
        }
        Sector::ALL.into_iter().find(|s| s.slug() == slug)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    Editor,
    User,
    Sector(Sector),
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Editor => "editor",
            Role::User => "user",
            Role::Sector(sector) => sector.slug(),
        }
    }

    pub fn sector(&self) -> Option<Sector> {
        match self {
            Role::Sector(sector) => Some(*sector),
            _ => None,
        }
    }

    /// Unknown or missing roles degrade to `User`.
    pub fn from_profile(role: Option<&str>) -> Role {
        role.and_then(|r| r.parse().ok()).unwrap_or(Role::User)
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "admin" => Ok(Role::Admin),
            "editor" => Ok(Role::Editor),
            "user" => Ok(Role::User),
            other => Sector::from_slug(other)
                .map(Role::Sector)
                .ok_or_else(|| AppError::invalid(format!("unknown role: {}", other))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Menu/item identifiers grouped by who may open them.
pub struct AccessPolicy {
    pub admin_only: &'static [&'static str],
    pub editor_items: &'static [&'static str],
    /// Items every sector role may open, scoped to its own sector.
    pub sector_items: &'static [&'static str],
    pub public_items: &'static [&'static str],
}

pub mod items {
    pub const USERS: &str = "users";
    pub const SECTOR_ACCESS: &str = "sector-access";
    pub const CAROUSEL: &str = "carousel";
    pub const LOCATIONS: &str = "locations";
    pub const EMERGENCY_CONTACTS: &str = "emergency-contacts";
    pub const ACERVO: &str = "acervo";
    pub const OUVIDORIA: &str = "ouvidoria";
    pub const INTEREST_REGISTRATIONS: &str = "interest-registrations";
}

impl AccessPolicy {
    pub const DEFAULT: AccessPolicy = AccessPolicy {
        admin_only: &[
            "gestao-utilizadores",
            "logs-auditoria",
            "configuracoes-sistema",
            "backup-restore",
            "acesso-setor",
            "audit-logs",
            items::USERS,
            items::SECTOR_ACCESS,
            "settings",
            "organigrama",
            "departamentos",
            "content",
            items::CAROUSEL,
            "events",
            "event-registrations",
            "turismo-carousel",
            items::LOCATIONS,
            items::EMERGENCY_CONTACTS,
            "transparency",
            "population",
            "characterization",
        ],
        editor_items: &["news", items::ACERVO],
        sector_items: &[
            "sector-content",
            "concursos",
            "service-requests",
            items::OUVIDORIA,
            items::INTEREST_REGISTRATIONS,
        ],
        public_items: &["dashboard", "notifications"],
    };

    fn all_items(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.public_items
            .iter()
            .chain(self.editor_items)
            .chain(self.sector_items)
            .chain(self.admin_only)
            .copied()
    }
}

/// What the current caller may do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub role: Role,
    /// `profiles.setor_id`
    pub sector_id: Option<String>,
}

impl Capabilities {
    pub fn new(role: Role, sector_id: Option<String>) -> Self {
        Self {
            role,
            sector_id: sector_id.filter(|s| !s.trim().is_empty()),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_editor(&self) -> bool {
        self.role == Role::Editor
    }

    pub fn is_sector_user(&self) -> bool {
        matches!(self.role, Role::Sector(_))
    }

    pub fn can_manage_users(&self) -> bool {
        self.is_admin()
    }

    pub fn can_manage_content(&self) -> bool {
        self.is_admin() || self.is_editor() || self.is_sector_user()
    }

    pub fn can_access_item(&self, item: &str) -> bool {
        self.can_access_item_with(&AccessPolicy::DEFAULT, item)
    }

    pub fn can_access_item_with(&self, policy: &AccessPolicy, item: &str) -> bool {
        if self.is_admin() {
            return true;
        }
        if policy.admin_only.contains(&item) {
            return false;
        }
        if policy.public_items.contains(&item) {
            return true;
        }
        if policy.editor_items.contains(&item) {
            return self.is_editor();
        }
        self.is_sector_user() && policy.sector_items.contains(&item)
    }

    /// Admins see every sector; sector users only their assigned one.
    pub fn can_access_sector(&self, sector_id: &str) -> bool {
        if self.is_admin() {
            return true;
        }
        self.is_sector_user() && self.sector_id.as_deref() == Some(sector_id)
    }

    pub fn accessible_items(&self) -> Vec<&'static str> {
        let policy = &AccessPolicy::DEFAULT;
        policy
            .all_items()
            .filter(|item| self.can_access_item_with(policy, item))
            .collect()
    }

    pub fn current_sector(&self) -> Option<&str> {
        if self.is_sector_user() {
            self.sector_id.as_deref()
        } else {
            None
        }
    }

    pub fn current_sector_name(&self) -> Option<&'static str> {
        self.role.sector().map(|s| s.display_name())
    }

    pub fn require_item(&self, item: &str) -> AppResult<()> {
        if self.can_access_item(item) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "role '{}' cannot access '{}'",
                self.role, item
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(role: &str, sector: Option<&str>) -> Capabilities {
        Capabilities::new(role.parse().unwrap(), sector.map(String::from))
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(
            "energia-agua".parse::<Role>().unwrap(),
            Role::Sector(Sector::EnergiaAgua)
        );
        assert_eq!(
            "setor-mineiro".parse::<Role>().unwrap(),
            Role::Sector(Sector::SectorMineiro)
        );
        assert!("root".parse::<Role>().is_err());
        assert_eq!(Role::from_profile(Some("root")), Role::User);
        assert_eq!(Role::from_profile(None), Role::User);
    }

    #[test]
    fn test_admin_sees_everything() {
        let admin = caps("admin", None);
        assert!(admin.can_access_item("users"));
        assert!(admin.can_access_item("acervo"));
        assert!(admin.can_access_item("anything-new"));
        assert!(admin.can_access_sector("saude"));
        assert!(admin.can_manage_users());
    }

    #[test]
    fn test_editor_items() {
        let editor = caps("editor", None);
        assert!(editor.can_access_item("acervo"));
        assert!(editor.can_access_item("news"));
        assert!(editor.can_access_item("dashboard"));
        assert!(!editor.can_access_item("carousel"));
        assert!(!editor.can_access_item("ouvidoria"));
        assert!(editor.can_manage_content());
        assert!(!editor.can_manage_users());
    }

    #[test]
    fn test_sector_user() {
        let saude = caps("saude", Some("saude"));
        assert!(saude.is_sector_user());
        assert!(saude.can_access_item("ouvidoria"));
        assert!(saude.can_access_item("interest-registrations"));
        assert!(!saude.can_access_item("acervo"));
        assert!(!saude.can_access_item("users"));
        assert!(saude.can_access_sector("saude"));
        assert!(!saude.can_access_sector("educacao"));
        assert_eq!(saude.current_sector_name(), Some("Saúde"));
        assert_eq!(saude.current_sector(), Some("saude"));
    }

    #[test]
    fn test_plain_user() {
        let user = caps("user", None);
        assert_eq!(user.accessible_items(), vec!["dashboard", "notifications"]);
        assert!(!user.can_manage_content());
        assert!(matches!(user.require_item("acervo"), Err(AppError::Forbidden(_))));
        assert_eq!(user.current_sector_name(), None);
    }

    #[test]
    fn test_blank_sector_id_is_none() {
        let c = caps("cultura", Some("  "));
        assert_eq!(c.sector_id, None);
        assert!(!c.can_access_sector(""));
    }
}
