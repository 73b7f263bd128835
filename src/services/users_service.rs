use sqlx::PgPool;
use tonic::{Request, Response, Status};
use uuid::Uuid;

use crate::access::{items, Role};
use crate::db::{begin_as, SessionIdentity};
use crate::error::{AppError, AppResult};
use crate::listing::{self, run_sequential};
use crate::middleware::AuthenticatedUser;
use crate::models::profile::{PROFILE_COLUMNS, PROFILE_SPEC};
use crate::models::ProfileModel;
use crate::proto::common::{BatchResult, Empty, IdRequest, IdsRequest, ListQuery};
use crate::proto::users::user_service_server::UserService;
use crate::proto::users::{
    ListUsersResponse, MeResponse, UpdateRoleRequest, UserProfile, UserProfileResponse,
};

use super::common::{
    batch_result, get_authenticated_user, list_query, page_info, parse_id, selection, timestamp,
    to_status, ServiceSettings,
};

/// Role change after validation: sector roles carry their sector, others none.
#[derive(Debug, Clone, PartialEq)]
struct RoleAssignment {
    role: Role,
    sector_id: Option<String>,
}

impl RoleAssignment {
    fn parse(role: &str, sector_id: &str) -> AppResult<Self> {
        let role: Role = role.parse()?;
        let sector_id = match role {
            Role::Sector(_) => {
                if sector_id.trim().is_empty() {
                    return Err(AppError::invalid(format!("role '{}' requires a sector", role)));
                }
                Some(parse_id(sector_id)?.to_string())
            }
            _ => None,
        };
        Ok(Self { role, sector_id })
    }
}

/// Account targeted by a delete; the caller's own account is refused
/// whatever spelling of the uuid is sent.
fn deletable_user(caller_id: &str, user_id: &str) -> AppResult<Uuid> {
    let target = parse_id(user_id)?;
    let caller = Uuid::parse_str(caller_id.trim()).map_err(|_| AppError::Unauthenticated)?;
    if target == caller {
        return Err(AppError::invalid("you cannot delete your own account"));
    }
    Ok(target)
}

pub struct UserServiceImpl {
    pool: PgPool,
    settings: ServiceSettings,
}

impl UserServiceImpl {
    pub fn new(pool: PgPool, settings: ServiceSettings) -> Self {
        Self { pool, settings }
    }

    fn model_to_proto(model: &ProfileModel) -> UserProfile {
        UserProfile {
            id: model.id.clone(),
            user_id: model.user_id.clone(),
            email: model.email.clone(),
            full_name: model.full_name.clone().unwrap_or_default(),
            role: model.role.clone().unwrap_or_default(),
            sector_id: model.setor_id.clone().unwrap_or_default(),
            created_at: timestamp(&model.created_at),
            updated_at: timestamp(&model.updated_at),
        }
    }

    /// Users-manager access: `users` or `sector-access`.
    fn require_manager<T>(request: &Request<T>) -> Result<AuthenticatedUser, Status> {
        let user = get_authenticated_user(request)?;
        let caps = &user.capabilities;
        if caps.can_access_item(items::USERS) || caps.can_access_item(items::SECTOR_ACCESS) {
            Ok(user)
        } else {
            Err(to_status(AppError::Forbidden(format!(
                "role '{}' cannot manage users",
                caps.role
            ))))
        }
    }

    async fn fetch_all(&self, identity: &SessionIdentity) -> AppResult<Vec<ProfileModel>> {
        let mut tx = begin_as(&self.pool, identity).await?;
        let rows: Vec<ProfileModel> = sqlx::query_as(&format!(
            "SELECT {} FROM profiles ORDER BY created_at DESC",
            PROFILE_COLUMNS
        ))
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(rows)
    }

    async fn fetch_own(&self, identity: &SessionIdentity, user_id: &str) -> AppResult<Option<ProfileModel>> {
        let mut tx = begin_as(&self.pool, identity).await?;
        let model: Option<ProfileModel> = sqlx::query_as(&format!(
            "SELECT {} FROM profiles WHERE user_id = $1::uuid",
            PROFILE_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(model)
    }

    async fn assign_role(
        &self,
        identity: &SessionIdentity,
        user_id: &str,
        assignment: &RoleAssignment,
    ) -> AppResult<ProfileModel> {
        let mut tx = begin_as(&self.pool, identity).await?;
        let model: Option<ProfileModel> = sqlx::query_as(&format!(
            "UPDATE profiles SET role = $1, setor_id = $2::uuid, updated_at = NOW() \
             WHERE user_id = $3::uuid RETURNING {}",
            PROFILE_COLUMNS
        ))
        .bind(assignment.role.as_str())
        .bind(&assignment.sector_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;
        model.ok_or_else(|| AppError::not_found(format!("User {} not found", user_id)))
    }

    async fn delete_one(&self, identity: &SessionIdentity, caller_id: &str, user_id: &str) -> AppResult<()> {
        let target = deletable_user(caller_id, user_id)?;
        let mut tx = begin_as(&self.pool, identity).await?;
        let rows_affected = sqlx::query("DELETE FROM profiles WHERE user_id = $1")
            .bind(target)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        if rows_affected == 0 {
            return Err(AppError::not_found(format!("User {} not found", user_id)));
        }
        tracing::info!("Deleted profile of user {}", user_id);
        Ok(())
    }
}

#[tonic::async_trait]
impl UserService for UserServiceImpl {
    async fn me(&self, request: Request<Empty>) -> Result<Response<MeResponse>, Status> {
        let auth_user = get_authenticated_user(&request)?;

        let profile = self
            .fetch_own(&SessionIdentity::from(&auth_user), &auth_user.user_id)
            .await
            .map_err(to_status)?;
        let caps = &auth_user.capabilities;

        Ok(Response::new(MeResponse {
            profile: profile.as_ref().map(Self::model_to_proto),
            is_admin: caps.is_admin(),
            is_editor: caps.is_editor(),
            is_sector_user: caps.is_sector_user(),
            can_manage_content: caps.can_manage_content(),
            can_manage_users: caps.can_manage_users(),
            sector_name: caps.current_sector_name().unwrap_or_default().to_string(),
            accessible_items: caps
                .accessible_items()
                .into_iter()
                .map(String::from)
                .collect(),
        }))
    }

    async fn list(&self, request: Request<ListQuery>) -> Result<Response<ListUsersResponse>, Status> {
        let auth_user = Self::require_manager(&request)?;
        let query = list_query(request.into_inner(), &PROFILE_SPEC).map_err(to_status)?;

        let rows = self
            .fetch_all(&SessionIdentity::from(&auth_user))
            .await
            .map_err(to_status)?;
        let page = listing::run(&rows, &query, &PROFILE_SPEC, self.settings.text_match);

        Ok(Response::new(ListUsersResponse {
            page: Some(page_info(&page)),
            items: page.items.iter().map(|m| Self::model_to_proto(m)).collect(),
        }))
    }

    async fn update_role(
        &self,
        request: Request<UpdateRoleRequest>,
    ) -> Result<Response<UserProfileResponse>, Status> {
        let auth_user = Self::require_manager(&request)?;
        let req = request.into_inner();

        parse_id(&req.user_id).map_err(to_status)?;
        let assignment = RoleAssignment::parse(&req.role, &req.sector_id).map_err(to_status)?;
        if let Some(sector_id) = &assignment.sector_id {
            if !auth_user.capabilities.can_access_sector(sector_id) {
                return Err(to_status(AppError::Forbidden(format!(
                    "role '{}' cannot assign users to sector {}",
                    auth_user.capabilities.role, sector_id
                ))));
            }
        }

        let model = self
            .assign_role(&SessionIdentity::from(&auth_user), &req.user_id, &assignment)
            .await
            .map_err(to_status)?;
        tracing::info!(
            "User {} set role of {} to {}",
            auth_user.user_id,
            req.user_id,
            assignment.role
        );

        Ok(Response::new(UserProfileResponse {
            profile: Some(Self::model_to_proto(&model)),
        }))
    }

    async fn delete(&self, request: Request<IdRequest>) -> Result<Response<Empty>, Status> {
        let auth_user = get_authenticated_user(&request)?;
        auth_user
            .capabilities
            .require_item(items::USERS)
            .map_err(to_status)?;
        let req = request.into_inner();

        parse_id(&req.id).map_err(to_status)?;

        self.delete_one(&SessionIdentity::from(&auth_user), &auth_user.user_id, &req.id)
            .await
            .map_err(to_status)?;

        Ok(Response::new(Empty {}))
    }

    async fn batch_delete(
        &self,
        request: Request<IdsRequest>,
    ) -> Result<Response<BatchResult>, Status> {
        let auth_user = get_authenticated_user(&request)?;
        auth_user
            .capabilities
            .require_item(items::USERS)
            .map_err(to_status)?;
        let selection = selection(request.into_inner().ids).map_err(to_status)?;

        let identity = SessionIdentity::from(&auth_user);
        let caller_id = auth_user.user_id.as_str();
        let outcome = run_sequential("user delete", &selection, |id| {
            let identity = &identity;
            async move { self.delete_one(identity, caller_id, &id).await }
        })
        .await;

        Ok(Response::new(batch_result(outcome)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{Capabilities, Sector};
    use sqlx::postgres::PgPoolOptions;

    const ME: &str = "3b0e4a7c-91d2-4f5e-8a6b-0c1d2e3f4a5b";
    const SECTOR: &str = "7f1c2a4e-0b1d-4c3e-9f00-123456789abc";

    fn own_id_spellings() -> Vec<String> {
        vec![
            ME.to_string(),
            ME.to_uppercase(),
            ME.replace('-', ""),
            format!("{{{}}}", ME),
            format!(" {} ", ME),
        ]
    }

    #[test]
    fn test_sector_role_requires_sector() {
        assert!(RoleAssignment::parse("educacao", "").is_err());
        assert!(RoleAssignment::parse("educacao", "7f1c").is_err());
        let assignment = RoleAssignment::parse("educacao", &format!(" {} ", SECTOR.to_uppercase())).unwrap();
        assert_eq!(assignment.role, Role::Sector(Sector::Educacao));
        assert_eq!(assignment.sector_id.as_deref(), Some(SECTOR));
    }

    #[test]
    fn test_other_roles_clear_sector() {
        let assignment = RoleAssignment::parse("editor", SECTOR).unwrap();
        assert_eq!(assignment.role, Role::Editor);
        assert_eq!(assignment.sector_id, None);
        assert!(RoleAssignment::parse("superuser", "").is_err());
    }

    #[test]
    fn test_own_account_cannot_be_deleted() {
        for spelling in own_id_spellings() {
            let err = deletable_user(ME, &spelling).unwrap_err();
            assert!(matches!(err, AppError::InvalidInput(_)), "{}: {:?}", spelling, err);
        }
        assert_eq!(deletable_user(ME, SECTOR).unwrap().to_string(), SECTOR);
        assert!(matches!(deletable_user(ME, "abc"), Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_self_delete_refused_before_any_query() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://portal@localhost/portal")
            .unwrap();
        let service = UserServiceImpl::new(pool, ServiceSettings::default());
        let identity = SessionIdentity::User {
            user_id: ME.to_string(),
            email: "admin@chipindo.ao".to_string(),
        };
        for spelling in own_id_spellings() {
            let err = service.delete_one(&identity, ME, &spelling).await.unwrap_err();
            assert!(matches!(err, AppError::InvalidInput(_)), "{}: {:?}", spelling, err);
        }
    }

    #[test]
    fn test_sector_assignment_scope() {
        let admin = Capabilities::new(Role::Admin, None);
        assert!(admin.can_access_sector(SECTOR));
        let other = Capabilities::new(Role::Sector(Sector::Saude), Some(ME.to_string()));
        assert!(!other.can_access_sector(SECTOR));
    }
}
