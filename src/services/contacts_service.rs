use sqlx::PgPool;
use tonic::{Request, Response, Status};

use crate::access::items;
use crate::db::{begin_as, SessionIdentity};
use crate::error::{AppError, AppResult};
use crate::listing::{self, run_sequential};
use crate::models::emergency_contact::{export_columns, ContactInput, CONTACT_COLUMNS, CONTACT_SPEC};
use crate::models::EmergencyContactModel;
use crate::proto::common::{BatchResult, Empty, ExportFile, ExportRequest, IdRequest, IdsRequest, ListQuery};
use crate::proto::contacts::emergency_contact_service_server::EmergencyContactService;
use crate::proto::contacts::{
    EmergencyContact, EmergencyContactResponse, ListEmergencyContactsResponse,
    SaveEmergencyContactRequest,
};

use super::common::{
    batch_result, list_query, page_info, parse_id, require_item, run_export, selection, timestamp,
    to_status, ExportJob, ServiceSettings,
};

pub struct EmergencyContactServiceImpl {
    pool: PgPool,
    settings: ServiceSettings,
}

impl EmergencyContactServiceImpl {
    pub fn new(pool: PgPool, settings: ServiceSettings) -> Self {
        Self { pool, settings }
    }

    fn model_to_proto(model: &EmergencyContactModel) -> EmergencyContact {
        EmergencyContact {
            id: model.id.clone(),
            name: model.name.clone(),
            phone: model.phone.clone(),
            description: model.description.clone().unwrap_or_default(),
            priority: model.priority,
            active: model.active,
            created_at: timestamp(&model.created_at),
            updated_at: timestamp(&model.updated_at),
        }
    }

    fn input(req: &SaveEmergencyContactRequest) -> AppResult<ContactInput> {
        ContactInput::new(&req.name, &req.phone, &req.description, req.priority, req.active)
    }

    async fn fetch_all(&self, identity: &SessionIdentity) -> AppResult<Vec<EmergencyContactModel>> {
        let mut tx = begin_as(&self.pool, identity).await?;
        let rows: Vec<EmergencyContactModel> = sqlx::query_as(&format!(
            "SELECT {} FROM emergency_contacts ORDER BY priority ASC, name ASC",
            CONTACT_COLUMNS
        ))
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(rows)
    }

    async fn insert(
        &self,
        identity: &SessionIdentity,
        input: &ContactInput,
    ) -> AppResult<EmergencyContactModel> {
        let mut tx = begin_as(&self.pool, identity).await?;
        let model: EmergencyContactModel = sqlx::query_as(&format!(
            "INSERT INTO emergency_contacts (name, phone, description, priority, active) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            CONTACT_COLUMNS
        ))
        .bind(&input.name)
        .bind(&input.phone)
        .bind(&input.description)
        .bind(input.priority)
        .bind(input.active)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(model)
    }

    async fn update_row(
        &self,
        identity: &SessionIdentity,
        id: &str,
        input: &ContactInput,
    ) -> AppResult<EmergencyContactModel> {
        let mut tx = begin_as(&self.pool, identity).await?;
        let model: Option<EmergencyContactModel> = sqlx::query_as(&format!(
            "UPDATE emergency_contacts SET name = $1, phone = $2, description = $3, priority = $4, \
             active = $5, updated_at = NOW() WHERE id = $6::uuid RETURNING {}",
            CONTACT_COLUMNS
        ))
        .bind(&input.name)
        .bind(&input.phone)
        .bind(&input.description)
        .bind(input.priority)
        .bind(input.active)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;
        model.ok_or_else(|| AppError::not_found(format!("Emergency contact {} not found", id)))
    }

    async fn delete_one(&self, identity: &SessionIdentity, id: &str) -> AppResult<()> {
        let mut tx = begin_as(&self.pool, identity).await?;
        let rows_affected = sqlx::query("DELETE FROM emergency_contacts WHERE id = $1::uuid")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        if rows_affected == 0 {
            return Err(AppError::not_found(format!("Emergency contact {} not found", id)));
        }
        Ok(())
    }
}

#[tonic::async_trait]
impl EmergencyContactService for EmergencyContactServiceImpl {
    async fn list(
        &self,
        request: Request<ListQuery>,
    ) -> Result<Response<ListEmergencyContactsResponse>, Status> {
        let auth_user = require_item(&request, items::EMERGENCY_CONTACTS)?;
        let query = list_query(request.into_inner(), &CONTACT_SPEC).map_err(to_status)?;

        let rows = self
            .fetch_all(&SessionIdentity::from(&auth_user))
            .await
            .map_err(to_status)?;
        let page = listing::run(&rows, &query, &CONTACT_SPEC, self.settings.text_match);

        Ok(Response::new(ListEmergencyContactsResponse {
            page: Some(page_info(&page)),
            items: page.items.iter().map(|m| Self::model_to_proto(m)).collect(),
        }))
    }

    async fn create(
        &self,
        request: Request<SaveEmergencyContactRequest>,
    ) -> Result<Response<EmergencyContactResponse>, Status> {
        let auth_user = require_item(&request, items::EMERGENCY_CONTACTS)?;
        let req = request.into_inner();
        let input = Self::input(&req).map_err(to_status)?;

        let model = self
            .insert(&SessionIdentity::from(&auth_user), &input)
            .await
            .map_err(to_status)?;
        tracing::info!("Created emergency contact {} ({})", model.id, model.name);

        Ok(Response::new(EmergencyContactResponse {
            item: Some(Self::model_to_proto(&model)),
        }))
    }

    async fn update(
        &self,
        request: Request<SaveEmergencyContactRequest>,
    ) -> Result<Response<EmergencyContactResponse>, Status> {
        let auth_user = require_item(&request, items::EMERGENCY_CONTACTS)?;
        let req = request.into_inner();

        parse_id(&req.id).map_err(to_status)?;
        let input = Self::input(&req).map_err(to_status)?;

        let model = self
            .update_row(&SessionIdentity::from(&auth_user), &req.id, &input)
            .await
            .map_err(to_status)?;

        Ok(Response::new(EmergencyContactResponse {
            item: Some(Self::model_to_proto(&model)),
        }))
    }

    async fn delete(&self, request: Request<IdRequest>) -> Result<Response<Empty>, Status> {
        let auth_user = require_item(&request, items::EMERGENCY_CONTACTS)?;
        let req = request.into_inner();

        parse_id(&req.id).map_err(to_status)?;

        self.delete_one(&SessionIdentity::from(&auth_user), &req.id)
            .await
            .map_err(to_status)?;

        Ok(Response::new(Empty {}))
    }

    async fn batch_delete(
        &self,
        request: Request<IdsRequest>,
    ) -> Result<Response<BatchResult>, Status> {
        let auth_user = require_item(&request, items::EMERGENCY_CONTACTS)?;
        let selection = selection(request.into_inner().ids).map_err(to_status)?;

        let identity = SessionIdentity::from(&auth_user);
        let outcome = run_sequential("emergency contact delete", &selection, |id| {
            let identity = &identity;
            async move { self.delete_one(identity, &id).await }
        })
        .await;

        Ok(Response::new(batch_result(outcome)))
    }

    async fn export(&self, request: Request<ExportRequest>) -> Result<Response<ExportFile>, Status> {
        let auth_user = require_item(&request, items::EMERGENCY_CONTACTS)?;
        let req = request.into_inner();

        let rows = self
            .fetch_all(&SessionIdentity::from(&auth_user))
            .await
            .map_err(to_status)?;
        let job = ExportJob {
            spec: &CONTACT_SPEC,
            columns: export_columns(),
            base_name: "contactos-emergencia".to_string(),
            title: "Contactos de Emergência",
        };
        let file = run_export(&rows, req, job, &self.settings, Some(&auth_user)).map_err(to_status)?;

        Ok(Response::new(file))
    }
}
