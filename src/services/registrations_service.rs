use sqlx::PgPool;
use tonic::{Request, Response, Status};

use crate::access::items;
use crate::db::{begin_as, SessionIdentity};
use crate::error::{AppError, AppResult};
use crate::listing::{self, run_sequential};
use crate::models::interest_registration::{
    export_base_name, export_columns, RegistrationInput, REGISTRATION_COLUMNS, REGISTRATION_SPEC,
};
use crate::models::InterestRegistrationModel;
use crate::proto::common::{BatchResult, Empty, ExportFile, ExportRequest, IdRequest, IdsRequest, ListQuery};
use crate::proto::registrations::interest_registration_service_server::InterestRegistrationService;
use crate::proto::registrations::{
    InterestRegistration, ListRegistrationsResponse, RegisterInterestRequest, RegistrationResponse,
};

use super::common::{
    batch_result, list_query, page_info, parse_id, require_item, run_export, selection, timestamp,
    to_status, ExportJob, ServiceSettings,
};

pub struct InterestRegistrationServiceImpl {
    pool: PgPool,
    settings: ServiceSettings,
}

impl InterestRegistrationServiceImpl {
    pub fn new(pool: PgPool, settings: ServiceSettings) -> Self {
        Self { pool, settings }
    }

    fn model_to_proto(model: &InterestRegistrationModel) -> InterestRegistration {
        InterestRegistration {
            id: model.id.clone(),
            full_name: model.full_name.clone(),
            email: model.email.clone(),
            phone: model.phone.clone().unwrap_or_default(),
            profession: model.profession.clone().unwrap_or_default(),
            experience_years: model.experience_years.unwrap_or_default(),
            areas_of_interest: model.areas_of_interest.clone(),
            additional_info: model.additional_info.clone().unwrap_or_default(),
            terms_accepted: model.terms_accepted,
            created_at: timestamp(&model.created_at),
            updated_at: timestamp(&model.updated_at),
        }
    }

    async fn fetch_all(&self, identity: &SessionIdentity) -> AppResult<Vec<InterestRegistrationModel>> {
        let mut tx = begin_as(&self.pool, identity).await?;
        let rows: Vec<InterestRegistrationModel> = sqlx::query_as(&format!(
            "SELECT {} FROM interest_registrations ORDER BY created_at DESC",
            REGISTRATION_COLUMNS
        ))
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(rows)
    }

    async fn insert(&self, input: &RegistrationInput) -> AppResult<InterestRegistrationModel> {
        let mut tx = begin_as(&self.pool, &SessionIdentity::Anonymous).await?;
        let model: InterestRegistrationModel = sqlx::query_as(&format!(
            "INSERT INTO interest_registrations (full_name, email, phone, profession, \
             experience_years, areas_of_interest, additional_info, terms_accepted) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, true) RETURNING {}",
            REGISTRATION_COLUMNS
        ))
        .bind(&input.full_name)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.profession)
        .bind(input.experience_years)
        .bind(&input.areas_of_interest)
        .bind(&input.additional_info)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(model)
    }

    async fn delete_one(&self, identity: &SessionIdentity, id: &str) -> AppResult<()> {
        let mut tx = begin_as(&self.pool, identity).await?;
        let rows_affected = sqlx::query("DELETE FROM interest_registrations WHERE id = $1::uuid")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        if rows_affected == 0 {
            return Err(AppError::not_found(format!("Registration {} not found", id)));
        }
        Ok(())
    }
}

#[tonic::async_trait]
impl InterestRegistrationService for InterestRegistrationServiceImpl {
    async fn register(
        &self,
        request: Request<RegisterInterestRequest>,
    ) -> Result<Response<RegistrationResponse>, Status> {
        let req = request.into_inner();

        let input = RegistrationInput::new(
            &req.full_name,
            &req.email,
            &req.phone,
            &req.profession,
            req.experience_years,
            &req.areas_of_interest,
            &req.additional_info,
            req.terms_accepted,
        )
        .map_err(to_status)?;

        let model = self.insert(&input).await.map_err(to_status)?;
        tracing::info!(
            "New interest registration {} ({} areas)",
            model.id,
            model.areas_of_interest.len()
        );

        Ok(Response::new(RegistrationResponse {
            item: Some(Self::model_to_proto(&model)),
        }))
    }

    async fn list(
        &self,
        request: Request<ListQuery>,
    ) -> Result<Response<ListRegistrationsResponse>, Status> {
        let auth_user = require_item(&request, items::INTEREST_REGISTRATIONS)?;
        let query = list_query(request.into_inner(), &REGISTRATION_SPEC).map_err(to_status)?;

        let rows = self
            .fetch_all(&SessionIdentity::from(&auth_user))
            .await
            .map_err(to_status)?;
        let page = listing::run(&rows, &query, &REGISTRATION_SPEC, self.settings.text_match);

        Ok(Response::new(ListRegistrationsResponse {
            page: Some(page_info(&page)),
            items: page.items.iter().map(|m| Self::model_to_proto(m)).collect(),
        }))
    }

    async fn delete(&self, request: Request<IdRequest>) -> Result<Response<Empty>, Status> {
        let auth_user = require_item(&request, items::INTEREST_REGISTRATIONS)?;
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
        let auth_user = require_item(&request, items::INTEREST_REGISTRATIONS)?;
        let selection = selection(request.into_inner().ids).map_err(to_status)?;

        let identity = SessionIdentity::from(&auth_user);
        let outcome = run_sequential("registration delete", &selection, |id| {
            let identity = &identity;
            async move { self.delete_one(identity, &id).await }
        })
        .await;

        Ok(Response::new(batch_result(outcome)))
    }

    async fn export(&self, request: Request<ExportRequest>) -> Result<Response<ExportFile>, Status> {
        let auth_user = require_item(&request, items::INTEREST_REGISTRATIONS)?;
        let req = request.into_inner();

        let area = req
            .query
            .as_ref()
            .and_then(|q| q.filters.get("areas_of_interest"))
            .map(String::as_str);
        let base_name = export_base_name(area);

        let rows = self
            .fetch_all(&SessionIdentity::from(&auth_user))
            .await
            .map_err(to_status)?;
        let job = ExportJob {
            spec: &REGISTRATION_SPEC,
            columns: export_columns(),
            base_name,
            title: "Registros de Interesse",
        };
        let file = run_export(&rows, req, job, &self.settings, Some(&auth_user)).map_err(to_status)?;

        Ok(Response::new(file))
    }
}
