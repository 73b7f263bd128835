use sqlx::PgPool;
use tonic::{Request, Response, Status};

use crate::access::items;
use crate::db::{begin_as, SessionIdentity};
use crate::error::{AppError, AppResult};
use crate::listing::{self, run_sequential};
use crate::models::location::{export_columns, LocationInput, LOCATION_COLUMNS, LOCATION_SPEC};
use crate::models::LocationModel;
use crate::proto::common::{BatchResult, Empty, ExportFile, ExportRequest, IdRequest, IdsRequest, ListQuery};
use crate::proto::locations::location_service_server::LocationService;
use crate::proto::locations::{ListLocationsResponse, Location, LocationResponse, SaveLocationRequest};

use super::common::{
    batch_result, list_query, page_info, parse_id, require_item, run_export, selection, timestamp,
    to_status, ExportJob, ServiceSettings,
};

pub struct LocationServiceImpl {
    pool: PgPool,
    settings: ServiceSettings,
}

impl LocationServiceImpl {
    pub fn new(pool: PgPool, settings: ServiceSettings) -> Self {
        Self { pool, settings }
    }

    fn model_to_proto(model: &LocationModel) -> Location {
        Location {
            id: model.id.clone(),
            name: model.name.clone(),
            description: model.description.clone().unwrap_or_default(),
            latitude: model.latitude,
            longitude: model.longitude,
            location_type: model.location_type.clone(),
            address: model.address.clone().unwrap_or_default(),
            phone: model.phone.clone().unwrap_or_default(),
            email: model.email.clone().unwrap_or_default(),
            opening_hours: model.opening_hours.clone().unwrap_or_default(),
            active: model.active,
            created_at: timestamp(&model.created_at),
            updated_at: timestamp(&model.updated_at),
        }
    }

    fn input(req: &SaveLocationRequest) -> AppResult<LocationInput> {
        LocationInput::new(
            &req.name,
            &req.description,
            req.latitude,
            req.longitude,
            &req.location_type,
            &req.address,
            &req.phone,
            &req.email,
            &req.opening_hours,
            req.active,
        )
    }

    async fn fetch_all(&self, identity: &SessionIdentity) -> AppResult<Vec<LocationModel>> {
        let mut tx = begin_as(&self.pool, identity).await?;
        let rows: Vec<LocationModel> = sqlx::query_as(&format!(
            "SELECT {} FROM municipality_locations ORDER BY name ASC",
            LOCATION_COLUMNS
        ))
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(rows)
    }

    async fn insert(&self, identity: &SessionIdentity, input: &LocationInput) -> AppResult<LocationModel> {
        let mut tx = begin_as(&self.pool, identity).await?;
        let model: LocationModel = sqlx::query_as(&format!(
            "INSERT INTO municipality_locations (name, description, latitude, longitude, type, \
             address, phone, email, opening_hours, active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {}",
            LOCATION_COLUMNS
        ))
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.latitude)
        .bind(input.longitude)
        .bind(&input.location_type)
        .bind(&input.address)
        .bind(&input.phone)
        .bind(&input.email)
        .bind(&input.opening_hours)
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
        input: &LocationInput,
    ) -> AppResult<LocationModel> {
        let mut tx = begin_as(&self.pool, identity).await?;
        let model: Option<LocationModel> = sqlx::query_as(&format!(
            "UPDATE municipality_locations SET name = $1, description = $2, latitude = $3, \
             longitude = $4, type = $5, address = $6, phone = $7, email = $8, opening_hours = $9, \
             active = $10, updated_at = NOW() WHERE id = $11::uuid RETURNING {}",
            LOCATION_COLUMNS
        ))
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.latitude)
        .bind(input.longitude)
        .bind(&input.location_type)
        .bind(&input.address)
        .bind(&input.phone)
        .bind(&input.email)
        .bind(&input.opening_hours)
        .bind(input.active)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;
        model.ok_or_else(|| AppError::not_found(format!("Location {} not found", id)))
    }

    async fn delete_one(&self, identity: &SessionIdentity, id: &str) -> AppResult<()> {
        let mut tx = begin_as(&self.pool, identity).await?;
        let rows_affected = sqlx::query("DELETE FROM municipality_locations WHERE id = $1::uuid")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        if rows_affected == 0 {
            return Err(AppError::not_found(format!("Location {} not found", id)));
        }
        Ok(())
    }
}

#[tonic::async_trait]
impl LocationService for LocationServiceImpl {
    async fn list(
        &self,
        request: Request<ListQuery>,
    ) -> Result<Response<ListLocationsResponse>, Status> {
        let auth_user = require_item(&request, items::LOCATIONS)?;
        let query = list_query(request.into_inner(), &LOCATION_SPEC).map_err(to_status)?;

        let rows = self
            .fetch_all(&SessionIdentity::from(&auth_user))
            .await
            .map_err(to_status)?;
        let page = listing::run(&rows, &query, &LOCATION_SPEC, self.settings.text_match);

        Ok(Response::new(ListLocationsResponse {
            page: Some(page_info(&page)),
            items: page.items.iter().map(|m| Self::model_to_proto(m)).collect(),
        }))
    }

    async fn create(
        &self,
        request: Request<SaveLocationRequest>,
    ) -> Result<Response<LocationResponse>, Status> {
        let auth_user = require_item(&request, items::LOCATIONS)?;
        let req = request.into_inner();
        let input = Self::input(&req).map_err(to_status)?;

        let model = self
            .insert(&SessionIdentity::from(&auth_user), &input)
            .await
            .map_err(to_status)?;
        tracing::info!("Created location {} ({})", model.id, model.name);

        Ok(Response::new(LocationResponse {
            item: Some(Self::model_to_proto(&model)),
        }))
    }

    async fn update(
        &self,
        request: Request<SaveLocationRequest>,
    ) -> Result<Response<LocationResponse>, Status> {
        let auth_user = require_item(&request, items::LOCATIONS)?;
        let req = request.into_inner();

        parse_id(&req.id).map_err(to_status)?;
        let input = Self::input(&req).map_err(to_status)?;

        let model = self
            .update_row(&SessionIdentity::from(&auth_user), &req.id, &input)
            .await
            .map_err(to_status)?;

        Ok(Response::new(LocationResponse {
            item: Some(Self::model_to_proto(&model)),
        }))
    }

    async fn delete(&self, request: Request<IdRequest>) -> Result<Response<Empty>, Status> {
        let auth_user = require_item(&request, items::LOCATIONS)?;
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
        let auth_user = require_item(&request, items::LOCATIONS)?;
        let selection = selection(request.into_inner().ids).map_err(to_status)?;

        let identity = SessionIdentity::from(&auth_user);
        let outcome = run_sequential("location delete", &selection, |id| {
            let identity = &identity;
            async move { self.delete_one(identity, &id).await }
        })
        .await;

        Ok(Response::new(batch_result(outcome)))
    }

    async fn export(&self, request: Request<ExportRequest>) -> Result<Response<ExportFile>, Status> {
        let auth_user = require_item(&request, items::LOCATIONS)?;
        let req = request.into_inner();

        let rows = self
            .fetch_all(&SessionIdentity::from(&auth_user))
            .await
            .map_err(to_status)?;
        let job = ExportJob {
            spec: &LOCATION_SPEC,
            columns: export_columns(),
            base_name: "localizacoes".to_string(),
            title: "Localizações do Município",
        };
        let file = run_export(&rows, req, job, &self.settings, Some(&auth_user)).map_err(to_status)?;

        Ok(Response::new(file))
    }
}
