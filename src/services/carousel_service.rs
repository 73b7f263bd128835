use std::collections::HashMap;

use sqlx::PgPool;
use tonic::{Request, Response, Status};

use crate::access::items;
use crate::db::{begin_as, SessionIdentity};
use crate::error::{AppError, AppResult};
use crate::listing::{self, run_sequential};
use crate::models::carousel_image::{reorder_plan, CAROUSEL_COLUMNS, CAROUSEL_SPEC};
use crate::models::CarouselImageModel;
use crate::proto::carousel::carousel_service_server::CarouselService;
use crate::proto::carousel::{
    CarouselImage, CarouselImageResponse, CreateCarouselImageRequest, ListCarouselImagesResponse,
    PublicCarouselResponse, ReorderRequest, SetActiveRequest, UpdateCarouselImageRequest,
};
use crate::proto::common::{BatchResult, Empty, IdRequest, IdsRequest, ListQuery, Upload};
use crate::storage::{path, SharedStorage};
use crate::validate::optional;

use super::common::{
    batch_result, check_upload, list_query, page_info, parse_id, require_item, selection,
    timestamp, to_status, upload_content_type, ServiceSettings,
};

/// Images are stored under this prefix of the carousel bucket.
const IMAGE_PREFIX: &str = "slides";

pub struct CarouselServiceImpl {
    pool: PgPool,
    storage: SharedStorage,
    settings: ServiceSettings,
}

impl CarouselServiceImpl {
    pub fn new(pool: PgPool, storage: SharedStorage, settings: ServiceSettings) -> Self {
        Self {
            pool,
            storage,
            settings,
        }
    }

    fn model_to_proto(model: &CarouselImageModel) -> CarouselImage {
        CarouselImage {
            id: model.id.clone(),
            title: model.title.clone(),
            description: model.description.clone().unwrap_or_default(),
            image_url: model.image_url.clone(),
            order_index: model.order_index,
            active: model.active,
            created_at: timestamp(&model.created_at),
            updated_at: timestamp(&model.updated_at),
        }
    }

    async fn fetch_all(
        &self,
        identity: &SessionIdentity,
        active_only: bool,
    ) -> AppResult<Vec<CarouselImageModel>> {
        let sql = if active_only {
            format!(
                "SELECT {} FROM hero_carousel WHERE active = true ORDER BY order_index ASC, created_at ASC",
                CAROUSEL_COLUMNS
            )
        } else {
            format!("SELECT {} FROM hero_carousel ORDER BY order_index ASC", CAROUSEL_COLUMNS)
        };
        let mut tx = begin_as(&self.pool, identity).await?;
        let rows: Vec<CarouselImageModel> = sqlx::query_as(&sql).fetch_all(&mut *tx).await?;
        tx.commit().await?;
        Ok(rows)
    }

    async fn fetch_one(&self, identity: &SessionIdentity, id: &str) -> AppResult<CarouselImageModel> {
        let mut tx = begin_as(&self.pool, identity).await?;
        let model: Option<CarouselImageModel> = sqlx::query_as(&format!(
            "SELECT {} FROM hero_carousel WHERE id = $1::uuid",
            CAROUSEL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;
        model.ok_or_else(|| AppError::not_found(format!("Carousel image {} not found", id)))
    }

    async fn store_image(&self, upload: &Upload) -> AppResult<String> {
        check_upload(upload, self.settings.max_upload_bytes)?;
        let content_type = upload_content_type(upload);
        if !content_type.starts_with("image/") {
            return Err(AppError::invalid(format!(
                "{} is not an image ({})",
                upload.file_name, content_type
            )));
        }
        let key = path::object_key(IMAGE_PREFIX, &upload.file_name)?;
        self.storage.upload(&key, &upload.data, &content_type).await?;
        Ok(self.storage.public_url(&key))
    }

    async fn remove_image(&self, url: &str) {
        let Some(key) = self.storage.key_from_public_url(url) else {
            return;
        };
        if let Err(e) = self.storage.delete(&key).await {
            tracing::warn!("Failed to delete carousel image {}: {}", key, e);
        }
    }

    async fn insert(
        &self,
        identity: &SessionIdentity,
        title: &str,
        description: Option<String>,
        image_url: &str,
        active: bool,
    ) -> AppResult<CarouselImageModel> {
        let mut tx = begin_as(&self.pool, identity).await?;
        let model: CarouselImageModel = sqlx::query_as(&format!(
            "INSERT INTO hero_carousel (title, description, image_url, order_index, active) \
             VALUES ($1, $2, $3, (SELECT COALESCE(MAX(order_index), -1) + 1 FROM hero_carousel), $4) \
             RETURNING {}",
            CAROUSEL_COLUMNS
        ))
        .bind(title)
        .bind(description)
        .bind(image_url)
        .bind(active)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(model)
    }

    async fn create_one(
        &self,
        identity: &SessionIdentity,
        req: CreateCarouselImageRequest,
    ) -> AppResult<CarouselImageModel> {
        let title = req.title.trim();
        if title.is_empty() {
            return Err(AppError::invalid("title is required"));
        }
        let upload = req
            .image
            .as_ref()
            .ok_or_else(|| AppError::invalid("image is required"))?;
        let image_url = self.store_image(upload).await?;

        let inserted = self
            .insert(identity, title, optional(&req.description), &image_url, req.active)
            .await;
        if inserted.is_err() {
            self.remove_image(&image_url).await;
        }
        inserted
    }

    /// `None` when no row has `id`.
    async fn update_row(
        &self,
        identity: &SessionIdentity,
        id: &str,
        title: &str,
        description: Option<String>,
        image_url: &str,
        active: bool,
    ) -> AppResult<Option<CarouselImageModel>> {
        let mut tx = begin_as(&self.pool, identity).await?;
        let model: Option<CarouselImageModel> = sqlx::query_as(&format!(
            "UPDATE hero_carousel SET title = $1, description = $2, image_url = $3, active = $4, \
             updated_at = NOW() WHERE id = $5::uuid RETURNING {}",
            CAROUSEL_COLUMNS
        ))
        .bind(title)
        .bind(description)
        .bind(image_url)
        .bind(active)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(model)
    }

    async fn update_one(
        &self,
        identity: &SessionIdentity,
        req: UpdateCarouselImageRequest,
    ) -> AppResult<CarouselImageModel> {
        parse_id(&req.id)?;
        let title = req.title.trim();
        if title.is_empty() {
            return Err(AppError::invalid("title is required"));
        }
        let current = self.fetch_one(identity, &req.id).await?;
        let new_url = match &req.image {
            Some(upload) => Some(self.store_image(upload).await?),
            None => None,
        };
        let image_url = new_url.as_deref().unwrap_or(&current.image_url);

        let updated = self
            .update_row(identity, &req.id, title, optional(&req.description), image_url, req.active)
            .await
            .and_then(|m| {
                m.ok_or_else(|| AppError::not_found(format!("Carousel image {} not found", req.id)))
            });

        // Only one of the two images survives.
        if let Some(url) = &new_url {
            match &updated {
                Ok(_) => self.remove_image(&current.image_url).await,
                Err(_) => self.remove_image(url).await,
            }
        }
        updated
    }

    async fn set_active_flag(
        &self,
        identity: &SessionIdentity,
        id: &str,
        active: bool,
    ) -> AppResult<CarouselImageModel> {
        let mut tx = begin_as(&self.pool, identity).await?;
        let model: Option<CarouselImageModel> = sqlx::query_as(&format!(
            "UPDATE hero_carousel SET active = $1, updated_at = NOW() WHERE id = $2::uuid RETURNING {}",
            CAROUSEL_COLUMNS
        ))
        .bind(active)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;
        model.ok_or_else(|| AppError::not_found(format!("Carousel image {} not found", id)))
    }

    async fn delete_one(&self, identity: &SessionIdentity, id: &str) -> AppResult<()> {
        let mut tx = begin_as(&self.pool, identity).await?;
        let image_url: Option<String> =
            sqlx::query_scalar("DELETE FROM hero_carousel WHERE id = $1::uuid RETURNING image_url")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        tx.commit().await?;
        match image_url {
            Some(url) => {
                self.remove_image(&url).await;
                tracing::info!("Deleted carousel image {}", id);
                Ok(())
            }
            None => Err(AppError::not_found(format!("Carousel image {} not found", id))),
        }
    }

    async fn set_order(&self, identity: &SessionIdentity, id: &str, order_index: i32) -> AppResult<()> {
        let mut tx = begin_as(&self.pool, identity).await?;
        let rows_affected = sqlx::query(
            "UPDATE hero_carousel SET order_index = $1, updated_at = NOW() WHERE id = $2::uuid",
        )
        .bind(order_index)
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        tx.commit().await?;
        if rows_affected == 0 {
            return Err(AppError::not_found(format!("Carousel image {} not found", id)));
        }
        Ok(())
    }
}

#[tonic::async_trait]
impl CarouselService for CarouselServiceImpl {
    async fn list(
        &self,
        request: Request<ListQuery>,
    ) -> Result<Response<ListCarouselImagesResponse>, Status> {
        let auth_user = require_item(&request, items::CAROUSEL)?;
        let query = list_query(request.into_inner(), &CAROUSEL_SPEC).map_err(to_status)?;

        let rows = self
            .fetch_all(&SessionIdentity::from(&auth_user), false)
            .await
            .map_err(to_status)?;
        let page = listing::run(&rows, &query, &CAROUSEL_SPEC, self.settings.text_match);

        Ok(Response::new(ListCarouselImagesResponse {
            page: Some(page_info(&page)),
            items: page.items.iter().map(|m| Self::model_to_proto(m)).collect(),
        }))
    }

    async fn list_public(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<PublicCarouselResponse>, Status> {
        let rows = self
            .fetch_all(&SessionIdentity::Anonymous, true)
            .await
            .map_err(to_status)?;

        Ok(Response::new(PublicCarouselResponse {
            items: rows.iter().map(Self::model_to_proto).collect(),
        }))
    }

    async fn create(
        &self,
        request: Request<CreateCarouselImageRequest>,
    ) -> Result<Response<CarouselImageResponse>, Status> {
        let auth_user = require_item(&request, items::CAROUSEL)?;
        let req = request.into_inner();

        let model = self
            .create_one(&SessionIdentity::from(&auth_user), req)
            .await
            .map_err(to_status)?;
        tracing::info!("Created carousel image {} at position {}", model.id, model.order_index);

        Ok(Response::new(CarouselImageResponse {
            item: Some(Self::model_to_proto(&model)),
        }))
    }

    async fn update(
        &self,
        request: Request<UpdateCarouselImageRequest>,
    ) -> Result<Response<CarouselImageResponse>, Status> {
        let auth_user = require_item(&request, items::CAROUSEL)?;
        let req = request.into_inner();

        let model = self
            .update_one(&SessionIdentity::from(&auth_user), req)
            .await
            .map_err(to_status)?;

        Ok(Response::new(CarouselImageResponse {
            item: Some(Self::model_to_proto(&model)),
        }))
    }

    async fn delete(&self, request: Request<IdRequest>) -> Result<Response<Empty>, Status> {
        let auth_user = require_item(&request, items::CAROUSEL)?;
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
        let auth_user = require_item(&request, items::CAROUSEL)?;
        let selection = selection(request.into_inner().ids).map_err(to_status)?;

        let identity = SessionIdentity::from(&auth_user);
        let outcome = run_sequential("carousel delete", &selection, |id| {
            let identity = &identity;
            async move { self.delete_one(identity, &id).await }
        })
        .await;

        Ok(Response::new(batch_result(outcome)))
    }

    async fn set_active(
        &self,
        request: Request<SetActiveRequest>,
    ) -> Result<Response<CarouselImageResponse>, Status> {
        let auth_user = require_item(&request, items::CAROUSEL)?;
        let req = request.into_inner();

        parse_id(&req.id).map_err(to_status)?;

        let model = self
            .set_active_flag(&SessionIdentity::from(&auth_user), &req.id, req.active)
            .await
            .map_err(to_status)?;

        Ok(Response::new(CarouselImageResponse {
            item: Some(Self::model_to_proto(&model)),
        }))
    }

    async fn reorder(
        &self,
        request: Request<ReorderRequest>,
    ) -> Result<Response<BatchResult>, Status> {
        let auth_user = require_item(&request, items::CAROUSEL)?;
        let req = request.into_inner();

        let ids = req
            .ids
            .iter()
            .map(|id| parse_id(id).map(|uuid| uuid.to_string()))
            .collect::<AppResult<Vec<_>>>()
            .map_err(to_status)?;
        let plan = reorder_plan(&ids).map_err(Status::invalid_argument)?;
        let positions: HashMap<String, i32> = plan.into_iter().collect();
        let selection = selection(ids).map_err(to_status)?;

        let identity = SessionIdentity::from(&auth_user);
        let positions = &positions;
        let outcome = run_sequential("carousel reorder", &selection, |id| {
            let identity = &identity;
            async move {
                let index = positions
                    .get(&id)
                    .copied()
                    .ok_or_else(|| AppError::invalid(format!("unknown position for {}", id)))?;
                self.set_order(identity, &id, index).await
            }
        })
        .await;

        Ok(Response::new(batch_result(outcome)))
    }
}
