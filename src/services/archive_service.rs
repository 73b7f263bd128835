use chrono::Utc;
use sqlx::PgPool;
use tonic::{Request, Response, Status};

use crate::access::items;
use crate::db::{begin_as, SessionIdentity};
use crate::error::{AppError, AppResult};
use crate::export::{self, ArchiveBuilder, GZIP_CONTENT_TYPE};
use crate::listing::{self, run_sequential, SelectionSet};
use crate::models::archive_item::{
    export_columns, title_from_file_name, ArchiveInput, ARCHIVE_COLUMNS, ARCHIVE_SPEC,
};
use crate::models::ArchiveItemModel;
use crate::proto::archive::archive_service_server::ArchiveService;
use crate::proto::archive::{
    ArchiveItem, ArchiveItemResponse, BatchCreateArchiveItemsRequest, CreateArchiveItemRequest,
    ListArchiveItemsResponse, SetVisibilityRequest, UpdateArchiveItemRequest,
};
use crate::proto::common::{
    BatchResult, Empty, ExportFile, ExportRequest, IdRequest, IdsRequest, ListQuery, Upload,
};
use crate::storage::{path, SharedStorage};

use super::common::{
    batch_result, check_upload, get_authenticated_user, list_query, page_info, parse_id,
    require_item, run_export, selection, timestamp, to_status, upload_content_type, ExportJob,
    ServiceSettings,
};

/// File stored for an archive item.
struct StoredFile {
    url: String,
    size: i64,
    mime_type: String,
}

pub struct ArchiveServiceImpl {
    pool: PgPool,
    storage: SharedStorage,
    settings: ServiceSettings,
}

impl ArchiveServiceImpl {
    pub fn new(pool: PgPool, storage: SharedStorage, settings: ServiceSettings) -> Self {
        Self {
            pool,
            storage,
            settings,
        }
    }

    fn model_to_proto(model: &ArchiveItemModel) -> ArchiveItem {
        ArchiveItem {
            id: model.id.clone(),
            title: model.title.clone(),
            description: model.description.clone().unwrap_or_default(),
            item_type: model.item_type.clone(),
            category: model.category.clone().unwrap_or_default(),
            department: model.department.clone(),
            file_url: model.file_url.clone().unwrap_or_default(),
            thumbnail_url: model.thumbnail_url.clone().unwrap_or_default(),
            file_size: model.file_size.unwrap_or_default(),
            mime_type: model.mime_type.clone().unwrap_or_default(),
            is_public: model.is_public,
            author_id: model.author_id.clone(),
            created_at: timestamp(&model.created_at),
            updated_at: timestamp(&model.updated_at),
        }
    }

    async fn fetch_all(&self, identity: &SessionIdentity) -> AppResult<Vec<ArchiveItemModel>> {
        let mut tx = begin_as(&self.pool, identity).await?;
        let rows: Vec<ArchiveItemModel> = sqlx::query_as(&format!(
            "SELECT {} FROM acervo_digital ORDER BY created_at DESC",
            ARCHIVE_COLUMNS
        ))
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(rows)
    }

    async fn fetch_one(&self, identity: &SessionIdentity, id: &str) -> AppResult<ArchiveItemModel> {
        let mut tx = begin_as(&self.pool, identity).await?;
        let model: Option<ArchiveItemModel> = sqlx::query_as(&format!(
            "SELECT {} FROM acervo_digital WHERE id = $1::uuid",
            ARCHIVE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;
        model.ok_or_else(|| AppError::not_found(format!("Archive item {} not found", id)))
    }

    async fn store_file(&self, prefix: &str, upload: &Upload) -> AppResult<StoredFile> {
        check_upload(upload, self.settings.max_upload_bytes)?;
        let key = path::object_key(prefix, &upload.file_name)?;
        let mime_type = upload_content_type(upload);
        self.storage.upload(&key, &upload.data, &mime_type).await?;
        Ok(StoredFile {
            url: self.storage.public_url(&key),
            size: upload.data.len() as i64,
            mime_type,
        })
    }

    /// Best effort: a missing object does not fail the caller.
    async fn remove_file(&self, url: Option<&str>) {
        let Some(key) = url.and_then(|u| self.storage.key_from_public_url(u)) else {
            return;
        };
        if let Err(e) = self.storage.delete(&key).await {
            tracing::warn!("Failed to delete stored object {}: {}", key, e);
        }
    }

    async fn insert(
        &self,
        identity: &SessionIdentity,
        author_id: &str,
        input: &ArchiveInput,
        file: Option<&StoredFile>,
    ) -> AppResult<ArchiveItemModel> {
        let thumbnail = file
            .filter(|_| input.item_type == "imagem")
            .map(|f| f.url.as_str());
        let mut tx = begin_as(&self.pool, identity).await?;
        let model: ArchiveItemModel = sqlx::query_as(&format!(
            "INSERT INTO acervo_digital (title, description, type, category, department, \
             file_url, thumbnail_url, file_size, mime_type, is_public, author_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11::uuid) \
             RETURNING {}",
            ARCHIVE_COLUMNS
        ))
        .bind(&input.title)
        .bind(&input.description)
        .bind(&input.item_type)
        .bind(&input.category)
        .bind(&input.department)
        .bind(file.map(|f| f.url.as_str()))
        .bind(thumbnail)
        .bind(file.map(|f| f.size))
        .bind(file.map(|f| f.mime_type.as_str()))
        .bind(input.is_public)
        .bind(author_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(model)
    }

    async fn create_one(
        &self,
        identity: &SessionIdentity,
        author_id: &str,
        input: &ArchiveInput,
        upload: Option<&Upload>,
    ) -> AppResult<ArchiveItemModel> {
        let file = match upload {
            Some(u) => Some(self.store_file(&input.storage_prefix(), u).await?),
            None => None,
        };
        match self.insert(identity, author_id, input, file.as_ref()).await {
            Ok(model) => Ok(model),
            Err(e) => {
                self.remove_file(file.as_ref().map(|f| f.url.as_str())).await;
                Err(e)
            }
        }
    }

    async fn delete_one(&self, identity: &SessionIdentity, id: &str) -> AppResult<()> {
        let mut tx = begin_as(&self.pool, identity).await?;
        let file_url: Option<Option<String>> =
            sqlx::query_scalar("DELETE FROM acervo_digital WHERE id = $1::uuid RETURNING file_url")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        tx.commit().await?;
        match file_url {
            Some(url) => {
                self.remove_file(url.as_deref()).await;
                tracing::info!("Deleted archive item {}", id);
                Ok(())
            }
            None => Err(AppError::not_found(format!("Archive item {} not found", id))),
        }
    }

    async fn set_visibility(
        &self,
        identity: &SessionIdentity,
        id: &str,
        is_public: bool,
    ) -> AppResult<()> {
        let mut tx = begin_as(&self.pool, identity).await?;
        let rows_affected = sqlx::query(
            "UPDATE acervo_digital SET is_public = $1, updated_at = NOW() WHERE id = $2::uuid",
        )
        .bind(is_public)
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        tx.commit().await?;
        if rows_affected == 0 {
            return Err(AppError::not_found(format!("Archive item {} not found", id)));
        }
        Ok(())
    }

    async fn update_one(
        &self,
        identity: &SessionIdentity,
        req: UpdateArchiveItemRequest,
    ) -> AppResult<ArchiveItemModel> {
        parse_id(&req.id)?;
        let input = ArchiveInput::new(
            &req.title,
            &req.description,
            &req.item_type,
            &req.category,
            &req.department,
            req.is_public,
        )?;
        let current = self.fetch_one(identity, &req.id).await?;

        let file = match &req.file {
            Some(u) => Some(self.store_file(&input.storage_prefix(), u).await?),
            None => None,
        };
        let file_url = file.as_ref().map(|f| f.url.clone()).or(current.file_url.clone());
        let file_size = file.as_ref().map(|f| f.size).or(current.file_size);
        let mime_type = file.as_ref().map(|f| f.mime_type.clone()).or(current.mime_type.clone());
        let thumbnail_url = if input.item_type == "imagem" {
            file_url.clone()
        } else {
            None
        };

        let mut tx = begin_as(&self.pool, identity).await?;
        let updated: Result<Option<ArchiveItemModel>, sqlx::Error> = sqlx::query_as(&format!(
            "UPDATE acervo_digital SET title = $1, description = $2, type = $3, category = $4, \
             department = $5, is_public = $6, file_url = $7, thumbnail_url = $8, file_size = $9, \
             mime_type = $10, updated_at = NOW() \
             WHERE id = $11::uuid \
             RETURNING {}",
            ARCHIVE_COLUMNS
        ))
        .bind(&input.title)
        .bind(&input.description)
        .bind(&input.item_type)
        .bind(&input.category)
        .bind(&input.department)
        .bind(input.is_public)
        .bind(&file_url)
        .bind(&thumbnail_url)
        .bind(file_size)
        .bind(&mime_type)
        .bind(&req.id)
        .fetch_optional(&mut *tx)
        .await;

        let updated = match updated {
            Ok(Some(model)) => {
                tx.commit().await?;
                model
            }
            Ok(None) => {
                self.remove_file(file.as_ref().map(|f| f.url.as_str())).await;
                return Err(AppError::not_found(format!("Archive item {} not found", req.id)));
            }
            Err(e) => {
                self.remove_file(file.as_ref().map(|f| f.url.as_str())).await;
                return Err(e.into());
            }
        };

        if file.is_some() {
            self.remove_file(current.file_url.as_deref()).await;
        }
        Ok(updated)
    }

    async fn record_view(&self, identity: &SessionIdentity, id: &str) -> AppResult<()> {
        let mut tx = begin_as(&self.pool, identity).await?;
        sqlx::query("SELECT register_acervo_view($1::uuid)")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Selected files packed into one gzip'd tar.
    async fn pack_files(&self, identity: &SessionIdentity, ids: Vec<String>) -> AppResult<ExportFile> {
        let selection = selection(ids)?;
        let mut archive = ArchiveBuilder::new();
        for id in selection.ids() {
            let item = match self.fetch_one(identity, id).await {
                Ok(item) => item,
                Err(e) => {
                    tracing::warn!("Skipping archive item {}: {}", id, e);
                    continue;
                }
            };
            let Some(url) = item.file_url.as_deref() else {
                tracing::debug!("Archive item {} has no file", id);
                continue;
            };
            let Some(key) = self.storage.key_from_public_url(url) else {
                tracing::warn!("Archive item {} points outside the bucket: {}", id, url);
                continue;
            };
            match self.storage.download(&key).await {
                Ok(data) => archive.add(&path::download_name(&item.title, &key), &data)?,
                Err(e) => tracing::warn!("Failed to download {} for item {}: {}", key, id, e),
            }
        }
        if archive.is_empty() {
            return Err(AppError::EmptyExport);
        }
        let record_count = archive.len();
        let bytes = archive.finish()?;
        tracing::info!("Packed {} archive files ({} bytes)", record_count, bytes.len());
        Ok(ExportFile {
            filename: export::filename("acervo", Utc::now(), "tar.gz"),
            content_type: GZIP_CONTENT_TYPE.to_string(),
            data: bytes,
            record_count: record_count as u32,
        })
    }
}

#[tonic::async_trait]
impl ArchiveService for ArchiveServiceImpl {
    async fn list(
        &self,
        request: Request<ListQuery>,
    ) -> Result<Response<ListArchiveItemsResponse>, Status> {
        let auth_user = require_item(&request, items::ACERVO)?;
        let query = list_query(request.into_inner(), &ARCHIVE_SPEC).map_err(to_status)?;

        let rows = self
            .fetch_all(&SessionIdentity::from(&auth_user))
            .await
            .map_err(to_status)?;
        let page = listing::run(&rows, &query, &ARCHIVE_SPEC, self.settings.text_match);

        Ok(Response::new(ListArchiveItemsResponse {
            page: Some(page_info(&page)),
            items: page.items.iter().map(|m| Self::model_to_proto(m)).collect(),
        }))
    }

    async fn get(
        &self,
        request: Request<IdRequest>,
    ) -> Result<Response<ArchiveItemResponse>, Status> {
        let auth_user = require_item(&request, items::ACERVO)?;
        let req = request.into_inner();

        parse_id(&req.id).map_err(to_status)?;

        let model = self
            .fetch_one(&SessionIdentity::from(&auth_user), &req.id)
            .await
            .map_err(to_status)?;

        Ok(Response::new(ArchiveItemResponse {
            item: Some(Self::model_to_proto(&model)),
        }))
    }

    async fn create(
        &self,
        request: Request<CreateArchiveItemRequest>,
    ) -> Result<Response<ArchiveItemResponse>, Status> {
        let auth_user = require_item(&request, items::ACERVO)?;
        let req = request.into_inner();

        let input = ArchiveInput::new(
            &req.title,
            &req.description,
            &req.item_type,
            &req.category,
            &req.department,
            req.is_public,
        )
        .map_err(to_status)?;

        let model = self
            .create_one(
                &SessionIdentity::from(&auth_user),
                &auth_user.user_id,
                &input,
                req.file.as_ref(),
            )
            .await
            .map_err(to_status)?;
        tracing::info!("Created archive item {} ({})", model.id, model.title);

        Ok(Response::new(ArchiveItemResponse {
            item: Some(Self::model_to_proto(&model)),
        }))
    }

    async fn batch_create(
        &self,
        request: Request<BatchCreateArchiveItemsRequest>,
    ) -> Result<Response<BatchResult>, Status> {
        let auth_user = require_item(&request, items::ACERVO)?;
        let req = request.into_inner();

        if req.files.is_empty() {
            return Err(Status::invalid_argument("at least one file is required"));
        }
        let names = SelectionSet::from_ids(req.files.iter().map(|f| f.file_name.clone()))
            .map_err(to_status)?;
        if names.len() != req.files.len() {
            return Err(Status::invalid_argument("file names must be unique"));
        }

        let identity = SessionIdentity::from(&auth_user);
        let files = &req.files;
        let req = &req;
        let outcome = run_sequential("archive upload", &names, |name| {
            let identity = &identity;
            let author_id = auth_user.user_id.as_str();
            async move {
                let upload = files
                    .iter()
                    .find(|f| f.file_name.trim() == name)
                    .ok_or_else(|| AppError::invalid(format!("missing file {}", name)))?;
                let input = ArchiveInput::new(
                    &title_from_file_name(&name),
                    "",
                    &req.item_type,
                    &req.category,
                    &req.department,
                    req.is_public,
                )?;
                self.create_one(identity, author_id, &input, Some(upload)).await?;
                Ok(())
            }
        })
        .await;

        Ok(Response::new(batch_result(outcome)))
    }

    async fn update(
        &self,
        request: Request<UpdateArchiveItemRequest>,
    ) -> Result<Response<ArchiveItemResponse>, Status> {
        let auth_user = require_item(&request, items::ACERVO)?;
        let req = request.into_inner();

        let model = self
            .update_one(&SessionIdentity::from(&auth_user), req)
            .await
            .map_err(to_status)?;

        Ok(Response::new(ArchiveItemResponse {
            item: Some(Self::model_to_proto(&model)),
        }))
    }

    async fn delete(&self, request: Request<IdRequest>) -> Result<Response<Empty>, Status> {
        let auth_user = require_item(&request, items::ACERVO)?;
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
        let auth_user = require_item(&request, items::ACERVO)?;
        let selection = selection(request.into_inner().ids).map_err(to_status)?;

        let identity = SessionIdentity::from(&auth_user);
        let outcome = run_sequential("archive delete", &selection, |id| {
            let identity = &identity;
            async move { self.delete_one(identity, &id).await }
        })
        .await;

        Ok(Response::new(batch_result(outcome)))
    }

    async fn batch_set_visibility(
        &self,
        request: Request<SetVisibilityRequest>,
    ) -> Result<Response<BatchResult>, Status> {
        let auth_user = require_item(&request, items::ACERVO)?;
        let req = request.into_inner();
        let selection = selection(req.ids).map_err(to_status)?;

        let identity = SessionIdentity::from(&auth_user);
        let is_public = req.is_public;
        let outcome = run_sequential("archive visibility", &selection, |id| {
            let identity = &identity;
            async move { self.set_visibility(identity, &id, is_public).await }
        })
        .await;

        Ok(Response::new(batch_result(outcome)))
    }

    async fn export(&self, request: Request<ExportRequest>) -> Result<Response<ExportFile>, Status> {
        let auth_user = require_item(&request, items::ACERVO)?;
        let req = request.into_inner();

        let rows = self
            .fetch_all(&SessionIdentity::from(&auth_user))
            .await
            .map_err(to_status)?;
        let job = ExportJob {
            spec: &ARCHIVE_SPEC,
            columns: export_columns(),
            base_name: "acervo-digital".to_string(),
            title: "Acervo Digital",
        };
        let file = run_export(&rows, req, job, &self.settings, Some(&auth_user)).map_err(to_status)?;

        Ok(Response::new(file))
    }

    async fn download_batch(
        &self,
        request: Request<IdsRequest>,
    ) -> Result<Response<ExportFile>, Status> {
        let auth_user = require_item(&request, items::ACERVO)?;
        let req = request.into_inner();

        let file = self
            .pack_files(&SessionIdentity::from(&auth_user), req.ids)
            .await
            .map_err(to_status)?;

        Ok(Response::new(file))
    }

    async fn register_view(&self, request: Request<IdRequest>) -> Result<Response<Empty>, Status> {
        let identity = get_authenticated_user(&request)
            .map(|u| SessionIdentity::from(&u))
            .unwrap_or(SessionIdentity::Anonymous);
        let req = request.into_inner();

        parse_id(&req.id).map_err(to_status)?;

        self.record_view(&identity, &req.id).await.map_err(to_status)?;

        Ok(Response::new(Empty {}))
    }
}
