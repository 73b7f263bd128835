use chrono::Utc;
use sqlx::PgPool;
use tonic::{Request, Response, Status};

use crate::access::items;
use crate::db::{begin_as, SessionIdentity};
use crate::error::{AppError, AppResult};
use crate::listing::{self, run_sequential};
use crate::models::manifestacao::{
    check_rating, compute_stats, export_columns, generate_protocolo, ManifestacaoStatus,
    StatusChange, SubmissionInput, MANIFESTACAO_COLUMNS, MANIFESTACAO_SPEC,
};
use crate::models::ManifestacaoModel;
use crate::proto::common::{BatchResult, Empty, ExportFile, ExportRequest, IdRequest, ListQuery};
use crate::proto::ouvidoria::ouvidoria_service_server::OuvidoriaService;
use crate::proto::ouvidoria::{
    BatchUpdateStatusRequest, ListManifestacoesResponse, Manifestacao, ManifestacaoResponse,
    OuvidoriaStats, RateRequest, SubmitManifestacaoRequest, SubmitManifestacaoResponse,
    TrackRequest, UpdateStatusRequest,
};
use crate::validate;

use super::common::{
    batch_result, list_query, opt_timestamp, page_info, parse_id, require_item, run_export,
    selection, timestamp, to_status, ExportJob, ServiceSettings,
};

/// Categories listed in the dashboard.
const TOP_CATEGORIES: usize = 5;

#[derive(Clone, Copy)]
enum Lookup<'a> {
    Id(&'a str),
    Protocolo(&'a str),
}

pub struct OuvidoriaServiceImpl {
    pool: PgPool,
    settings: ServiceSettings,
}

impl OuvidoriaServiceImpl {
    pub fn new(pool: PgPool, settings: ServiceSettings) -> Self {
        Self { pool, settings }
    }

    fn model_to_proto(model: &ManifestacaoModel) -> Manifestacao {
        Manifestacao {
            id: model.id.clone(),
            protocolo: model.protocolo.clone(),
            nome: model.nome.clone(),
            email: model.email.clone(),
            telefone: model.telefone.clone().unwrap_or_default(),
            categoria: model.categoria.clone(),
            assunto: model.assunto.clone(),
            descricao: model.descricao.clone(),
            status: model.status.clone(),
            prioridade: model.prioridade.clone(),
            data_abertura: timestamp(&model.data_abertura),
            data_resposta: opt_timestamp(&model.data_resposta),
            resposta: model.resposta.clone().unwrap_or_default(),
            avaliacao: model.avaliacao.unwrap_or_default(),
            comentario_avaliacao: model.comentario_avaliacao.clone().unwrap_or_default(),
            departamento_responsavel: model.departamento_responsavel.clone().unwrap_or_default(),
            tempo_resposta: model.tempo_resposta.unwrap_or_default(),
        }
    }

    async fn fetch_all(&self, identity: &SessionIdentity) -> AppResult<Vec<ManifestacaoModel>> {
        let mut tx = begin_as(&self.pool, identity).await?;
        let rows: Vec<ManifestacaoModel> = sqlx::query_as(&format!(
            "SELECT {} FROM ouvidoria_manifestacoes ORDER BY data_abertura DESC",
            MANIFESTACAO_COLUMNS
        ))
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(rows)
    }

    async fn fetch_by(&self, identity: &SessionIdentity, key: Lookup<'_>) -> AppResult<ManifestacaoModel> {
        let (condition, value) = match key {
            Lookup::Id(id) => ("id = $1::uuid", id),
            Lookup::Protocolo(p) => ("protocolo = $1", p),
        };
        let mut tx = begin_as(&self.pool, identity).await?;
        let model: Option<ManifestacaoModel> = sqlx::query_as(&format!(
            "SELECT {} FROM ouvidoria_manifestacoes WHERE {}",
            MANIFESTACAO_COLUMNS, condition
        ))
        .bind(value)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;
        model.ok_or_else(|| AppError::not_found(format!("Manifestação {} não encontrada", value)))
    }

    async fn insert(&self, input: &SubmissionInput) -> AppResult<String> {
        let protocolo = generate_protocolo(Utc::now());
        let mut tx = begin_as(&self.pool, &SessionIdentity::Anonymous).await?;
        sqlx::query(
            "INSERT INTO ouvidoria_manifestacoes \
             (protocolo, nome, email, telefone, categoria, assunto, descricao, status, prioridade, data_abertura) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'pendente', 'media', NOW())",
        )
        .bind(&protocolo)
        .bind(&input.nome)
        .bind(&input.email)
        .bind(&input.telefone)
        .bind(&input.categoria)
        .bind(&input.assunto)
        .bind(&input.descricao)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(protocolo)
    }

    async fn record_rating(&self, req: &RateRequest) -> AppResult<ManifestacaoModel> {
        check_rating(req.avaliacao)?;
        let protocolo = req.protocolo.trim().to_uppercase();
        let protocolo = protocolo.as_str();
        if !validate::is_protocolo(protocolo) {
            return Err(AppError::invalid(format!("invalid protocolo: {}", protocolo)));
        }
        let identity = SessionIdentity::Anonymous;
        let current = self.fetch_by(&identity, Lookup::Protocolo(protocolo)).await?;
        current.check_can_rate()?;

        let mut tx = begin_as(&self.pool, &identity).await?;
        let model: Option<ManifestacaoModel> = sqlx::query_as(&format!(
            "UPDATE ouvidoria_manifestacoes SET avaliacao = $1, comentario_avaliacao = $2 \
             WHERE protocolo = $3 AND avaliacao IS NULL RETURNING {}",
            MANIFESTACAO_COLUMNS
        ))
        .bind(req.avaliacao)
        .bind(validate::optional(&req.comentario))
        .bind(protocolo)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;
        model.ok_or_else(|| AppError::invalid("manifestação já foi avaliada"))
    }

    async fn change_status(
        &self,
        identity: &SessionIdentity,
        id: &str,
        status: ManifestacaoStatus,
        resposta: &str,
    ) -> AppResult<ManifestacaoModel> {
        let current = self.fetch_by(identity, Lookup::Id(id)).await?;
        let change = StatusChange::plan(&current, status, resposta, Utc::now());

        let mut tx = begin_as(&self.pool, identity).await?;
        let model: Option<ManifestacaoModel> = sqlx::query_as(&format!(
            "UPDATE ouvidoria_manifestacoes SET status = $1, resposta = $2, data_resposta = $3, \
             tempo_resposta = $4 WHERE id = $5::uuid RETURNING {}",
            MANIFESTACAO_COLUMNS
        ))
        .bind(change.status.as_str())
        .bind(&change.resposta)
        .bind(change.data_resposta)
        .bind(change.tempo_resposta)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;
        let model =
            model.ok_or_else(|| AppError::not_found(format!("Manifestação {} não encontrada", id)))?;
        tracing::info!("Manifestação {} is now {}", model.protocolo, change.status);
        Ok(model)
    }
}

#[tonic::async_trait]
impl OuvidoriaService for OuvidoriaServiceImpl {
    async fn submit(
        &self,
        request: Request<SubmitManifestacaoRequest>,
    ) -> Result<Response<SubmitManifestacaoResponse>, Status> {
        let req = request.into_inner();

        let input = SubmissionInput::new(
            &req.nome,
            &req.email,
            &req.telefone,
            &req.categoria,
            &req.assunto,
            &req.descricao,
        )
        .map_err(to_status)?;

        let protocolo = self.insert(&input).await.map_err(to_status)?;
        tracing::info!("New manifestação {} ({})", protocolo, input.categoria);

        Ok(Response::new(SubmitManifestacaoResponse { protocolo }))
    }

    async fn track(
        &self,
        request: Request<TrackRequest>,
    ) -> Result<Response<ManifestacaoResponse>, Status> {
        let req = request.into_inner();
        let protocolo = req.protocolo.trim().to_uppercase();

        if !validate::is_protocolo(&protocolo) {
            return Err(Status::invalid_argument("invalid protocolo"));
        }

        let model = self
            .fetch_by(&SessionIdentity::Anonymous, Lookup::Protocolo(&protocolo))
            .await
            .map_err(to_status)?;

        Ok(Response::new(ManifestacaoResponse {
            item: Some(Self::model_to_proto(&model)),
        }))
    }

    async fn rate(&self, request: Request<RateRequest>) -> Result<Response<ManifestacaoResponse>, Status> {
        let req = request.into_inner();

        let model = self.record_rating(&req).await.map_err(to_status)?;

        Ok(Response::new(ManifestacaoResponse {
            item: Some(Self::model_to_proto(&model)),
        }))
    }

    async fn list(
        &self,
        request: Request<ListQuery>,
    ) -> Result<Response<ListManifestacoesResponse>, Status> {
        let auth_user = require_item(&request, items::OUVIDORIA)?;
        let query = list_query(request.into_inner(), &MANIFESTACAO_SPEC).map_err(to_status)?;

        let rows = self
            .fetch_all(&SessionIdentity::from(&auth_user))
            .await
            .map_err(to_status)?;
        let page = listing::run(&rows, &query, &MANIFESTACAO_SPEC, self.settings.text_match);

        Ok(Response::new(ListManifestacoesResponse {
            page: Some(page_info(&page)),
            items: page.items.iter().map(|m| Self::model_to_proto(m)).collect(),
        }))
    }

    async fn get(&self, request: Request<IdRequest>) -> Result<Response<ManifestacaoResponse>, Status> {
        let auth_user = require_item(&request, items::OUVIDORIA)?;
        let req = request.into_inner();

        parse_id(&req.id).map_err(to_status)?;

        let model = self
            .fetch_by(&SessionIdentity::from(&auth_user), Lookup::Id(&req.id))
            .await
            .map_err(to_status)?;

        Ok(Response::new(ManifestacaoResponse {
            item: Some(Self::model_to_proto(&model)),
        }))
    }

    async fn update_status(
        &self,
        request: Request<UpdateStatusRequest>,
    ) -> Result<Response<ManifestacaoResponse>, Status> {
        let auth_user = require_item(&request, items::OUVIDORIA)?;
        let req = request.into_inner();

        parse_id(&req.id).map_err(to_status)?;
        let status: ManifestacaoStatus = req.status.parse().map_err(to_status)?;

        let model = self
            .change_status(&SessionIdentity::from(&auth_user), &req.id, status, &req.resposta)
            .await
            .map_err(to_status)?;

        Ok(Response::new(ManifestacaoResponse {
            item: Some(Self::model_to_proto(&model)),
        }))
    }

    async fn batch_update_status(
        &self,
        request: Request<BatchUpdateStatusRequest>,
    ) -> Result<Response<BatchResult>, Status> {
        let auth_user = require_item(&request, items::OUVIDORIA)?;
        let req = request.into_inner();
        let status: ManifestacaoStatus = req.status.parse().map_err(to_status)?;
        let selection = selection(req.ids).map_err(to_status)?;

        let identity = SessionIdentity::from(&auth_user);
        let outcome = run_sequential("ouvidoria status", &selection, |id| {
            let identity = &identity;
            async move {
                self.change_status(identity, &id, status, "").await?;
                Ok(())
            }
        })
        .await;

        Ok(Response::new(batch_result(outcome)))
    }

    async fn stats(&self, request: Request<Empty>) -> Result<Response<OuvidoriaStats>, Status> {
        let auth_user = require_item(&request, items::OUVIDORIA)?;

        let rows = self
            .fetch_all(&SessionIdentity::from(&auth_user))
            .await
            .map_err(to_status)?;
        let stats = compute_stats(&rows, TOP_CATEGORIES);

        Ok(Response::new(OuvidoriaStats {
            total_manifestacoes: stats.total as u32,
            pendentes: stats.count(ManifestacaoStatus::Pendente) as u32,
            em_analise: stats.count(ManifestacaoStatus::EmAnalise) as u32,
            respondidas: stats.count(ManifestacaoStatus::Respondido) as u32,
            resolvidas: stats.count(ManifestacaoStatus::Resolvido) as u32,
            arquivadas: stats.count(ManifestacaoStatus::Arquivado) as u32,
            tempo_medio_resposta: stats.average_response_hours,
            satisfacao_geral: stats.satisfaction,
            categorias_mais_comuns: stats.top_categories,
        }))
    }

    async fn export(&self, request: Request<ExportRequest>) -> Result<Response<ExportFile>, Status> {
        let auth_user = require_item(&request, items::OUVIDORIA)?;
        let req = request.into_inner();

        let rows = self
            .fetch_all(&SessionIdentity::from(&auth_user))
            .await
            .map_err(to_status)?;
        let job = ExportJob {
            spec: &MANIFESTACAO_SPEC,
            columns: export_columns(),
            base_name: "ouvidoria".to_string(),
            title: "Relatório de Manifestações da Ouvidoria",
        };
        let file = run_export(&rows, req, job, &self.settings, Some(&auth_user)).map_err(to_status)?;

        Ok(Response::new(file))
    }
}
