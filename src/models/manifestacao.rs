use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{AppError, AppResult};
use crate::export::{date_cell, ExportColumn};
use crate::listing::{FieldValue, ListRecord, ListSpec, SortDirection};
use crate::validate;

/// Row of `ouvidoria_manifestacoes`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ManifestacaoModel {
    pub id: String,
    pub protocolo: String,
    pub nome: String,
    pub email: String,
    pub telefone: Option<String>,
    pub categoria: String,
    pub assunto: String,
    pub descricao: String,
    pub status: String,
    pub prioridade: String,
    pub data_abertura: DateTime<Utc>,
    pub data_resposta: Option<DateTime<Utc>>,
    pub resposta: Option<String>,
    pub avaliacao: Option<i32>,
    pub comentario_avaliacao: Option<String>,
    pub departamento_responsavel: Option<String>,
    pub tempo_resposta: Option<i32>,
}

pub const MANIFESTACAO_COLUMNS: &str = "id::text, protocolo, nome, email, telefone, categoria, assunto, \
     descricao, status, prioridade, data_abertura, data_resposta, resposta, avaliacao, \
     comentario_avaliacao, departamento_responsavel, tempo_resposta";

pub const MANIFESTACAO_SPEC: ListSpec = ListSpec {
    search_fields: &["assunto", "nome", "protocolo"],
    filter_fields: &["status", "categoria", "prioridade"],
    required_fields: &[],
    sort_fields: &["data_abertura", "status", "prioridade", "categoria", "nome"],
    date_field: "data_abertura",
    default_sort: ("data_abertura", SortDirection::Desc),
    page_size: 10,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManifestacaoStatus {
    Pendente,
    EmAnalise,
    Respondido,
    Resolvido,
    Arquivado,
}

impl ManifestacaoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManifestacaoStatus::Pendente => "pendente",
            ManifestacaoStatus::EmAnalise => "em_analise",
            ManifestacaoStatus::Respondido => "respondido",
            ManifestacaoStatus::Resolvido => "resolvido",
            ManifestacaoStatus::Arquivado => "arquivado",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ManifestacaoStatus::Pendente => "Pendente",
            ManifestacaoStatus::EmAnalise => "Em Análise",
            ManifestacaoStatus::Respondido => "Respondido",
            ManifestacaoStatus::Resolvido => "Resolvido",
            ManifestacaoStatus::Arquivado => "Arquivado",
        }
    }

    /// Statuses that close the request from the citizen's point of view.
    pub fn is_answered(&self) -> bool {
        matches!(self, ManifestacaoStatus::Respondido | ManifestacaoStatus::Resolvido)
    }
}

impl FromStr for ManifestacaoStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pendente" => Ok(ManifestacaoStatus::Pendente),
            "em_analise" => Ok(ManifestacaoStatus::EmAnalise),
            "respondido" => Ok(ManifestacaoStatus::Respondido),
            "resolvido" => Ok(ManifestacaoStatus::Resolvido),
            "arquivado" => Ok(ManifestacaoStatus::Arquivado),
            other => Err(AppError::invalid(format!("unknown status: {}", other))),
        }
    }
}

impl fmt::Display for ManifestacaoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const PRIORIDADES: &[&str] = &["baixa", "media", "alta", "urgente"];

impl ListRecord for ManifestacaoModel {
    fn id(&self) -> &str {
        &self.id
    }

    fn field(&self, name: &str) -> FieldValue {
        match name {
            "protocolo" => self.protocolo.as_str().into(),
            "nome" => self.nome.as_str().into(),
            "email" => self.email.as_str().into(),
            "telefone" => self.telefone.clone().into(),
            "categoria" => self.categoria.as_str().into(),
            "assunto" => self.assunto.as_str().into(),
            "descricao" => self.descricao.as_str().into(),
            "status" => self.status.as_str().into(),
            "prioridade" => self.prioridade.as_str().into(),
            "data_abertura" => self.data_abertura.into(),
            "data_resposta" => self.data_resposta.into(),
            "resposta" => self.resposta.clone().into(),
            "avaliacao" => self.avaliacao.into(),
            "departamento_responsavel" => self.departamento_responsavel.clone().into(),
            "tempo_resposta" => self.tempo_resposta.into(),
            _ => FieldValue::Empty,
        }
    }
}

impl ManifestacaoModel {
    pub fn status(&self) -> Option<ManifestacaoStatus> {
        self.status.parse().ok()
    }

    /// Citizens may rate once, and only after an answer.
    pub fn check_can_rate(&self) -> AppResult<()> {
        if !self.status().map(|s| s.is_answered()).unwrap_or(false) {
            return Err(AppError::invalid(
                "manifestação ainda não foi respondida",
            ));
        }
        if self.avaliacao.is_some() {
            return Err(AppError::invalid("manifestação já foi avaliada"));
        }
        Ok(())
    }
}

/// `OUV-YYYYMMDD-XXXXXX` with six uppercase hex digits.
pub fn generate_protocolo(now: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string()[..6].to_uppercase();
    format!("OUV-{}-{}", now.format("%Y%m%d"), suffix)
}

/// Whole hours between opening and response, never negative.
pub fn response_hours(opened: DateTime<Utc>, answered: DateTime<Utc>) -> i32 {
    let hours = (answered - opened).num_hours().max(0);
    i32::try_from(hours).unwrap_or(i32::MAX)
}

/// Columns written by a status update.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub status: ManifestacaoStatus,
    pub resposta: Option<String>,
    pub data_resposta: Option<DateTime<Utc>>,
    pub tempo_resposta: Option<i32>,
}

impl StatusChange {
    /// Moving to an answered status stamps the response date once;
    /// an empty `resposta` keeps the stored one.
    pub fn plan(current: &ManifestacaoModel, status: ManifestacaoStatus, resposta: &str, now: DateTime<Utc>) -> Self {
        let resposta = validate::optional(resposta).or_else(|| current.resposta.clone());
        let data_resposta = match current.data_resposta {
            Some(at) => Some(at),
            None if status.is_answered() => Some(now),
            None => None,
        };
        let tempo_resposta = data_resposta.map(|at| response_hours(current.data_abertura, at));
        Self {
            status,
            resposta,
            data_resposta,
            tempo_resposta,
        }
    }
}

pub const RATING_RANGE: std::ops::RangeInclusive<i32> = 1..=5;

pub fn check_rating(avaliacao: i32) -> AppResult<()> {
    if RATING_RANGE.contains(&avaliacao) {
        Ok(())
    } else {
        Err(AppError::invalid("avaliacao must be between 1 and 5"))
    }
}

/// Validated citizen submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionInput {
    pub nome: String,
    pub email: String,
    pub telefone: Option<String>,
    pub categoria: String,
    pub assunto: String,
    pub descricao: String,
}

impl SubmissionInput {
    pub fn new(
        nome: &str,
        email: &str,
        telefone: &str,
        categoria: &str,
        assunto: &str,
        descricao: &str,
    ) -> AppResult<Self> {
        let email = validate::email("email", email)?;
        if let Some(t) = validate::optional(telefone) {
            if !validate::is_phone(&t) {
                return Err(AppError::invalid(format!("invalid telefone: {}", t)));
            }
        }
        let descricao = validate::required("descricao", descricao)?;
        if descricao.chars().count() < 10 {
            return Err(AppError::invalid("descricao must have at least 10 characters"));
        }
        Ok(Self {
            nome: validate::required("nome", nome)?,
            email,
            telefone: validate::optional(telefone),
            categoria: validate::required("categoria", categoria)?,
            assunto: validate::required("assunto", assunto)?,
            descricao,
        })
    }
}

/// Dashboard aggregates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stats {
    pub total: usize,
    pub by_status: HashMap<ManifestacaoStatus, usize>,
    /// Mean `tempo_resposta` in hours over answered rows
    pub average_response_hours: f64,
    /// Mean rating (1..=5) over rated rows
    pub satisfaction: f64,
    pub top_categories: Vec<String>,
}

impl Stats {
    pub fn count(&self, status: ManifestacaoStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

pub fn compute_stats(rows: &[ManifestacaoModel], top: usize) -> Stats {
    let mut stats = Stats {
        total: rows.len(),
        ..Default::default()
    };
    let mut categories: HashMap<&str, usize> = HashMap::new();
    let (mut hours_sum, mut hours_n) = (0i64, 0usize);
    let (mut rating_sum, mut rating_n) = (0i64, 0usize);

    for row in rows {
        if let Some(status) = row.status() {
            *stats.by_status.entry(status).or_insert(0) += 1;
        }
        *categories.entry(row.categoria.as_str()).or_insert(0) += 1;
        if let Some(h) = row.tempo_resposta {
            hours_sum += i64::from(h);
            hours_n += 1;
        }
        if let Some(r) = row.avaliacao {
            rating_sum += i64::from(r);
            rating_n += 1;
        }
    }

    if hours_n > 0 {
        stats.average_response_hours = hours_sum as f64 / hours_n as f64;
    }
    if rating_n > 0 {
        stats.satisfaction = rating_sum as f64 / rating_n as f64;
    }

    let mut ranked: Vec<(&str, usize)> = categories.into_iter().collect();
    // Most frequent first, ties by name so the result is deterministic
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    stats.top_categories = ranked.into_iter().take(top).map(|(c, _)| c.to_string()).collect();
    stats
}

fn status_label(raw: &str) -> String {
    raw.parse::<ManifestacaoStatus>()
        .map(|s| s.label().to_string())
        .unwrap_or_else(|_| raw.to_string())
}

pub fn export_columns() -> Vec<ExportColumn<ManifestacaoModel>> {
    vec![
        ExportColumn { key: "protocolo", header: "Protocolo", value: |r| r.protocolo.clone() },
        ExportColumn { key: "nome", header: "Nome", value: |r| r.nome.clone() },
        ExportColumn { key: "email", header: "Email", value: |r| r.email.clone() },
        ExportColumn {
            key: "telefone",
            header: "Telefone",
            value: |r| r.telefone.clone().unwrap_or_default(),
        },
        ExportColumn { key: "categoria", header: "Categoria", value: |r| r.categoria.clone() },
        ExportColumn { key: "assunto", header: "Assunto", value: |r| r.assunto.clone() },
        ExportColumn { key: "status", header: "Estado", value: |r| status_label(&r.status) },
        ExportColumn { key: "prioridade", header: "Prioridade", value: |r| r.prioridade.clone() },
        ExportColumn {
            key: "data_abertura",
            header: "Data de Abertura",
            value: |r| date_cell(&r.data_abertura),
        },
        ExportColumn {
            key: "data_resposta",
            header: "Data de Resposta",
            value: |r| r.data_resposta.as_ref().map(date_cell).unwrap_or_default(),
        },
        ExportColumn {
            key: "avaliacao",
            header: "Avaliação",
            value: |r| r.avaliacao.map(|a| a.to_string()).unwrap_or_default(),
        },
    ]
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    pub fn manifestacao(id: &str, categoria: &str, status: &str) -> ManifestacaoModel {
        ManifestacaoModel {
            id: id.into(),
            protocolo: format!("OUV-20240101-{:0>6}", id),
            nome: "Ana".into(),
            email: "ana@example.ao".into(),
            telefone: None,
            categoria: categoria.into(),
            assunto: "Iluminação pública".into(),
            descricao: "Poste avariado na rua principal".into(),
            status: status.into(),
            prioridade: "media".into(),
            data_abertura: Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap(),
            data_resposta: None,
            resposta: None,
            avaliacao: None,
            comentario_avaliacao: None,
            departamento_responsavel: None,
            tempo_resposta: None,
        }
    }

    #[test]
    fn test_protocolo() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 10, 0, 0).unwrap();
        let p = generate_protocolo(now);
        assert!(p.starts_with("OUV-20240309-"), "{}", p);
        assert!(validate::is_protocolo(&p));
    }

    #[test]
    fn test_response_hours() {
        let opened = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        assert_eq!(response_hours(opened, opened + Duration::minutes(150)), 2);
        assert_eq!(response_hours(opened, opened - Duration::hours(1)), 0);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("em_analise".parse::<ManifestacaoStatus>().unwrap(), ManifestacaoStatus::EmAnalise);
        assert!("fechado".parse::<ManifestacaoStatus>().is_err());
        assert!(ManifestacaoStatus::Resolvido.is_answered());
        assert!(!ManifestacaoStatus::Arquivado.is_answered());
    }

    #[test]
    fn test_rating_rules() {
        let mut m = manifestacao("1", "Obras", "pendente");
        assert!(m.check_can_rate().is_err());
        m.status = "respondido".into();
        assert!(m.check_can_rate().is_ok());
        m.avaliacao = Some(4);
        assert!(m.check_can_rate().is_err());
    }

    #[test]
    fn test_status_change_stamps_response_once() {
        let m = manifestacao("1", "Obras", "em_analise");
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 8, 30, 0).unwrap();
        let change = StatusChange::plan(&m, ManifestacaoStatus::Respondido, "Reparado", at);
        assert_eq!(change.data_resposta, Some(at));
        assert_eq!(change.tempo_resposta, Some(24));
        assert_eq!(change.resposta.as_deref(), Some("Reparado"));

        let mut answered = m.clone();
        answered.data_resposta = Some(at);
        answered.resposta = Some("Reparado".into());
        let later = at + Duration::days(3);
        let change = StatusChange::plan(&answered, ManifestacaoStatus::Resolvido, "", later);
        assert_eq!(change.data_resposta, Some(at));
        assert_eq!(change.resposta.as_deref(), Some("Reparado"));
    }

    #[test]
    fn test_status_change_unanswered() {
        let m = manifestacao("1", "Obras", "pendente");
        let change = StatusChange::plan(&m, ManifestacaoStatus::EmAnalise, "", Utc::now());
        assert_eq!(change.data_resposta, None);
        assert_eq!(change.tempo_resposta, None);
    }

    #[test]
    fn test_check_rating() {
        assert!(check_rating(1).is_ok());
        assert!(check_rating(5).is_ok());
        assert!(check_rating(0).is_err());
        assert!(check_rating(6).is_err());
    }

    #[test]
    fn test_submission_input() {
        assert!(SubmissionInput::new("Ana", "ana@x.ao", "", "Obras", "Buraco", "Buraco grande na estrada").is_ok());
        assert!(SubmissionInput::new("Ana", "ana", "", "Obras", "Buraco", "Buraco grande na estrada").is_err());
        assert!(SubmissionInput::new("Ana", "ana@x.ao", "", "Obras", "Buraco", "curto").is_err());
        assert!(SubmissionInput::new("", "ana@x.ao", "", "Obras", "Buraco", "Buraco grande na estrada").is_err());
    }

    #[test]
    fn test_compute_stats() {
        let mut a = manifestacao("1", "Obras", "respondido");
        a.tempo_resposta = Some(10);
        a.avaliacao = Some(5);
        let mut b = manifestacao("2", "Saúde", "resolvido");
        b.tempo_resposta = Some(20);
        b.avaliacao = Some(3);
        let c = manifestacao("3", "Obras", "pendente");
        let d = manifestacao("4", "Água", "pendente");

        let stats = compute_stats(&[a, b, c, d], 2);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.count(ManifestacaoStatus::Pendente), 2);
        assert_eq!(stats.count(ManifestacaoStatus::EmAnalise), 0);
        assert_eq!(stats.average_response_hours, 15.0);
        assert_eq!(stats.satisfaction, 4.0);
        assert_eq!(stats.top_categories, vec!["Obras", "Saúde"]);
    }

    #[test]
    fn test_compute_stats_empty() {
        let stats = compute_stats(&[], 5);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.average_response_hours, 0.0);
        assert!(stats.top_categories.is_empty());
    }
}
