//! Conversions shared by every manager service.

use chrono::{DateTime, SecondsFormat, Utc};
use tonic::{Request, Status};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::export::{self, ExportArtifact, ExportColumn, ExportFormat, ExportOptions};
use crate::listing::{
    self, BatchOutcome, DateRange, ListFilter, ListQuery, ListRecord, ListSpec, Page,
    SelectionSet, SortDirection, SortSpec, TextMatch,
};
use crate::middleware::AuthenticatedUser;
use crate::proto::common as pb;

/// Per-deployment knobs every service needs.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub text_match: TextMatch,
    pub export_author: String,
    pub export_company: String,
    pub max_upload_bytes: usize,
}

impl ServiceSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            text_match: config.text_match(),
            export_author: config.export_author.clone(),
            export_company: config.export_company.clone(),
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    /// Labels for a report generated now by `user`.
    pub fn export_options(&self, user: Option<&AuthenticatedUser>) -> ExportOptions {
        let author = match user {
            Some(u) if !u.email.is_empty() => format!("{} ({})", self.export_author, u.email),
            _ => self.export_author.clone(),
        };
        ExportOptions {
            author,
            company: self.export_company.clone(),
            generated_at: Utc::now(),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            text_match: TextMatch::default(),
            export_author: "Portal de Chipindo".to_string(),
            export_company: "Município de Chipindo".to_string(),
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

pub fn get_authenticated_user<T>(request: &Request<T>) -> Result<AuthenticatedUser, Status> {
    request
        .extensions()
        .get::<AuthenticatedUser>()
        .cloned()
        .ok_or_else(|| Status::unauthenticated("Authentication required"))
}

/// Authenticated user allowed to open `item`.
pub fn require_item<T>(request: &Request<T>, item: &str) -> Result<AuthenticatedUser, Status> {
    let user = get_authenticated_user(request)?;
    user.capabilities.require_item(item).map_err(to_status)?;
    Ok(user)
}

/// Logs the error once and converts it.
pub fn to_status(err: AppError) -> Status {
    match err.kind() {
        crate::error::ErrorKind::Internal | crate::error::ErrorKind::Network => {
            tracing::error!("{}", err)
        }
        _ => tracing::debug!("{}", err),
    }
    Status::from(err)
}

/// Converts the wire query into pipeline state, validated against `spec`.
pub fn list_query(query: pb::ListQuery, spec: &ListSpec) -> AppResult<ListQuery> {
    let direction = match pb::SortDirection::try_from(query.direction) {
        Ok(pb::SortDirection::Asc) => SortDirection::Asc,
        Ok(pb::SortDirection::Desc) => SortDirection::Desc,
        Err(_) => return Err(AppError::invalid("invalid sort direction")),
    };
    let sort = if query.sort_key.trim().is_empty() {
        let (key, direction) = spec.default_sort;
        SortSpec::new(key, direction)
    } else {
        SortSpec::new(query.sort_key.trim(), direction)
    };
    let filter = ListFilter {
        search: query.search,
        categorical: query.filters.into_iter().collect(),
        date_range: DateRange::parse(&query.date_from, &query.date_to)?,
        required: query.require_fields,
    };
    let list_query = ListQuery {
        filter,
        sort,
        page: query.page.max(1) as usize,
    };
    list_query.validate(spec)?;
    Ok(list_query)
}

pub fn page_info<T>(page: &Page<T>) -> pb::PageInfo {
    pb::PageInfo {
        page: page.page as u32,
        page_size: page.page_size as u32,
        total_pages: page.total_pages as u32,
        total_filtered: page.total_filtered as u32,
        has_next: page.has_next(),
        has_prev: page.has_prev(),
    }
}

/// Record id as the database sees it; malformed ids never reach SQL.
pub fn parse_id(id: &str) -> AppResult<Uuid> {
    let id = id.trim();
    if id.is_empty() {
        return Err(AppError::invalid("id is required"));
    }
    Uuid::parse_str(id).map_err(|_| AppError::invalid(format!("invalid id: {}", id)))
}

/// Batch selection of record ids, canonicalised so spellings of one uuid collapse.
pub fn selection(ids: Vec<String>) -> AppResult<SelectionSet> {
    let ids = ids
        .iter()
        .map(|id| parse_id(id).map(|uuid| uuid.to_string()))
        .collect::<AppResult<Vec<_>>>()?;
    SelectionSet::from_ids(ids)
}

pub fn batch_result(outcome: BatchOutcome) -> pb::BatchResult {
    pb::BatchResult {
        succeeded: outcome.succeeded,
        failed: outcome
            .failed
            .into_iter()
            .map(|(id, err)| pb::BatchFailure {
                id,
                message: Status::from(err).message().to_string(),
            })
            .collect(),
    }
}

pub fn export_format(value: i32) -> AppResult<ExportFormat> {
    match pb::ExportFormat::try_from(value) {
        Ok(pb::ExportFormat::Csv) => Ok(ExportFormat::Csv),
        Ok(pb::ExportFormat::Excel) => Ok(ExportFormat::Excel),
        Ok(pb::ExportFormat::Text) => Ok(ExportFormat::Text),
        Ok(pb::ExportFormat::Pdf) => Ok(ExportFormat::Pdf),
        Err(_) => Err(AppError::invalid("invalid export format")),
    }
}

pub fn export_file(artifact: ExportArtifact) -> pb::ExportFile {
    pb::ExportFile {
        filename: artifact.filename,
        content_type: artifact.content_type,
        data: artifact.bytes,
        record_count: artifact.record_count as u32,
    }
}

/// Everything an export needs besides the rows.
pub struct ExportJob<'a, R> {
    pub spec: &'a ListSpec,
    pub columns: Vec<ExportColumn<R>>,
    pub base_name: String,
    pub title: &'a str,
}

/// Filter, sort, field-select and render `records` as requested.
pub fn run_export<R: ListRecord>(
    records: &[R],
    request: pb::ExportRequest,
    job: ExportJob<'_, R>,
    settings: &ServiceSettings,
    user: Option<&AuthenticatedUser>,
) -> AppResult<pb::ExportFile> {
    let format = export_format(request.format)?;
    let query = list_query(request.query.unwrap_or_default(), job.spec)?;
    let rows = listing::filter_and_sort(records, &query, job.spec, settings.text_match);

    let mut table = export::build_table(&rows, &job.columns, &request.fields)?.with_title(job.title);
    table.metadata.push(("Total de registros".to_string(), rows.len().to_string()));
    if !query.filter.search.trim().is_empty() {
        table.metadata.push(("Pesquisa".to_string(), query.filter.search.trim().to_string()));
    }
    for (field, value) in query.filter.active_filters() {
        table.metadata.push((field.to_string(), value.to_string()));
    }

    let options = settings.export_options(user);
    let artifact = export::export(&table, format, &job.base_name, &options)?;
    tracing::info!(
        "Export {} ({} records) as {}",
        job.base_name,
        artifact.record_count,
        artifact.filename
    );
    Ok(export_file(artifact))
}

pub fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn opt_timestamp(at: &Option<DateTime<Utc>>) -> String {
    at.as_ref().map(timestamp).unwrap_or_default()
}

/// Rejects uploads that are empty or over the size limit.
pub fn check_upload(upload: &pb::Upload, max_bytes: usize) -> AppResult<()> {
    if upload.file_name.trim().is_empty() {
        return Err(AppError::invalid("file name is required"));
    }
    if upload.data.is_empty() {
        return Err(AppError::invalid(format!("file {} is empty", upload.file_name)));
    }
    if upload.data.len() > max_bytes {
        return Err(AppError::invalid(format!(
            "file {} exceeds the {} MB limit",
            upload.file_name,
            max_bytes / (1024 * 1024)
        )));
    }
    Ok(())
}

pub fn upload_content_type(upload: &pb::Upload) -> String {
    if upload.content_type.trim().is_empty() {
        crate::storage::path::guess_content_type(&upload.file_name).to_string()
    } else {
        upload.content_type.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::test_support::{doc, DOC_SPEC};

    #[test]
    fn test_list_query_defaults() {
        let q = list_query(pb::ListQuery::default(), &DOC_SPEC).unwrap();
        assert_eq!(q.page, 1);
        assert_eq!(q.sort, SortSpec::new("created_at", SortDirection::Desc));
        assert!(q.filter.is_passthrough());
    }

    #[test]
    fn test_list_query_conversion() {
        let mut filters = std::collections::HashMap::new();
        filters.insert("type".to_string(), "documento".to_string());
        let q = list_query(
            pb::ListQuery {
                search: "plano".into(),
                filters,
                sort_key: "title".into(),
                direction: pb::SortDirection::Asc as i32,
                page: 3,
                date_from: "2024-01-01".into(),
                date_to: "".into(),
                require_fields: vec![],
            },
            &DOC_SPEC,
        )
        .unwrap();
        assert_eq!(q.page, 3);
        assert_eq!(q.sort, SortSpec::new("title", SortDirection::Asc));
        assert_eq!(q.filter.categorical.get("type").map(String::as_str), Some("documento"));
        assert!(q.filter.date_range.is_some());
    }

    #[test]
    fn test_list_query_rejects_unknown_sort() {
        let query = pb::ListQuery {
            sort_key: "password".into(),
            ..Default::default()
        };
        assert!(list_query(query, &DOC_SPEC).is_err());
    }

    #[test]
    fn test_parse_id() {
        let id = "7f1c2a4e-0b1d-4c3e-9f00-123456789abc";
        assert_eq!(parse_id(id).unwrap(), parse_id(&id.to_uppercase()).unwrap());
        assert_eq!(parse_id(&id.replace('-', "")).unwrap().to_string(), id);
        assert!(matches!(parse_id("abc"), Err(AppError::InvalidInput(_))));
        assert!(matches!(parse_id("  "), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn test_selection_canonicalises_ids() {
        let id = "7f1c2a4e-0b1d-4c3e-9f00-123456789abc";
        let set = selection(vec![id.to_uppercase(), id.into()]).unwrap();
        assert_eq!(set.ids(), &[id.to_string()]);
        assert!(selection(vec![id.into(), "abc".into()]).is_err());
    }

    #[test]
    fn test_page_info_navigation() {
        let items: Vec<u32> = (0..25).collect();
        let info = page_info(&crate::listing::paginate(&items, 2, 10));
        assert_eq!(info.total_pages, 3);
        assert!(info.has_next);
        assert!(info.has_prev);
    }

    #[test]
    fn test_batch_result_messages() {
        let outcome = BatchOutcome {
            succeeded: vec!["1".into()],
            failed: vec![("2".into(), AppError::not_found("registo 2"))],
        };
        let result = batch_result(outcome);
        assert_eq!(result.succeeded, vec!["1"]);
        assert_eq!(result.failed[0].id, "2");
        assert_eq!(result.failed[0].message, "registo 2");
    }

    #[test]
    fn test_run_export_csv() {
        let docs = vec![
            doc("1", "Plano", "documento", 2, "2024-01-01"),
            doc("2", "Escola", "imagem", 1, "2024-01-02"),
        ];
        let columns = vec![
            ExportColumn { key: "title", header: "Título", value: |d: &crate::listing::test_support::Doc| d.title.clone() },
        ];
        let request = pb::ExportRequest {
            query: Some(pb::ListQuery {
                sort_key: "title".into(),
                direction: pb::SortDirection::Asc as i32,
                ..Default::default()
            }),
            format: pb::ExportFormat::Csv as i32,
            fields: vec![],
        };
        let job = ExportJob {
            spec: &DOC_SPEC,
            columns,
            base_name: "docs".into(),
            title: "Documentos",
        };
        let file = run_export(&docs, request, job, &ServiceSettings::default(), None).unwrap();
        assert!(file.filename.starts_with("docs-"));
        assert!(file.filename.ends_with(".csv"));
        assert_eq!(file.record_count, 2);
        assert_eq!(
            String::from_utf8(file.data).unwrap(),
            "\"Título\"\n\"Escola\"\n\"Plano\""
        );
    }

    #[test]
    fn test_run_export_empty_is_refused() {
        let docs = vec![doc("1", "Plano", "documento", 2, "2024-01-01")];
        let request = pb::ExportRequest {
            query: Some(pb::ListQuery {
                search: "inexistente".into(),
                ..Default::default()
            }),
            format: pb::ExportFormat::Pdf as i32,
            fields: vec![],
        };
        let job = ExportJob {
            spec: &DOC_SPEC,
            columns: vec![ExportColumn { key: "title", header: "Título", value: |d: &crate::listing::test_support::Doc| d.title.clone() }],
            base_name: "docs".into(),
            title: "Documentos",
        };
        let err = run_export(&docs, request, job, &ServiceSettings::default(), None).unwrap_err();
        assert!(matches!(err, AppError::EmptyExport));
    }

    #[test]
    fn test_check_upload() {
        let upload = pb::Upload {
            file_name: "a.pdf".into(),
            content_type: "".into(),
            data: vec![1, 2, 3],
        };
        assert!(check_upload(&upload, 10).is_ok());
        assert!(check_upload(&upload, 2).is_err());
        assert_eq!(upload_content_type(&upload), "application/pdf");
    }
}
