//! Export formatter: a header-labelled table in, a downloadable artifact out.

pub mod archive;
pub mod csv;
pub mod pdf;
pub mod text;

use chrono::{DateTime, Utc};

use crate::error::{AppError, AppResult};

pub use archive::ArchiveBuilder;

/// Rows already field-selected and header-labelled by the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub metadata: Vec<(String, String)>,
}

impl ExportTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    pub fn push_row(&mut self, row: Vec<String>) -> AppResult<()> {
        if row.len() != self.headers.len() {
            return Err(AppError::Export(format!(
                "row has {} cells, expected {}",
                row.len(),
                self.headers.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Labels stamped on generated reports.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub author: String,
    pub company: String,
    pub generated_at: DateTime<Utc>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            author: "Portal de Chipindo".to_string(),
            company: "Município de Chipindo".to_string(),
            generated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    /// Tab-separated text with an `.xls` extension.
    Excel,
    /// "Registro N:" blocks.
    Text,
    Pdf,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Excel => "xls",
            ExportFormat::Text => "txt",
            ExportFormat::Pdf => "pdf",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv;charset=utf-8",
            ExportFormat::Excel => "application/vnd.ms-excel",
            ExportFormat::Text => "text/plain;charset=utf-8",
            ExportFormat::Pdf => "application/pdf",
        }
    }
}

pub const GZIP_CONTENT_TYPE: &str = "application/gzip";

#[derive(Debug, Clone, PartialEq)]
pub struct ExportArtifact {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    pub record_count: usize,
}

/// `{base}-{YYYY-MM-DD}.{ext}`
pub fn filename(base: &str, date: DateTime<Utc>, ext: &str) -> String {
    format!("{}-{}.{}", base, date.format("%Y-%m-%d"), ext)
}

/// Lowercase ASCII slug used in file names.
pub fn slug(text: &str) -> String {
    let folded = crate::listing::TextMatch::FoldDiacritics.normalize(text);
    let mut out = String::with_capacity(folded.len());
    for c in folded.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

pub fn export(
    table: &ExportTable,
    format: ExportFormat,
    base_name: &str,
    options: &ExportOptions,
) -> AppResult<ExportArtifact> {
    if table.is_empty() {
        return Err(AppError::EmptyExport);
    }
    let bytes = match format {
        ExportFormat::Csv => csv::render(table).into_bytes(),
        ExportFormat::Excel => text::render_tsv(table).into_bytes(),
        ExportFormat::Text => text::render_records(table).into_bytes(),
        ExportFormat::Pdf => pdf::render(table, options)?,
    };
    tracing::debug!(
        "Exported {} rows as {:?} ({} bytes)",
        table.rows.len(),
        format,
        bytes.len()
    );
    Ok(ExportArtifact {
        filename: filename(base_name, options.generated_at, format.extension()),
        content_type: format.content_type().to_string(),
        bytes,
        record_count: table.rows.len(),
    })
}

/// One exportable field of a record type.
pub struct ExportColumn<T> {
    pub key: &'static str,
    pub header: &'static str,
    pub value: fn(&T) -> String,
}

/// Builds a table from the selected column keys, in catalog order.
/// An empty selection exports every column.
pub fn build_table<T>(
    records: &[&T],
    columns: &[ExportColumn<T>],
    selected: &[String],
) -> AppResult<ExportTable> {
    for key in selected {
        if !columns.iter().any(|c| c.key == key) {
            return Err(AppError::invalid(format!("unknown export field: {}", key)));
        }
    }
    let chosen: Vec<&ExportColumn<T>> = columns
        .iter()
        .filter(|c| selected.is_empty() || selected.iter().any(|k| k == c.key))
        .collect();

    let mut table = ExportTable::new(chosen.iter().map(|c| c.header.to_string()).collect());
    for record in records {
        table.push_row(chosen.iter().map(|c| (c.value)(record)).collect())?;
    }
    Ok(table)
}

pub fn date_cell(date: &DateTime<Utc>) -> String {
    date.format("%d/%m/%Y").to_string()
}

pub fn bool_cell(value: bool) -> String {
    if value { "Sim" } else { "Não" }.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct Person {
        name: &'static str,
        age: u32,
        active: bool,
    }

    fn columns() -> Vec<ExportColumn<Person>> {
        vec![
            ExportColumn { key: "name", header: "Nome", value: |p| p.name.to_string() },
            ExportColumn { key: "age", header: "Idade", value: |p| p.age.to_string() },
            ExportColumn { key: "active", header: "Activo", value: |p| bool_cell(p.active) },
        ]
    }

    fn options() -> ExportOptions {
        ExportOptions {
            generated_at: Utc.with_ymd_and_hms(2024, 3, 9, 10, 0, 0).unwrap(),
            ..Default::default()
        }
    }

    #[test]
    fn test_build_table_selection_keeps_catalog_order() {
        let ana = Person { name: "Ana", age: 30, active: true };
        let table = build_table(&[&ana], &columns(), &["active".into(), "name".into()]).unwrap();
        assert_eq!(table.headers, vec!["Nome", "Activo"]);
        assert_eq!(table.rows, vec![vec!["Ana".to_string(), "Sim".to_string()]]);
    }

    #[test]
    fn test_build_table_rejects_unknown_field() {
        let ana = Person { name: "Ana", age: 30, active: true };
        assert!(build_table(&[&ana], &columns(), &["password".into()]).is_err());
    }

    #[test]
    fn test_export_refuses_empty() {
        let table = ExportTable::new(vec!["Nome".into()]);
        let err = export(&table, ExportFormat::Csv, "contactos", &options()).unwrap_err();
        assert!(matches!(err, AppError::EmptyExport));
    }

    #[test]
    fn test_export_csv_artifact() {
        let ana = Person { name: "Ana", age: 30, active: false };
        let table = build_table(&[&ana], &columns(), &[]).unwrap();
        let artifact = export(&table, ExportFormat::Csv, "pessoas", &options()).unwrap();
        assert_eq!(artifact.filename, "pessoas-2024-03-09.csv");
        assert_eq!(artifact.content_type, "text/csv;charset=utf-8");
        assert_eq!(artifact.record_count, 1);
        assert_eq!(
            String::from_utf8(artifact.bytes).unwrap(),
            "\"Nome\",\"Idade\",\"Activo\"\n\"Ana\",\"30\",\"Não\""
        );
    }

    #[test]
    fn test_push_row_length_mismatch() {
        let mut table = ExportTable::new(vec!["Nome".into(), "Idade".into()]);
        assert!(table.push_row(vec!["Ana".into()]).is_err());
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("Educação e Saúde"), "educacao-e-saude");
        assert_eq!(slug("  Tecnologia / TI "), "tecnologia-ti");
    }
}
