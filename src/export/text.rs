use super::ExportTable;

/// Tab-separated table saved with an `.xls` extension. Tabs and line
/// breaks inside cells are flattened to spaces so columns stay aligned.
pub fn render_tsv(table: &ExportTable) -> String {
    let clean = |cell: &String| cell.replace(['\t', '\n', '\r'], " ");
    let mut lines = Vec::with_capacity(table.rows.len() + 1);
    lines.push(table.headers.iter().map(clean).collect::<Vec<_>>().join("\t"));
    for row in &table.rows {
        lines.push(row.iter().map(clean).collect::<Vec<_>>().join("\t"));
    }
    lines.join("\n")
}

/// Plain-text "Registro N:" blocks, one `header: value` line per column.
pub fn render_records(table: &ExportTable) -> String {
    let mut out = String::new();
    if let Some(title) = &table.title {
        out.push_str(title);
        out.push_str("\n\n");
    }
    for (i, row) in table.rows.iter().enumerate() {
        out.push_str(&format!("Registro {}:\n", i + 1));
        for (header, value) in table.headers.iter().zip(row) {
            out.push_str(&format!("{}: {}\n", header, value));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ExportTable {
        let mut table = ExportTable::new(vec!["Nome".into(), "Email".into()])
            .with_title("Registros de Interesse");
        table.push_row(vec!["Ana".into(), "ana@example.ao".into()]).unwrap();
        table.push_row(vec!["Rui\tSilva".into(), "".into()]).unwrap();
        table
    }

    #[test]
    fn test_tsv() {
        assert_eq!(
            render_tsv(&table()),
            "Nome\tEmail\nAna\tana@example.ao\nRui Silva\t"
        );
    }

    #[test]
    fn test_record_blocks() {
        let out = render_records(&table());
        assert!(out.starts_with("Registros de Interesse\n\nRegistro 1:\nNome: Ana\nEmail: ana@example.ao\n\n"));
        assert!(out.contains("Registro 2:\nNome: Rui\tSilva\nEmail: \n"));
    }
}
