use super::ExportTable;

fn quote(cell: &str) -> String {
    format!("\"{}\"", cell.replace('"', "\"\""))
}

/// Every cell double-quoted, embedded quotes doubled, lines joined by `\n`.
pub fn render(table: &ExportTable) -> String {
    let mut lines = Vec::with_capacity(table.rows.len() + 1);
    lines.push(table.headers.iter().map(|h| quote(h)).collect::<Vec<_>>().join(","));
    for row in &table.rows {
        lines.push(row.iter().map(|c| quote(c)).collect::<Vec<_>>().join(","));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> ExportTable {
        let mut table = ExportTable::new(vec!["Nome".into(), "Idade".into()]);
        table.push_row(vec!["Ana".into(), "30".into()]).unwrap();
        table.push_row(vec!["Zé".into(), "5".into()]).unwrap();
        table
    }

    #[test]
    fn test_lines() {
        let out = render(&people());
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines, vec![r#""Nome","Idade""#, r#""Ana","30""#, r#""Zé","5""#]);
    }

    #[test]
    fn test_resplit_reconstructs_values() {
        let table = people();
        let out = render(&table);
        for (line, expected) in out.lines().skip(1).zip(&table.rows) {
            let inner = &line[1..line.len() - 1];
            let cells: Vec<&str> = inner.split("\",\"").collect();
            assert_eq!(&cells, expected);
        }
    }

    #[test]
    fn test_embedded_quotes_and_commas() {
        let mut table = ExportTable::new(vec!["Assunto".into()]);
        table.push_row(vec![r#"Rua "A", bairro 2"#.into()]).unwrap();
        assert_eq!(render(&table).lines().nth(1), Some(r#""Rua ""A"", bairro 2""#));
    }
}
