//! Paginated A4 report: title block, metadata, tabulated rows and a
//! footer with the issuing body and page numbers.

use std::io::BufWriter;

use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};

use crate::error::{AppError, AppResult};

use super::{ExportOptions, ExportTable};

const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const MARGIN: f32 = 20.0;
const TOP: f32 = 277.0;
const BOTTOM: f32 = 25.0;
const ROW_H: f32 = 6.0;
const HEADER_ROW_H: f32 = 8.0;

fn pdf_err(e: impl std::fmt::Display) -> AppError {
    AppError::Export(format!("PDF error: {}", e))
}

/// Rough Helvetica capacity of a column at the given size.
fn max_chars(col_width_mm: f32, font_size: f32) -> usize {
    let char_mm = font_size * 0.19;
    ((col_width_mm - 2.0) / char_mm).floor().max(3.0) as usize
}

fn fit(text: &str, max: usize) -> String {
    let flat = text.replace(['\n', '\r', '\t'], " ");
    if flat.chars().count() <= max {
        flat
    } else {
        let cut: String = flat.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

/// Splits `rows` into per-page counts given the capacity of the first
/// page and of every following page.
pub(crate) fn plan_pages(rows: usize, first: usize, next: usize) -> Vec<usize> {
    let first = first.max(1);
    let next = next.max(1);
    let mut pages = vec![rows.min(first)];
    let mut left = rows.saturating_sub(first);
    while left > 0 {
        pages.push(left.min(next));
        left = left.saturating_sub(next);
    }
    pages
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

fn draw_header_row(layer: &PdfLayerReference, fonts: &Fonts, headers: &[String], col_w: f32, y: f32) {
    let max = max_chars(col_w, 9.0);
    for (i, header) in headers.iter().enumerate() {
        let x = MARGIN + col_w * i as f32;
        layer.use_text(fit(header, max), 9.0, Mm(x), Mm(y), &fonts.bold);
    }
}

pub fn render(table: &ExportTable, options: &ExportOptions) -> AppResult<Vec<u8>> {
    let title = table.title.clone().unwrap_or_else(|| "Relatório".to_string());
    let (doc, page1, layer1) = PdfDocument::new(&title, Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
    let fonts = Fonts {
        regular: doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_err)?,
        bold: doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(pdf_err)?,
    };

    let mut layers = vec![doc.get_page(page1).get_layer(layer1)];
    let mut y = TOP;
    let first = layers[0].clone();

    // Title block
    first.use_text(&title, 16.0, Mm(MARGIN), Mm(y), &fonts.bold);
    y -= 9.0;
    if let Some(subtitle) = &table.subtitle {
        first.use_text(subtitle, 12.0, Mm(MARGIN), Mm(y), &fonts.regular);
        y -= 7.0;
    }
    for (key, value) in &table.metadata {
        first.use_text(format!("{}: {}", key, value), 9.0, Mm(MARGIN), Mm(y), &fonts.regular);
        y -= 5.0;
    }
    first.use_text(
        format!("Gerado em: {}", options.generated_at.format("%d/%m/%Y %H:%M")),
        9.0,
        Mm(MARGIN),
        Mm(y),
        &fonts.regular,
    );
    y -= 5.0;
    first.use_text(format!("Por: {}", options.author), 9.0, Mm(MARGIN), Mm(y), &fonts.regular);
    y -= 10.0;

    let columns = table.headers.len().max(1);
    let col_w = (PAGE_W - 2.0 * MARGIN) / columns as f32;
    let cell_max = max_chars(col_w, 8.0);

    let first_capacity = ((y - HEADER_ROW_H - BOTTOM) / ROW_H).floor().max(1.0) as usize;
    let next_capacity = ((TOP - HEADER_ROW_H - BOTTOM) / ROW_H).floor().max(1.0) as usize;
    let plan = plan_pages(table.rows.len(), first_capacity, next_capacity);

    let mut rows = table.rows.iter();
    for (page_no, count) in plan.iter().enumerate() {
        let layer = if page_no == 0 {
            first.clone()
        } else {
            let (page, layer) = doc.add_page(Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
            let layer = doc.get_page(page).get_layer(layer);
            layers.push(layer.clone());
            y = TOP;
            layer
        };

        draw_header_row(&layer, &fonts, &table.headers, col_w, y);
        y -= HEADER_ROW_H;

        for row in rows.by_ref().take(*count) {
            for (i, cell) in row.iter().enumerate() {
                let x = MARGIN + col_w * i as f32;
                layer.use_text(fit(cell, cell_max), 8.0, Mm(x), Mm(y), &fonts.regular);
            }
            y -= ROW_H;
        }
    }

    let total = layers.len();
    for (i, layer) in layers.iter().enumerate() {
        layer.use_text(&options.company, 8.0, Mm(MARGIN), Mm(10.0), &fonts.regular);
        layer.use_text(
            format!("Página {} de {}", i + 1, total),
            8.0,
            Mm(PAGE_W - 40.0),
            Mm(10.0),
            &fonts.regular,
        );
    }

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf).map_err(pdf_err)?;
    buf.into_inner().map_err(pdf_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_pages() {
        assert_eq!(plan_pages(0, 30, 40), vec![0]);
        assert_eq!(plan_pages(30, 30, 40), vec![30]);
        assert_eq!(plan_pages(31, 30, 40), vec![30, 1]);
        assert_eq!(plan_pages(115, 30, 40), vec![30, 40, 40, 5]);
    }

    #[test]
    fn test_fit() {
        assert_eq!(fit("curto", 10), "curto");
        assert_eq!(fit("um texto bem comprido", 10), "um text...");
        assert_eq!(fit("a\nb", 10), "a b");
    }

    #[test]
    fn test_render_produces_pdf() {
        let mut table = ExportTable::new(vec!["Nome".into(), "Telefone".into()])
            .with_title("Contactos de Emergência");
        table.metadata.push(("Total".into(), "60".into()));
        for i in 0..60 {
            table
                .push_row(vec![format!("Contacto {}", i), "923 000 000".into()])
                .unwrap();
        }
        let bytes = render(&table, &ExportOptions::default()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }
}
