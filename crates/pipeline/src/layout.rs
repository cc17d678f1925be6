//! Where things are on a mirror sheet.
//!
//! The mirror builder records an `EntityLayout` for every sheet it writes.
//! A mirror workbook read back from disk has no such record, so the same
//! index is rebuilt by scanning for the anchor labels the builder writes.

use serde::Serialize;

use espelhos_engine::sheet::Sheet;
use espelhos_engine::workbook::Workbook;

use crate::config::IdentityCells;
use crate::mirror::MirrorBook;
use crate::summary::is_summary_sheet;

/// Substring that marks the gross-value row.
pub const GROSS_ANCHOR: &str = "VALOR TOTAL DOS SERVIÇOS PRESTADOS";
pub const GROSS_LABEL: &str = "VALOR TOTAL DOS SERVIÇOS PRESTADOS NO PERÍODO (valor da nota fiscal)";
pub const DISCOUNT_LABEL: &str = "(-) DESCONTOS";
pub const NET_LABEL: &str = "VALOR LÍQUIDO A PAGAR AO PRESTADOR DE SERVIÇO";
pub const DRIVER_PREFIX: &str = "MOTORISTA:";
pub const CITY_HEADER: &str = "CIDADE";
pub const CITY_VALUE_HEADER: &str = "VALOR TOTAL";
pub const TOTAL_LABEL: &str = "TOTAL";

/// Column holding every money value on a mirror sheet (F).
pub const VALUE_COL: usize = 5;
/// Column holding client and city labels in the city table (B).
pub const LABEL_COL: usize = 1;
/// City count column (D). Empty on client header rows.
pub const COUNT_COL: usize = 3;
/// Unit value column (E). Holds "-" on the TOTAL row.
pub const UNIT_COL: usize = 4;

/// City rows of one client, 0-based and inclusive. `rows` is None when the
/// client has a header but no city rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientRange {
    pub client: String,
    pub rows: Option<(usize, usize)>,
}

/// Anchor rows of one mirror sheet, 0-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityLayout {
    pub sheet_name: String,
    pub driver: String,
    pub gross_row: Option<usize>,
    pub discount_row: Option<usize>,
    pub net_row: Option<usize>,
    pub city_header_row: Option<usize>,
    pub client_ranges: Vec<ClientRange>,
}

impl EntityLayout {
    pub fn range_for(&self, client: &str) -> Option<(usize, usize)> {
        self.client_ranges.iter().find(|r| r.client == client).and_then(|r| r.rows)
    }

    /// Rebuild the layout of `sheet` from its anchor labels. Returns None
    /// when no driver name can be derived from the identity block.
    pub fn scan(sheet: &Sheet, clients: &[String], cells: &IdentityCells) -> Option<EntityLayout> {
        let driver = driver_display_name(sheet, cells);
        if driver.is_empty() {
            return None;
        }
        let city_header_row = find_city_header_row(sheet);
        Some(EntityLayout {
            sheet_name: sheet.name.clone(),
            driver,
            gross_row: find_gross_row(sheet),
            discount_row: find_row_with_text(sheet, DISCOUNT_LABEL),
            net_row: find_row_with_text(sheet, NET_LABEL),
            city_header_row,
            client_ranges: city_header_row
                .map(|header| scan_client_ranges(sheet, header, clients))
                .unwrap_or_default(),
        })
    }
}

/// The driver's own name as shown on the identity block: the secondary
/// `MOTORISTA:` line when a provider is the payee, else the payee line
/// without its trailing document.
pub fn driver_display_name(sheet: &Sheet, cells: &IdentityCells) -> String {
    let (r, c) = cells.driver;
    let secondary = sheet.text(r, c);
    if secondary.to_uppercase().starts_with(DRIVER_PREFIX) {
        if let Some((_, name)) = secondary.split_once(':') {
            return name.trim().to_string();
        }
    }
    let (r, c) = cells.payee;
    strip_document(&sheet.text(r, c))
}

/// "Ana Silva - 123" -> "Ana Silva"; an empty document leaves "Ana Silva -".
fn strip_document(payee_line: &str) -> String {
    if let Some((name, _)) = payee_line.rsplit_once(" - ") {
        return name.trim().to_string();
    }
    payee_line.strip_suffix(" -").unwrap_or(payee_line).trim().to_string()
}

/// First row (row-major) with a cell containing the gross anchor.
pub fn find_gross_row(sheet: &Sheet) -> Option<usize> {
    sheet
        .cells_iter()
        .find(|(_, cell)| cell.value.raw_display().contains(GROSS_ANCHOR))
        .map(|(&(row, _), _)| row)
}

/// First row (row-major) with a cell whose trimmed text equals `label`.
pub fn find_row_with_text(sheet: &Sheet, label: &str) -> Option<usize> {
    sheet
        .cells_iter()
        .find(|(_, cell)| cell.value.raw_display().trim() == label)
        .map(|(&(row, _), _)| row)
}

pub fn find_city_header_row(sheet: &Sheet) -> Option<usize> {
    let last = sheet.max_row()?;
    (0..=last).find(|&r| {
        sheet.text(r, LABEL_COL).to_uppercase() == CITY_HEADER
            && sheet.text(r, VALUE_COL).to_uppercase() == CITY_VALUE_HEADER
    })
}

/// Walk column B below the city header. A known client name on a row with
/// no count opens a range on the next row; the range closes before the next
/// client header or the `TOTAL` row. City rows always carry a count and a
/// numeric unit value, so a city spelled like a client (or like `TOTAL`)
/// stays inside the current range.
pub fn scan_client_ranges(sheet: &Sheet, header_row: usize, clients: &[String]) -> Vec<ClientRange> {
    let mut ranges: Vec<ClientRange> = Vec::new();
    let Some(last) = sheet.max_row() else { return ranges };

    let mut current: Option<(String, usize)> = None;
    let mut r = header_row + 1;
    while r <= last {
        let label = sheet.text(r, LABEL_COL);
        if !label.is_empty() {
            let is_city_row = sheet.value(r, UNIT_COL).as_number().is_some();
            if !is_city_row && label.to_uppercase() == TOTAL_LABEL {
                break;
            }
            let is_client_header = sheet.text(r, COUNT_COL).is_empty();
            if is_client_header && clients.iter().any(|c| *c == label) {
                if let Some((client, start)) = current.take() {
                    close_range(&mut ranges, client, start, r);
                }
                current = Some((label, r + 1));
            }
        }
        r += 1;
    }
    if let Some((client, start)) = current {
        close_range(&mut ranges, client, start, r);
    }
    ranges
}

/// Record `client` as spanning `start..end` (end exclusive). A client seen
/// twice keeps its last span.
fn close_range(ranges: &mut Vec<ClientRange>, client: String, start: usize, end: usize) {
    let rows = (end > start).then(|| (start, end - 1));
    match ranges.iter_mut().find(|r| r.client == client) {
        Some(existing) => existing.rows = rows,
        None => ranges.push(ClientRange { client, rows }),
    }
}

impl MirrorBook {
    /// Index a mirror workbook loaded from disk. Summary sheets and sheets
    /// with no derivable driver name are left out of the index but stay in
    /// the workbook.
    pub fn from_workbook(workbook: Workbook, clients: &[String], cells: &IdentityCells) -> MirrorBook {
        let layouts = workbook
            .sheets()
            .iter()
            .filter(|s| !is_summary_sheet(&s.name))
            .filter_map(|s| {
                let layout = EntityLayout::scan(s, clients, cells);
                if layout.is_none() {
                    log::debug!("sheet '{}': no driver name, not indexed", s.name);
                }
                layout
            })
            .collect();
        MirrorBook { workbook, layouts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use espelhos_engine::cell::CellValue;

    use crate::config::LayoutConfig;

    fn cells() -> IdentityCells {
        LayoutConfig::default().identity().unwrap()
    }

    fn city_row(s: &mut Sheet, row: usize, city: &str) {
        s.set_value(row, 1, CellValue::text(city));
        s.set_value(row, 3, CellValue::Number(1.0));
        s.set_value(row, 4, CellValue::Number(10.0));
        s.set_value(row, 5, CellValue::Number(10.0));
    }

    fn mirror_like() -> Sheet {
        let mut s = Sheet::new("Ana Silva");
        s.set_value(3, 2, CellValue::text("Ana Silva - 123.456.789-00"));
        s.set_value(12, 1, CellValue::text("CIDADE"));
        s.set_value(12, 5, CellValue::text("VALOR TOTAL"));
        s.set_value(13, 1, CellValue::text("X"));
        city_row(&mut s, 14, "SP");
        city_row(&mut s, 15, "RJ");
        s.set_value(16, 1, CellValue::text("Y"));
        s.set_value(17, 1, CellValue::text("TOTAL"));
        s.set_value(17, 3, CellValue::Number(2.0));
        s.set_value(17, 4, CellValue::text("-"));
        s.set_value(19, 0, CellValue::text(GROSS_LABEL));
        s.set_value(21, 0, CellValue::text(" (-) DESCONTOS "));
        s.set_value(27, 0, CellValue::text(NET_LABEL));
        s
    }

    #[test]
    fn driver_from_payee_line() {
        assert_eq!(driver_display_name(&mirror_like(), &cells()), "Ana Silva");
    }

    #[test]
    fn driver_from_secondary_line() {
        let mut s = mirror_like();
        s.set_value(3, 2, CellValue::text("Transportes ABC - 12.345/0001-99"));
        s.set_value(4, 2, CellValue::text("motorista: Ana Silva "));
        assert_eq!(driver_display_name(&s, &cells()), "Ana Silva");
    }

    #[test]
    fn payee_without_document() {
        assert_eq!(strip_document("Ana -"), "Ana");
        assert_eq!(strip_document("Ana - Jr - 123"), "Ana - Jr");
        assert_eq!(strip_document("Ana"), "Ana");
    }

    #[test]
    fn anchors_are_found() {
        let layout = EntityLayout::scan(&mirror_like(), &["X".into(), "Y".into()], &cells()).unwrap();
        assert_eq!(layout.gross_row, Some(19));
        assert_eq!(layout.discount_row, Some(21));
        assert_eq!(layout.net_row, Some(27));
        assert_eq!(layout.city_header_row, Some(12));
        assert_eq!(layout.range_for("X"), Some((14, 15)));
        // Y has a header but no cities
        assert_eq!(layout.range_for("Y"), None);
        assert_eq!(layout.client_ranges.len(), 2);
    }

    #[test]
    fn unknown_labels_do_not_open_ranges() {
        let layout = EntityLayout::scan(&mirror_like(), &["Y".into()], &cells()).unwrap();
        assert_eq!(layout.client_ranges, vec![ClientRange { client: "Y".into(), rows: None }]);
    }

    #[test]
    fn city_spelled_like_a_client_stays_in_range() {
        let mut s = mirror_like();
        city_row(&mut s, 15, "Y");
        let layout = EntityLayout::scan(&s, &["X".into(), "Y".into()], &cells()).unwrap();
        assert_eq!(layout.range_for("X"), Some((14, 15)));
        assert_eq!(layout.range_for("Y"), None);
    }

    #[test]
    fn city_named_total_does_not_end_the_table() {
        let mut s = mirror_like();
        city_row(&mut s, 15, "Total");
        let layout = EntityLayout::scan(&s, &["X".into(), "Y".into()], &cells()).unwrap();
        assert_eq!(layout.range_for("X"), Some((14, 15)));
        assert_eq!(layout.client_ranges.len(), 2);
    }

    #[test]
    fn blank_identity_is_not_indexed() {
        let s = Sheet::new("Vazio");
        assert!(EntityLayout::scan(&s, &[], &cells()).is_none());
    }

    #[test]
    fn missing_anchors_scan_as_none() {
        let mut s = Sheet::new("Ana");
        s.set_value(3, 2, CellValue::text("Ana - 1"));
        let layout = EntityLayout::scan(&s, &[], &cells()).unwrap();
        assert_eq!(layout.gross_row, None);
        assert_eq!(layout.discount_row, None);
        assert!(layout.client_ranges.is_empty());
    }
}
