//! Stage 3: the RESUMO and RESUMO TOTAL sheets.
//!
//! Both sheets reference the mirror sheets through cross-sheet formulas, so
//! a discount typed into a mirror sheet flows into the rollup. A mirror
//! sheet with a missing anchor contributes zero or a blank cell and is
//! listed in the report; it never aborts the rollup.

use serde::Serialize;

use espelhos_engine::address::{col_to_letter, quote_sheet_name};
use espelhos_engine::cell::CellValue;
use espelhos_engine::sheet::Sheet;
use espelhos_engine::table::{Datum, RowTable};
use espelhos_engine::workbook::{normalize_sheet_name, Workbook};

use crate::fields::{AliasSet, Field};
use crate::layout::{EntityLayout, VALUE_COL};
use crate::mirror::{parse_amount, MirrorBook};
use crate::styles::{Font, Style};

pub const SUMMARY_SHEET: &str = "RESUMO";
pub const SUMMARY_TOTAL_SHEET: &str = "RESUMO TOTAL";

const TITLE: &str = "Relação dos Parceiros para Pagamento";
const COST_CENTER: &str = "Centro de Custo:";
const PERIOD: &str = "Período:";
const DUE: &str = "Vencimento:";
const GRAND_TOTAL: &str = "CUSTO TOTAL";

/// 0-based header row of both summary sheets (row 5).
const HEADER_ROW: usize = 4;
const FIRST_ROW: usize = HEADER_ROW + 1;

pub fn is_summary_sheet(name: &str) -> bool {
    let key = normalize_sheet_name(name);
    key == normalize_sheet_name(SUMMARY_SHEET) || key == normalize_sheet_name(SUMMARY_TOTAL_SHEET)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnchorMiss {
    pub sheet: String,
    pub anchor: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryEntity {
    pub driver: String,
    pub sheet_name: String,
    pub gross: f64,
    pub discount: f64,
    pub net: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SummaryReport {
    pub entities: Vec<SummaryEntity>,
    pub clients: Vec<String>,
    pub anchor_misses: Vec<AnchorMiss>,
    /// Evaluated grand total of the RESUMO net column.
    pub net_total: f64,
}

/// Distinct non-blank clients of the consolidated table, first-seen order.
/// A table without a client column yields no clients.
pub fn distinct_clients(table: &RowTable, aliases: &AliasSet) -> Vec<String> {
    let Some(col) = aliases.resolve(Field::Client, table) else {
        log::warn!("consolidated table has no client column; RESUMO TOTAL gets no client columns");
        return Vec::new();
    };
    let mut clients: Vec<String> = Vec::new();
    for row in table.rows() {
        let client = row[col].display();
        if !client.is_empty() && !clients.contains(&client) {
            clients.push(client);
        }
    }
    clients
}

fn cross_ref(sheet: &str, row: usize) -> String {
    format!("{}!F{}", quote_sheet_name(sheet), row + 1)
}

/// Widen every used column to its longest rendered value plus 3.
fn autofit(sheet: &mut Sheet) {
    let Some(last) = sheet.max_col() else { return };
    let mut widths = vec![0usize; last + 1];
    for (&(_, col), cell) in sheet.cells_iter() {
        let len = cell.value.raw_display().chars().count();
        widths[col] = widths[col].max(len);
    }
    for (col, width) in widths.into_iter().enumerate() {
        sheet.set_col_width(col, width as f64 + 3.0);
    }
}

fn title_block(sheet: &mut Sheet) {
    sheet.set_value(0, 0, CellValue::text(TITLE));
    Style::new().bold().apply(sheet, 0, 0);
    sheet.set_value(1, 0, CellValue::text(COST_CENTER));
    sheet.set_value(2, 0, CellValue::text(PERIOD));
}

/// Literal gross value of a mirror sheet, for the RESUMO gross column.
fn gross_value(workbook: &Workbook, layout: &EntityLayout, row: usize) -> f64 {
    let Some(sheet) = workbook.sheet_by_name(&layout.sheet_name) else { return 0.0 };
    match sheet.value(row, VALUE_COL) {
        CellValue::Number(n) => *n,
        CellValue::Formula { .. } => workbook
            .evaluate(&layout.sheet_name, row, VALUE_COL)
            .as_number()
            .unwrap_or(0.0),
        CellValue::Text(s) => parse_amount(&Datum::text(s.as_str())).unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Add both summary sheets to the mirror workbook. Summary sheets from an
/// earlier run are replaced, and grid lines are hidden on every sheet.
pub fn build_summaries(book: MirrorBook, clients: &[String]) -> (Workbook, SummaryReport) {
    let MirrorBook { workbook, layouts } = book;

    let active = workbook.active_sheet_index();
    let sheets: Vec<Sheet> = workbook
        .into_sheets()
        .into_iter()
        .filter(|s| {
            let summary = is_summary_sheet(&s.name);
            if summary {
                log::debug!("replacing existing sheet '{}'", s.name);
            }
            !summary
        })
        .collect();
    let mut workbook = Workbook::from_sheets(sheets, active);
    for sheet in workbook.sheets_mut() {
        sheet.show_grid_lines = false;
    }

    let layouts: Vec<EntityLayout> = layouts
        .into_iter()
        .filter(|l| !l.driver.is_empty() && workbook.sheet_index(&l.sheet_name).is_some())
        .collect();

    let mut report = SummaryReport { clients: clients.to_vec(), ..Default::default() };
    for layout in &layouts {
        let mut miss = |anchor: &str| {
            log::warn!("sheet '{}': anchor '{}' not found", layout.sheet_name, anchor);
            report.anchor_misses.push(AnchorMiss {
                sheet: layout.sheet_name.clone(),
                anchor: anchor.to_string(),
            });
        };
        if layout.gross_row.is_none() {
            miss(crate::layout::GROSS_ANCHOR);
        }
        if layout.discount_row.is_none() {
            miss(crate::layout::DISCOUNT_LABEL);
        }
        if layout.city_header_row.is_none() && !clients.is_empty() {
            miss(crate::layout::CITY_HEADER);
        }
    }

    let resumo = summary_sheet(&workbook, &layouts);
    let total = summary_total_sheet(&layouts, clients);
    let resumo_total_row = FIRST_ROW + layouts.len();
    workbook.add_sheet(resumo);
    workbook.add_sheet(total);

    for (i, layout) in layouts.iter().enumerate() {
        let r = FIRST_ROW + i;
        let number = |col: usize| workbook.evaluate(SUMMARY_SHEET, r, col).as_number().unwrap_or(0.0);
        report.entities.push(SummaryEntity {
            driver: layout.driver.clone(),
            sheet_name: layout.sheet_name.clone(),
            gross: number(1),
            discount: number(2),
            net: number(3),
        });
    }
    report.net_total = workbook
        .evaluate(SUMMARY_SHEET, resumo_total_row, 3)
        .as_number()
        .unwrap_or(0.0);

    log::info!(
        "summarized {} mirror sheets over {} clients ({} anchor misses)",
        report.entities.len(),
        clients.len(),
        report.anchor_misses.len()
    );
    (workbook, report)
}

fn summary_sheet(workbook: &Workbook, layouts: &[EntityLayout]) -> Sheet {
    let mut sheet = Sheet::new(SUMMARY_SHEET);
    sheet.show_grid_lines = false;
    title_block(&mut sheet);
    sheet.set_value(2, 4, CellValue::text(DUE));
    Style::new().boxed().apply(&mut sheet, 2, 4);

    let headers = ["Nome do motorista", "Valor Bruto", "Desconto", "Valor Líquido", "Status NF"];
    for (col, header) in headers.iter().enumerate() {
        sheet.set_value(HEADER_ROW, col, CellValue::text(*header));
        let font = if col == 2 { Font::BoldRed } else { Font::Bold };
        Style::new().font(font).center().boxed().apply(&mut sheet, HEADER_ROW, col);
    }

    let money = Style::new().money().center();
    let mut r = FIRST_ROW;
    for layout in layouts {
        sheet.set_value(r, 0, CellValue::text(layout.driver.as_str()));
        Style::new().center().apply(&mut sheet, r, 0);

        let gross = layout.gross_row.map(|g| gross_value(workbook, layout, g)).unwrap_or(0.0);
        sheet.set_value(r, 1, CellValue::Number(gross));
        money.apply(&mut sheet, r, 1);

        let discount = match layout.discount_row {
            Some(d) => CellValue::formula(format!("={}", cross_ref(&layout.sheet_name, d))),
            None => CellValue::Number(0.0),
        };
        sheet.set_value(r, 2, discount);
        money.font(Font::Red).apply(&mut sheet, r, 2);

        sheet.set_value(r, 3, CellValue::formula(format!("=B{0}-C{0}", r + 1)));
        money.apply(&mut sheet, r, 3);

        sheet.set_value(r, 4, CellValue::Empty);
        Style::new().center().apply(&mut sheet, r, 4);

        Style::new().boxed().apply_row(&mut sheet, r, 0..=4);
        r += 1;
    }

    // Grand total
    sheet.set_value(r, 0, CellValue::text(GRAND_TOTAL));
    for col in 1..=3 {
        let letter = col_to_letter(col);
        sheet.set_value(
            r,
            col,
            CellValue::formula(format!("=SUM({letter}{}:{letter}{})", FIRST_ROW + 1, r)),
        );
        let font = if col == 2 { Font::BoldRed } else { Font::Bold };
        Style::new().font(font).money().center().apply(&mut sheet, r, col);
    }
    Style::new().bold().center().apply(&mut sheet, r, 0);
    Style::new().bold().center().apply(&mut sheet, r, 4);
    Style::new().boxed().apply_row(&mut sheet, r, 0..=4);

    autofit(&mut sheet);
    sheet
}

fn summary_total_sheet(layouts: &[EntityLayout], clients: &[String]) -> Sheet {
    let mut sheet = Sheet::new(SUMMARY_TOTAL_SHEET);
    sheet.show_grid_lines = false;
    title_block(&mut sheet);

    let header = Style::new().bold().center().boxed();
    let cell = Style::new().center().boxed();

    let first_client = 1;
    let gross_col = first_client + clients.len();
    let discount_col = gross_col + 1;
    let net_col = discount_col + 1;
    let status_col = net_col + 1;

    sheet.set_value(HEADER_ROW, 0, CellValue::text("Nome do Motorista"));
    header.apply(&mut sheet, HEADER_ROW, 0);
    for (i, client) in clients.iter().enumerate() {
        sheet.set_value(HEADER_ROW, first_client + i, CellValue::text(client.as_str()));
        header.apply(&mut sheet, HEADER_ROW, first_client + i);
    }
    sheet.set_value(HEADER_ROW, gross_col, CellValue::text("Valor Bruto"));
    header.apply(&mut sheet, HEADER_ROW, gross_col);
    sheet.set_value(HEADER_ROW, discount_col, CellValue::text("Desconto"));
    header.font(Font::BoldRed).apply(&mut sheet, HEADER_ROW, discount_col);
    sheet.set_value(HEADER_ROW, net_col, CellValue::text("Valor Líquido"));
    header.apply(&mut sheet, HEADER_ROW, net_col);
    sheet.set_value(HEADER_ROW, status_col, CellValue::text("Status NF"));
    header.apply(&mut sheet, HEADER_ROW, status_col);

    sheet.set_value(2, status_col, CellValue::text(DUE));
    header.apply(&mut sheet, 2, status_col);

    let gross_letter = col_to_letter(gross_col);
    let discount_letter = col_to_letter(discount_col);

    let mut r = FIRST_ROW;
    for layout in layouts {
        sheet.set_value(r, 0, CellValue::text(layout.driver.as_str()));
        cell.apply(&mut sheet, r, 0);

        for (i, client) in clients.iter().enumerate() {
            let col = first_client + i;
            match layout.range_for(client) {
                Some((start, end)) => {
                    sheet.set_value(
                        r,
                        col,
                        CellValue::formula(format!(
                            "=SUM({}!F{}:F{})",
                            quote_sheet_name(&layout.sheet_name),
                            start + 1,
                            end + 1
                        )),
                    );
                    cell.money().apply(&mut sheet, r, col);
                }
                None => cell.apply(&mut sheet, r, col),
            }
        }

        match layout.gross_row {
            Some(g) => {
                sheet.set_value(r, gross_col, CellValue::formula(format!("={}", cross_ref(&layout.sheet_name, g))));
                cell.money().apply(&mut sheet, r, gross_col);
            }
            None => cell.apply(&mut sheet, r, gross_col),
        }

        let discount_style = cell.font(Font::Red);
        match layout.discount_row {
            Some(d) => {
                sheet.set_value(r, discount_col, CellValue::formula(format!("={}", cross_ref(&layout.sheet_name, d))));
                discount_style.money().apply(&mut sheet, r, discount_col);
            }
            None => discount_style.apply(&mut sheet, r, discount_col),
        }

        sheet.set_value(
            r,
            net_col,
            CellValue::formula(format!("={gross_letter}{0}-N({discount_letter}{0})", r + 1)),
        );
        cell.money().apply(&mut sheet, r, net_col);

        cell.apply(&mut sheet, r, status_col);
        r += 1;
    }

    // Grand total
    sheet.set_value(r, 0, CellValue::text(GRAND_TOTAL));
    header.apply(&mut sheet, r, 0);
    for col in first_client..=net_col {
        let letter = col_to_letter(col);
        sheet.set_value(
            r,
            col,
            CellValue::formula(format!("=SUM({letter}{}:{letter}{})", FIRST_ROW + 1, r)),
        );
        let font = if col == discount_col { Font::BoldRed } else { Font::Bold };
        header.font(font).money().apply(&mut sheet, r, col);
    }
    header.apply(&mut sheet, r, status_col);

    autofit(&mut sheet);
    sheet
}

#[cfg(test)]
mod tests {
    use super::*;
    use espelhos_engine::formula::eval::Value;

    use crate::layout::ClientRange;
    use crate::styles::RED;

    /// A mirror-like sheet: city rows for X at F15:F16, gross at F20,
    /// discount at F22 summing F23:F27.
    fn mirror_sheet(name: &str) -> Sheet {
        let mut s = Sheet::new(name);
        s.set_value(14, 5, CellValue::Number(120.0));
        s.set_value(15, 5, CellValue::Number(80.0));
        s.set_value(19, 5, CellValue::Number(200.0));
        s.set_value(21, 5, CellValue::formula("=SUM(F23:F27)"));
        s
    }

    fn layout(name: &str, driver: &str) -> EntityLayout {
        EntityLayout {
            sheet_name: name.to_string(),
            driver: driver.to_string(),
            gross_row: Some(19),
            discount_row: Some(21),
            net_row: Some(27),
            city_header_row: Some(12),
            client_ranges: vec![
                ClientRange { client: "X".into(), rows: Some((14, 15)) },
                ClientRange { client: "Y".into(), rows: None },
            ],
        }
    }

    fn book(names: &[(&str, &str)]) -> MirrorBook {
        let sheets = names.iter().map(|(n, _)| mirror_sheet(n)).collect();
        MirrorBook {
            workbook: Workbook::from_sheets(sheets, 0),
            layouts: names.iter().map(|(n, d)| layout(n, d)).collect(),
        }
    }

    fn clients() -> Vec<String> {
        vec!["X".into(), "Y".into()]
    }

    #[test]
    fn resumo_rows_reference_mirror_sheets() {
        let (wb, report) = build_summaries(book(&[("Ana Silva", "Ana Silva")]), &clients());
        let resumo = wb.sheet_by_name(SUMMARY_SHEET).unwrap();
        assert_eq!(resumo.text(0, 0), TITLE);
        assert_eq!(resumo.text(2, 4), DUE);
        assert_eq!(resumo.text(4, 2), "Desconto");
        assert_eq!(resumo.format(4, 2).unwrap().font_color, Some(RED));
        assert_eq!(resumo.text(5, 0), "Ana Silva");
        assert_eq!(resumo.value(5, 1), &CellValue::Number(200.0));
        assert_eq!(resumo.value(5, 2), &CellValue::formula("='Ana Silva'!F22"));
        assert_eq!(resumo.value(5, 3), &CellValue::formula("=B6-C6"));
        assert_eq!(resumo.text(6, 0), GRAND_TOTAL);
        assert_eq!(resumo.value(6, 1), &CellValue::formula("=SUM(B6:B6)"));

        assert_eq!(report.entities[0].gross, 200.0);
        assert_eq!(report.entities[0].net, 200.0);
        assert_eq!(report.net_total, 200.0);
        assert!(report.anchor_misses.is_empty());
    }

    #[test]
    fn resumo_total_columns() {
        let (wb, _) = build_summaries(book(&[("Ana Silva", "Ana Silva")]), &clients());
        let total = wb.sheet_by_name(SUMMARY_TOTAL_SHEET).unwrap();
        assert_eq!(total.text(4, 0), "Nome do Motorista");
        assert_eq!(total.text(4, 1), "X");
        assert_eq!(total.text(4, 2), "Y");
        assert_eq!(total.text(4, 3), "Valor Bruto");
        assert_eq!(total.text(4, 4), "Desconto");
        assert_eq!(total.text(4, 5), "Valor Líquido");
        assert_eq!(total.text(4, 6), "Status NF");
        assert_eq!(total.text(2, 6), DUE);

        assert_eq!(total.value(5, 1), &CellValue::formula("=SUM('Ana Silva'!F15:F16)"));
        assert!(total.value(5, 2).is_empty());
        assert_eq!(total.value(5, 3), &CellValue::formula("='Ana Silva'!F20"));
        assert_eq!(total.value(5, 5), &CellValue::formula("=D6-N(E6)"));
        assert_eq!(total.text(6, 0), GRAND_TOTAL);

        assert_eq!(wb.evaluate(SUMMARY_TOTAL_SHEET, 5, 1), Value::Number(200.0));
        assert_eq!(wb.evaluate(SUMMARY_TOTAL_SHEET, 6, 5), Value::Number(200.0));
    }

    #[test]
    fn discount_flows_into_net() {
        let (mut wb, _) = build_summaries(book(&[("Ana Silva", "Ana Silva")]), &clients());
        wb.sheet_by_name_mut("Ana Silva").unwrap().set_value(22, 5, CellValue::Number(35.0));
        assert_eq!(wb.evaluate(SUMMARY_SHEET, 5, 3), Value::Number(165.0));
        assert_eq!(wb.evaluate(SUMMARY_TOTAL_SHEET, 5, 5), Value::Number(165.0));
    }

    #[test]
    fn quotes_in_sheet_names_are_doubled() {
        let (wb, _) = build_summaries(book(&[("D'Avila Jr", "D'Avila Jr")]), &clients());
        let resumo = wb.sheet_by_name(SUMMARY_SHEET).unwrap();
        assert_eq!(resumo.value(5, 2), &CellValue::formula("='D''Avila Jr'!F22"));
        assert_eq!(wb.evaluate(SUMMARY_SHEET, 5, 3), Value::Number(200.0));
    }

    #[test]
    fn missing_anchors_degrade() {
        let mut b = book(&[("Ana", "Ana")]);
        b.layouts[0].gross_row = None;
        b.layouts[0].discount_row = None;
        let (wb, report) = build_summaries(b, &clients());
        let resumo = wb.sheet_by_name(SUMMARY_SHEET).unwrap();
        assert_eq!(resumo.value(5, 1), &CellValue::Number(0.0));
        assert_eq!(resumo.value(5, 2), &CellValue::Number(0.0));
        let total = wb.sheet_by_name(SUMMARY_TOTAL_SHEET).unwrap();
        assert!(total.value(5, 3).is_empty());
        assert!(total.value(5, 4).is_empty());
        assert_eq!(report.anchor_misses.len(), 2);
        assert_eq!(report.anchor_misses[0].sheet, "Ana");
    }

    #[test]
    fn rerun_replaces_summary_sheets() {
        let (wb, _) = build_summaries(book(&[("Ana", "Ana")]), &clients());
        let again = MirrorBook { workbook: wb, layouts: vec![layout("Ana", "Ana")] };
        let (wb, report) = build_summaries(again, &clients());
        assert_eq!(wb.sheet_names(), vec!["Ana", SUMMARY_SHEET, SUMMARY_TOTAL_SHEET]);
        assert_eq!(report.entities.len(), 1);
    }

    #[test]
    fn grid_lines_hidden_everywhere() {
        let (wb, _) = build_summaries(book(&[("Ana", "Ana"), ("Bia", "Bia")]), &clients());
        assert!(wb.sheets().iter().all(|s| !s.show_grid_lines));
    }

    #[test]
    fn columns_are_autofit() {
        let (wb, _) = build_summaries(book(&[("Ana", "Ana")]), &clients());
        let resumo = wb.sheet_by_name(SUMMARY_SHEET).unwrap();
        let title_len = TITLE.chars().count() as f64;
        assert_eq!(resumo.col_width(0), Some(title_len + 3.0));
    }

    #[test]
    fn clients_in_first_seen_order() {
        let table = RowTable::new(
            &["Cliente", "x"],
            vec![
                vec![Datum::text("B"), Datum::Empty],
                vec![Datum::text(" A "), Datum::Empty],
                vec![Datum::Empty, Datum::Empty],
                vec![Datum::text("B"), Datum::Empty],
            ],
        );
        assert_eq!(distinct_clients(&table, &AliasSet::default()), vec!["B".to_string(), "A".to_string()]);
        let none = RowTable::new(&["x"], vec![]);
        assert!(distinct_clients(&none, &AliasSet::default()).is_empty());
    }
}
