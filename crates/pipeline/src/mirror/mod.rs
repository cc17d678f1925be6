//! Stage 2: one mirror sheet per driver, built from the template sheet.
//!
//! Each sheet carries the identity/banking block, the client item table,
//! the city table with its totals, the discount block and the net-payable
//! formula. The builder records every anchor row it writes in an
//! `EntityLayout`, so stage 3 does not need to search for them.

pub mod naming;

use std::collections::HashMap;

use serde::Serialize;

use espelhos_engine::cell::CellValue;
use espelhos_engine::sheet::{MergedRegion, Sheet};
use espelhos_engine::table::{Datum, RowTable};
use espelhos_engine::workbook::Workbook;

use crate::config::{IdentityCells, PipelineConfig};
use crate::error::PipelineError;
use crate::fields::{Field, FieldMap};
use crate::layout::{
    ClientRange, EntityLayout, CITY_HEADER, CITY_VALUE_HEADER, DISCOUNT_LABEL, GROSS_LABEL, NET_LABEL,
    TOTAL_LABEL,
};
use crate::styles::{Edges, Font, Style};
use crate::summary::{SUMMARY_SHEET, SUMMARY_TOTAL_SHEET};

use naming::SheetNamer;

const MISSING: &str = "INEXISTENTE";
/// Editable discount lines under the discount row.
pub const DISCOUNT_LINES: usize = 5;

// Columns A..F
const COL_A: usize = 0;
const COL_B: usize = 1;
const COL_C: usize = 2;
const COL_D: usize = 3;
const COL_E: usize = 4;
const COL_F: usize = 5;

/// The mirror workbook together with the layout of every entity sheet.
#[derive(Debug, Clone)]
pub struct MirrorBook {
    pub workbook: Workbook,
    pub layouts: Vec<EntityLayout>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MirrorEntity {
    pub driver: String,
    pub sheet_name: String,
    pub gross: f64,
    pub clients: usize,
    pub orders: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MirrorReport {
    pub entities: Vec<MirrorEntity>,
    /// Consolidated rows skipped for having no driver name.
    pub blank_driver_rows: usize,
    /// Cost cells that were not a number and counted as zero.
    pub unparsed_costs: usize,
}

/// Columns every mirror sheet reads, resolved once.
struct Columns {
    driver: usize,
    provider: Option<usize>,
    contract: Option<usize>,
    cnpj: Option<usize>,
    cpf: Option<usize>,
    bank: usize,
    branch: usize,
    account: usize,
    pix: usize,
    client: usize,
    order: usize,
    date: usize,
    city: usize,
    status: usize,
    cost: usize,
}

impl Columns {
    /// Check the mandatory fields, document first.
    fn resolve(fields: &FieldMap) -> Result<Self, PipelineError> {
        fields.require_document()?;
        let bank = fields.require(Field::Bank)?;
        let branch = fields.require(Field::Branch)?;
        let client = fields.require(Field::Client)?;
        let order = fields.require(Field::Order)?;
        let driver = fields.require(Field::Driver)?;
        let account = fields.require(Field::Account)?;
        let pix = fields.require(Field::Pix)?;
        let date = fields.require(Field::Date)?;
        let city = fields.require(Field::City)?;
        let status = fields.require(Field::Status)?;
        let cost = fields.require(Field::Cost)?;
        Ok(Self {
            driver,
            provider: fields.get(Field::Provider),
            contract: fields.get(Field::Contract),
            cnpj: fields.get(Field::Cnpj),
            cpf: fields.get(Field::Cpf),
            bank,
            branch,
            account,
            pix,
            client,
            order,
            date,
            city,
            status,
            cost,
        })
    }
}

/// Rows of one driver, in table order.
struct Entity<'a> {
    driver: String,
    rows: Vec<&'a [Datum]>,
}

/// Group rows by trimmed driver name in first-seen order. Returns the
/// groups and the number of rows without a driver name.
fn group_entities<'a>(table: &'a RowTable, driver_col: usize) -> (Vec<Entity<'a>>, usize) {
    let mut entities: Vec<Entity<'a>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut blank = 0;
    for row in table.rows() {
        let name = row[driver_col].display();
        if name.is_empty() {
            blank += 1;
            continue;
        }
        match index.get(&name) {
            Some(&i) => entities[i].rows.push(row.as_slice()),
            None => {
                index.insert(name.clone(), entities.len());
                entities.push(Entity { driver: name, rows: vec![row.as_slice()] });
            }
        }
    }
    (entities, blank)
}

/// Distinct non-blank values of `col` in first-seen order, each with the
/// rows carrying it.
fn distinct_by<'a>(rows: &[&'a [Datum]], col: usize) -> Vec<(String, Vec<&'a [Datum]>)> {
    let mut groups: Vec<(String, Vec<&'a [Datum]>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for &row in rows {
        let key = row[col].display();
        if key.is_empty() {
            continue;
        }
        match index.get(&key) {
            Some(&i) => groups[i].1.push(row),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![row]));
            }
        }
    }
    groups
}

/// Read a money value: numbers as-is, text in Brazilian or plain notation
/// (`R$ 1.234,56`, `1234.56`).
pub fn parse_amount(value: &Datum) -> Option<f64> {
    match value {
        Datum::Number(n) => Some(*n),
        Datum::Text(s) => {
            let cleaned: String = s
                .trim()
                .trim_start_matches("R$")
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();
            if cleaned.is_empty() {
                return None;
            }
            let normalized = if cleaned.contains(',') {
                cleaned.replace('.', "").replace(',', ".")
            } else {
                cleaned
            };
            normalized.parse().ok()
        }
        _ => None,
    }
}

/// Cell value for a table datum. Dates are written as their display text.
fn datum_value(value: &Datum) -> CellValue {
    match value {
        Datum::Empty => CellValue::Empty,
        Datum::Text(s) => CellValue::Text(s.clone()),
        Datum::Number(n) => CellValue::Number(*n),
        Datum::Bool(b) => CellValue::Bool(*b),
        Datum::DateTime(_) => CellValue::Text(value.display()),
    }
}

/// Merge a row span, replacing template merges it would overlap.
fn merge_span(sheet: &mut Sheet, row: usize, first_col: usize, last_col: usize) {
    let region = MergedRegion::new(row, first_col, row, last_col);
    sheet.unmerge_overlapping(&region);
    sheet.merge(region);
}

fn optional_text(row: &[Datum], col: Option<usize>) -> String {
    col.map(|c| row[c].display()).unwrap_or_default()
}

/// Build every mirror sheet from `template`.
pub fn build_mirrors(
    table: &RowTable,
    template: &Sheet,
    config: &PipelineConfig,
) -> Result<(MirrorBook, MirrorReport), PipelineError> {
    let fields = FieldMap::resolve("consolidated", table, &config.alias_set());
    let columns = Columns::resolve(&fields)?;
    let cells = config.layout.identity()?;

    let (entities, blank_driver_rows) = group_entities(table, columns.driver);
    if blank_driver_rows > 0 {
        log::warn!("skipped {} rows without a driver name", blank_driver_rows);
    }
    if entities.is_empty() {
        return Err(PipelineError::NoEntities);
    }

    let mut namer = SheetNamer::with_reserved([SUMMARY_SHEET, SUMMARY_TOTAL_SHEET]);
    let mut workbook = Workbook::new();
    let mut layouts = Vec::with_capacity(entities.len());
    let mut report = MirrorReport { blank_driver_rows, ..Default::default() };

    for entity in &entities {
        let sheet_name = namer.next_name(&entity.driver);
        let mut sheet = template.duplicate(&sheet_name);
        let built = write_entity(&mut sheet, entity, &columns, &cells);
        report.unparsed_costs += built.unparsed_costs;

        log::debug!(
            "sheet '{}': {} clients, {} orders, gross {:.2}",
            sheet_name,
            built.layout.client_ranges.len(),
            built.orders,
            built.gross
        );
        report.entities.push(MirrorEntity {
            driver: entity.driver.clone(),
            sheet_name: sheet_name.clone(),
            gross: built.gross,
            clients: built.layout.client_ranges.len(),
            orders: built.orders,
        });
        layouts.push(built.layout);

        if workbook.add_sheet(sheet).is_none() {
            return Err(PipelineError::MalformedInput(format!(
                "cannot create sheet '{}' for driver '{}'",
                sheet_name, entity.driver
            )));
        }
    }

    log::info!("generated {} mirror sheets", report.entities.len());
    Ok((MirrorBook { workbook, layouts }, report))
}

struct BuiltEntity {
    layout: EntityLayout,
    gross: f64,
    orders: usize,
    unparsed_costs: usize,
}

fn write_entity(sheet: &mut Sheet, entity: &Entity<'_>, cols: &Columns, cells: &IdentityCells) -> BuiltEntity {
    let first = entity.rows[0];
    write_identity(sheet, &entity.driver, first, cols, cells);

    let clients = distinct_by(&entity.rows, cols.client);

    // Item table: one header per client, one row per order id
    let bold = Style::new().bold();
    let mut r = cells.first_item_row;
    let mut orders = 0;
    for (client, rows) in &clients {
        merge_span(sheet, r, COL_A, COL_F);
        sheet.set_value(r, COL_A, CellValue::text(client.as_str()));
        Style::new().bold().center().grey().apply(sheet, r, COL_A);
        Style::new().boxed().apply_row(sheet, r, COL_A..=COL_F);
        r += 1;

        for (_, order_rows) in distinct_by(rows, cols.order) {
            let head = order_rows[0];
            sheet.set_value(r, COL_A, datum_value(&head[cols.order]));
            sheet.set_value(r, COL_B, CellValue::Number(order_rows.len() as f64));
            sheet.set_value(r, COL_D, datum_value(&head[cols.city]));
            sheet.set_value(r, COL_E, datum_value(&head[cols.date]));
            sheet.set_value(r, COL_F, datum_value(&head[cols.status]));
            for col in [COL_A, COL_B, COL_D, COL_E, COL_F] {
                bold.apply(sheet, r, col);
            }
            Style::new().center().boxed().apply_row(sheet, r, COL_A..=COL_F);
            orders += 1;
            r += 1;
        }
    }

    // City table
    r += 1;
    let city_header_row = r;
    merge_span(sheet, r, COL_B, COL_C);
    sheet.set_value(r, COL_B, CellValue::text(CITY_HEADER));
    sheet.set_value(r, COL_D, CellValue::text("QUANTIDADE"));
    sheet.set_value(r, COL_E, CellValue::text("VALOR UNITÁRIO"));
    sheet.set_value(r, COL_F, CellValue::text(CITY_VALUE_HEADER));
    Style::new().bold().center().boxed().apply_row(sheet, r, COL_B..=COL_F);
    r += 1;

    let mut total_count = 0usize;
    let mut total_value = 0.0;
    let mut unparsed_costs = 0;
    let mut client_ranges = Vec::with_capacity(clients.len());
    for (client, rows) in &clients {
        merge_span(sheet, r, COL_B, COL_F);
        sheet.set_value(r, COL_B, CellValue::text(client.as_str()));
        Style::new().bold().center().grey().apply(sheet, r, COL_B);
        Style::new().boxed().apply_row(sheet, r, COL_B..=COL_F);
        r += 1;

        let start = r;
        for (city, city_rows) in distinct_by(rows, cols.city) {
            let count = city_rows.len();
            let cost = &city_rows[0][cols.cost];
            let unit = match parse_amount(cost) {
                Some(v) => v,
                None => {
                    if !cost.is_blank() {
                        log::warn!(
                            "driver '{}', city '{}': cost '{}' is not a number, using 0",
                            entity.driver,
                            city,
                            cost.display()
                        );
                        unparsed_costs += 1;
                    }
                    0.0
                }
            };
            let value = count as f64 * unit;
            total_count += count;
            total_value += value;

            merge_span(sheet, r, COL_B, COL_C);
            sheet.set_value(r, COL_B, datum_value(&city_rows[0][cols.city]));
            sheet.set_value(r, COL_D, CellValue::Number(count as f64));
            sheet.set_value(r, COL_E, CellValue::Number(unit));
            sheet.set_value(r, COL_F, CellValue::Number(value));
            Style::new().money().apply(sheet, r, COL_E);
            Style::new().money().apply(sheet, r, COL_F);
            Style::new().center().boxed().apply_row(sheet, r, COL_B..=COL_F);
            r += 1;
        }
        client_ranges.push(ClientRange {
            client: client.clone(),
            rows: (r > start).then(|| (start, r - 1)),
        });
    }

    // TOTAL row
    merge_span(sheet, r, COL_B, COL_C);
    sheet.set_value(r, COL_B, CellValue::text(TOTAL_LABEL));
    sheet.set_value(r, COL_D, CellValue::Number(total_count as f64));
    sheet.set_value(r, COL_E, CellValue::text("-"));
    sheet.set_value(r, COL_F, CellValue::Number(total_value));
    Style::new().money().apply(sheet, r, COL_F);
    Style::new().bold().center().boxed().apply_row(sheet, r, COL_B..=COL_F);

    // Gross value
    r += 2;
    let gross_row = r;
    merge_span(sheet, r, COL_A, COL_E);
    sheet.set_value(r, COL_A, CellValue::text(GROSS_LABEL));
    Style::new().bold().grey().left_center().apply(sheet, r, COL_A);
    sheet.set_value(r, COL_F, CellValue::Number(total_value));
    Style::new().bold().grey().center().money().apply(sheet, r, COL_F);
    Style::new().boxed().apply_row(sheet, r, COL_A..=COL_F);

    // Discounts
    r += 2;
    let discount_row = r;
    merge_span(sheet, r, COL_A, COL_E);
    sheet.set_value(r, COL_A, CellValue::text(DISCOUNT_LABEL));
    Style::new().bold().left_center().apply(sheet, r, COL_A);
    sheet.set_value(
        r,
        COL_F,
        CellValue::formula(format!("=SUM(F{}:F{})", r + 2, r + 1 + DISCOUNT_LINES)),
    );
    Style::new().font(Font::BoldRed).center().money().apply(sheet, r, COL_F);
    Style::new().boxed().apply_row(sheet, r, COL_A..=COL_F);

    for _ in 0..DISCOUNT_LINES {
        r += 1;
        Style::new().edges(Edges::LeftRight).apply(sheet, r, COL_A);
        Style::new()
            .edges(Edges::LeftRight)
            .center()
            .font(Font::Red)
            .money()
            .apply(sheet, r, COL_F);
    }

    // Net payable
    r += 1;
    let net_row = r;
    merge_span(sheet, r, COL_A, COL_E);
    sheet.set_value(r, COL_A, CellValue::text(NET_LABEL));
    Style::new().left_center().apply(sheet, r, COL_A);
    sheet.set_value(
        r,
        COL_F,
        CellValue::formula(format!("=F{}-F{}", gross_row + 1, discount_row + 1)),
    );
    Style::new().center().money().apply(sheet, r, COL_F);
    Style::new().bold().grey().boxed().apply_row(sheet, r, COL_A..=COL_F);

    BuiltEntity {
        layout: EntityLayout {
            sheet_name: sheet.name.clone(),
            driver: entity.driver.clone(),
            gross_row: Some(gross_row),
            discount_row: Some(discount_row),
            net_row: Some(net_row),
            city_header_row: Some(city_header_row),
            client_ranges,
        },
        gross: total_value,
        orders,
        unparsed_costs,
    }
}

/// Identity and banking block. A provider, when present, is the payee and
/// the driver is shown on the secondary line.
fn write_identity(sheet: &mut Sheet, driver: &str, row: &[Datum], cols: &Columns, cells: &IdentityCells) {
    let provider = optional_text(row, cols.provider);
    let cnpj = optional_text(row, cols.cnpj);
    let document = if cnpj.is_empty() { optional_text(row, cols.cpf) } else { cnpj };
    let payee = if provider.is_empty() { driver.to_string() } else { provider.clone() };

    let (pr, pc) = cells.payee;
    sheet.set_value(pr, pc, CellValue::text(format!("{payee} - {document}").trim()));

    let (dr, dc) = cells.driver;
    if provider.is_empty() {
        sheet.set_value(dr, dc, CellValue::Empty);
    } else {
        sheet.set_value(dr, dc, CellValue::text(format!("MOTORISTA: {driver}")));
        let secondary = Style::new().center().edges(Edges::None);
        secondary.apply(sheet, dr, dc);
        secondary.apply(sheet, dr, dc + 1);
    }

    let contract = optional_text(row, cols.contract);
    let labeled = [
        (cells.contract, "Contrato", contract),
        (cells.bank, "Banco", row[cols.bank].display()),
        (cells.branch, "Agência", row[cols.branch].display()),
        (cells.account, "Conta", row[cols.account].display()),
        (cells.payee_name, "Favorecido", payee),
        (cells.document, "CPF/CNPJ do Favorecido", document),
        (cells.pix, "PIX", row[cols.pix].display()),
    ];
    for ((r, c), label, value) in labeled {
        if value.is_empty() {
            sheet.set_value(r, c, CellValue::text(format!("{label}: {MISSING}")));
            Style::new().font(Font::BoldRed).apply(sheet, r, c);
        } else {
            sheet.set_value(r, c, CellValue::text(format!("{label}: {value}")));
            Style::new().bold().apply(sheet, r, c);
        }
    }

    // Fit the banking column to its longest line
    let (_, value_col) = cells.contract;
    let longest = cells
        .labeled()
        .iter()
        .map(|&(r, c)| sheet.value(r, c).raw_display().chars().count())
        .max()
        .unwrap_or(0);
    sheet.set_col_width(value_col, longest as f64 + 2.0);
}
