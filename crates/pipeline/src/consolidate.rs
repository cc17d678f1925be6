//! Stage 1: left join of the settlement table against the driver roster.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use espelhos_engine::table::{from_excel_serial, Datum, RowTable};

use crate::error::PipelineError;
use crate::fields::{AliasSet, Field, FieldMap};

/// Header the roster's contract column is emitted under.
pub const CONTRACT_HEADER: &str = "contrato";

const DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%Y-%m-%d", "%d-%m-%Y", "%Y/%m/%d", "%d/%m/%y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d/%m/%Y %H:%M:%S"];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConsolidationReport {
    pub rows: usize,
    pub matched: usize,
    /// Distinct settlement driver names with no roster entry.
    pub unmatched_drivers: Vec<String>,
    /// Roster names that appear more than once; the first row was used.
    pub duplicate_roster_keys: Vec<String>,
    /// Header of the reformatted date column, if one was found.
    pub date_column: Option<String>,
    /// Date cells that could not be parsed and were left empty.
    pub unparsed_dates: usize,
}

/// Join key: trimmed, internal whitespace collapsed, case-folded.
pub fn join_key(value: &Datum) -> String {
    value.display().split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Left-join `settlement` against `roster` on the driver name.
///
/// Every settlement row is kept, in order. Roster columns follow the
/// settlement columns; the roster's key column is dropped and its contract
/// column is renamed to `contrato`. A roster column whose name the
/// settlement already uses fills that column's blank cells instead of
/// being added twice.
pub fn consolidate(
    roster: &RowTable,
    settlement: &RowTable,
    aliases: &AliasSet,
) -> Result<(RowTable, ConsolidationReport), PipelineError> {
    let roster_fields = FieldMap::resolve("roster", roster, aliases);
    let settlement_fields = FieldMap::resolve("settlement", settlement, aliases);

    let roster_key = roster_fields.require(Field::Driver)?;
    let settlement_key = settlement_fields.require(Field::Driver)?;
    let roster_contract = roster_fields.require(Field::Contract)?;

    // Index the roster by key; the first row for a name wins
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut duplicates: Vec<String> = Vec::new();
    for (i, row) in roster.rows().iter().enumerate() {
        let key = join_key(&row[roster_key]);
        if key.is_empty() {
            continue;
        }
        if index.contains_key(&key) {
            let name = row[roster_key].display();
            if !duplicates.contains(&name) {
                log::warn!("roster lists driver '{}' more than once; using the first row", name);
                duplicates.push(name);
            }
        } else {
            index.insert(key, i);
        }
    }

    // Output columns: settlement columns, then roster columns not already present
    let mut headers: Vec<String> = settlement.headers().to_vec();
    // For each roster column (except the key): the output column it lands in
    // and whether it fills blanks of an existing settlement column.
    let mut placement: Vec<(usize, usize, bool)> = Vec::new();
    for (col, header) in roster.headers().iter().enumerate() {
        if col == roster_key {
            continue;
        }
        let name = if col == roster_contract { CONTRACT_HEADER.to_string() } else { header.clone() };
        match headers.iter().position(|h| *h == name) {
            Some(existing) => placement.push((col, existing, true)),
            None => {
                headers.push(name);
                placement.push((col, headers.len() - 1, false));
            }
        }
    }

    let width = headers.len();
    let mut matched = 0;
    let mut unmatched: Vec<String> = Vec::new();
    let mut rows: Vec<Vec<Datum>> = Vec::with_capacity(settlement.len());

    for row in settlement.rows() {
        let mut out = row.clone();
        out.resize(width, Datum::Empty);

        match index.get(&join_key(&row[settlement_key])) {
            Some(&roster_row) => {
                matched += 1;
                let source = &roster.rows()[roster_row];
                for &(from, to, fill_only) in &placement {
                    if !fill_only || out[to].is_blank() {
                        out[to] = source[from].clone();
                    }
                }
            }
            None => {
                let name = row[settlement_key].display();
                if !name.is_empty() && !unmatched.contains(&name) {
                    unmatched.push(name);
                }
            }
        }
        rows.push(out);
    }

    let mut table = RowTable::new(&headers, rows);

    let mut report = ConsolidationReport {
        rows: table.len(),
        matched,
        unmatched_drivers: unmatched,
        duplicate_roster_keys: duplicates,
        date_column: None,
        unparsed_dates: 0,
    };

    match aliases.resolve(Field::Date, &table) {
        Some(date_col) => {
            report.date_column = Some(table.headers()[date_col].clone());
            report.unparsed_dates = reformat_dates(&mut table, date_col);
        }
        None => log::warn!("no date column found; dates left as they are"),
    }

    log::info!(
        "consolidated {} settlement rows ({} matched the roster, {} unmatched drivers)",
        report.rows,
        report.matched,
        report.unmatched_drivers.len()
    );
    Ok((table, report))
}

/// Rewrite a date column as `DD/MM/YYYY` text. Returns the number of
/// non-blank cells that could not be parsed (they become empty).
fn reformat_dates(table: &mut RowTable, col: usize) -> usize {
    let mut failed = 0;
    for row in 0..table.len() {
        let value = table.get(row, col);
        if value.is_blank() {
            table.set(row, col, Datum::Empty);
            continue;
        }
        match parse_date(value) {
            Some(date) => table.set(row, col, Datum::Text(date.format("%d/%m/%Y").to_string())),
            None => {
                log::debug!("row {}: unparseable date '{}'", row + 1, value.display());
                failed += 1;
                table.set(row, col, Datum::Empty);
            }
        }
    }
    failed
}

/// Interpret a cell as a calendar date. Text is read day-first.
pub fn parse_date(value: &Datum) -> Option<NaiveDate> {
    match value {
        Datum::DateTime(dt) => Some(dt.date()),
        Datum::Number(n) if *n >= 1.0 => from_excel_serial(*n).map(|dt| dt.date()),
        Datum::Text(s) => parse_date_text(s.trim()),
        _ => None,
    }
}

fn parse_date_text(s: &str) -> Option<NaiveDate> {
    // %Y happily reads "24" as year 24, so two-digit years fall through to %y
    let plausible = |d: &NaiveDate| chrono::Datelike::year(d) >= 1000;
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok().map(|dt| dt.date()))
        .filter(plausible)
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(s, f).ok().filter(plausible))
        })
        .or_else(|| s.parse::<f64>().ok().filter(|n| *n >= 1.0).and_then(from_excel_serial).map(|dt| dt.date()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> Datum {
        Datum::text(s)
    }

    fn roster() -> RowTable {
        RowTable::new(
            &["Nome do Motorista", "Contrato", "Banco"],
            vec![
                vec![t("Ana Silva"), t("C1"), t("Itaú")],
                vec![t("Bruno"), t("C2"), t("Caixa")],
                vec![t("ana  silva"), t("C9"), t("Outro")],
            ],
        )
    }

    fn settlement() -> RowTable {
        RowTable::new(
            &["Motorista", "Cliente", "Data", "Banco"],
            vec![
                vec![t(" ANA SILVA "), t("X"), t("2024-01-05"), Datum::Empty],
                vec![t("Carla"), t("Y"), t("05/01/2024"), t("BB")],
                vec![t("Bruno"), t("X"), t("ontem"), t("Nubank")],
            ],
        )
    }

    #[test]
    fn left_join_keeps_every_settlement_row() {
        let (table, report) = consolidate(&roster(), &settlement(), &AliasSet::default()).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(report.rows, 3);
        assert_eq!(report.matched, 2);
        assert_eq!(report.unmatched_drivers, vec!["Carla".to_string()]);
        assert_eq!(table.headers(), &["motorista", "cliente", "data", "banco", "contrato"]);

        let contract = table.column_index("contrato").unwrap();
        assert_eq!(table.get(0, contract), &t("C1"));
        assert_eq!(table.get(1, contract), &Datum::Empty);
        assert_eq!(table.get(2, contract), &t("C2"));
    }

    #[test]
    fn overlapping_columns_fill_only_blanks() {
        let (table, _) = consolidate(&roster(), &settlement(), &AliasSet::default()).unwrap();
        let bank = table.column_index("banco").unwrap();
        assert_eq!(table.get(0, bank), &t("Itaú"));
        assert_eq!(table.get(1, bank), &t("BB"));
        assert_eq!(table.get(2, bank), &t("Nubank"));
    }

    #[test]
    fn duplicate_roster_keys_use_first_row() {
        let (table, report) = consolidate(&roster(), &settlement(), &AliasSet::default()).unwrap();
        assert_eq!(report.duplicate_roster_keys, vec!["ana  silva".to_string()]);
        assert_eq!(table.get(0, table.column_index("contrato").unwrap()), &t("C1"));
    }

    #[test]
    fn dates_are_reformatted_or_emptied() {
        let (table, report) = consolidate(&roster(), &settlement(), &AliasSet::default()).unwrap();
        let date = table.column_index("data").unwrap();
        assert_eq!(table.get(0, date), &t("05/01/2024"));
        assert_eq!(table.get(1, date), &t("05/01/2024"));
        assert_eq!(table.get(2, date), &Datum::Empty);
        assert_eq!(report.date_column.as_deref(), Some("data"));
        assert_eq!(report.unparsed_dates, 1);
    }

    #[test]
    fn roster_key_is_checked_first() {
        let roster = RowTable::new(&["contrato"], vec![vec![t("C1")]]);
        let settlement = RowTable::new(&["cliente"], vec![vec![t("X")]]);
        let err = consolidate(&roster, &settlement, &AliasSet::default()).unwrap_err();
        match err {
            PipelineError::MissingColumn { table, field } => {
                assert_eq!(table, "roster");
                assert_eq!(field, "nome do motorista");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_contract_is_fatal() {
        let roster = RowTable::new(&["motorista", "banco"], vec![vec![t("Ana"), t("B")]]);
        let err = consolidate(&roster, &settlement(), &AliasSet::default()).unwrap_err();
        assert!(err.to_string().contains("contrato"));
    }

    #[test]
    fn contract_alias_is_renamed() {
        let roster = RowTable::new(
            &["motorista", "Número do Contrato"],
            vec![vec![t("Carla"), t("K7")]],
        );
        let (table, _) = consolidate(&roster, &settlement(), &AliasSet::default()).unwrap();
        assert_eq!(table.headers().last().map(String::as_str), Some("contrato"));
        assert_eq!(table.get(1, table.width() - 1), &t("K7"));
    }

    #[test]
    fn parse_date_variants() {
        let jan5 = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        for s in [
            "05/01/2024",
            "2024-01-05",
            "2024-01-05 10:30:00",
            "2024-01-05T10:30:00",
            "05-01-2024",
            "2024/01/05",
            "05/01/2024 08:00:00",
            "05/01/24",
        ] {
            assert_eq!(parse_date(&t(s)), Some(jan5), "{s}");
        }
        assert_eq!(parse_date(&Datum::Number(45296.0)), Some(jan5));
        assert_eq!(parse_date(&t("31/02/2024")), None);
        assert_eq!(parse_date(&Datum::Bool(true)), None);
    }

    #[test]
    fn join_key_folds_case_and_spacing() {
        assert_eq!(join_key(&t("  Ana   SILVA ")), "ana silva");
        assert_eq!(join_key(&Datum::Empty), "");
    }
}
