//! Tabular sources: read a workbook's first sheet or a CSV file into a
//! `RowTable`, and write a row table back out as a one-sheet workbook.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Workbook as XlsxWorkbook};

use espelhos_engine::table::{from_excel_serial, to_excel_serial, Datum, RowTable};

use crate::error::IoError;
use crate::source::{looks_like_xlsx, Artifact, OutputTarget, Source};

/// Load a tabular source. Workbooks are detected by their ZIP signature;
/// anything else is parsed as delimited text.
pub fn load_table(source: &Source) -> Result<RowTable, IoError> {
    let bytes = source.bytes()?;
    if bytes.is_empty() {
        return Err(IoError::Malformed(format!("{} is empty", source.describe())));
    }
    let table = if looks_like_xlsx(&bytes) || is_ole_container(&bytes) {
        read_workbook_table(bytes)?
    } else {
        crate::csv::parse_table(&crate::csv::decode_to_utf8(bytes))?
    };
    log::debug!(
        "loaded {} rows x {} columns from {}",
        table.len(),
        table.width(),
        source.describe()
    );
    Ok(table)
}

/// Legacy .xls files are OLE compound documents.
fn is_ole_container(bytes: &[u8]) -> bool {
    bytes.starts_with(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1])
}

fn read_workbook_table(bytes: Vec<u8>) -> Result<RowTable, IoError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| IoError::Malformed(format!("Failed to open workbook: {}", e)))?;
    let first = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| IoError::Malformed("workbook contains no sheets".to_string()))?;
    let range = workbook
        .worksheet_range(&first)
        .map_err(|e| IoError::Malformed(format!("Failed to read sheet '{}': {}", first, e)))?;

    let mut rows = range
        .rows()
        .filter(|row| row.iter().any(|c| !data_to_datum(c).is_blank()));
    let headers: Vec<String> = rows
        .next()
        .ok_or_else(|| IoError::Malformed(format!("sheet '{}' has no header row", first)))?
        .iter()
        .map(|c| data_to_datum(c).display())
        .collect();
    let body = rows.map(|row| row.iter().map(data_to_datum).collect()).collect();

    Ok(RowTable::new(&headers, body))
}

fn data_to_datum(cell: &Data) -> Datum {
    match cell {
        Data::Empty => Datum::Empty,
        Data::String(s) if s.trim().is_empty() => Datum::Empty,
        Data::String(s) => Datum::Text(s.clone()),
        Data::Float(n) => Datum::Number(*n),
        Data::Int(n) => Datum::Number(*n as f64),
        Data::Bool(b) => Datum::Bool(*b),
        Data::DateTime(dt) => from_excel_serial(dt.as_f64())
            .map(Datum::DateTime)
            .unwrap_or(Datum::Number(dt.as_f64())),
        Data::DateTimeIso(s) => chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
            .map(Datum::DateTime)
            .unwrap_or_else(|_| Datum::Text(s.clone())),
        Data::DurationIso(s) => Datum::Text(s.clone()),
        Data::Error(e) => Datum::Text(format!("#{:?}", e)),
    }
}

/// Write a row table as a single-sheet workbook. The header row is bold,
/// centered and bordered; date-times keep a date number format.
pub fn write_table(table: &RowTable, sheet_name: &str, target: &OutputTarget) -> Result<Artifact, IoError> {
    let mut xlsx = XlsxWorkbook::new();
    let worksheet = xlsx.add_worksheet();
    worksheet.set_name(sheet_name)?;

    let header = Format::new()
        .set_bold()
        .set_align(FormatAlign::Center)
        .set_border(FormatBorder::Thin);
    let date = Format::new().set_num_format("dd/mm/yyyy hh:mm:ss");

    for (col, name) in table.headers().iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, name, &header)?;
    }

    for (r, row) in table.rows().iter().enumerate() {
        let row32 = r as u32 + 1;
        for (col, value) in row.iter().enumerate() {
            let col16 = col as u16;
            match value {
                Datum::Empty => {}
                Datum::Text(s) => {
                    worksheet.write_string(row32, col16, s)?;
                }
                Datum::Number(n) => {
                    worksheet.write_number(row32, col16, *n)?;
                }
                Datum::Bool(b) => {
                    worksheet.write_boolean(row32, col16, *b)?;
                }
                Datum::DateTime(dt) => {
                    worksheet.write_number_with_format(row32, col16, to_excel_serial(dt), &date)?;
                }
            }
        }
    }

    target.emit(xlsx.save_to_buffer()?)
}
