//! Row tables: the in-memory shape of a loaded tabular source.
//!
//! A `RowTable` is a header list plus rows of `Datum`. Headers are
//! normalized on construction (trimmed, lower-cased, blanks named, duplicates
//! suffixed) so lookups never have to care about spelling noise.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::cell::format_number;

/// One value in a row table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Datum {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl Datum {
    pub fn text(s: impl Into<String>) -> Self {
        Datum::Text(s.into())
    }

    /// Empty, or text made only of whitespace.
    pub fn is_blank(&self) -> bool {
        match self {
            Datum::Empty => true,
            Datum::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Trimmed text rendering ("" for blanks). Dates render as `DD/MM/YYYY`
    /// when they carry no time of day.
    pub fn display(&self) -> String {
        match self {
            Datum::Empty => String::new(),
            Datum::Text(s) => s.trim().to_string(),
            Datum::Number(n) => format_number(*n),
            Datum::Bool(b) => if *b { "TRUE".to_string() } else { "FALSE".to_string() },
            Datum::DateTime(dt) => {
                if dt.time() == chrono::NaiveTime::MIN {
                    dt.format("%d/%m/%Y").to_string()
                } else {
                    dt.format("%d/%m/%Y %H:%M:%S").to_string()
                }
            }
        }
    }
}

impl From<&str> for Datum {
    fn from(s: &str) -> Self {
        if s.is_empty() { Datum::Empty } else { Datum::Text(s.to_string()) }
    }
}

impl From<f64> for Datum {
    fn from(n: f64) -> Self {
        Datum::Number(n)
    }
}

fn excel_epoch() -> NaiveDateTime {
    chrono::NaiveDate::from_ymd_opt(1899, 12, 30)
        .unwrap_or_default()
        .and_time(chrono::NaiveTime::MIN)
}

/// Convert an Excel serial date (1900 system) to a date-time.
/// Serials before the epoch or too large to represent yield None.
pub fn from_excel_serial(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 || serial > 2_958_465.0 {
        return None;
    }
    let millis = (serial * 86_400_000.0).round() as i64;
    excel_epoch().checked_add_signed(chrono::Duration::milliseconds(millis))
}

/// Inverse of `from_excel_serial`.
pub fn to_excel_serial(dt: &NaiveDateTime) -> f64 {
    let delta = *dt - excel_epoch();
    delta.num_milliseconds() as f64 / 86_400_000.0
}

/// Normalize a header: trim and lower-case.
pub fn normalize_header(h: &str) -> String {
    h.trim().to_lowercase()
}

/// Normalize a whole header row. Empty headers become `unnamed: {i}` and
/// repeated headers get `.1`, `.2`, ... suffixes in order of appearance.
pub fn normalize_headers<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for (i, h) in raw.iter().enumerate() {
        let base = normalize_header(h.as_ref());
        let base = if base.is_empty() { format!("unnamed: {}", i) } else { base };
        let mut name = base.clone();
        let mut n = 1;
        while out.contains(&name) {
            name = format!("{}.{}", base, n);
            n += 1;
        }
        out.push(name);
    }
    out
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RowTable {
    headers: Vec<String>,
    rows: Vec<Vec<Datum>>,
}

impl RowTable {
    /// Build a table, normalizing headers and padding/truncating every row
    /// to the header width.
    pub fn new<S: AsRef<str>>(headers: &[S], rows: Vec<Vec<Datum>>) -> Self {
        let headers = normalize_headers(headers);
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut r| {
                r.resize(width, Datum::Empty);
                r
            })
            .collect();
        Self { headers, rows }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<Datum>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.headers.len()
    }

    /// Index of a column by header, compared after normalization.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let key = normalize_header(name);
        self.headers.iter().position(|h| *h == key)
    }

    pub fn get(&self, row: usize, col: usize) -> &Datum {
        static EMPTY: Datum = Datum::Empty;
        self.rows.get(row).and_then(|r| r.get(col)).unwrap_or(&EMPTY)
    }

    pub fn set(&mut self, row: usize, col: usize, value: Datum) {
        if let Some(cell) = self.rows.get_mut(row).and_then(|r| r.get_mut(col)) {
            *cell = value;
        }
    }
}
