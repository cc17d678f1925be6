// CSV/TSV import into row tables

use espelhos_engine::table::{Datum, RowTable};

use crate::error::IoError;

/// Detect the most likely field delimiter by checking consistency across the first few lines.
///
/// For each candidate (tab, semicolon, comma, pipe), count fields per line. The delimiter
/// that produces the most consistent field count (>1 field) wins.
pub fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b'\t', b';', b',', b'|'];
    let sample_lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).take(10).collect();

    if sample_lines.is_empty() {
        return b',';
    }

    let mut best = b',';
    let mut best_score = 0u64;

    for &delim in candidates {
        let counts: Vec<usize> = sample_lines
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        if counts.first().copied().unwrap_or(0) <= 1 {
            continue;
        }

        let target = counts[0];
        let consistent = counts.iter().filter(|&&c| c == target).count() as u64;
        let score = consistent * target as u64;

        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}

/// Decode bytes as UTF-8, falling back to Windows-1252 (Excel-exported CSVs).
pub fn decode_to_utf8(bytes: Vec<u8>) -> String {
    let bytes = match bytes.strip_prefix(b"\xEF\xBB\xBF") {
        Some(rest) => rest.to_vec(),
        None => bytes,
    };
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            decoded.into_owned()
        }
    }
}

/// Typed value of one CSV field. Numeric-looking fields become numbers,
/// except zero-padded codes such as account numbers ("0123").
fn field_to_datum(field: &str) -> Datum {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return Datum::Empty;
    }
    let numeric = trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
        && trimmed.chars().any(|c| c.is_ascii_digit());
    let zero_padded = {
        let digits = trimmed.trim_start_matches('-');
        digits.len() > 1 && digits.starts_with('0') && !digits.starts_with("0.")
    };
    if numeric && !zero_padded {
        if let Ok(n) = trimmed.parse::<f64>() {
            return Datum::Number(n);
        }
    }
    Datum::Text(field.to_string())
}

/// Parse CSV text into a row table. The first non-blank record is the header.
pub fn parse_table(content: &str) -> Result<RowTable, IoError> {
    let delimiter = sniff_delimiter(content);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut headers: Option<Vec<String>> = None;
    let mut rows = Vec::new();

    for result in reader.records() {
        let record = result.map_err(|e| IoError::Malformed(e.to_string()))?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        match headers {
            None => headers = Some(record.iter().map(str::to_string).collect()),
            Some(_) => rows.push(record.iter().map(field_to_datum).collect()),
        }
    }

    let headers = headers.ok_or_else(|| IoError::Malformed("no header row".to_string()))?;
    Ok(RowTable::new(&headers, rows))
}
