// A1-style addressing helpers. Rows and columns are 0-indexed everywhere
// inside the engine; only the A1 text is 1-based.

/// Convert column index to Excel column letter (0 = A, 25 = Z, 26 = AA, etc.)
pub fn col_to_letter(col: usize) -> String {
    let mut result = String::new();
    let mut n = col;
    loop {
        result.insert(0, (b'A' + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    result
}

/// Parse a cell reference like "B5" or "$F$12" into (row, col) = (4, 1).
pub fn parse_cell_ref(r: &str) -> Option<(usize, usize)> {
    let mut col_part = String::new();
    let mut row_part = String::new();

    for ch in r.trim().chars() {
        match ch {
            '$' => {}
            c if c.is_ascii_alphabetic() && row_part.is_empty() => col_part.push(c.to_ascii_uppercase()),
            c if c.is_ascii_digit() => row_part.push(c),
            _ => return None,
        }
    }

    if col_part.is_empty() || row_part.is_empty() || col_part.len() > 3 {
        return None;
    }

    let mut col: usize = 0;
    for ch in col_part.chars() {
        col = col * 26 + (ch as usize - 'A' as usize + 1);
    }

    let row: usize = row_part.parse().ok()?;
    if row == 0 {
        return None;
    }

    Some((row - 1, col - 1))
}

/// Parse a range reference like "A1:C3" into (start_row, start_col, end_row, end_col).
pub fn parse_range_ref(r: &str) -> Option<(usize, usize, usize, usize)> {
    let (start, end) = r.split_once(':')?;
    let (sr, sc) = parse_cell_ref(start)?;
    let (er, ec) = parse_cell_ref(end)?;
    Some((sr.min(er), sc.min(ec), sr.max(er), sc.max(ec)))
}

/// Quote a sheet name for use inside a formula: `'Ana Silva'!`.
/// Embedded single quotes are doubled.
pub fn quote_sheet_name(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}
