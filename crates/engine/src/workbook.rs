use super::formula::eval::{self, Value};
use super::sheet::Sheet;

/// Maximum sheet name length accepted by spreadsheet applications.
pub const MAX_SHEET_NAME_LEN: usize = 31;

/// Characters a sheet name may not contain.
pub const FORBIDDEN_SHEET_CHARS: [char; 7] = ['\\', '/', '*', '?', ':', '[', ']'];

/// Normalize a sheet name for case-insensitive comparison
pub fn normalize_sheet_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Check if a sheet name is valid: non-empty, at most 31 characters,
/// no forbidden characters, not wrapped in apostrophes.
pub fn is_valid_sheet_name(name: &str) -> bool {
    let trimmed = name.trim();
    !trimmed.is_empty()
        && name.chars().count() <= MAX_SHEET_NAME_LEN
        && !name.chars().any(|c| FORBIDDEN_SHEET_CHARS.contains(&c))
        && !name.starts_with('\'')
        && !name.ends_with('\'')
}

#[derive(Debug, Clone, Default)]
pub struct Workbook {
    sheets: Vec<Sheet>,
    active_sheet: usize,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a workbook from sheets (for import)
    pub fn from_sheets(sheets: Vec<Sheet>, active: usize) -> Self {
        let active_sheet = active.min(sheets.len().saturating_sub(1));
        Self { sheets, active_sheet }
    }

    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    pub fn active_sheet_index(&self) -> usize {
        self.active_sheet
    }

    pub fn set_active_sheet(&mut self, index: usize) -> bool {
        if index < self.sheets.len() {
            self.active_sheet = index;
            true
        } else {
            false
        }
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn sheets_mut(&mut self) -> impl Iterator<Item = &mut Sheet> {
        self.sheets.iter_mut()
    }

    pub fn sheet(&self, index: usize) -> Option<&Sheet> {
        self.sheets.get(index)
    }

    pub fn sheet_mut(&mut self, index: usize) -> Option<&mut Sheet> {
        self.sheets.get_mut(index)
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    /// Check if a sheet name already exists (case-insensitive)
    pub fn sheet_name_exists(&self, name: &str) -> bool {
        self.sheet_index(name).is_some()
    }

    /// Index of a sheet by name (case-insensitive)
    pub fn sheet_index(&self, name: &str) -> Option<usize> {
        let key = normalize_sheet_name(name);
        self.sheets.iter().position(|s| normalize_sheet_name(&s.name) == key)
    }

    pub fn sheet_by_name(&self, name: &str) -> Option<&Sheet> {
        self.sheet_index(name).and_then(|i| self.sheets.get(i))
    }

    pub fn sheet_by_name_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        let idx = self.sheet_index(name)?;
        self.sheets.get_mut(idx)
    }

    /// Append a sheet. Returns None if its name is invalid or already used.
    pub fn add_sheet(&mut self, sheet: Sheet) -> Option<usize> {
        if !is_valid_sheet_name(&sheet.name) || self.sheet_name_exists(&sheet.name) {
            return None;
        }
        self.sheets.push(sheet);
        Some(self.sheets.len() - 1)
    }

    /// Add a new empty sheet with a specific name
    pub fn add_sheet_named(&mut self, name: &str) -> Option<usize> {
        self.add_sheet(Sheet::new(name))
    }

    /// Remove and return every sheet, leaving the workbook empty.
    pub fn into_sheets(self) -> Vec<Sheet> {
        self.sheets
    }

    /// Evaluate the cell at (row, col) on the named sheet.
    ///
    /// Formulas are computed from the workbook's current contents, so this
    /// reflects edits made after the formula was written.
    pub fn evaluate(&self, sheet_name: &str, row: usize, col: usize) -> Value {
        eval::evaluate_cell(self, sheet_name, row, col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellValue;

    #[test]
    fn names_are_case_insensitive() {
        let mut wb = Workbook::new();
        assert_eq!(wb.add_sheet_named("Ana Silva"), Some(0));
        assert_eq!(wb.add_sheet_named("ana silva"), None);
        assert!(wb.sheet_by_name("ANA SILVA").is_some());
    }

    #[test]
    fn invalid_names_are_rejected() {
        let mut wb = Workbook::new();
        assert_eq!(wb.add_sheet_named(""), None);
        assert_eq!(wb.add_sheet_named("a/b"), None);
        assert_eq!(wb.add_sheet_named(&"x".repeat(32)), None);
        assert_eq!(wb.add_sheet_named(&"x".repeat(31)), Some(0));
    }

    #[test]
    fn evaluate_cross_sheet() {
        let mut wb = Workbook::new();
        wb.add_sheet_named("Ana");
        wb.add_sheet_named("RESUMO");
        wb.sheet_by_name_mut("Ana").unwrap().set_value(4, 5, CellValue::Number(150.0));
        wb.sheet_by_name_mut("RESUMO")
            .unwrap()
            .set_value(0, 0, CellValue::formula("='Ana'!F5*2"));
        assert_eq!(wb.evaluate("RESUMO", 0, 0), Value::Number(300.0));
    }
}
