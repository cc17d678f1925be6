use std::collections::BTreeMap;

use super::cell::{Cell, CellFormat, CellValue};

/// A rectangular merged region, inclusive on both corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergedRegion {
    pub start: (usize, usize),
    pub end: (usize, usize),
}

impl MergedRegion {
    pub fn new(start_row: usize, start_col: usize, end_row: usize, end_col: usize) -> Self {
        Self {
            start: (start_row.min(end_row), start_col.min(end_col)),
            end: (start_row.max(end_row), start_col.max(end_col)),
        }
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        row >= self.start.0 && row <= self.end.0 && col >= self.start.1 && col <= self.end.1
    }

    pub fn overlaps(&self, other: &MergedRegion) -> bool {
        self.start.0 <= other.end.0
            && other.start.0 <= self.end.0
            && self.start.1 <= other.end.1
            && other.start.1 <= self.end.1
    }
}

/// One worksheet. Cells are kept in row-major order so scans visit them
/// the way a spreadsheet reads: left to right, top to bottom.
#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    cells: BTreeMap<(usize, usize), Cell>,
    pub merged_regions: Vec<MergedRegion>,
    /// Column widths in Excel character units
    pub col_widths: BTreeMap<usize, f64>,
    /// Row heights in points
    pub row_heights: BTreeMap<usize, f64>,
    pub show_grid_lines: bool,
}

impl Sheet {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cells: BTreeMap::new(),
            merged_regions: Vec::new(),
            col_widths: BTreeMap::new(),
            row_heights: BTreeMap::new(),
            show_grid_lines: true,
        }
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&Cell> {
        self.cells.get(&(row, col))
    }

    /// Get the cell at (row, col), creating an empty one if needed.
    pub fn cell_mut(&mut self, row: usize, col: usize) -> &mut Cell {
        self.cells.entry((row, col)).or_default()
    }

    pub fn value(&self, row: usize, col: usize) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.cells.get(&(row, col)).map(|c| &c.value).unwrap_or(&EMPTY)
    }

    pub fn set_value(&mut self, row: usize, col: usize, value: CellValue) {
        self.cell_mut(row, col).value = value;
    }

    pub fn format(&self, row: usize, col: usize) -> Option<&CellFormat> {
        self.cells.get(&(row, col)).map(|c| &c.format)
    }

    pub fn format_mut(&mut self, row: usize, col: usize) -> &mut CellFormat {
        &mut self.cell_mut(row, col).format
    }

    /// Trimmed display text of a cell ("" for empty or missing cells).
    pub fn text(&self, row: usize, col: usize) -> String {
        self.value(row, col).raw_display().trim().to_string()
    }

    pub fn cells_iter(&self) -> impl Iterator<Item = (&(usize, usize), &Cell)> {
        self.cells.iter()
    }

    /// Highest row holding a cell, if any.
    pub fn max_row(&self) -> Option<usize> {
        self.cells.keys().next_back().map(|(r, _)| *r)
    }

    /// Highest column holding a cell, if any.
    pub fn max_col(&self) -> Option<usize> {
        self.cells.keys().map(|(_, c)| *c).max()
    }

    /// Add a merged region. Regions overlapping an existing merge are
    /// rejected (the spreadsheet application refuses them too).
    pub fn merge(&mut self, region: MergedRegion) -> bool {
        if self.merged_regions.iter().any(|m| m.overlaps(&region)) {
            return false;
        }
        self.merged_regions.push(region);
        true
    }

    /// Drop every merged region that intersects `region`.
    pub fn unmerge_overlapping(&mut self, region: &MergedRegion) {
        self.merged_regions.retain(|m| !m.overlaps(region));
    }

    /// True if (row, col) is inside a merge but not its top-left origin.
    pub fn is_merge_hidden(&self, row: usize, col: usize) -> bool {
        self.merged_regions
            .iter()
            .any(|m| m.contains(row, col) && m.start != (row, col))
    }

    pub fn set_col_width(&mut self, col: usize, width: f64) {
        self.col_widths.insert(col, width);
    }

    pub fn col_width(&self, col: usize) -> Option<f64> {
        self.col_widths.get(&col).copied()
    }

    /// Copy of this sheet under a new name.
    pub fn duplicate(&self, name: &str) -> Sheet {
        let mut copy = self.clone();
        copy.name = name.to_string();
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_iterate_row_major() {
        let mut sheet = Sheet::new("S");
        sheet.set_value(2, 0, CellValue::text("c"));
        sheet.set_value(0, 3, CellValue::text("b"));
        sheet.set_value(0, 1, CellValue::text("a"));
        let order: Vec<String> = sheet.cells_iter().map(|(_, c)| c.value.raw_display()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(sheet.max_row(), Some(2));
        assert_eq!(sheet.max_col(), Some(3));
    }

    #[test]
    fn overlapping_merge_is_rejected() {
        let mut sheet = Sheet::new("S");
        assert!(sheet.merge(MergedRegion::new(10, 0, 10, 5)));
        assert!(!sheet.merge(MergedRegion::new(10, 3, 10, 4)));
        assert!(sheet.merge(MergedRegion::new(11, 1, 11, 2)));
        assert!(sheet.is_merge_hidden(10, 5));
        assert!(!sheet.is_merge_hidden(10, 0));
    }

    #[test]
    fn text_is_trimmed() {
        let mut sheet = Sheet::new("S");
        sheet.set_value(0, 0, CellValue::text("  (-) DESCONTOS "));
        assert_eq!(sheet.text(0, 0), "(-) DESCONTOS");
        assert_eq!(sheet.text(5, 5), "");
    }

    #[test]
    fn duplicate_keeps_layout() {
        let mut sheet = Sheet::new("MODELO");
        sheet.set_col_width(5, 30.0);
        sheet.merge(MergedRegion::new(3, 2, 3, 3));
        let copy = sheet.duplicate("Ana");
        assert_eq!(copy.name, "Ana");
        assert_eq!(copy.col_width(5), Some(30.0));
        assert_eq!(copy.merged_regions.len(), 1);
    }
}
