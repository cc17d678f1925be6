// Excel workbook import/export.
//
// Import pairs calamine (values, formulas) with the quick-xml style reader so
// a template keeps its look. Export writes the engine workbook back through
// rust_xlsxwriter: merges first, then cells, then layout.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, FormatUnderline, Workbook as XlsxWorkbook, Worksheet};

use espelhos_engine::cell::{Alignment, BorderStyle, CellFormat, CellValue, NumberFormat, VerticalAlignment};
use espelhos_engine::sheet::{MergedRegion, Sheet};
use espelhos_engine::workbook::Workbook;

use crate::error::IoError;
use crate::source::{Artifact, OutputTarget, Source};
use crate::xlsx_styles;

// =============================================================================
// XLSX Import
// =============================================================================

/// Import a workbook with values, formulas, styles and layout.
pub fn import_workbook(source: &Source) -> Result<Workbook, IoError> {
    let bytes = source.bytes()?;
    import_workbook_bytes(&bytes)
}

pub fn import_workbook_bytes(bytes: &[u8]) -> Result<Workbook, IoError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| IoError::Malformed(format!("Failed to open workbook: {}", e)))?;

    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    if sheet_names.is_empty() {
        return Err(IoError::Malformed("workbook contains no sheets".to_string()));
    }

    let mut sheets = Vec::with_capacity(sheet_names.len());
    for name in &sheet_names {
        let mut sheet = Sheet::new(name);

        let range = workbook
            .worksheet_range(name)
            .map_err(|e| IoError::Malformed(format!("Failed to read sheet '{}': {}", name, e)))?;
        // Range start offset (data may not begin at A1)
        let (start_row, start_col) = range.start().unwrap_or((0, 0));
        for (row_idx, row) in range.rows().enumerate() {
            for (col_idx, cell) in row.iter().enumerate() {
                let value = data_to_cell_value(cell);
                if !value.is_empty() {
                    sheet.set_value(start_row as usize + row_idx, start_col as usize + col_idx, value);
                }
            }
        }

        if let Ok(formulas) = workbook.worksheet_formula(name) {
            let (start_row, start_col) = formulas.start().unwrap_or((0, 0));
            for (row_idx, row) in formulas.rows().enumerate() {
                for (col_idx, formula) in row.iter().enumerate() {
                    if !formula.is_empty() {
                        sheet.set_value(
                            start_row as usize + row_idx,
                            start_col as usize + col_idx,
                            CellValue::formula(formula.as_str()),
                        );
                    }
                }
            }
        }

        sheets.push(sheet);
    }

    let mut workbook = Workbook::from_sheets(sheets, 0);
    match xlsx_styles::parse_xlsx_formatting(bytes, &sheet_names) {
        Ok(formatting) => apply_formatting(&mut workbook, formatting),
        // Non-xlsx containers (xls, ods) import without formatting
        Err(e) => log::debug!("no xlsx formatting imported: {}", e),
    }
    Ok(workbook)
}

fn data_to_cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) if s.is_empty() => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(n) => CellValue::Number(*n),
        Data::Int(n) => CellValue::Number(*n as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        // Dates stay serial numbers; the cell's number format renders them
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(format!("#{:?}", e)),
    }
}

/// Stored xlsx column widths carry cell padding (+5px at the default 7px
/// digit width); strip it so a re-export writes back the same width.
fn stored_to_user_width(stored: f64) -> f64 {
    const PADDING: f64 = 5.0 / 7.0;
    if stored <= PADDING {
        return stored;
    }
    ((stored - PADDING) * 100.0).round() / 100.0
}

fn apply_formatting(workbook: &mut Workbook, formatting: xlsx_styles::WorkbookFormatting) {
    let xlsx_styles::WorkbookFormatting { styles, sheets, active_tab } = formatting;

    for (sheet, sheet_fmt) in workbook.sheets_mut().zip(sheets) {
        for (row, col, style_id) in sheet_fmt.cell_styles {
            let Some(format) = styles.get(style_id) else { continue };
            let has_value = sheet.get(row, col).is_some_and(|c| !c.value.is_empty());
            // Styled-empty cells are only materialized when they show something
            if has_value || format.is_visible_when_empty() {
                *sheet.format_mut(row, col) = format.clone();
            }
        }
        for (sr, sc, er, ec) in sheet_fmt.merged_regions {
            if !sheet.merge(MergedRegion::new(sr, sc, er, ec)) {
                log::warn!("sheet '{}': dropped overlapping merge", sheet.name);
            }
        }
        sheet
            .col_widths
            .extend(sheet_fmt.col_widths.into_iter().map(|(c, w)| (c, stored_to_user_width(w))));
        sheet.row_heights.extend(sheet_fmt.row_heights);
        sheet.show_grid_lines = sheet_fmt.show_grid_lines;
    }

    workbook.set_active_sheet(active_tab);
}

// =============================================================================
// XLSX Export
// =============================================================================

/// Serialize a workbook to xlsx bytes.
pub fn export_workbook_bytes(workbook: &Workbook) -> Result<Vec<u8>, IoError> {
    let mut xlsx = XlsxWorkbook::new();

    for sheet in workbook.sheets() {
        let worksheet = xlsx.add_worksheet();
        worksheet.set_name(&sheet.name)?;
        export_sheet(sheet, worksheet)?;
    }

    if let Ok(ws) = xlsx.worksheet_from_index(workbook.active_sheet_index()) {
        ws.set_active(true);
    }

    Ok(xlsx.save_to_buffer()?)
}

/// Serialize a workbook and deliver it to `target`.
pub fn export_workbook(workbook: &Workbook, target: &OutputTarget) -> Result<Artifact, IoError> {
    target.emit(export_workbook_bytes(workbook)?)
}

fn export_sheet(sheet: &Sheet, worksheet: &mut Worksheet) -> Result<(), IoError> {
    // merge_range() writes blanks to every cell in the range using the
    // origin's format; the origin is then overwritten with its typed value.
    for merge in &sheet.merged_regions {
        if merge.start == merge.end {
            continue;
        }
        let origin_format = sheet
            .format(merge.start.0, merge.start.1)
            .map(build_excel_format)
            .unwrap_or_else(Format::new);
        worksheet.merge_range(
            merge.start.0 as u32,
            merge.start.1 as u16,
            merge.end.0 as u32,
            merge.end.1 as u16,
            "",
            &origin_format,
        )?;
    }

    for (&(row, col), cell) in sheet.cells_iter() {
        let (row32, col16) = (row as u32, col as u16);
        let format = build_excel_format(&cell.format);

        if sheet.is_merge_hidden(row, col) {
            // Hidden cells keep their own borders so the merged box draws fully
            if cell.format.is_visible_when_empty() {
                worksheet.write_blank(row32, col16, &format)?;
            }
            continue;
        }

        match &cell.value {
            CellValue::Empty => {
                if !cell.format.is_default() {
                    worksheet.write_blank(row32, col16, &format)?;
                }
            }
            CellValue::Text(s) => {
                worksheet.write_string_with_format(row32, col16, s, &format)?;
            }
            CellValue::Number(n) => {
                worksheet.write_number_with_format(row32, col16, *n, &format)?;
            }
            CellValue::Bool(b) => {
                worksheet.write_boolean_with_format(row32, col16, *b, &format)?;
            }
            CellValue::Formula { source, .. } => {
                let formula = source.strip_prefix('=').unwrap_or(source);
                worksheet.write_formula_with_format(row32, col16, formula, &format)?;
            }
        }
    }

    for (&col, &width) in &sheet.col_widths {
        worksheet.set_column_width(col as u16, width)?;
    }
    for (&row, &height) in &sheet.row_heights {
        worksheet.set_row_height(row as u32, height)?;
    }
    worksheet.set_screen_gridlines(sheet.show_grid_lines);

    Ok(())
}

fn rgb(color: [u8; 4]) -> Color {
    let [r, g, b, _] = color;
    Color::RGB(((r as u32) << 16) | ((g as u32) << 8) | (b as u32))
}

/// Build a rust_xlsxwriter Format from an engine CellFormat.
pub fn build_excel_format(cell_format: &CellFormat) -> Format {
    let mut format = Format::new();

    if cell_format.bold {
        format = format.set_bold();
    }
    if cell_format.italic {
        format = format.set_italic();
    }
    if cell_format.underline {
        format = format.set_underline(FormatUnderline::Single);
    }
    if let Some(size) = cell_format.font_size {
        format = format.set_font_size(size as f64);
    }
    if let Some(color) = cell_format.font_color {
        format = format.set_font_color(rgb(color));
    }
    if let Some(ref family) = cell_format.font_family {
        format = format.set_font_name(family);
    }

    format = match cell_format.alignment {
        Alignment::General => format,
        Alignment::Left => format.set_align(FormatAlign::Left),
        Alignment::Center => format.set_align(FormatAlign::Center),
        Alignment::Right => format.set_align(FormatAlign::Right),
    };
    format = match cell_format.vertical_alignment {
        VerticalAlignment::Top => format.set_align(FormatAlign::Top),
        VerticalAlignment::Middle => format.set_align(FormatAlign::VerticalCenter),
        VerticalAlignment::Bottom => format,
    };
    if cell_format.wrap_text {
        format = format.set_text_wrap();
    }

    if let Some(color) = cell_format.background_color {
        format = format.set_background_color(rgb(color));
    }

    let sides = [
        (&cell_format.border_top, 0),
        (&cell_format.border_right, 1),
        (&cell_format.border_bottom, 2),
        (&cell_format.border_left, 3),
    ];
    for (border, side) in sides {
        if border.style == BorderStyle::None {
            continue;
        }
        let style = border_style_to_xlsx(border.style);
        format = match side {
            0 => format.set_border_top(style),
            1 => format.set_border_right(style),
            2 => format.set_border_bottom(style),
            _ => format.set_border_left(style),
        };
        if let Some(color) = border.color {
            format = match side {
                0 => format.set_border_top_color(rgb(color)),
                1 => format.set_border_right_color(rgb(color)),
                2 => format.set_border_bottom_color(rgb(color)),
                _ => format.set_border_left_color(rgb(color)),
            };
        }
    }

    match &cell_format.number_format {
        NumberFormat::General => format,
        NumberFormat::Builtin(id) => match u8::try_from(*id) {
            Ok(id) => format.set_num_format_index(id),
            Err(_) => format,
        },
        NumberFormat::Custom(code) => format.set_num_format(code),
    }
}

fn border_style_to_xlsx(style: BorderStyle) -> FormatBorder {
    match style {
        BorderStyle::None => FormatBorder::None,
        BorderStyle::Thin => FormatBorder::Thin,
        BorderStyle::Medium => FormatBorder::Medium,
        BorderStyle::Thick => FormatBorder::Thick,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use espelhos_engine::cell::CellBorder;

    fn sample() -> Workbook {
        let mut modelo = Sheet::new("MODELO");
        modelo.set_value(3, 2, CellValue::text("Ana - 123"));
        let fmt = modelo.format_mut(3, 2);
        fmt.bold = true;
        fmt.font_color = Some([255, 0, 0, 255]);
        fmt.border_top = CellBorder::THIN;
        fmt.alignment = Alignment::Center;
        modelo.format_mut(3, 3).border_right = CellBorder::THIN;
        modelo.merge(MergedRegion::new(3, 2, 3, 3));
        modelo.set_value(9, 5, CellValue::Number(200.0));
        modelo.format_mut(9, 5).number_format = NumberFormat::Custom("R$ #,##0.00_);R$ (#,##0.00)".into());
        modelo.set_value(10, 5, CellValue::formula("=SUM(F11:F15)"));
        modelo.set_col_width(5, 33.0);
        modelo.show_grid_lines = false;

        let mut wb = Workbook::new();
        wb.add_sheet(Sheet::new("Capa"));
        wb.add_sheet(modelo);
        wb.set_active_sheet(1);
        wb
    }

    #[test]
    fn export_import_keeps_template_layout() {
        let bytes = export_workbook_bytes(&sample()).unwrap();
        assert!(crate::source::looks_like_xlsx(&bytes));

        let wb = import_workbook_bytes(&bytes).unwrap();
        assert_eq!(wb.sheet_names(), vec!["Capa", "MODELO"]);
        assert_eq!(wb.active_sheet_index(), 1);

        let s = wb.sheet_by_name("MODELO").unwrap();
        assert_eq!(s.text(3, 2), "Ana - 123");
        let f = s.format(3, 2).unwrap();
        assert!(f.bold);
        assert_eq!(f.font_color, Some([255, 0, 0, 255]));
        assert_eq!(f.alignment, Alignment::Center);
        assert_eq!(f.border_top.style, BorderStyle::Thin);
        assert_eq!(s.merged_regions, vec![MergedRegion::new(3, 2, 3, 3)]);
        assert_eq!(s.format(3, 3).unwrap().border_right.style, BorderStyle::Thin);
        assert_eq!(
            s.format(9, 5).unwrap().number_format,
            NumberFormat::Custom("R$ #,##0.00_);R$ (#,##0.00)".into())
        );
        assert_eq!(s.value(10, 5), &CellValue::formula("=SUM(F11:F15)"));
        assert_eq!(s.col_width(5), Some(33.0));
        assert!(!s.show_grid_lines);
    }

    #[test]
    fn garbage_is_malformed() {
        let err = import_workbook_bytes(b"not a workbook").unwrap_err();
        assert!(matches!(err, IoError::Malformed(_)));
    }

    #[test]
    fn export_to_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        let art = export_workbook(&sample(), &OutputTarget::path(&path)).unwrap();
        assert_eq!(art, Artifact::Path(path.clone()));
        assert!(path.is_file());
        let wb = import_workbook(&Source::path(&path)).unwrap();
        assert_eq!(wb.sheet_count(), 2);
    }
}
