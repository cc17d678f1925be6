//! XLSX style parser: extracts formatting from styles.xml and per-cell style IDs,
//! column/row sizes, merges and grid-line visibility from worksheet XML.
//!
//! calamine reads values and formulas; everything visual comes from here.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};
use zip::ZipArchive;

use espelhos_engine::address::{parse_cell_ref, parse_range_ref};
use espelhos_engine::cell::{
    Alignment, BorderStyle, CellBorder, CellFormat, NumberFormat, VerticalAlignment,
};

// =============================================================================
// Public types
// =============================================================================

/// Parsed style table from styles.xml: maps cellXfs index to CellFormat.
#[derive(Debug, Default)]
pub struct StyleTable {
    pub styles: Vec<CellFormat>,
}

impl StyleTable {
    pub fn get(&self, id: usize) -> Option<&CellFormat> {
        self.styles.get(id)
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }
}

/// Per-cell style references and layout extracted from a worksheet XML.
#[derive(Debug)]
pub struct SheetFormatting {
    /// (row, col, style_id) triples
    pub cell_styles: Vec<(usize, usize, usize)>,
    /// Column widths in Excel character-width units
    pub col_widths: HashMap<usize, f64>,
    /// Row heights in points
    pub row_heights: HashMap<usize, f64>,
    /// Merged cell regions: (start_row, start_col, end_row, end_col)
    pub merged_regions: Vec<(usize, usize, usize, usize)>,
    pub show_grid_lines: bool,
}

impl Default for SheetFormatting {
    fn default() -> Self {
        Self {
            cell_styles: Vec::new(),
            col_widths: HashMap::new(),
            row_heights: HashMap::new(),
            merged_regions: Vec::new(),
            show_grid_lines: true,
        }
    }
}

/// Everything visual in one xlsx file.
#[derive(Debug, Default)]
pub struct WorkbookFormatting {
    pub styles: StyleTable,
    /// One entry per requested sheet name, in the same order.
    pub sheets: Vec<SheetFormatting>,
    /// Index of the sheet selected when the file was last saved.
    pub active_tab: usize,
}

// =============================================================================
// Small parsing helpers
// =============================================================================

/// Unescape the 5 predefined XML entities: &amp; &lt; &gt; &quot; &apos;
fn unescape_xml(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn attr_str(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).to_string())
}

fn attr_parse<T: std::str::FromStr>(e: &BytesStart, key: &[u8]) -> Option<T> {
    attr_str(e, key).and_then(|s| s.parse().ok())
}

fn attr_flag(e: &BytesStart, key: &[u8]) -> bool {
    matches!(attr_str(e, key).as_deref(), Some("1") | Some("true"))
}

/// Standard Excel indexed colors (RGBA) for the low palette entries
/// templates actually use.
fn indexed_color(idx: u8) -> Option<[u8; 4]> {
    let rgb: [u8; 3] = match idx {
        0 | 8 | 64 => [0, 0, 0],
        1 | 9 | 65 => [255, 255, 255],
        2 | 10 => [255, 0, 0],
        3 | 11 => [0, 255, 0],
        4 | 12 => [0, 0, 255],
        5 | 13 => [255, 255, 0],
        6 | 14 => [255, 0, 255],
        7 | 15 => [0, 255, 255],
        16 => [128, 0, 0],
        17 => [0, 128, 0],
        18 => [0, 0, 128],
        22 => [192, 192, 192],
        23 => [128, 128, 128],
        55 => [150, 150, 150],
        _ => return None,
    };
    Some([rgb[0], rgb[1], rgb[2], 255])
}

/// Flat theme color defaults (no tint math).
fn theme_color_default(idx: u8) -> Option<[u8; 4]> {
    let rgb: [u8; 3] = match idx {
        0 => [255, 255, 255],
        1 => [0, 0, 0],
        2 => [238, 236, 225],
        3 => [31, 73, 125],
        4 => [79, 129, 189],
        5 => [192, 80, 77],
        6 => [155, 187, 89],
        7 => [128, 100, 162],
        8 => [75, 172, 198],
        9 => [247, 150, 70],
        _ => return None,
    };
    Some([rgb[0], rgb[1], rgb[2], 255])
}

/// Color from a <color>/<fgColor> element: rgb, then indexed, then theme.
fn parse_color(e: &BytesStart) -> Option<[u8; 4]> {
    if let Some(hex) = attr_str(e, b"rgb") {
        return parse_argb_hex(&hex);
    }
    if let Some(idx) = attr_parse::<u8>(e, b"indexed") {
        return indexed_color(idx);
    }
    attr_parse::<u8>(e, b"theme").and_then(theme_color_default)
}

/// Parse AARRGGBB (or RRGGBB) hex to RGBA.
fn parse_argb_hex(hex: &str) -> Option<[u8; 4]> {
    let s = hex.trim_start_matches('#');
    let byte = |i: usize| u8::from_str_radix(s.get(i..i + 2)?, 16).ok();
    match s.len() {
        8 => Some([byte(2)?, byte(4)?, byte(6)?, byte(0)?]),
        6 => Some([byte(0)?, byte(2)?, byte(4)?, 255]),
        _ => None,
    }
}

fn parse_border_style(s: &str) -> BorderStyle {
    match s {
        "thin" | "hair" | "dotted" | "dashed" => BorderStyle::Thin,
        "medium" | "mediumDashed" | "mediumDashDot" | "mediumDashDotDot" => BorderStyle::Medium,
        "thick" | "double" => BorderStyle::Thick,
        _ => BorderStyle::None,
    }
}

// =============================================================================
// styles.xml parser
// =============================================================================

#[derive(Debug, Clone, Default)]
struct ParsedFont {
    bold: bool,
    italic: bool,
    underline: bool,
    size: Option<f32>,
    color: Option<[u8; 4]>,
    family: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct ParsedBorder {
    top: CellBorder,
    right: CellBorder,
    bottom: CellBorder,
    left: CellBorder,
}

impl ParsedBorder {
    fn side_mut(&mut self, name: &[u8]) -> Option<&mut CellBorder> {
        match name {
            b"top" => Some(&mut self.top),
            b"right" => Some(&mut self.right),
            b"bottom" => Some(&mut self.bottom),
            b"left" => Some(&mut self.left),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct XfEntry {
    num_fmt_id: Option<u16>,
    font_id: Option<usize>,
    fill_id: Option<usize>,
    border_id: Option<usize>,
    h_align: Option<String>,
    v_align: Option<String>,
    wrap_text: bool,
}

impl XfEntry {
    fn from_start(e: &BytesStart) -> Self {
        Self {
            num_fmt_id: attr_parse(e, b"numFmtId"),
            font_id: attr_parse(e, b"fontId"),
            fill_id: attr_parse(e, b"fillId"),
            border_id: attr_parse(e, b"borderId"),
            ..Default::default()
        }
    }

    fn read_alignment(&mut self, e: &BytesStart) {
        self.h_align = attr_str(e, b"horizontal");
        self.v_align = attr_str(e, b"vertical");
        self.wrap_text = attr_flag(e, b"wrapText");
    }
}

/// Parse styles.xml content into a StyleTable.
pub fn parse_styles_xml(xml: &str) -> StyleTable {
    let num_fmts = parse_num_fmts(xml);
    let fonts = parse_fonts(xml);
    let fills = parse_fills(xml);
    let borders = parse_borders(xml);
    let styles = parse_cell_xfs(xml)
        .iter()
        .map(|xf| resolve_xf(xf, &num_fmts, &fonts, &fills, &borders))
        .collect();
    StyleTable { styles }
}

/// Parse <numFmts> into formatId -> formatCode
fn parse_num_fmts(xml: &str) -> HashMap<u16, String> {
    let mut map = HashMap::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) if e.name().as_ref() == b"numFmt" => {
                if let (Some(id), Some(code)) = (attr_parse::<u16>(e, b"numFmtId"), attr_str(e, b"formatCode")) {
                    map.insert(id, unescape_xml(&code));
                }
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"numFmts" => break,
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    map
}

fn parse_fonts(xml: &str) -> Vec<ParsedFont> {
    let mut fonts = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_fonts = false;
    let mut current: Option<ParsedFont> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"fonts" => in_fonts = true,
                b"font" if in_fonts => current = Some(ParsedFont::default()),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => {
                let Some(font) = current.as_mut() else {
                    // <font/> with no children still occupies an index
                    if in_fonts && e.name().as_ref() == b"font" {
                        fonts.push(ParsedFont::default());
                    }
                    buf.clear();
                    continue;
                };
                match e.name().as_ref() {
                    b"b" => font.bold = attr_str(e, b"val").map_or(true, |v| v != "0"),
                    b"i" => font.italic = attr_str(e, b"val").map_or(true, |v| v != "0"),
                    b"u" => font.underline = attr_str(e, b"val").map_or(true, |v| v != "none"),
                    b"sz" => font.size = attr_parse(e, b"val"),
                    b"color" => font.color = parse_color(e),
                    b"name" | b"rFont" => font.family = attr_str(e, b"val"),
                    _ => {}
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"font" => {
                    if let Some(font) = current.take() {
                        fonts.push(font);
                    }
                }
                b"fonts" => break,
                _ => {}
            },
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    fonts
}

/// Solid fill colors by fill index (None for pattern "none"/"gray125").
fn parse_fills(xml: &str) -> Vec<Option<[u8; 4]>> {
    let mut fills = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_fills = false;
    let mut current: Option<Option<[u8; 4]>> = None;
    let mut solid = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"fills" => in_fills = true,
                b"fill" if in_fills => {
                    current = Some(None);
                    solid = false;
                }
                b"patternFill" => solid = attr_str(e, b"patternType").as_deref() == Some("solid"),
                b"fgColor" if solid => current = Some(parse_color(e)),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"fgColor" if solid => current = Some(parse_color(e)),
                b"patternFill" => solid = false,
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"fill" => {
                    if let Some(fill) = current.take() {
                        fills.push(fill);
                    }
                }
                b"fills" => break,
                _ => {}
            },
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    fills
}

fn parse_borders(xml: &str) -> Vec<ParsedBorder> {
    let mut borders = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_borders = false;
    let mut current: Option<ParsedBorder> = None;
    let mut side: Option<Vec<u8>> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = e.name().as_ref().to_vec();
                match name.as_slice() {
                    b"borders" => in_borders = true,
                    b"border" if in_borders => current = Some(ParsedBorder::default()),
                    b"top" | b"right" | b"bottom" | b"left" => {
                        if let Some(b) = current.as_mut().and_then(|b| b.side_mut(&name)) {
                            b.style = attr_str(e, b"style").map_or(BorderStyle::None, |s| parse_border_style(&s));
                        }
                        side = Some(name);
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(ref e)) => {
                let name = e.name().as_ref().to_vec();
                match name.as_slice() {
                    b"border" if in_borders => borders.push(ParsedBorder::default()),
                    b"top" | b"right" | b"bottom" | b"left" => {
                        if let Some(b) = current.as_mut().and_then(|b| b.side_mut(&name)) {
                            b.style = attr_str(e, b"style").map_or(BorderStyle::None, |s| parse_border_style(&s));
                        }
                    }
                    b"color" => {
                        if let (Some(cur), Some(s)) = (current.as_mut(), side.as_deref()) {
                            if let Some(b) = cur.side_mut(s) {
                                b.color = parse_color(e);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"top" | b"right" | b"bottom" | b"left" => side = None,
                b"border" => {
                    if let Some(b) = current.take() {
                        borders.push(b);
                    }
                }
                b"borders" => break,
                _ => {}
            },
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    borders
}

/// Parse <cellXfs> entries in order.
fn parse_cell_xfs(xml: &str) -> Vec<XfEntry> {
    let mut entries = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_cell_xfs = false;
    let mut current: Option<XfEntry> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"cellXfs" => in_cell_xfs = true,
                b"xf" if in_cell_xfs => current = Some(XfEntry::from_start(e)),
                b"alignment" => {
                    if let Some(xf) = current.as_mut() {
                        xf.read_alignment(e);
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"xf" if in_cell_xfs => entries.push(XfEntry::from_start(e)),
                b"alignment" => {
                    if let Some(xf) = current.as_mut() {
                        xf.read_alignment(e);
                    }
                }
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"xf" => {
                    if let Some(xf) = current.take() {
                        entries.push(xf);
                    }
                }
                b"cellXfs" => break,
                _ => {}
            },
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    entries
}

/// Resolve an XfEntry into a CellFormat using the parsed component tables.
fn resolve_xf(
    xf: &XfEntry,
    num_fmts: &HashMap<u16, String>,
    fonts: &[ParsedFont],
    fills: &[Option<[u8; 4]>],
    borders: &[ParsedBorder],
) -> CellFormat {
    let mut format = CellFormat::default();

    if let Some(font) = xf.font_id.and_then(|id| fonts.get(id)) {
        format.bold = font.bold;
        format.italic = font.italic;
        format.underline = font.underline;
        format.font_size = font.size;
        format.font_color = font.color;
        format.font_family = font.family.clone();
    }

    if let Some(fill) = xf.fill_id.and_then(|id| fills.get(id)) {
        format.background_color = *fill;
    }

    if let Some(border) = xf.border_id.and_then(|id| borders.get(id)) {
        format.border_top = border.top;
        format.border_right = border.right;
        format.border_bottom = border.bottom;
        format.border_left = border.left;
    }

    format.number_format = match xf.num_fmt_id {
        None | Some(0) => NumberFormat::General,
        Some(id) => match num_fmts.get(&id) {
            Some(code) => NumberFormat::Custom(code.clone()),
            None => NumberFormat::Builtin(id),
        },
    };

    format.alignment = match xf.h_align.as_deref() {
        Some("left") => Alignment::Left,
        Some("center") | Some("centerContinuous") => Alignment::Center,
        Some("right") => Alignment::Right,
        _ => Alignment::General,
    };

    format.vertical_alignment = match xf.v_align.as_deref() {
        Some("top") => VerticalAlignment::Top,
        Some("center") => VerticalAlignment::Middle,
        _ => VerticalAlignment::Bottom,
    };

    format.wrap_text = xf.wrap_text;
    format
}

// =============================================================================
// Worksheet XML parser: per-cell style IDs + layout
// =============================================================================

pub fn parse_sheet_formatting(xml: &str) -> SheetFormatting {
    let mut out = SheetFormatting::default();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"sheetView" => {
                    if attr_str(e, b"showGridLines").as_deref().is_some_and(|v| v == "0" || v == "false") {
                        out.show_grid_lines = false;
                    }
                }
                b"row" => {
                    let row = attr_parse::<usize>(e, b"r").map(|r| r.saturating_sub(1));
                    let height = attr_parse::<f64>(e, b"ht");
                    if attr_flag(e, b"customHeight") {
                        if let (Some(row), Some(height)) = (row, height) {
                            out.row_heights.insert(row, height);
                        }
                    }
                }
                b"c" => {
                    let style = attr_parse::<usize>(e, b"s").unwrap_or(0);
                    // style 0 is the workbook default
                    if style > 0 {
                        if let Some((row, col)) = attr_str(e, b"r").and_then(|r| parse_cell_ref(&r)) {
                            out.cell_styles.push((row, col, style));
                        }
                    }
                }
                b"col" => {
                    let min = attr_parse::<usize>(e, b"min").map(|c| c.saturating_sub(1));
                    let max = attr_parse::<usize>(e, b"max").map(|c| c.saturating_sub(1));
                    let width = attr_parse::<f64>(e, b"width");
                    if let (Some(min), Some(max), Some(w)) = (min, max, width) {
                        // Whole-sheet default ranges (max=16384) carry no information
                        if max - min < 1024 {
                            for col in min..=max {
                                out.col_widths.insert(col, w);
                            }
                        }
                    }
                }
                b"mergeCell" => {
                    if let Some(region) = attr_str(e, b"ref").and_then(|r| parse_range_ref(&r)) {
                        out.merged_regions.push(region);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    out
}

/// `activeTab` of the first <workbookView>, 0 when absent.
pub fn parse_active_tab(workbook_xml: &str) -> usize {
    let mut reader = Reader::from_str(workbook_xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) if e.name().as_ref() == b"workbookView" => {
                return attr_parse(e, b"activeTab").unwrap_or(0);
            }
            Ok(Event::Eof) | Err(_) => return 0,
            _ => {}
        }
        buf.clear();
    }
}

// =============================================================================
// Top-level entry point
// =============================================================================

/// Parse all formatting data from xlsx bytes. `sheet_names` must be in
/// workbook order; missing parts degrade to empty formatting.
pub fn parse_xlsx_formatting(bytes: &[u8], sheet_names: &[String]) -> Result<WorkbookFormatting, String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| format!("Failed to read XLSX as ZIP for styles: {}", e))?;

    let styles = read_zip_file(&mut archive, "xl/styles.xml")
        .map(|xml| parse_styles_xml(&xml))
        .unwrap_or_default();

    let workbook_xml = read_zip_file(&mut archive, "xl/workbook.xml").unwrap_or_default();
    let rels_xml = read_zip_file(&mut archive, "xl/_rels/workbook.xml.rels").unwrap_or_default();
    let active_tab = parse_active_tab(&workbook_xml);

    let sheets = resolve_worksheet_paths(&workbook_xml, &rels_xml, sheet_names)
        .iter()
        .map(|path| match path {
            Some(path) => read_zip_file(&mut archive, path)
                .map(|xml| parse_sheet_formatting(&xml))
                .unwrap_or_default(),
            None => SheetFormatting::default(),
        })
        .collect();

    Ok(WorkbookFormatting { styles, sheets, active_tab })
}

fn read_zip_file<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &str) -> Result<String, String> {
    let mut file = archive
        .by_name(path)
        .map_err(|e| format!("File '{}' not found in XLSX: {}", path, e))?;
    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| format!("Failed to read '{}': {}", path, e))?;
    Ok(content)
}

/// Map sheet names to their worksheet part inside the archive.
fn resolve_worksheet_paths(workbook_xml: &str, rels_xml: &str, sheet_names: &[String]) -> Vec<Option<String>> {
    let mut name_to_rid: HashMap<String, String> = HashMap::new();
    let mut reader = Reader::from_str(workbook_xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) if e.name().as_ref() == b"sheet" => {
                if let (Some(name), Some(rid)) = (attr_str(e, b"name"), attr_str(e, b"r:id")) {
                    name_to_rid.insert(unescape_xml(&name), rid);
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    let mut rid_to_target: HashMap<String, String> = HashMap::new();
    let mut reader = Reader::from_str(rels_xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) if e.name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) = (attr_str(e, b"Id"), attr_str(e, b"Target")) {
                    rid_to_target.insert(id, target);
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    sheet_names
        .iter()
        .map(|name| {
            let target = rid_to_target.get(name_to_rid.get(name)?)?;
            // Absolute targets are archive-rooted, relative ones live under xl/
            Some(match target.strip_prefix('/') {
                Some(abs) => abs.to_string(),
                None => format!("xl/{}", target),
            })
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
