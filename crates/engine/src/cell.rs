use super::formula::parser::{self, Expr};

/// Horizontal text alignment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Alignment {
    #[default]
    General,
    Left,
    Center,
    Right,
}

/// Vertical text alignment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VerticalAlignment {
    Top,
    Middle,
    #[default]
    Bottom,
}

/// Border line style for one edge of a cell
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BorderStyle {
    #[default]
    None,
    Thin,
    Medium,
    Thick,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellBorder {
    pub style: BorderStyle,
    pub color: Option<[u8; 4]>,
}

impl CellBorder {
    pub const NONE: CellBorder = CellBorder { style: BorderStyle::None, color: None };
    pub const THIN: CellBorder = CellBorder { style: BorderStyle::Thin, color: None };
}

/// Number format attached to a cell.
///
/// Built-in ids are kept as ids so an imported template writes back
/// the same format the spreadsheet application knows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NumberFormat {
    #[default]
    General,
    Builtin(u16),
    Custom(String),
}

/// Cell formatting options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellFormat {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub font_size: Option<f32>,
    pub font_color: Option<[u8; 4]>,
    pub font_family: Option<String>,
    pub background_color: Option<[u8; 4]>,
    pub border_top: CellBorder,
    pub border_right: CellBorder,
    pub border_bottom: CellBorder,
    pub border_left: CellBorder,
    pub alignment: Alignment,
    pub vertical_alignment: VerticalAlignment,
    pub wrap_text: bool,
    pub number_format: NumberFormat,
}

impl CellFormat {
    /// True when the format would be visible on an empty cell.
    pub fn is_visible_when_empty(&self) -> bool {
        self.background_color.is_some()
            || self.border_top.style != BorderStyle::None
            || self.border_right.style != BorderStyle::None
            || self.border_bottom.style != BorderStyle::None
            || self.border_left.style != BorderStyle::None
    }

    pub fn is_default(&self) -> bool {
        *self == CellFormat::default()
    }
}

#[derive(Debug, Clone, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Formula { source: String, ast: Option<Expr> },
}

impl PartialEq for CellValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CellValue::Empty, CellValue::Empty) => true,
            (CellValue::Text(a), CellValue::Text(b)) => a == b,
            (CellValue::Number(a), CellValue::Number(b)) => a == b,
            (CellValue::Bool(a), CellValue::Bool(b)) => a == b,
            (CellValue::Formula { source: a, .. }, CellValue::Formula { source: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl CellValue {
    pub fn text(s: impl Into<String>) -> Self {
        CellValue::Text(s.into())
    }

    /// Build a formula value. A missing leading '=' is added.
    pub fn formula(source: impl Into<String>) -> Self {
        let mut source = source.into();
        if !source.starts_with('=') {
            source.insert(0, '=');
        }
        let ast = parser::parse(&source).ok();
        CellValue::Formula { source, ast }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Text the way a spreadsheet shows the stored value (formulas as source).
    pub fn raw_display(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Bool(b) => if *b { "TRUE".to_string() } else { "FALSE".to_string() },
            CellValue::Formula { source, .. } => source.clone(),
        }
    }
}

/// Integers without a fractional part, everything else with its shortest repr.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Cell {
    pub value: CellValue,
    pub format: CellFormat,
}
