//! Cell style presets shared by the mirror and summary sheets.
//!
//! A `Style` only touches the aspects it names. Each aspect it does name is
//! replaced whole: setting a font clears the cell's previous font, setting
//! edges redraws all four borders.

use std::ops::RangeInclusive;

use espelhos_engine::cell::{Alignment, CellBorder, CellFormat, NumberFormat, VerticalAlignment};
use espelhos_engine::sheet::Sheet;

/// Accounting mask for money cells.
pub const ACCOUNTING: &str = "R$ #,##0.00_);R$ (#,##0.00)";

pub const GREY: [u8; 4] = [0xD9, 0xD9, 0xD9, 0xFF];
pub const RED: [u8; 4] = [0xFF, 0x00, 0x00, 0xFF];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Bold,
    BoldRed,
    Red,
}

impl Font {
    fn apply(self, fmt: &mut CellFormat) {
        fmt.bold = matches!(self, Font::Bold | Font::BoldRed);
        fmt.italic = false;
        fmt.underline = false;
        fmt.font_size = None;
        fmt.font_family = None;
        fmt.font_color = match self {
            Font::Bold => None,
            Font::BoldRed | Font::Red => Some(RED),
        };
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Center,
    LeftCenter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edges {
    All,
    LeftRight,
    None,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Style {
    font: Option<Font>,
    align: Option<Align>,
    edges: Option<Edges>,
    fill: bool,
    money: bool,
}

impl Style {
    pub const fn new() -> Self {
        Self { font: None, align: None, edges: None, fill: false, money: false }
    }

    pub const fn font(mut self, font: Font) -> Self {
        self.font = Some(font);
        self
    }

    pub const fn bold(self) -> Self {
        self.font(Font::Bold)
    }

    pub const fn center(mut self) -> Self {
        self.align = Some(Align::Center);
        self
    }

    pub const fn left_center(mut self) -> Self {
        self.align = Some(Align::LeftCenter);
        self
    }

    pub const fn edges(mut self, edges: Edges) -> Self {
        self.edges = Some(edges);
        self
    }

    pub const fn boxed(self) -> Self {
        self.edges(Edges::All)
    }

    pub const fn grey(mut self) -> Self {
        self.fill = true;
        self
    }

    pub const fn money(mut self) -> Self {
        self.money = true;
        self
    }

    pub fn apply_to(&self, fmt: &mut CellFormat) {
        if let Some(font) = self.font {
            font.apply(fmt);
        }
        if let Some(align) = self.align {
            fmt.alignment = match align {
                Align::Center => Alignment::Center,
                Align::LeftCenter => Alignment::Left,
            };
            fmt.vertical_alignment = VerticalAlignment::Middle;
            fmt.wrap_text = false;
        }
        if let Some(edges) = self.edges {
            let (horizontal, vertical) = match edges {
                Edges::All => (CellBorder::THIN, CellBorder::THIN),
                Edges::LeftRight => (CellBorder::NONE, CellBorder::THIN),
                Edges::None => (CellBorder::NONE, CellBorder::NONE),
            };
            fmt.border_top = horizontal;
            fmt.border_bottom = horizontal;
            fmt.border_left = vertical;
            fmt.border_right = vertical;
        }
        if self.fill {
            fmt.background_color = Some(GREY);
        }
        if self.money {
            fmt.number_format = NumberFormat::Custom(ACCOUNTING.to_string());
        }
    }

    pub fn apply(&self, sheet: &mut Sheet, row: usize, col: usize) {
        self.apply_to(sheet.format_mut(row, col));
    }

    /// Apply to every column of `cols` on one row.
    pub fn apply_row(&self, sheet: &mut Sheet, row: usize, cols: RangeInclusive<usize>) {
        for col in cols {
            self.apply(sheet, row, col);
        }
    }
}
