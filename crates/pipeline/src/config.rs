use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use espelhos_engine::address::parse_cell_ref;

use crate::error::PipelineError;
use crate::fields::{AliasSet, Field};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Optional pipeline configuration. Every section has defaults that
/// reproduce the built-in behavior, so an empty file is a valid config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Per-field header spellings, keyed by field (`driver`, `cost`, ...).
    /// A listed field replaces its built-in spellings entirely.
    #[serde(default)]
    pub aliases: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Where the mirror builder writes the identity block, as A1 references
/// into the template sheet.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutConfig {
    pub payee: String,
    pub driver: String,
    pub contract: String,
    pub bank: String,
    pub branch: String,
    pub account: String,
    pub payee_name: String,
    pub document: String,
    pub pix: String,
    /// 1-based row where the client item table starts.
    pub first_item_row: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            payee: "C4".into(),
            driver: "C5".into(),
            contract: "F2".into(),
            bank: "F3".into(),
            branch: "F4".into(),
            account: "F5".into(),
            payee_name: "F6".into(),
            document: "F7".into(),
            pix: "F8".into(),
            first_item_row: 11,
        }
    }
}

/// The identity block cells resolved to 0-based (row, col).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityCells {
    pub payee: (usize, usize),
    pub driver: (usize, usize),
    pub contract: (usize, usize),
    pub bank: (usize, usize),
    pub branch: (usize, usize),
    pub account: (usize, usize),
    pub payee_name: (usize, usize),
    pub document: (usize, usize),
    pub pix: (usize, usize),
    /// 0-based first item row.
    pub first_item_row: usize,
}

impl IdentityCells {
    /// The labeled banking lines, top to bottom.
    pub fn labeled(&self) -> [(usize, usize); 7] {
        [
            self.contract,
            self.bank,
            self.branch,
            self.account,
            self.payee_name,
            self.document,
            self.pix,
        ]
    }
}

impl LayoutConfig {
    pub fn identity(&self) -> Result<IdentityCells, PipelineError> {
        let cell = |name: &str, value: &str| {
            parse_cell_ref(value).ok_or_else(|| {
                PipelineError::ConfigValidation(format!("layout.{name}: '{value}' is not a cell reference"))
            })
        };
        if self.first_item_row == 0 {
            return Err(PipelineError::ConfigValidation(
                "layout.first_item_row must be at least 1".into(),
            ));
        }
        Ok(IdentityCells {
            payee: cell("payee", &self.payee)?,
            driver: cell("driver", &self.driver)?,
            contract: cell("contract", &self.contract)?,
            bank: cell("bank", &self.bank)?,
            branch: cell("branch", &self.branch)?,
            account: cell("account", &self.account)?,
            payee_name: cell("payee_name", &self.payee_name)?,
            document: cell("document", &self.document)?,
            pix: cell("pix", &self.pix)?,
            first_item_row: self.first_item_row - 1,
        })
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub consolidated: String,
    pub consolidated_sheet: String,
    pub mirrors: String,
    #[serde(rename = "final")]
    pub final_name: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            consolidated: "banco_consolidado.xlsx".into(),
            consolidated_sheet: "Sheet1".into(),
            mirrors: "Espelhos_Motoristas.xlsx".into(),
            final_name: "Espelhos_Motoristas_FINAL.xlsx".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl PipelineConfig {
    pub fn from_toml(input: &str) -> Result<Self, PipelineError> {
        let config: PipelineConfig =
            toml::from_str(input).map_err(|e| PipelineError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        if !path.is_file() {
            return Err(PipelineError::SourceNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::Io(e.to_string()))?;
        Self::from_toml(&text)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        // Alias overrides must name known fields and list at least one spelling
        for (key, spellings) in &self.aliases {
            if Field::from_key(key).is_none() {
                return Err(PipelineError::ConfigValidation(format!("aliases: unknown field '{key}'")));
            }
            if spellings.iter().all(|s| s.trim().is_empty()) {
                return Err(PipelineError::ConfigValidation(format!(
                    "aliases.{key}: at least one spelling is required"
                )));
            }
        }

        // Identity cells must parse, and the item table must start below them
        let cells = self.layout.identity()?;
        let lowest = cells.labeled().iter().chain([&cells.payee, &cells.driver]).map(|(r, _)| *r).max();
        if let Some(lowest) = lowest {
            if cells.first_item_row <= lowest {
                return Err(PipelineError::ConfigValidation(format!(
                    "layout.first_item_row {} overlaps the identity block (last row {})",
                    self.layout.first_item_row,
                    lowest + 1
                )));
            }
        }

        let names = [
            ("output.consolidated", &self.output.consolidated),
            ("output.consolidated_sheet", &self.output.consolidated_sheet),
            ("output.mirrors", &self.output.mirrors),
            ("output.final", &self.output.final_name),
        ];
        for (name, value) in names {
            if value.trim().is_empty() {
                return Err(PipelineError::ConfigValidation(format!("{name} must not be empty")));
            }
        }

        Ok(())
    }

    /// Built-in spellings with this config's overrides applied.
    pub fn alias_set(&self) -> AliasSet {
        let mut set = AliasSet::default();
        for (key, spellings) in &self.aliases {
            if let Some(field) = Field::from_key(key) {
                let kept: Vec<String> = spellings.iter().filter(|s| !s.trim().is_empty()).cloned().collect();
                set.set(field, &kept);
            }
        }
        set
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
