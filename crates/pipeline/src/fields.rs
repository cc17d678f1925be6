//! Logical fields and their accepted header spellings.
//!
//! Every column the pipeline reads is addressed through a `Field`. A table
//! is resolved once into a `FieldMap`; after that no code looks at header
//! text again.

use std::collections::BTreeMap;
use std::fmt;

use espelhos_engine::table::{normalize_header, RowTable};

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Driver,
    Provider,
    Contract,
    Date,
    Cnpj,
    Cpf,
    Bank,
    Branch,
    Account,
    Pix,
    Client,
    Order,
    City,
    Status,
    Cost,
}

impl Field {
    pub const ALL: [Field; 15] = [
        Field::Driver,
        Field::Provider,
        Field::Contract,
        Field::Date,
        Field::Cnpj,
        Field::Cpf,
        Field::Bank,
        Field::Branch,
        Field::Account,
        Field::Pix,
        Field::Client,
        Field::Order,
        Field::City,
        Field::Status,
        Field::Cost,
    ];

    /// Key used for this field in the `[aliases]` config table.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Driver => "driver",
            Self::Provider => "provider",
            Self::Contract => "contract",
            Self::Date => "date",
            Self::Cnpj => "cnpj",
            Self::Cpf => "cpf",
            Self::Bank => "bank",
            Self::Branch => "branch",
            Self::Account => "account",
            Self::Pix => "pix",
            Self::Client => "client",
            Self::Order => "order",
            Self::City => "city",
            Self::Status => "status",
            Self::Cost => "cost",
        }
    }

    pub fn from_key(key: &str) -> Option<Field> {
        Field::ALL.iter().copied().find(|f| f.key() == key.trim())
    }

    /// Built-in header spellings, most specific first.
    pub fn default_aliases(&self) -> &'static [&'static str] {
        match self {
            Self::Driver => &["nome do motorista", "motorista", "nome"],
            Self::Provider => &[
                "prestador",
                "nome do prestador",
                "prestador de serviço",
                "prestador de servico",
            ],
            Self::Contract => &["contrato", "número do contrato", "numero do contrato", "nº do contrato"],
            Self::Date => &["data", "data da entrega", "data de entrega", "data do romaneio"],
            Self::Cnpj => &["cnpj", "cnpj do favorecido", "cnpj/cpf", "cpf/cnpj"],
            Self::Cpf => &["cpf", "cpf do favorecido", "cpf/cnpj", "cnpj/cpf"],
            Self::Bank => &["banco"],
            Self::Branch => &["agencia", "agência"],
            Self::Account => &["conta", "conta corrente"],
            Self::Pix => &["pix", "chave pix"],
            Self::Client => &["cliente"],
            Self::Order => &["romaneio"],
            Self::City => &["cidade"],
            Self::Status => &["status"],
            Self::Cost => &["custo", "valor", "valor unitario", "valor unitário"],
        }
    }
}

impl fmt::Display for Field {
    /// Fields print as their canonical header, which is what operators see
    /// in their spreadsheets.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let canonical = self.default_aliases().first().copied().unwrap_or_else(|| self.key());
        write!(f, "{canonical}")
    }
}

// ---------------------------------------------------------------------------
// Alias set
// ---------------------------------------------------------------------------

/// Ordered header spellings for every field.
#[derive(Debug, Clone, PartialEq)]
pub struct AliasSet {
    aliases: BTreeMap<Field, Vec<String>>,
}

impl Default for AliasSet {
    fn default() -> Self {
        let aliases = Field::ALL
            .iter()
            .map(|f| (*f, f.default_aliases().iter().map(|a| a.to_string()).collect()))
            .collect();
        Self { aliases }
    }
}

impl AliasSet {
    /// Replace the spellings of one field. Spellings are normalized the way
    /// table headers are.
    pub fn set(&mut self, field: Field, spellings: &[String]) {
        let normalized = spellings.iter().map(|s| normalize_header(s)).collect();
        self.aliases.insert(field, normalized);
    }

    pub fn aliases(&self, field: Field) -> &[String] {
        self.aliases.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First spelling of `field` present in `table`.
    pub fn resolve(&self, field: Field, table: &RowTable) -> Option<usize> {
        self.aliases(field).iter().find_map(|a| table.column_index(a))
    }
}

// ---------------------------------------------------------------------------
// Field map
// ---------------------------------------------------------------------------

/// Field-to-column resolution for one table.
#[derive(Debug, Clone)]
pub struct FieldMap {
    table: String,
    columns: BTreeMap<Field, usize>,
}

impl FieldMap {
    /// Resolve every field against `table`. Fields with no spelling present
    /// are simply absent from the map.
    pub fn resolve(table_name: &str, table: &RowTable, aliases: &AliasSet) -> Self {
        let columns = Field::ALL
            .iter()
            .filter_map(|f| aliases.resolve(*f, table).map(|col| (*f, col)))
            .collect();
        Self { table: table_name.to_string(), columns }
    }

    pub fn get(&self, field: Field) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    pub fn require(&self, field: Field) -> Result<usize, PipelineError> {
        self.get(field).ok_or_else(|| PipelineError::MissingColumn {
            table: self.table.clone(),
            field: field.to_string(),
        })
    }

    /// The document column: CNPJ-like or CPF-like, whichever exists.
    pub fn require_document(&self) -> Result<(), PipelineError> {
        if self.get(Field::Cnpj).is_some() || self.get(Field::Cpf).is_some() {
            Ok(())
        } else {
            Err(PipelineError::MissingColumn {
                table: self.table.clone(),
                field: "cpf/cnpj".to_string(),
            })
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use espelhos_engine::table::Datum;

    fn table(headers: &[&str]) -> RowTable {
        RowTable::new(headers, vec![vec![Datum::Empty; headers.len()]])
    }

    #[test]
    fn first_present_spelling_wins() {
        let t = table(&["Nome", "Motorista"]);
        let aliases = AliasSet::default();
        // "motorista" is listed before "nome"
        assert_eq!(aliases.resolve(Field::Driver, &t), Some(1));
    }

    #[test]
    fn header_spelling_noise_is_ignored() {
        let t = table(&["  NOME DO MOTORISTA ", "Agência"]);
        let map = FieldMap::resolve("roster", &t, &AliasSet::default());
        assert_eq!(map.get(Field::Driver), Some(0));
        assert_eq!(map.get(Field::Branch), Some(1));
        assert_eq!(map.get(Field::Bank), None);
    }

    #[test]
    fn overrides_replace_builtin_spellings() {
        let mut aliases = AliasSet::default();
        aliases.set(Field::Driver, &["Condutor".to_string()]);
        let t = table(&["condutor", "motorista"]);
        assert_eq!(aliases.resolve(Field::Driver, &t), Some(0));
        assert_eq!(aliases.aliases(Field::Driver), &["condutor".to_string()]);
    }

    #[test]
    fn require_reports_canonical_header() {
        let map = FieldMap::resolve("settlement", &table(&["cliente"]), &AliasSet::default());
        let err = map.require(Field::Driver).unwrap_err();
        assert!(err.to_string().contains("nome do motorista"));
        assert!(err.to_string().contains("settlement"));
        assert!(map.require(Field::Client).is_ok());
    }

    #[test]
    fn document_accepts_either_spelling() {
        let cnpj = FieldMap::resolve("t", &table(&["cnpj do favorecido"]), &AliasSet::default());
        assert!(cnpj.require_document().is_ok());
        let none = FieldMap::resolve("t", &table(&["banco"]), &AliasSet::default());
        assert!(none.require_document().unwrap_err().to_string().contains("cpf/cnpj"));
    }

    #[test]
    fn keys_round_trip() {
        for f in Field::ALL {
            assert_eq!(Field::from_key(f.key()), Some(f));
        }
        assert_eq!(Field::from_key("nope"), None);
    }
}
