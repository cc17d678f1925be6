// Formula parsing and evaluation for the generated-sheet vocabulary:
// literals, A1 refs and ranges (optionally sheet-qualified), + - * /,
// SUM and N. Anything else parses to an error value.

pub mod eval;
pub mod parser;
