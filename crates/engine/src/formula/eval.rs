// Formula evaluator - walks the AST against a workbook.
// Sheet names resolve case-insensitively at evaluation time, so a formula
// keeps working after the sheet it points at is rebuilt or edited.

use crate::cell::CellValue;
use crate::workbook::Workbook;

use super::parser::{Expr, Op};

/// Nested formula evaluations deeper than this are treated as circular.
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
    Error(String),
}

impl Value {
    /// Numeric coercion used by arithmetic: empty is 0, text must parse.
    fn to_number(&self) -> Result<f64, String> {
        match self {
            Value::Empty => Ok(0.0),
            Value::Number(n) => Ok(*n),
            Value::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Text(s) if s.trim().is_empty() => Ok(0.0),
            Value::Text(s) => s.trim().parse().map_err(|_| "#VALUE!".to_string()),
            Value::Error(e) => Err(e.clone()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }
}

/// Evaluation context: which sheet unqualified references belong to.
struct Ctx<'a> {
    workbook: &'a Workbook,
    sheet: usize,
    depth: usize,
}

/// Evaluate the cell at (row, col) on `sheet_name`.
pub fn evaluate_cell(workbook: &Workbook, sheet_name: &str, row: usize, col: usize) -> Value {
    match workbook.sheet_index(sheet_name) {
        Some(sheet) => cell_value(&Ctx { workbook, sheet, depth: 0 }, sheet, row, col),
        None => Value::Error("#REF!".to_string()),
    }
}

fn cell_value(ctx: &Ctx, sheet: usize, row: usize, col: usize) -> Value {
    let Some(s) = ctx.workbook.sheet(sheet) else {
        return Value::Error("#REF!".to_string());
    };
    match s.value(row, col) {
        CellValue::Empty => Value::Empty,
        CellValue::Text(t) => Value::Text(t.clone()),
        CellValue::Number(n) => Value::Number(*n),
        CellValue::Bool(b) => Value::Boolean(*b),
        CellValue::Formula { ast: None, .. } => Value::Error("#NAME?".to_string()),
        CellValue::Formula { ast: Some(expr), .. } => {
            if ctx.depth >= MAX_DEPTH {
                return Value::Error("#CIRC!".to_string());
            }
            let inner = Ctx { workbook: ctx.workbook, sheet, depth: ctx.depth + 1 };
            evaluate(&inner, expr)
        }
    }
}

fn resolve_sheet(ctx: &Ctx, sheet: &Option<String>) -> Option<usize> {
    match sheet {
        Some(name) => ctx.workbook.sheet_index(name),
        None => Some(ctx.sheet),
    }
}

fn evaluate(ctx: &Ctx, expr: &Expr) -> Value {
    match expr {
        Expr::Number(n) => Value::Number(*n),
        Expr::Text(s) => Value::Text(s.clone()),
        Expr::Boolean(b) => Value::Boolean(*b),
        Expr::CellRef { sheet, row, col } => match resolve_sheet(ctx, sheet) {
            Some(idx) => cell_value(ctx, idx, *row, *col),
            None => Value::Error("#REF!".to_string()),
        },
        // A bare range outside a function behaves like its first cell
        Expr::Range { sheet, start_row, start_col, .. } => match resolve_sheet(ctx, sheet) {
            Some(idx) => cell_value(ctx, idx, *start_row, *start_col),
            None => Value::Error("#REF!".to_string()),
        },
        Expr::Negate(inner) => match evaluate(ctx, inner).to_number() {
            Ok(n) => Value::Number(-n),
            Err(e) => Value::Error(e),
        },
        Expr::BinaryOp { op, left, right } => {
            let l = match evaluate(ctx, left).to_number() {
                Ok(n) => n,
                Err(e) => return Value::Error(e),
            };
            let r = match evaluate(ctx, right).to_number() {
                Ok(n) => n,
                Err(e) => return Value::Error(e),
            };
            match op {
                Op::Add => Value::Number(l + r),
                Op::Sub => Value::Number(l - r),
                Op::Mul => Value::Number(l * r),
                Op::Div if r == 0.0 => Value::Error("#DIV/0!".to_string()),
                Op::Div => Value::Number(l / r),
            }
        }
        Expr::Function { name, args } => call(ctx, name, args),
    }
}

fn call(ctx: &Ctx, name: &str, args: &[Expr]) -> Value {
    match name {
        "SUM" => {
            let mut total = 0.0;
            for arg in args {
                match arg {
                    Expr::Range { sheet, start_row, start_col, end_row, end_col } => {
                        let Some(idx) = resolve_sheet(ctx, sheet) else {
                            return Value::Error("#REF!".to_string());
                        };
                        for r in *start_row..=*end_row {
                            for c in *start_col..=*end_col {
                                // Text and blanks inside a range are skipped
                                match cell_value(ctx, idx, r, c) {
                                    Value::Number(n) => total += n,
                                    Value::Error(e) => return Value::Error(e),
                                    _ => {}
                                }
                            }
                        }
                    }
                    other => match evaluate(ctx, other).to_number() {
                        Ok(n) => total += n,
                        Err(e) => return Value::Error(e),
                    },
                }
            }
            Value::Number(total)
        }
        "N" => {
            if args.len() != 1 {
                return Value::Error("#VALUE!".to_string());
            }
            match evaluate(ctx, &args[0]) {
                Value::Number(n) => Value::Number(n),
                Value::Boolean(b) => Value::Number(if b { 1.0 } else { 0.0 }),
                Value::Error(e) => Value::Error(e),
                Value::Empty | Value::Text(_) => Value::Number(0.0),
            }
        }
        _ => Value::Error("#NAME?".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::Sheet;

    fn book() -> Workbook {
        let mut ana = Sheet::new("Ana Silva");
        ana.set_value(19, 5, CellValue::Number(100.0));
        ana.set_value(20, 5, CellValue::Number(50.0));
        ana.set_value(21, 5, CellValue::text("obs"));
        ana.set_value(22, 5, CellValue::formula("=SUM(F20:F22)"));
        let mut wb = Workbook::new();
        wb.add_sheet(ana);
        wb.add_sheet_named("RESUMO");
        wb
    }

    #[test]
    fn sum_skips_text_and_follows_formulas() {
        let mut wb = book();
        wb.sheet_by_name_mut("RESUMO")
            .unwrap()
            .set_value(0, 0, CellValue::formula("='Ana Silva'!F23"));
        assert_eq!(wb.evaluate("Ana Silva", 22, 5), Value::Number(150.0));
        assert_eq!(wb.evaluate("RESUMO", 0, 0), Value::Number(150.0));
    }

    #[test]
    fn n_turns_blank_into_zero() {
        let mut wb = book();
        let s = wb.sheet_by_name_mut("RESUMO").unwrap();
        s.set_value(0, 3, CellValue::Number(80.0));
        s.set_value(0, 5, CellValue::formula("=D1-N(E1)"));
        assert_eq!(wb.evaluate("RESUMO", 0, 5), Value::Number(80.0));
    }

    #[test]
    fn missing_sheet_is_ref_error() {
        let mut wb = book();
        wb.sheet_by_name_mut("RESUMO")
            .unwrap()
            .set_value(0, 0, CellValue::formula("='Nobody'!F1"));
        assert_eq!(wb.evaluate("RESUMO", 0, 0), Value::Error("#REF!".into()));
        assert!(wb.evaluate("Nope", 0, 0).is_error());
    }

    #[test]
    fn self_reference_stops() {
        let mut wb = book();
        wb.sheet_by_name_mut("RESUMO")
            .unwrap()
            .set_value(0, 0, CellValue::formula("=A1+1"));
        assert_eq!(wb.evaluate("RESUMO", 0, 0), Value::Error("#CIRC!".into()));
    }

    #[test]
    fn division_by_zero() {
        let mut wb = book();
        wb.sheet_by_name_mut("RESUMO")
            .unwrap()
            .set_value(0, 0, CellValue::formula("=1/B9"));
        assert_eq!(wb.evaluate("RESUMO", 0, 0), Value::Error("#DIV/0!".into()));
    }
}
