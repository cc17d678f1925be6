// Formula parser - converts formula strings into AST
// Supports: numbers, strings, booleans, cell refs (A1, $A$1), ranges (A1:A5),
// sheet prefixes (Sheet1!A1, 'My Sheet'!A1), functions, + - * / and unary minus

/// Expression AST. Sheet names stay unresolved until evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    Boolean(bool),
    CellRef {
        sheet: Option<String>,
        row: usize,
        col: usize,
    },
    Range {
        sheet: Option<String>,
        start_row: usize,
        start_col: usize,
        end_row: usize,
        end_col: usize,
    },
    Function {
        name: String,
        args: Vec<Expr>,
    },
    BinaryOp {
        op: Op,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Negate(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

/// Parse a formula string (must start with '=') into an AST.
pub fn parse(formula: &str) -> Result<Expr, String> {
    let formula = formula.trim();
    let input = formula
        .strip_prefix('=')
        .ok_or_else(|| "Formula must start with =".to_string())?;

    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err("Empty formula".to_string());
    }

    let mut parser = Parser { tokens: &tokens, pos: 0 };
    let expr = parser.parse_expr()?;
    if parser.pos != tokens.len() {
        return Err(format!("Unexpected token at position {}", parser.pos));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    StringLit(String),
    CellRef { row: usize, col: usize },
    /// Sheet name prefix (e.g., "Sheet1" from "Sheet1!A1")
    SheetPrefix(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Colon,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => { chars.next(); }
            '+' => { tokens.push(Token::Plus); chars.next(); }
            '-' => { tokens.push(Token::Minus); chars.next(); }
            '*' => { tokens.push(Token::Star); chars.next(); }
            '/' => { tokens.push(Token::Slash); chars.next(); }
            '(' => { tokens.push(Token::LParen); chars.next(); }
            ')' => { tokens.push(Token::RParen); chars.next(); }
            ':' => { tokens.push(Token::Colon); chars.next(); }
            ',' | ';' => { tokens.push(Token::Comma); chars.next(); }
            '"' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('"') if chars.peek() == Some(&'"') => {
                            chars.next();
                            s.push('"');
                        }
                        Some('"') => break,
                        Some(ch) => s.push(ch),
                        None => return Err("Unterminated string literal".to_string()),
                    }
                }
                tokens.push(Token::StringLit(s));
            }
            '\'' => {
                // Quoted sheet name; doubled quotes inside escape a single quote
                chars.next();
                let mut sheet_name = String::new();
                loop {
                    match chars.next() {
                        Some('\'') if chars.peek() == Some(&'\'') => {
                            chars.next();
                            sheet_name.push('\'');
                        }
                        Some('\'') => break,
                        Some(ch) => sheet_name.push(ch),
                        None => return Err("Unterminated sheet name".to_string()),
                    }
                }
                if chars.next() != Some('!') {
                    return Err("Quoted sheet name must be followed by !".to_string());
                }
                tokens.push(Token::SheetPrefix(sheet_name));
            }
            '0'..='9' | '.' => {
                let mut num_str = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        num_str.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let num: f64 = num_str.parse().map_err(|_| format!("Invalid number: {}", num_str))?;
                tokens.push(Token::Number(num));
            }
            c if c.is_alphabetic() || c == '$' || c == '_' => {
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' || ch == '$' || ch == '.' {
                        ident.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }

                if chars.peek() == Some(&'!') {
                    chars.next();
                    tokens.push(Token::SheetPrefix(ident));
                    continue;
                }

                if let Some((row, col)) = crate::address::parse_cell_ref(&ident) {
                    tokens.push(Token::CellRef { row, col });
                } else {
                    tokens.push(Token::Ident(ident.to_uppercase()));
                }
            }
            _ => return Err(format!("Unexpected character: {}", c)),
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let tok = self.tokens.get(self.pos);
        self.pos += 1;
        tok
    }

    fn expect(&mut self, expected: &Token) -> Result<(), String> {
        match self.next() {
            Some(tok) if tok == expected => Ok(()),
            Some(tok) => Err(format!("Expected {:?}, found {:?}", expected, tok)),
            None => Err(format!("Expected {:?}, found end of formula", expected)),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => Op::Add,
                Some(Token::Minus) => Op::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_term()?;
            left = Expr::BinaryOp { op, left: Box::new(left), right: Box::new(right) };
        }
    }

    fn parse_term(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => Op::Mul,
                Some(Token::Slash) => Op::Div,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::BinaryOp { op, left: Box::new(left), right: Box::new(right) };
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(Expr::Negate(Box::new(self.parse_unary()?)))
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.parse_unary()
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Number(*n)),
            Some(Token::StringLit(s)) => Ok(Expr::Text(s.clone())),
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::SheetPrefix(name)) => match self.next() {
                Some(Token::CellRef { row, col }) => self.parse_ref(Some(name.clone()), *row, *col),
                other => Err(format!("Expected cell reference after sheet '{}', found {:?}", name, other)),
            },
            Some(Token::CellRef { row, col }) => self.parse_ref(None, *row, *col),
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    let args = self.parse_args()?;
                    return Ok(Expr::Function { name: name.clone(), args });
                }
                match name.as_str() {
                    "TRUE" => Ok(Expr::Boolean(true)),
                    "FALSE" => Ok(Expr::Boolean(false)),
                    _ => Err(format!("Unknown identifier: {}", name)),
                }
            }
            Some(tok) => Err(format!("Unexpected token: {:?}", tok)),
            None => Err("Unexpected end of formula".to_string()),
        }
    }

    fn parse_ref(&mut self, sheet: Option<String>, row: usize, col: usize) -> Result<Expr, String> {
        if self.peek() != Some(&Token::Colon) {
            return Ok(Expr::CellRef { sheet, row, col });
        }
        self.pos += 1;
        match self.next() {
            Some(Token::CellRef { row: end_row, col: end_col }) => Ok(Expr::Range {
                sheet,
                start_row: row.min(*end_row),
                start_col: col.min(*end_col),
                end_row: row.max(*end_row),
                end_col: col.max(*end_col),
            }),
            other => Err(format!("Expected range end, found {:?}", other)),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, String> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                other => return Err(format!("Expected , or ) in argument list, found {:?}", other)),
            }
        }
    }
}
