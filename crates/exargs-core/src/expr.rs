//! Restricted expression evaluation for `${{ expr }}` blocks
//!
//! A hand-written lexer and recursive-descent parser over a small,
//! side-effect-free grammar: literals, identifiers, arithmetic
//! (`+ - * / % **`), bitwise xor (`^`), logical `&&`/`||` (also spelled
//! `and`/`or`), chainable comparisons (`a < b < c`), unary `-` and
//! `!`/`not`, and calls to a fixed whitelist of functions
//! (`min, max, abs, int, float, bool`). The whitelist is structural: the
//! grammar cannot express anything else, so there is no general evaluation
//! mechanism to escape from.
//!
//! Identifier lookups go through the [`Scope`] trait, which the resolver
//! implements with its resolved-cache / flat-map / environment tiers.

use crate::error::{Error, Result};
use crate::value::Value;

/// Identifier lookup context supplied by the caller.
///
/// Lookup may mutate the scope (the resolver memoizes recursively resolved
/// values), hence `&mut self`.
pub trait Scope {
    /// Resolve an identifier to a value, or fail if it is unknown
    fn lookup(&mut self, name: &str) -> Result<Value>;
}

/// Evaluate an expression against the given scope.
///
/// Any failure (invalid syntax, unknown function, failed lookup, operator
/// type mismatch) fails the whole evaluation; there is no partial recovery.
pub fn evaluate(input: &str, scope: &mut dyn Scope) -> Result<Value> {
    let src = input.trim();
    let tokens = tokenize(src).map_err(|msg| Error::expression(src, msg))?;
    let expr = Parser::new(tokens)
        .parse()
        .map_err(|msg| Error::expression(src, msg))?;
    eval_expr(&expr, scope).map_err(|msg| Error::expression(src, msg))
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Integer(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Literal(Value),
    And,
    Or,
    Not,
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    Caret,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> std::result::Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '^' => {
                tokens.push(Token::Caret);
                i += 1;
            }
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    tokens.push(Token::StarStar);
                    i += 2;
                } else {
                    tokens.push(Token::Star);
                    i += 1;
                }
            }
            '&' => {
                if chars.get(i + 1) == Some(&'&') {
                    tokens.push(Token::And);
                    i += 2;
                } else {
                    return Err("unexpected character '&' (use '&&')".into());
                }
            }
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    tokens.push(Token::Or);
                    i += 2;
                } else {
                    return Err("unexpected character '|' (use '||')".into());
                }
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Eq);
                    i += 2;
                } else {
                    return Err("assignment is not supported (use '==')".into());
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ne);
                    i += 2;
                } else {
                    tokens.push(Token::Not);
                    i += 1;
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some('\\') => {
                            match chars.get(i + 1) {
                                Some(&esc) if esc == quote || esc == '\\' => s.push(esc),
                                Some(&esc) => {
                                    s.push('\\');
                                    s.push(esc);
                                }
                                None => return Err("unterminated string literal".into()),
                            }
                            i += 2;
                        }
                        Some(&ch) => {
                            s.push(ch);
                            i += 1;
                        }
                        None => return Err("unterminated string literal".into()),
                    }
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                let mut is_float = false;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                if chars.get(i) == Some(&'.')
                    && chars.get(i + 1).is_some_and(char::is_ascii_digit)
                {
                    is_float = true;
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                if is_float {
                    let n: f64 = text
                        .parse()
                        .map_err(|_| format!("invalid number literal '{}'", text))?;
                    tokens.push(Token::Float(n));
                } else {
                    let n: i64 = text
                        .parse()
                        .map_err(|_| format!("integer literal '{}' out of range", text))?;
                    tokens.push(Token::Integer(n));
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                // Dotted identifiers reference flat keys like `base.dir`
                while chars.get(i) == Some(&'.')
                    && chars
                        .get(i + 1)
                        .is_some_and(|&ch| ch.is_ascii_alphabetic() || ch == '_')
                {
                    i += 1;
                    while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_')
                    {
                        i += 1;
                    }
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "true" | "True" => Token::Literal(Value::Bool(true)),
                    "false" | "False" => Token::Literal(Value::Bool(false)),
                    "None" | "null" => Token::Literal(Value::Null),
                    _ => Token::Ident(word),
                });
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Xor,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Ident(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Chained comparison such as `a < b < c`
    Compare {
        first: Box<Expr>,
        rest: Vec<(CmpOp, Expr)>,
    },
    Call {
        func: String,
        args: Vec<Expr>,
    },
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type ParseResult = std::result::Result<Expr, String>;

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn parse(mut self) -> ParseResult {
        let expr = self.parse_or()?;
        match self.peek() {
            None => Ok(expr),
            Some(tok) => Err(format!("unexpected token {:?} after expression", tok)),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> ParseResult {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::Or) {
            let rhs = self.parse_and()?;
            lhs = Expr::Binary {
                op: BinOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> ParseResult {
        let mut lhs = self.parse_not()?;
        while self.eat(&Token::And) {
            let rhs = self.parse_not()?;
            lhs = Expr::Binary {
                op: BinOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> ParseResult {
        if self.eat(&Token::Not) {
            let operand = self.parse_not()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> ParseResult {
        let first = self.parse_xor()?;
        let mut rest = Vec::new();

        while let Some(op) = self.peek().and_then(|tok| match tok {
            Token::Eq => Some(CmpOp::Eq),
            Token::Ne => Some(CmpOp::Ne),
            Token::Lt => Some(CmpOp::Lt),
            Token::Le => Some(CmpOp::Le),
            Token::Gt => Some(CmpOp::Gt),
            Token::Ge => Some(CmpOp::Ge),
            _ => None,
        }) {
            self.pos += 1;
            let rhs = self.parse_xor()?;
            rest.push((op, rhs));
        }

        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare {
                first: Box::new(first),
                rest,
            })
        }
    }

    fn parse_xor(&mut self) -> ParseResult {
        let mut lhs = self.parse_additive()?;
        while self.eat(&Token::Caret) {
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary {
                op: BinOp::Xor,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> ParseResult {
        let mut lhs = self.parse_term()?;
        loop {
            let op = if self.eat(&Token::Plus) {
                BinOp::Add
            } else if self.eat(&Token::Minus) {
                BinOp::Sub
            } else {
                break;
            };
            let rhs = self.parse_term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> ParseResult {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = if self.eat(&Token::Star) {
                BinOp::Mul
            } else if self.eat(&Token::Slash) {
                BinOp::Div
            } else if self.eat(&Token::Percent) {
                BinOp::Mod
            } else {
                break;
            };
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> ParseResult {
        if self.eat(&Token::Minus) {
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> ParseResult {
        let base = self.parse_atom()?;
        if self.eat(&Token::StarStar) {
            // Right-associative; exponent may carry its own unary minus
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary {
                op: BinOp::Pow,
                lhs: Box::new(base),
                rhs: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn parse_atom(&mut self) -> ParseResult {
        match self.advance() {
            Some(Token::Integer(n)) => Ok(Expr::Literal(Value::Integer(n))),
            Some(Token::Float(n)) => Ok(Expr::Literal(Value::Float(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Literal(v)) => Ok(Expr::Literal(v)),
            Some(Token::Ident(name)) => {
                if self.eat(&Token::LParen) {
                    let args = self.parse_args()?;
                    Ok(Expr::Call { func: name, args })
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            Some(Token::LParen) => {
                let expr = self.parse_or()?;
                if !self.eat(&Token::RParen) {
                    return Err("expected ')'".into());
                }
                Ok(expr)
            }
            Some(tok) => Err(format!("unexpected token {:?}", tok)),
            None => Err("unexpected end of expression".into()),
        }
    }

    fn parse_args(&mut self) -> std::result::Result<Vec<Expr>, String> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_or()?);
            if self.eat(&Token::Comma) {
                continue;
            }
            if self.eat(&Token::RParen) {
                return Ok(args);
            }
            return Err("expected ',' or ')' in argument list".into());
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

type EvalResult = std::result::Result<Value, String>;

fn eval_expr(expr: &Expr, scope: &mut dyn Scope) -> EvalResult {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Ident(name) => scope.lookup(name).map_err(|e| match e.kind {
            crate::error::ErrorKind::UnresolvedVariable { .. } => {
                format!("unresolved identifier '{}'", name)
            }
            _ => e.to_string(),
        }),
        Expr::Unary { op, operand } => {
            let value = eval_expr(operand, scope)?;
            eval_unary(*op, value)
        }
        Expr::Binary { op, lhs, rhs } => match op {
            // Short-circuit: the deciding operand is the result
            BinOp::And => {
                let left = eval_expr(lhs, scope)?;
                if left.is_truthy() {
                    eval_expr(rhs, scope)
                } else {
                    Ok(left)
                }
            }
            BinOp::Or => {
                let left = eval_expr(lhs, scope)?;
                if left.is_truthy() {
                    Ok(left)
                } else {
                    eval_expr(rhs, scope)
                }
            }
            _ => {
                let left = eval_expr(lhs, scope)?;
                let right = eval_expr(rhs, scope)?;
                eval_binary(*op, left, right)
            }
        },
        Expr::Compare { first, rest } => {
            // a < b < c evaluates as (a < b) and (b < c), stopping at the
            // first comparison that fails
            let mut current = eval_expr(first, scope)?;
            for (op, rhs_expr) in rest {
                let rhs = eval_expr(rhs_expr, scope)?;
                if !compare(*op, &current, &rhs)? {
                    return Ok(Value::Bool(false));
                }
                current = rhs;
            }
            Ok(Value::Bool(true))
        }
        Expr::Call { func, args } => {
            let values: Vec<Value> = args
                .iter()
                .map(|a| eval_expr(a, scope))
                .collect::<std::result::Result<_, _>>()?;
            eval_call(func, values)
        }
    }
}

fn eval_unary(op: UnaryOp, value: Value) -> EvalResult {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
        UnaryOp::Neg => match value {
            Value::Integer(i) => i
                .checked_neg()
                .map(Value::Integer)
                .ok_or_else(|| "integer overflow in negation".into()),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(format!("cannot negate {}", other.type_name())),
        },
    }
}

fn eval_binary(op: BinOp, lhs: Value, rhs: Value) -> EvalResult {
    use Value::{Float, Integer, String as Str};

    match (op, &lhs, &rhs) {
        (BinOp::Add, Str(a), Str(b)) => return Ok(Str(format!("{}{}", a, b))),
        (BinOp::Xor, &Integer(a), &Integer(b)) => return Ok(Integer(a ^ b)),
        (BinOp::Xor, Value::Bool(a), Value::Bool(b)) => return Ok(Value::Bool(a ^ b)),
        (BinOp::Xor, ..) => {
            return Err(format!(
                "unsupported operand types for ^: {} and {}",
                lhs.type_name(),
                rhs.type_name()
            ))
        }
        _ => {}
    }

    let type_err = || {
        format!(
            "unsupported operand types for {}: {} and {}",
            match op {
                BinOp::Add => "+",
                BinOp::Sub => "-",
                BinOp::Mul => "*",
                BinOp::Div => "/",
                BinOp::Mod => "%",
                BinOp::Pow => "**",
                _ => "?",
            },
            lhs.type_name(),
            rhs.type_name()
        )
    };

    // Integer arithmetic stays integral; any float operand promotes
    if let (&Integer(a), &Integer(b)) = (&lhs, &rhs) {
        return match op {
            BinOp::Add => a
                .checked_add(b)
                .map(Integer)
                .ok_or_else(|| "integer overflow in +".into()),
            BinOp::Sub => a
                .checked_sub(b)
                .map(Integer)
                .ok_or_else(|| "integer overflow in -".into()),
            BinOp::Mul => a
                .checked_mul(b)
                .map(Integer)
                .ok_or_else(|| "integer overflow in *".into()),
            BinOp::Div => {
                // True division: integer operands still produce a float
                if b == 0 {
                    Err("division by zero".into())
                } else {
                    Ok(Float(a as f64 / b as f64))
                }
            }
            BinOp::Mod => {
                if b == 0 {
                    Err("modulo by zero".into())
                } else {
                    // Result takes the sign of the divisor
                    Ok(Integer(((a % b) + b) % b))
                }
            }
            BinOp::Pow => {
                if b >= 0 {
                    let exp = u32::try_from(b).map_err(|_| "exponent too large".to_string())?;
                    a.checked_pow(exp)
                        .map(Integer)
                        .ok_or_else(|| "integer overflow in **".into())
                } else {
                    Ok(Float((a as f64).powf(b as f64)))
                }
            }
            _ => Err(type_err()),
        };
    }

    let (a, b) = match (lhs.as_f64(), rhs.as_f64()) {
        (Some(a), Some(b)) => (a, b),
        _ => return Err(type_err()),
    };
    match op {
        BinOp::Add => Ok(Float(a + b)),
        BinOp::Sub => Ok(Float(a - b)),
        BinOp::Mul => Ok(Float(a * b)),
        BinOp::Div => {
            if b == 0.0 {
                Err("division by zero".into())
            } else {
                Ok(Float(a / b))
            }
        }
        BinOp::Mod => {
            if b == 0.0 {
                Err("modulo by zero".into())
            } else {
                Ok(Float(a - (a / b).floor() * b))
            }
        }
        BinOp::Pow => Ok(Float(a.powf(b))),
        _ => Err(type_err()),
    }
}

fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs.as_f64(), rhs.as_f64()) {
        // Cross-type numeric equality (1 == 1.0)
        (Some(a), Some(b)) => a == b,
        _ => lhs == rhs,
    }
}

fn compare(op: CmpOp, lhs: &Value, rhs: &Value) -> std::result::Result<bool, String> {
    match op {
        CmpOp::Eq => return Ok(values_equal(lhs, rhs)),
        CmpOp::Ne => return Ok(!values_equal(lhs, rhs)),
        _ => {}
    }

    let ordering = if let (Some(a), Some(b)) = (lhs.as_f64(), rhs.as_f64()) {
        a.partial_cmp(&b)
    } else if let (Value::String(a), Value::String(b)) = (lhs, rhs) {
        Some(a.cmp(b))
    } else {
        return Err(format!(
            "ordering comparison not supported between {} and {}",
            lhs.type_name(),
            rhs.type_name()
        ));
    };

    let Some(ordering) = ordering else {
        // NaN compares false against everything
        return Ok(false);
    };

    Ok(match op {
        CmpOp::Lt => ordering.is_lt(),
        CmpOp::Le => ordering.is_le(),
        CmpOp::Gt => ordering.is_gt(),
        CmpOp::Ge => ordering.is_ge(),
        CmpOp::Eq | CmpOp::Ne => unreachable!("handled above"),
    })
}

fn eval_call(func: &str, args: Vec<Value>) -> EvalResult {
    match func {
        "min" | "max" => {
            if args.is_empty() {
                return Err(format!("{}() expects at least 1 argument", func));
            }
            let mut best = args[0].clone();
            for value in &args[1..] {
                let replace = if func == "min" {
                    compare(CmpOp::Lt, value, &best)?
                } else {
                    compare(CmpOp::Gt, value, &best)?
                };
                if replace {
                    best = value.clone();
                }
            }
            Ok(best)
        }
        "abs" => {
            let value = single_arg(func, args)?;
            match value {
                Value::Integer(i) => i
                    .checked_abs()
                    .map(Value::Integer)
                    .ok_or_else(|| "integer overflow in abs()".into()),
                Value::Float(f) => Ok(Value::Float(f.abs())),
                other => Err(format!("abs() expects a number, got {}", other.type_name())),
            }
        }
        "int" => {
            let value = single_arg(func, args)?;
            match value {
                Value::Integer(i) => Ok(Value::Integer(i)),
                Value::Float(f) => {
                    if f.is_finite() && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                        Ok(Value::Integer(f.trunc() as i64))
                    } else {
                        Err(format!("cannot convert {} to an integer", f))
                    }
                }
                Value::Bool(b) => Ok(Value::Integer(i64::from(b))),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Integer)
                    .map_err(|_| format!("invalid literal for int(): '{}'", s)),
                other => Err(format!(
                    "int() expects a number or string, got {}",
                    other.type_name()
                )),
            }
        }
        "float" => {
            let value = single_arg(func, args)?;
            match value {
                Value::Float(f) => Ok(Value::Float(f)),
                Value::Integer(i) => Ok(Value::Float(i as f64)),
                Value::Bool(b) => Ok(Value::Float(if b { 1.0 } else { 0.0 })),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| format!("invalid literal for float(): '{}'", s)),
                other => Err(format!(
                    "float() expects a number or string, got {}",
                    other.type_name()
                )),
            }
        }
        "bool" => {
            let value = single_arg(func, args)?;
            Ok(Value::Bool(value.is_truthy()))
        }
        other => Err(format!("unknown function '{}'", other)),
    }
}

fn single_arg(func: &str, mut args: Vec<Value>) -> std::result::Result<Value, String> {
    if args.len() != 1 {
        return Err(format!(
            "{}() expects exactly 1 argument, got {}",
            func,
            args.len()
        ));
    }
    Ok(args.remove(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    struct MapScope(HashMap<String, Value>);

    impl MapScope {
        fn new(pairs: &[(&str, Value)]) -> Self {
            Self(
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
            )
        }
    }

    impl Scope for MapScope {
        fn lookup(&mut self, name: &str) -> Result<Value> {
            self.0
                .get(name)
                .cloned()
                .ok_or_else(|| Error::unresolved_variable(name))
        }
    }

    fn eval(input: &str) -> Result<Value> {
        evaluate(input, &mut MapScope::new(&[]))
    }

    fn eval_with(input: &str, pairs: &[(&str, Value)]) -> Result<Value> {
        evaluate(input, &mut MapScope::new(pairs))
    }

    #[test]
    fn test_integer_arithmetic_stays_integral() {
        assert_eq!(eval("2 + 3").unwrap(), Value::Integer(5));
        assert_eq!(eval("2 * 3").unwrap(), Value::Integer(6));
        assert_eq!(eval("7 - 10").unwrap(), Value::Integer(-3));
        assert_eq!(eval("2 ** 10").unwrap(), Value::Integer(1024));
    }

    #[test]
    fn test_division_is_true_division() {
        assert_eq!(eval("5 / 2").unwrap(), Value::Float(2.5));
        assert_eq!(eval("4 / 2").unwrap(), Value::Float(2.0));
    }

    #[test]
    fn test_modulo_takes_divisor_sign() {
        assert_eq!(eval("-7 % 3").unwrap(), Value::Integer(2));
        assert_eq!(eval("7 % -3").unwrap(), Value::Integer(-2));
        assert_eq!(eval("7 % 3").unwrap(), Value::Integer(1));
    }

    #[test]
    fn test_mixed_arithmetic_promotes_to_float() {
        assert_eq!(eval("1 + 2.5").unwrap(), Value::Float(3.5));
        assert_eq!(eval("2.0 * 3").unwrap(), Value::Float(6.0));
    }

    #[test]
    fn test_power_binds_tighter_than_unary_minus() {
        assert_eq!(eval("-2 ** 2").unwrap(), Value::Integer(-4));
        assert_eq!(eval("(-2) ** 2").unwrap(), Value::Integer(4));
        assert_eq!(eval("2 ** -1").unwrap(), Value::Float(0.5));
    }

    #[test]
    fn test_operator_precedence() {
        assert_eq!(eval("2 + 3 * 4").unwrap(), Value::Integer(14));
        assert_eq!(eval("(2 + 3) * 4").unwrap(), Value::Integer(20));
        assert_eq!(eval("1 ^ 2 + 1").unwrap(), Value::Integer(2));
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(
            eval("'foo' + \"bar\"").unwrap(),
            Value::String("foobar".into())
        );
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(eval("1 < 2").unwrap(), Value::Bool(true));
        assert_eq!(eval("2 <= 2").unwrap(), Value::Bool(true));
        assert_eq!(eval("1 == 1.0").unwrap(), Value::Bool(true));
        assert_eq!(eval("1 != 2").unwrap(), Value::Bool(true));
        assert_eq!(eval("'a' < 'b'").unwrap(), Value::Bool(true));
        assert_eq!(eval("'a' == 1").unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_chained_comparison() {
        assert_eq!(eval("1 < 2 < 3").unwrap(), Value::Bool(true));
        assert_eq!(eval("1 < 2 < 2").unwrap(), Value::Bool(false));
        assert_eq!(eval("3 > 2 > 1").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_logical_operators() {
        assert_eq!(eval("true && false").unwrap(), Value::Bool(false));
        assert_eq!(eval("true || false").unwrap(), Value::Bool(true));
        assert_eq!(eval("1 < 2 && 2 > 1").unwrap(), Value::Bool(true));
        assert_eq!(eval("not true").unwrap(), Value::Bool(false));
        assert_eq!(eval("!false").unwrap(), Value::Bool(true));
        // and/or keyword spellings are accepted too
        assert_eq!(eval("true and false").unwrap(), Value::Bool(false));
        assert_eq!(eval("false or true").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_logical_operators_return_deciding_operand() {
        assert_eq!(eval("0 || 5").unwrap(), Value::Integer(5));
        assert_eq!(eval("3 && 5").unwrap(), Value::Integer(5));
        assert_eq!(eval("0 && 5").unwrap(), Value::Integer(0));
    }

    #[test]
    fn test_xor() {
        assert_eq!(eval("5 ^ 3").unwrap(), Value::Integer(6));
        assert_eq!(eval("true ^ false").unwrap(), Value::Bool(true));
        assert!(eval("'a' ^ 1").is_err());
    }

    #[test]
    fn test_builtin_functions() {
        assert_eq!(eval("min(3, 1, 2)").unwrap(), Value::Integer(1));
        assert_eq!(eval("max(10, 20 - 5)").unwrap(), Value::Integer(15));
        assert_eq!(eval("abs(-4)").unwrap(), Value::Integer(4));
        assert_eq!(eval("abs(-1.5)").unwrap(), Value::Float(1.5));
        assert_eq!(eval("int('12')").unwrap(), Value::Integer(12));
        assert_eq!(eval("int(2.9)").unwrap(), Value::Integer(2));
        assert_eq!(eval("float(2)").unwrap(), Value::Float(2.0));
        assert_eq!(eval("bool(0)").unwrap(), Value::Bool(false));
        assert_eq!(eval("bool('x')").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_min_max_on_strings() {
        assert_eq!(eval("min('b', 'a')").unwrap(), Value::String("a".into()));
        assert_eq!(eval("max('b', 'a')").unwrap(), Value::String("b".into()));
    }

    #[test]
    fn test_identifier_lookup() {
        let vars = [("a", Value::Integer(2)), ("b", Value::Integer(3))];
        assert_eq!(eval_with("a + b", &vars).unwrap(), Value::Integer(5));
        assert_eq!(eval_with("a * b", &vars).unwrap(), Value::Integer(6));
    }

    #[test]
    fn test_dotted_identifier_lookup() {
        let vars = [("limits.max", Value::Integer(10))];
        assert_eq!(
            eval_with("limits.max > 5", &vars).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_unknown_identifier_fails() {
        let err = eval("missing + 1").unwrap_err();
        assert!(err.to_string().contains("unresolved identifier 'missing'"));
    }

    #[test]
    fn test_unknown_function_fails() {
        let err = eval("exec(1)").unwrap_err();
        assert!(err.to_string().contains("unknown function 'exec'"));
    }

    #[test]
    fn test_assignment_is_rejected() {
        let err = eval("a = 1").unwrap_err();
        assert!(err.to_string().contains("assignment is not supported"));
    }

    #[test]
    fn test_division_by_zero_fails() {
        assert!(eval("1 / 0").is_err());
        assert!(eval("1 % 0").is_err());
    }

    #[test]
    fn test_type_mismatch_fails() {
        assert!(eval("'a' - 1").is_err());
        assert!(eval("'a' < 1").is_err());
        assert!(eval("null + 1").is_err());
    }

    #[test]
    fn test_unterminated_string_fails() {
        assert!(eval("'abc").is_err());
    }

    #[test]
    fn test_trailing_tokens_fail() {
        assert!(eval("1 2").is_err());
    }

    #[test]
    fn test_error_carries_expression_text() {
        let err = eval("1 +").unwrap_err();
        assert!(err.to_string().contains("Failed to evaluate expression '1 +'"));
    }
}
