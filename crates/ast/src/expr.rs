use std::sync::{Arc, Mutex};

use persica_core::{Error, Result, Value};

use crate::context::EvalContext;

/// The small, embeddable expression language used by `test`, `collection`,
/// and `${...}` (spec §4.2.1). A hand-written recursive-descent parser is
/// enough here; importing a general expression-engine crate would be a poor
/// fit for a grammar this small (spec §9).
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    /// `a.b[0]['k']` — a root name followed by zero or more property/index
    /// accesses, evaluated against the evaluation context.
    Path(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl Expr {
    pub fn eval(&self, ctx: &EvalContext) -> Result<Value> {
        match self {
            Expr::Null => Ok(Value::Null),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Number(n) => Ok(Value::F64(*n)),
            Expr::Str(s) => Ok(Value::from(s.as_str())),
            Expr::Path(path) => Ok(ctx.resolve_path(path)),
            Expr::Unary(op, inner) => {
                let v = inner.eval(ctx)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!v.truthy()),
                    UnaryOp::Neg => match v.as_f64() {
                        Some(n) if matches!(v, Value::I64(_)) => Value::I64(-(n as i64)),
                        Some(n) => Value::F64(-n),
                        None => {
                            return Err(Error::Render("cannot negate a non-numeric value".into()))
                        }
                    },
                })
            }
            Expr::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, ctx),
        }
    }
}

fn eval_binary(op: BinOp, lhs: &Expr, rhs: &Expr, ctx: &EvalContext) -> Result<Value> {
    if matches!(op, BinOp::And | BinOp::Or) {
        let l = lhs.eval(ctx)?.truthy();
        return Ok(match op {
            BinOp::And => Value::Bool(l && rhs.eval(ctx)?.truthy()),
            BinOp::Or => Value::Bool(l || rhs.eval(ctx)?.truthy()),
            _ => unreachable!(),
        });
    }

    let l = lhs.eval(ctx)?;
    let r = rhs.eval(ctx)?;

    match op {
        BinOp::Eq => return Ok(Value::Bool(values_equal(&l, &r))),
        BinOp::Ne => return Ok(Value::Bool(!values_equal(&l, &r))),
        _ => {}
    }

    let (lf, rf) = match (l.as_f64(), r.as_f64()) {
        (Some(lf), Some(rf)) => (lf, rf),
        _ => {
            return Err(Error::Render(format!(
                "expected numeric operands for `{op:?}`, got {l:?} and {r:?}"
            )))
        }
    };

    Ok(match op {
        BinOp::Add => numeric_result(&l, &r, lf + rf),
        BinOp::Sub => numeric_result(&l, &r, lf - rf),
        BinOp::Mul => numeric_result(&l, &r, lf * rf),
        BinOp::Div => numeric_result(&l, &r, lf / rf),
        BinOp::Mod => numeric_result(&l, &r, lf % rf),
        BinOp::Lt => Value::Bool(lf < rf),
        BinOp::Le => Value::Bool(lf <= rf),
        BinOp::Gt => Value::Bool(lf > rf),
        BinOp::Ge => Value::Bool(lf >= rf),
        BinOp::Eq | BinOp::Ne | BinOp::And | BinOp::Or => unreachable!(),
    })
}

fn numeric_result(l: &Value, r: &Value, result: f64) -> Value {
    if matches!(l, Value::I64(_)) && matches!(r, Value::I64(_)) {
        Value::I64(result as i64)
    } else {
        Value::F64(result)
    }
}

fn values_equal(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Null, Value::Null) => true,
        (Value::I64(_) | Value::F64(_), Value::I64(_) | Value::F64(_)) => {
            l.as_f64() == r.as_f64()
        }
        _ => l == r,
    }
}

/// Expression parses are cached by source text (spec §4.2.1).
#[derive(Default)]
pub struct ExprCache {
    cache: Mutex<ahash::AHashMap<String, Arc<Expr>>>,
}

impl ExprCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(&self, source: &str) -> Result<Arc<Expr>> {
        if let Some(cached) = self.cache.lock().unwrap().get(source) {
            return Ok(cached.clone());
        }
        let parsed = Arc::new(parse(source)?);
        self.cache
            .lock()
            .unwrap()
            .insert(source.to_string(), parsed.clone());
        Ok(parsed)
    }
}

pub fn parse(source: &str) -> Result<Expr> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(Error::Render(format!(
            "unexpected trailing input in expression `{source}`"
        )));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    Op(&'static str),
    LParen,
    RParen,
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '(' {
            tokens.push(Token::LParen);
            i += 1;
        } else if c == ')' {
            tokens.push(Token::RParen);
            i += 1;
        } else if c == '\'' || c == '"' {
            let quote = c;
            let mut j = i + 1;
            let mut s = String::new();
            while j < chars.len() && chars[j] != quote {
                s.push(chars[j]);
                j += 1;
            }
            if j >= chars.len() {
                return Err(Error::Render(format!("unterminated string literal in `{source}`")));
            }
            tokens.push(Token::Str(s));
            i = j + 1;
        } else if c.is_ascii_digit() {
            let mut j = i;
            while j < chars.len() && (chars[j].is_ascii_digit() || chars[j] == '.') {
                j += 1;
            }
            let text: String = chars[i..j].iter().collect();
            let n: f64 = text
                .parse()
                .map_err(|_| Error::Render(format!("invalid number `{text}` in `{source}`")))?;
            tokens.push(Token::Number(n));
            i = j;
        } else if c.is_alphabetic() || c == '_' || c == '$' {
            let mut j = i;
            while j < chars.len()
                && (chars[j].is_alphanumeric() || chars[j] == '_' || chars[j] == '.' || chars[j] == '[' || chars[j] == ']' || chars[j] == '\'' || chars[j] == '"' || chars[j] == '$')
            {
                j += 1;
            }
            let ident: String = chars[i..j].iter().collect();
            tokens.push(Token::Ident(ident));
            i = j;
        } else {
            let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
            let op = match two.as_str() {
                "==" => Some("=="),
                "!=" => Some("!="),
                "<=" => Some("<="),
                ">=" => Some(">="),
                "&&" => Some("&&"),
                "||" => Some("||"),
                _ => None,
            };
            if let Some(op) = op {
                tokens.push(Token::Op(op));
                i += 2;
            } else {
                let op = match c {
                    '+' => "+",
                    '-' => "-",
                    '*' => "*",
                    '/' => "/",
                    '%' => "%",
                    '<' => "<",
                    '>' => ">",
                    '!' => "!",
                    '=' => "==",
                    _ => {
                        return Err(Error::Render(format!(
                            "unexpected character `{c}` in expression `{source}`"
                        )))
                    }
                };
                tokens.push(Token::Op(op));
                i += 1;
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Some(Token::Op(o)) if *o == op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while self.eat_op("||") {
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_comparison()?;
        while self.eat_op("&&") {
            let rhs = self.parse_comparison()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let lhs = self.parse_additive()?;
        let op = match self.peek() {
            Some(Token::Op("==")) => Some(BinOp::Eq),
            Some(Token::Op("!=")) => Some(BinOp::Ne),
            Some(Token::Op("<")) => Some(BinOp::Lt),
            Some(Token::Op("<=")) => Some(BinOp::Le),
            Some(Token::Op(">")) => Some(BinOp::Gt),
            Some(Token::Op(">=")) => Some(BinOp::Ge),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let rhs = self.parse_additive()?;
            return Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Op("+")) => BinOp::Add,
                Some(Token::Op("-")) => BinOp::Sub,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Op("*")) => BinOp::Mul,
                Some(Token::Op("/")) => BinOp::Div,
                Some(Token::Op("%")) => BinOp::Mod,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.eat_op("!") {
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(self.parse_unary()?)));
        }
        if self.eat_op("-") {
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.bump() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                if !matches!(self.bump(), Some(Token::RParen)) {
                    return Err(Error::Render("unmatched `(` in expression".into()));
                }
                Ok(inner)
            }
            Some(Token::Ident(ident)) => Ok(match ident.as_str() {
                "null" => Expr::Null,
                "true" => Expr::Bool(true),
                "false" => Expr::Bool(false),
                _ => Expr::Path(ident),
            }),
            other => Err(Error::Render(format!(
                "unexpected token {other:?} in expression"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EvalContext;
    use persica_helpers::IndexMap;

    fn ctx(parameter: Value) -> EvalContext {
        EvalContext::new(parameter, None)
    }

    #[test]
    fn null_comparison() {
        let mut map = IndexMap::default();
        map.insert("name".into(), Value::from("a"));
        let c = ctx(Value::Map(map));
        let e = parse("name != null").unwrap();
        assert_eq!(e.eval(&c).unwrap(), Value::Bool(true));
    }

    #[test]
    fn numeric_comparison_and_arithmetic() {
        let mut map = IndexMap::default();
        map.insert("age".into(), Value::I64(30));
        let c = ctx(Value::Map(map));
        assert_eq!(parse("age > 0").unwrap().eval(&c).unwrap(), Value::Bool(true));
        assert_eq!(parse("age + 1").unwrap().eval(&c).unwrap(), Value::I64(31));
    }

    #[test]
    fn logical_and_or() {
        let mut map = IndexMap::default();
        map.insert("a".into(), Value::Bool(true));
        map.insert("b".into(), Value::Bool(false));
        let c = ctx(Value::Map(map));
        assert_eq!(parse("a && b").unwrap().eval(&c).unwrap(), Value::Bool(false));
        assert_eq!(parse("a || b").unwrap().eval(&c).unwrap(), Value::Bool(true));
    }

    #[test]
    fn missing_property_is_falsy_not_error() {
        let c = ctx(Value::Map(Default::default()));
        assert_eq!(parse("missing").unwrap().eval(&c).unwrap(), Value::Null);
        assert!(!parse("missing").unwrap().eval(&c).unwrap().truthy());
    }

    #[test]
    fn expr_cache_returns_equal_parses() {
        let cache = ExprCache::new();
        let a = cache.parse("age > 0").unwrap();
        let b = cache.parse("age > 0").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
