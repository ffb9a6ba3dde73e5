//! Textual type-expression parser.
//!
//! Accepts the typing-module spelling of field types:
//!
//! ```text
//! int | None
//! Optional[list[str]]
//! dict[str, tuple[int, float]]
//! Literal["a", 1, True]
//! Annotated[int, NoJSON, Range(0, 256, closed_open)]
//! ```
//!
//! Names that are not atomic types, type variables or the declaring
//! template's own name are resolved as publicly declared templates.
//! Anything else is reported, never guessed.

use std::sync::Arc;
use thiserror::Error;

use super::annotations::{AnnotationMeta, Interval, Range};
use super::expr::{AtomicType, TypeExpr};
use crate::errors::{RecordError, RecordResult};
use crate::template::{Registry, RecordTemplate};
use crate::value::Value;

/// Parser failures, surfaced as `UnsupportedTypeExpr`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("unexpected end of type expression")]
    UnexpectedEnd,
    #[error("unexpected '{0}' at offset {1}")]
    UnexpectedToken(String, usize),
    #[error("unsupported construct '{0}'")]
    Unsupported(String),
    #[error("unknown type name '{0}'")]
    UnknownName(String),
    #[error("'{0}' expects {1} type argument(s)")]
    Arity(String, usize),
    #[error("invalid literal '{0}'")]
    InvalidLiteral(String),
    #[error("invalid character '{0}' at offset {1}")]
    InvalidChar(char, usize),
}

/// Name resolution for the parser.
pub struct ParseContext<'a> {
    /// Name of the template being declared; resolves to a self-reference
    pub self_name: Option<&'a str>,
    /// Type variables bound by the declaring schema
    pub type_vars: &'a [String],
    /// Lookup of publicly declared templates by name
    pub resolver: &'a dyn Fn(&str) -> Option<Arc<RecordTemplate>>,
}

fn global_resolver(name: &str) -> Option<Arc<RecordTemplate>> {
    Registry::global().lookup_public(name)
}

impl ParseContext<'static> {
    /// No self name, no type variables, global registry lookups.
    pub fn global() -> Self {
        Self {
            self_name: None,
            type_vars: &[],
            resolver: &global_resolver,
        }
    }
}

impl TypeExpr {
    /// Parses a type expression, resolving template names globally.
    pub fn parse(text: &str) -> RecordResult<TypeExpr> {
        parse_type_expr(text, &ParseContext::global())
    }
}

/// Parses `text` within `ctx`.
pub fn parse_type_expr(text: &str, ctx: &ParseContext<'_>) -> RecordResult<TypeExpr> {
    let tokens = tokenize(text).map_err(|e| RecordError::unsupported_type_expr(text, e))?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        ctx,
    };
    parser
        .parse_all()
        .map_err(|e| RecordError::unsupported_type_expr(text, e))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Pipe,
    Ellipsis,
}

impl Token {
    fn text(&self) -> String {
        match self {
            Token::Ident(s) => s.clone(),
            Token::Str(s) => format!("{:?}", s),
            Token::Int(i) => i.to_string(),
            Token::Float(f) => f.to_string(),
            Token::LBracket => "[".into(),
            Token::RBracket => "]".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::Comma => ",".into(),
            Token::Pipe => "|".into(),
            Token::Ellipsis => "...".into(),
        }
    }
}

fn tokenize(text: &str) -> Result<Vec<(Token, usize)>, ParseError> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let start = i;
        match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '[' => tokens.push((Token::LBracket, start)),
            ']' => tokens.push((Token::RBracket, start)),
            '(' => tokens.push((Token::LParen, start)),
            ')' => tokens.push((Token::RParen, start)),
            ',' => tokens.push((Token::Comma, start)),
            '|' => tokens.push((Token::Pipe, start)),
            '.' if chars[i..].starts_with(&['.', '.', '.']) => {
                tokens.push((Token::Ellipsis, start));
                i += 3;
                continue;
            }
            '"' | '\'' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                while i < chars.len() && chars[i] != quote {
                    if chars[i] == '\\' && i + 1 < chars.len() {
                        i += 1;
                    }
                    s.push(chars[i]);
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(ParseError::UnexpectedEnd);
                }
                tokens.push((Token::Str(s), start));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut j = i + 1;
                while j < chars.len() && (chars[j].is_ascii_digit() || chars[j] == '.' || chars[j] == 'e') {
                    j += 1;
                }
                let literal: String = chars[i..j].iter().collect();
                let token = if literal.contains('.') || literal.contains('e') {
                    literal
                        .parse::<f64>()
                        .map(Token::Float)
                        .map_err(|_| ParseError::InvalidLiteral(literal.clone()))?
                } else {
                    literal
                        .parse::<i64>()
                        .map(Token::Int)
                        .map_err(|_| ParseError::InvalidLiteral(literal.clone()))?
                };
                tokens.push((token, start));
                i = j;
                continue;
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut j = i + 1;
                while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_' || chars[j] == '.') {
                    j += 1;
                }
                tokens.push((Token::Ident(chars[i..j].iter().collect()), start));
                i = j;
                continue;
            }
            other => return Err(ParseError::InvalidChar(other, start)),
        }
        i += 1;
    }
    Ok(tokens)
}

/// `typing.Optional` -> `Optional`, `datetime.datetime` -> `datetime`.
fn normalize_name(name: &str) -> &str {
    match name {
        "datetime.datetime" => "datetime",
        "datetime.date" => "date",
        other => other.strip_prefix("typing.").unwrap_or(other),
    }
}

struct Parser<'c, 'a> {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    ctx: &'c ParseContext<'a>,
}

impl<'c, 'a> Parser<'c, 'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn next(&mut self) -> Result<(Token, usize), ParseError> {
        let token = self.tokens.get(self.pos).cloned().ok_or(ParseError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<(), ParseError> {
        let (got, offset) = self.next()?;
        if &got == token {
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken(got.text(), offset))
        }
    }

    fn parse_all(&mut self) -> Result<TypeExpr, ParseError> {
        let expr = self.parse_union()?;
        match self.tokens.get(self.pos) {
            None => Ok(expr),
            Some((token, offset)) => Err(ParseError::UnexpectedToken(token.text(), *offset)),
        }
    }

    fn parse_union(&mut self) -> Result<TypeExpr, ParseError> {
        let mut members = vec![self.parse_term()?];
        while self.eat(&Token::Pipe) {
            members.push(self.parse_term()?);
        }
        Ok(TypeExpr::union(members))
    }

    fn parse_term(&mut self) -> Result<TypeExpr, ParseError> {
        match self.next()? {
            (Token::Ident(name), _) => self.parse_named(&name),
            (token, offset) => Err(ParseError::UnexpectedToken(token.text(), offset)),
        }
    }

    /// `[T, U, ...]` with an optional fixed arity.
    fn parse_type_args(&mut self, owner: &str, arity: Option<usize>) -> Result<Vec<TypeExpr>, ParseError> {
        self.expect(&Token::LBracket)?;
        let mut args = Vec::new();
        loop {
            if self.peek() == Some(&Token::Ellipsis) {
                return Err(ParseError::Unsupported(format!("{}[..., ...]", owner)));
            }
            args.push(self.parse_union()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RBracket)?;
        match arity {
            Some(n) if args.len() != n => Err(ParseError::Arity(owner.to_string(), n)),
            _ => Ok(args),
        }
    }

    /// Bare container names default their parameters to `Any`.
    fn parse_optional_args(&mut self, owner: &str, arity: usize) -> Result<Vec<TypeExpr>, ParseError> {
        if self.peek() == Some(&Token::LBracket) {
            self.parse_type_args(owner, Some(arity))
        } else {
            Ok(vec![TypeExpr::any(); arity])
        }
    }

    fn parse_named(&mut self, raw: &str) -> Result<TypeExpr, ParseError> {
        let name = normalize_name(raw);
        match name {
            "Optional" => {
                let mut args = self.parse_type_args(name, Some(1))?;
                Ok(TypeExpr::optional(args.remove(0)))
            }
            "Union" => Ok(TypeExpr::union(self.parse_type_args(name, None)?)),
            "list" | "List" | "Sequence" => {
                let mut args = self.parse_optional_args(name, 1)?;
                Ok(TypeExpr::list(args.remove(0)))
            }
            "set" | "Set" => {
                let mut args = self.parse_optional_args(name, 1)?;
                Ok(TypeExpr::set_of(args.remove(0)))
            }
            "dict" | "Dict" | "Mapping" => {
                let mut args = self.parse_optional_args(name, 2)?;
                let value = args.remove(1);
                Ok(TypeExpr::mapping(args.remove(0), value))
            }
            "tuple" | "Tuple" => self.parse_tuple(name),
            "Literal" => self.parse_literal(),
            "Annotated" => self.parse_annotated(),
            _ => {
                if let Some(atomic) = AtomicType::from_name(name) {
                    return Ok(TypeExpr::Atomic(atomic));
                }
                if self.ctx.type_vars.iter().any(|v| v == name) {
                    return Ok(TypeExpr::type_var(name));
                }
                if self.ctx.self_name == Some(name) {
                    return Ok(TypeExpr::SelfRef);
                }
                if let Some(template) = (self.ctx.resolver)(name) {
                    return Ok(TypeExpr::Record(template));
                }
                if self.peek() == Some(&Token::LBracket) {
                    Err(ParseError::Unsupported(name.to_string()))
                } else {
                    Err(ParseError::UnknownName(name.to_string()))
                }
            }
        }
    }

    fn parse_tuple(&mut self, name: &str) -> Result<TypeExpr, ParseError> {
        if self.peek() != Some(&Token::LBracket) {
            return Err(ParseError::Unsupported(format!("bare {}", name)));
        }
        // tuple[()] is the empty tuple
        if self.tokens.get(self.pos + 1).map(|(t, _)| t) == Some(&Token::LParen) {
            self.expect(&Token::LBracket)?;
            self.expect(&Token::LParen)?;
            self.expect(&Token::RParen)?;
            self.expect(&Token::RBracket)?;
            return Ok(TypeExpr::tuple(Vec::new()));
        }
        Ok(TypeExpr::tuple(self.parse_type_args(name, None)?))
    }

    fn parse_literal_value(&mut self) -> Result<Value, ParseError> {
        match self.next()? {
            (Token::Str(s), _) => Ok(Value::Str(s)),
            (Token::Int(i), _) => Ok(Value::Int(i)),
            (Token::Float(f), _) => Ok(Value::Float(f)),
            (Token::Ident(id), offset) => match id.as_str() {
                "True" => Ok(Value::Bool(true)),
                "False" => Ok(Value::Bool(false)),
                "None" => Ok(Value::Null),
                _ => Err(ParseError::UnexpectedToken(id, offset)),
            },
            (token, offset) => Err(ParseError::UnexpectedToken(token.text(), offset)),
        }
    }

    fn parse_literal(&mut self) -> Result<TypeExpr, ParseError> {
        self.expect(&Token::LBracket)?;
        let mut values = vec![self.parse_literal_value()?];
        while self.eat(&Token::Comma) {
            values.push(self.parse_literal_value()?);
        }
        self.expect(&Token::RBracket)?;
        Ok(TypeExpr::Literal(values))
    }

    fn parse_annotated(&mut self) -> Result<TypeExpr, ParseError> {
        self.expect(&Token::LBracket)?;
        let inner = self.parse_union()?;
        let mut metas = Vec::new();
        while self.eat(&Token::Comma) {
            metas.push(self.parse_meta()?);
        }
        self.expect(&Token::RBracket)?;
        if metas.is_empty() {
            return Err(ParseError::Arity("Annotated".into(), 2));
        }
        Ok(TypeExpr::annotated(inner, metas))
    }

    fn parse_meta(&mut self) -> Result<AnnotationMeta, ParseError> {
        let (token, offset) = self.next()?;
        let name = match token {
            Token::Ident(name) => name,
            other => return Err(ParseError::UnexpectedToken(other.text(), offset)),
        };
        if let Some(flag) = AnnotationMeta::parse_flag(&name) {
            return Ok(flag);
        }
        if name != "Range" {
            return Err(ParseError::Unsupported(name));
        }
        self.expect(&Token::LParen)?;
        let lower = self.parse_literal_value()?;
        self.expect(&Token::Comma)?;
        let upper = self.parse_literal_value()?;
        let mut range = Range::new(lower, upper);
        if self.eat(&Token::Comma) {
            let (token, offset) = self.next()?;
            let text = match token {
                Token::Ident(id) => id.rsplit('.').next().unwrap_or_default().to_string(),
                Token::Str(s) => s,
                other => return Err(ParseError::UnexpectedToken(other.text(), offset)),
            };
            let interval = Interval::parse(&text).ok_or(ParseError::InvalidLiteral(text))?;
            range = range.with_interval(interval);
        }
        self.expect(&Token::RParen)?;
        Ok(AnnotationMeta::Range(range))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn no_templates(_: &str) -> Option<Arc<RecordTemplate>> {
        None
    }

    fn parse(text: &str) -> RecordResult<TypeExpr> {
        let vars = vec!["T".to_string()];
        let ctx = ParseContext {
            self_name: Some("Node"),
            type_vars: &vars,
            resolver: &no_templates,
        };
        parse_type_expr(text, &ctx)
    }

    #[test]
    fn test_atomic_and_union() {
        assert_eq!(parse("str | int").unwrap().display_name(), "str | int");
        assert_eq!(parse("Optional[int]").unwrap().display_name(), "int | None");
        assert_eq!(parse("Union[int, Union[str, int]]").unwrap().display_name(), "int | str");
    }

    #[test]
    fn test_containers() {
        assert_eq!(parse("list[int]").unwrap().display_name(), "list[int]");
        assert_eq!(parse("List").unwrap().display_name(), "list[Any]");
        assert_eq!(parse("Dict[str, list[float]]").unwrap().display_name(), "dict[str, list[float]]");
        assert_eq!(parse("tuple[int, str]").unwrap().display_name(), "tuple[int, str]");
        assert_eq!(parse("tuple[()]").unwrap().display_name(), "tuple[()]");
        assert_eq!(parse("typing.Set[bytes]").unwrap().display_name(), "set[bytes]");
    }

    #[test]
    fn test_literal() {
        let expr = parse("Literal['a', 1, True, None]").unwrap();
        match expr {
            TypeExpr::Literal(values) => assert_eq!(values.len(), 4),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_annotated_with_range() {
        let expr = parse("Annotated[int, NoJSON, Range(0, 256, closed_open)]").unwrap();
        let (inner, metas) = expr.split_annotations();
        assert_eq!(inner, TypeExpr::int());
        assert_eq!(metas.len(), 2);
        assert_eq!(metas[1].as_range().unwrap().to_string(), "[0, 256)");
    }

    #[test]
    fn test_range_flag_spelling() {
        let expr = parse("Annotated[float, Range(-1.5, 1.5, RangeFlags.CLOSED)]").unwrap();
        let (_, metas) = expr.split_annotations();
        assert_eq!(metas[0].as_range().unwrap().interval(), Interval::Closed);
    }

    #[test]
    fn test_type_var_and_self() {
        assert_eq!(parse("list[T]").unwrap().type_vars(), vec!["T".to_string()]);
        assert!(parse("Node | None").unwrap().contains_self_ref());
    }

    #[test]
    fn test_unsupported_constructs() {
        for text in ["Callable[[int], str]", "frozenset[int]", "tuple[int, ...]", "Widget", "tuple", "int |", "list[int"] {
            let err = parse(text).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::UnsupportedTypeExpr, "{}", text);
        }
    }
}
