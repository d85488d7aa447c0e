//! Sandboxed macro/variable expression evaluator.
//!
//! Grounded on `domain/handlers/variable.py`: degrees-mode trig, the
//! function allow-list, and the "set to 0.0 and keep going" fallback on
//! assignment failure are all carried over. Evaluation never uses a host
//! `eval` — expressions go through the small precedence-climbing parser
//! below, per the design note ruling out host-language evaluation.

use std::collections::HashMap;

use crate::error::Result;
use crate::node::CommandNode;
use crate::state::CanalState;

use super::{Handler, HandlerContext, HandlerOutput};

const MAX_BRACKET_REDUCTIONS: usize = 50;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    DoubleStar,
    DoubleSlash,
    LParen,
    RParen,
    Comma,
}

fn tokenize(expr: &str) -> Vec<Token> {
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    tokens.push(Token::DoubleStar);
                    i += 2;
                } else {
                    tokens.push(Token::Star);
                    i += 1;
                }
            }
            '/' => {
                if chars.get(i + 1) == Some(&'/') {
                    tokens.push(Token::DoubleSlash);
                    i += 2;
                } else {
                    tokens.push(Token::Slash);
                    i += 1;
                }
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '(' | '[' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' | ']' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(Token::Number(text.parse().unwrap_or(0.0)));
            }
            c if c.is_ascii_alphabetic() || c == '#' || c == '_' => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(Token::Ident(text));
            }
            _ => i += 1,
        }
    }
    tokens
}

/// Allow-listed function names, sandboxing evaluation against anything
/// else a hostile expression might try to name.
const ALLOWED_FUNCS: &[&str] = &["SIN", "COS", "TAN", "ASIN", "ACOS", "ATAN", "SQRT"];

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    lookup: &'a dyn Fn(&str) -> Option<f64>,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn parse_expr(&mut self, min_bp: u8) -> Result<f64> {
        self.depth += 1;
        if self.depth > MAX_BRACKET_REDUCTIONS {
            self.depth -= 1;
            return eval_err("expression nesting exceeded the reduction limit");
        }
        let mut lhs = self.parse_unary()?;

        loop {
            let (op_bp, op) = match self.peek() {
                Some(Token::Plus) => (1, Token::Plus),
                Some(Token::Minus) => (1, Token::Minus),
                Some(Token::Star) => (2, Token::Star),
                Some(Token::Slash) => (2, Token::Slash),
                Some(Token::Percent) => (2, Token::Percent),
                Some(Token::DoubleSlash) => (2, Token::DoubleSlash),
                Some(Token::DoubleStar) => (3, Token::DoubleStar),
                _ => break,
            };
            if op_bp < min_bp {
                break;
            }
            self.advance();
            let next_min_bp = if op == Token::DoubleStar { op_bp } else { op_bp + 1 };
            let rhs = self.parse_expr(next_min_bp)?;
            lhs = match op {
                Token::Plus => lhs + rhs,
                Token::Minus => lhs - rhs,
                Token::Star => lhs * rhs,
                Token::Slash => lhs / rhs,
                Token::Percent => lhs % rhs,
                Token::DoubleSlash => (lhs / rhs).floor(),
                Token::DoubleStar => lhs.powf(rhs),
                _ => unreachable!(),
            };
        }
        self.depth -= 1;
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<f64> {
        match self.peek() {
            Some(Token::Minus) => {
                self.advance();
                Ok(-self.parse_unary()?)
            }
            Some(Token::Plus) => {
                self.advance();
                self.parse_unary()
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<f64> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::LParen) => {
                let v = self.parse_expr(0)?;
                if matches!(self.peek(), Some(Token::RParen)) {
                    self.advance();
                }
                Ok(v)
            }
            Some(Token::Ident(name)) => self.resolve_ident(&name),
            _ => eval_err("unexpected end of expression"),
        }
    }

    fn resolve_ident(&mut self, name: &str) -> Result<f64> {
        let upper = name.to_ascii_uppercase();
        if upper == "PI" {
            return Ok(std::f64::consts::PI);
        }
        if ALLOWED_FUNCS.contains(&upper.as_str()) && matches!(self.peek(), Some(Token::LParen)) {
            self.advance();
            let arg = self.parse_expr(0)?;
            if matches!(self.peek(), Some(Token::RParen)) {
                self.advance();
            }
            return Ok(apply_trig(&upper, arg));
        }
        (self.lookup)(name).ok_or_else(|| unknown_name(name))
    }
}

fn apply_trig(name: &str, arg_deg_or_plain: f64) -> f64 {
    match name {
        "SIN" => arg_deg_or_plain.to_radians().sin(),
        "COS" => arg_deg_or_plain.to_radians().cos(),
        "TAN" => arg_deg_or_plain.to_radians().tan(),
        "ASIN" => arg_deg_or_plain.asin().to_degrees(),
        "ACOS" => arg_deg_or_plain.acos().to_degrees(),
        "ATAN" => arg_deg_or_plain.atan().to_degrees(),
        "SQRT" => arg_deg_or_plain.max(0.0).sqrt(),
        _ => 0.0,
    }
}

fn eval_err(msg: &str) -> Result<f64> {
    Err(crate::error::ControlError { message: msg.to_string(), line: 0, canal: 0 }.into())
}

fn unknown_name(name: &str) -> crate::error::NcError {
    crate::error::ControlError {
        message: format!("unknown identifier in sandboxed expression: {name}"),
        line: 0,
        canal: 0,
    }
    .into()
}

/// Evaluate `expr` against the variables visible in `state.parameters`,
/// recognising bracket/paren grouping, degrees-mode trig, and `pi`.
pub fn evaluate(expr: &str, state: &CanalState) -> Result<f64> {
    let lookup = |name: &str| -> Option<f64> {
        let key = name.trim_start_matches(['#', 'R']);
        state.parameters.get(key).copied()
    };
    let tokens = tokenize(expr);
    let mut parser = Parser { tokens, pos: 0, lookup: &lookup, depth: 0 };
    parser.parse_expr(0)
}

/// Split `"name=expr name=expr"` into ordered assignment pairs.
fn split_assignments(text: &str) -> Vec<(String, String)> {
    text.split_whitespace()
        .filter_map(|chunk| {
            let (name, expr) = chunk.split_once('=')?;
            Some((name.trim_start_matches(['#', 'R']).to_string(), expr.to_string()))
        })
        .collect()
}

fn format_number(value: f64) -> String {
    value.to_string()
}

/// A parameter value is a candidate for expression evaluation unless it's
/// already a plain decimal literal or an opaque string/name (tool names
/// preserved in quotes by the lexer).
fn needs_evaluation(value: &str) -> bool {
    if value.starts_with('"') {
        return false;
    }
    !value.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '-' || c == '+')
}

pub struct VariableHandler;

impl Handler for VariableHandler {
    fn handle(
        &self,
        node: &mut CommandNode,
        state: &mut CanalState,
        _ctx: &mut HandlerContext,
    ) -> Result<HandlerOutput> {
        if let Some(text) = node.variable_command.clone() {
            if text.contains('=') {
                for (name, expr) in split_assignments(&text) {
                    let value = evaluate(&expr, state).unwrap_or_else(|_| {
                        tracing::warn!(name, expr, "variable assignment failed, defaulting to 0.0");
                        0.0
                    });
                    state.parameters.insert(name, value);
                }
            }
        }

        let letters: Vec<char> = node.parameters.keys().copied().collect();
        for letter in letters {
            if letter == 'M' {
                continue;
            }
            if let Some(raw) = node.parameters.get(&letter).cloned() {
                if needs_evaluation(&raw) {
                    if let Ok(value) = evaluate(&raw, state) {
                        node.parameters.insert(letter, format_number(value));
                    }
                }
            }
        }

        Ok(HandlerOutput::Delegate)
    }
}

/// Evaluate a comparison used by `IF`/`WHILE` conditions (`GT/LT/GE/LE/EQ`).
pub fn evaluate_condition(lhs: f64, op: &str, rhs: f64) -> bool {
    match op {
        "GT" => lhs > rhs,
        "LT" => lhs < rhs,
        "GE" => lhs >= rhs,
        "LE" => lhs <= rhs,
        "EQ" => (lhs - rhs).abs() < 1e-9,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::FANUC_GENERIC;

    #[test]
    fn evaluates_arithmetic_with_precedence() {
        let state = CanalState::new(&FANUC_GENERIC);
        assert_eq!(evaluate("1+2*3", &state).unwrap(), 7.0);
    }

    #[test]
    fn evaluates_nested_brackets_innermost_first() {
        let state = CanalState::new(&FANUC_GENERIC);
        assert_eq!(evaluate("[1+[2*3]]", &state).unwrap(), 7.0);
    }

    #[test]
    fn trig_is_in_degrees() {
        let state = CanalState::new(&FANUC_GENERIC);
        let v = evaluate("SIN(90)", &state).unwrap();
        assert!((v - 1.0).abs() < 1e-9);
    }

    #[test]
    fn substitutes_variable_references() {
        let mut state = CanalState::new(&FANUC_GENERIC);
        state.parameters.insert("1".to_string(), 4.0);
        assert_eq!(evaluate("#1*2", &state).unwrap(), 8.0);
    }

    #[test]
    fn assignment_failure_falls_back_to_zero() {
        let mut state = CanalState::new(&FANUC_GENERIC);
        let mut node = CommandNode::new(1);
        node.variable_command = Some("1=UNKNOWNFUNC(5)".to_string());
        let maps = super::super::ControlFlowMaps::default();
        let options = super::super::EngineOptions::default();
        let mut counters = HashMap::new();
        let mut ctx = HandlerContext {
            options: &options,
            maps: &maps,
            nodes: &[],
            cursor: 0,
            loop_counters: &mut counters,
        };
        VariableHandler.handle(&mut node, &mut state, &mut ctx).unwrap();
        assert_eq!(state.parameters.get("1"), Some(&0.0));
    }
}
