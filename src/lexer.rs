//! NC line lexer: turns one source line into a [`CommandNode`].
//!
//! Grounded on the original `infrastructure/parsers/nc_command_parser.py`
//! tokenizer: comment/parenthesis handling, the vendor-cycle preservation
//! rule, and the duplicate-parameter / bare-variable error codes are all
//! carried over from there.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{CodeError, ErrorLocation, NcError};
use crate::node::CommandNode;

lazy_static! {
    /// Vendor cycle / keyword patterns whose trailing parenthesis group is
    /// part of the call, not a comment, and must survive as one opaque token.
    static ref VENDOR_CYCLE: Regex =
        Regex::new(r"^(CYCLE\d+|POCKET\d+|SLOT\d+|LONGHOLE|HOLES\d+|MCALL|WORKPIECE|MSG|REPEAT)\(").unwrap();

    /// Space-insertion before tokens that otherwise run together, matching
    /// the original parser's pre-tokenization normalization pass. The
    /// `regex` crate has no lookaround, so the preceding character is
    /// captured and re-emitted rather than asserted.
    static ref SPACE_BEFORE_TOKEN: Regex =
        Regex::new(r"([0-9\]\)])(G\d|SQRT|ASIN|ACOS|ATAN|SIN|COS|TAN)").unwrap();

    static ref STRING_LITERAL: Regex = Regex::new("\"[^\"]*\"").unwrap();

    static ref ASSIGNMENT: Regex = Regex::new(r"^[A-Z#][0-9]+=.+$").unwrap();

    static ref BARE_VARIABLE: Regex = Regex::new(r"^[#R][0-9]+$").unwrap();

    /// Loop-command keywords are glued directly to their label/operand
    /// (`DO1`, `END1`, `IF#1GT0GOTO10`) with no separating whitespace, so
    /// this checks only that one starts the block rather than requiring a
    /// word boundary on both sides.
    static ref LOOP_KEYWORD: Regex = Regex::new(r"^(GOTO|IF|WHILE|END|DO)").unwrap();
}

const SINGLE_LETTER_PARAMS: &[char] = &[
    'X', 'Y', 'Z', 'A', 'B', 'C', 'U', 'V', 'W', 'F', 'S', 'T', 'N', 'D', 'H', 'I', 'J', 'K', 'L',
    'Q', 'R',
];

/// Strip `()`-delimited comments from `line`, unless the whole line is a
/// vendor cycle call, in which case the first parenthesis group is kept
/// as part of the line.
fn strip_comments(line: &str) -> String {
    if VENDOR_CYCLE.is_match(line.trim_start()) {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len());
    let mut depth = 0u32;
    for ch in line.chars() {
        match ch {
            '(' => depth += 1,
            ')' => {
                if depth > 0 {
                    depth -= 1;
                }
            }
            c if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

/// Protect double-quoted string literals from tokenization by replacing
/// them with an index placeholder, restored after the token split.
fn extract_string_literals(line: &str) -> (String, Vec<String>) {
    let mut literals = Vec::new();
    let mut out = String::with_capacity(line.len());
    let mut last = 0;
    for m in STRING_LITERAL.find_iter(line) {
        out.push_str(&line[last..m.start()]);
        out.push_str(&format!(" \u{0}{} ", literals.len()));
        literals.push(m.as_str().to_string());
        last = m.end();
    }
    out.push_str(&line[last..]);
    (out, literals)
}

fn restore_literal(token: &str, literals: &[String]) -> String {
    if let Some(rest) = token.strip_prefix('\u{0}') {
        if let Ok(idx) = rest.parse::<usize>() {
            if let Some(lit) = literals.get(idx) {
                return lit.clone();
            }
        }
    }
    token.to_string()
}

/// Parse one NC source line (1-based `line_nr`) into a [`CommandNode`].
pub fn parse_line(raw: &str, line_nr: u32) -> Result<CommandNode, NcError> {
    let mut node = CommandNode::new(line_nr);

    let line = raw.strip_prefix('/').unwrap_or(raw);
    let stripped = strip_comments(line);
    let trimmed = stripped.trim();
    if trimmed.is_empty() {
        return Ok(node);
    }

    if LOOP_KEYWORD.is_match(trimmed) {
        node.loop_command = Some(trimmed.to_string());
        return Ok(node);
    }

    if VENDOR_CYCLE.is_match(trimmed) {
        node.variable_command = Some(trimmed.to_string());
        return Ok(node);
    }

    let (protected, literals) = extract_string_literals(trimmed);
    let spaced = SPACE_BEFORE_TOKEN.replace_all(&protected, "$1 $2").to_string();
    let tokens: Vec<&str> = spaced.split_whitespace().collect();

    if tokens.len() == 1 && BARE_VARIABLE.is_match(tokens[0]) {
        node.variable_command = Some(trimmed.to_string());
        return Ok(node);
    }

    let mut pending_dddp = false;
    for raw_tok in &tokens {
        let tok = restore_literal(raw_tok, &literals);

        if BARE_VARIABLE.is_match(&tok) {
            return Err(CodeError::DuplicateMacroAndCommand {
                value: tok.clone(),
                loc: ErrorLocation::new(line_nr, 0).with_context(raw.to_string(), &tok),
            }
            .into());
        }

        if tok.starts_with(',') {
            pending_dddp = true;
            continue;
        }
        if pending_dddp {
            node.dddp_command.insert(tok.clone());
            pending_dddp = false;
            continue;
        }

        if ASSIGNMENT.is_match(&tok) {
            node.variable_command = Some(match node.variable_command.take() {
                Some(existing) => format!("{existing} {tok}"),
                None => tok.clone(),
            });
            continue;
        }

        let mut chars = tok.chars();
        let letter = match chars.next() {
            Some(c) if c.is_ascii_alphabetic() => c,
            _ => continue,
        };
        let rest: String = chars.collect();

        match letter {
            'G' => {
                node.g_codes.insert(tok.clone());
            }
            'M' => {
                if node.parameters.contains_key(&'M') {
                    return Err(CodeError::DuplicateParameter {
                        value: tok.clone(),
                        loc: ErrorLocation::new(line_nr, 0).with_context(raw.to_string(), &tok),
                    }
                    .into());
                }
                node.parameters.insert('M', rest);
            }
            c if SINGLE_LETTER_PARAMS.contains(&c) => {
                if node.parameters.contains_key(&c) {
                    return Err(CodeError::DuplicateParameter {
                        value: tok.clone(),
                        loc: ErrorLocation::new(line_nr, 0).with_context(raw.to_string(), &tok),
                    }
                    .into());
                }
                node.parameters.insert(c, rest);
            }
            c if c.is_ascii_lowercase() => {
                return Err(CodeError::LowerCaseParameter {
                    value: tok.clone(),
                    loc: ErrorLocation::new(line_nr, 0).with_context(raw.to_string(), &tok),
                }
                .into());
            }
            _ => {}
        }
    }

    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_linear_move_parses_g_code_and_params() {
        let node = parse_line("G1 X10 Y5 F60", 1).unwrap();
        assert!(node.has_g_code("G1"));
        assert_eq!(node.param('X'), Some("10"));
        assert_eq!(node.param('F'), Some("60"));
    }

    #[test]
    fn duplicate_axis_raises_dash_2() {
        let err = parse_line("G1 X10 X20", 1).unwrap_err();
        assert_eq!(err.code(), -2);
    }

    #[test]
    fn comment_is_stripped() {
        let node = parse_line("G1 X10 (rapid to start)", 1).unwrap();
        assert_eq!(node.param('X'), Some("10"));
    }

    #[test]
    fn vendor_cycle_keeps_parenthesis_group() {
        let node = parse_line("CYCLE81(5, 0, 2, -10)", 5).unwrap();
        assert!(node.is_variable_command());
        assert!(node.variable_command.unwrap().contains('('));
    }

    #[test]
    fn bare_variable_alone_becomes_variable_command() {
        let node = parse_line("#1", 1).unwrap();
        assert_eq!(node.variable_command.as_deref(), Some("#1"));
    }

    #[test]
    fn bare_variable_mixed_with_gcode_is_dash_3() {
        let err = parse_line("G1 #1", 1).unwrap_err();
        assert_eq!(err.code(), -3);
    }

    #[test]
    fn loop_keyword_classifies_whole_line() {
        let node = parse_line("IF#1GT0GOTO10", 1).unwrap();
        assert!(node.is_loop_command());
        assert!(node.g_codes.is_empty());
    }

    #[test]
    fn variable_assignment_is_not_a_duplicate() {
        let node = parse_line("R1=10 R2=20", 1).unwrap();
        assert_eq!(node.variable_command.as_deref(), Some("R1=10 R2=20"));
    }

    #[test]
    fn dddp_token_is_collected() {
        let node = parse_line("G1 X10 Y5 ,R2", 1).unwrap();
        assert!(node.dddp_command.contains("R2"));
    }
}
