//! The command node: the sole currency between the parser and the handler chain.

use std::collections::{BTreeMap, BTreeSet};

/// One logical NC block — one source line, or one `;`-separated command.
///
/// Handlers see this as a mutable, in-place-rewritable structure: polar
/// remapping rewrites `parameters`, cutter compensation consumes `D`,
/// control flow rewrites `next`. Nothing here outlives the canal that
/// owns it.
#[derive(Debug, Clone, Default)]
pub struct CommandNode {
    pub g_codes: BTreeSet<String>,
    /// Single upper-case letter key to its raw textual value.
    pub parameters: BTreeMap<char, String>,
    pub loop_command: Option<String>,
    pub variable_command: Option<String>,
    pub dddp_command: BTreeSet<String>,
    pub line_nr: u32,
    /// Index into the owning canal's node vector, set up before execution.
    pub next: Option<usize>,
    pub prev: Option<usize>,
}

impl CommandNode {
    pub fn new(line_nr: u32) -> Self {
        Self { line_nr, ..Default::default() }
    }

    pub fn has_g_code(&self, code: &str) -> bool {
        self.g_codes.contains(code)
    }

    /// Any of the requested g-codes is present (modal groups often share
    /// multiple synonymous spellings, e.g. `G0`/`G00`).
    pub fn has_any_g_code(&self, codes: &[&str]) -> bool {
        codes.iter().any(|c| self.g_codes.contains(*c))
    }

    pub fn param(&self, letter: char) -> Option<&str> {
        self.parameters.get(&letter).map(|s| s.as_str())
    }

    pub fn param_f64(&self, letter: char) -> Option<f64> {
        self.param(letter).and_then(|v| v.parse::<f64>().ok())
    }

    pub fn is_loop_command(&self) -> bool {
        self.loop_command.is_some()
    }

    pub fn is_variable_command(&self) -> bool {
        self.variable_command.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_any_g_code_matches_synonyms() {
        let mut node = CommandNode::new(1);
        node.g_codes.insert("G1".to_string());
        assert!(node.has_any_g_code(&["G01", "G1"]));
        assert!(!node.has_any_g_code(&["G2", "G02"]));
    }

    #[test]
    fn param_f64_parses_numeric_text() {
        let mut node = CommandNode::new(1);
        node.parameters.insert('X', "10.5".to_string());
        assert_eq!(node.param_f64('X'), Some(10.5));
        assert_eq!(node.param_f64('Y'), None);
    }
}
