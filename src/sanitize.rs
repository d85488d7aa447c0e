//! Boundary sanitizer for permissive callers.
//!
//! The strict parser in [`crate::lexer`] raises `CodeErrors/-2` on a
//! duplicate axis letter within one block. The HTTP-facing boundary layer
//! in the original implementation instead silently keeps the *last*
//! occurrence of each duplicated axis token. Per the design note on
//! sanitizer semantics, the two behaviors are kept in distinct layers
//! rather than fused: this function is never called by [`crate::lexer`],
//! only by callers that want permissive pre-cleaning before strict parsing.

const AXIS_LETTERS: &[char] = &['X', 'Y', 'Z', 'A', 'B', 'C', 'U', 'V', 'W'];

/// Rewrite `line` so that each axis letter appears at most once, keeping
/// the last occurrence and dropping earlier ones, while preserving token
/// order otherwise.
pub fn sanitize(line: &str) -> String {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    let mut last_index_for_axis = std::collections::HashMap::new();
    for (i, tok) in tokens.iter().enumerate() {
        if let Some(letter) = tok.chars().next() {
            if AXIS_LETTERS.contains(&letter) {
                last_index_for_axis.insert(letter, i);
            }
        }
    }

    tokens
        .iter()
        .enumerate()
        .filter(|(i, tok)| match tok.chars().next() {
            Some(letter) if AXIS_LETTERS.contains(&letter) => {
                last_index_for_axis.get(&letter) == Some(i)
            }
            _ => true,
        })
        .map(|(_, tok)| *tok)
        .collect::<Vec<_>>()
        .join(" ")
}
