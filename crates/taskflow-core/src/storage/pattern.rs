//! Key patterns in the glob dialect shared by `SCAN MATCH` and SQLite `GLOB`:
//! `*`, `?`, `[abc]`, `[a-z]`, and negated `[^...]` classes.
//!
//! Patterns are written in that dialect so they can be pushed down to SQLite
//! unchanged; in-process matching goes through `glob::Pattern`.

use taskflow_types::error::StoreError;

/// Escape the glob metacharacters in a literal key fragment.
///
/// Uses single-character classes rather than backslashes, which `GLOB` does
/// not understand.
pub fn escape(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for c in literal.chars() {
        match c {
            '*' | '?' | '[' => {
                out.push('[');
                out.push(c);
                out.push(']');
            }
            _ => out.push(c),
        }
    }
    out
}

/// Compile a key pattern. `glob` spells class negation `[!...]`.
pub fn compile(pattern: &str) -> Result<glob::Pattern, StoreError> {
    glob::Pattern::new(&pattern.replace("[^", "[!"))
        .map_err(|e| StoreError::Backend(format!("invalid key pattern '{pattern}': {e}")))
}

/// Whether `text` matches `pattern` in full. Invalid patterns match nothing.
pub fn matches(pattern: &str, text: &str) -> bool {
    compile(pattern).map(|p| p.matches(text)).unwrap_or(false)
}
