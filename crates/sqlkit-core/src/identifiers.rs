//! SQL identifier quoting.
//!
//! Savepoint names are caller-supplied and end up spliced into SQL text, so
//! they are always emitted as quoted identifiers.

/// Quote a SQL identifier using ANSI double-quoting.
///
/// Embedded double-quotes are escaped by doubling them (`"` → `""`).
///
/// # Examples
///
/// ```
/// use sqlkit_core::quote_ident;
///
/// assert_eq!(quote_ident("outer"), "\"outer\"");
/// assert_eq!(quote_ident("sp\"1"), "\"sp\"\"1\"");
/// ```
#[inline]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
