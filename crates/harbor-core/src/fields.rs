//! Wire ↔ local field-name mapping.
//!
//! The wire protocol spells record fields in camelCase; the local store
//! spells them in snake_case. The pull pipeline maps names at the boundary,
//! so by the time a document reaches the store the names match local
//! conventions. Keys that are already snake_case pass through unchanged.

use crate::types::Document;

/// Converts a camelCase key to snake_case. snake_case input is unchanged.
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Converts a snake_case key to camelCase. camelCase input is unchanged.
pub fn to_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for ch in name.chars() {
        if ch == '_' {
            upper_next = true;
        } else if upper_next {
            out.push(ch.to_ascii_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Rewrites every key of `doc` to snake_case.
pub fn document_to_snake_case(doc: &Document) -> Document {
    doc.iter()
        .map(|(k, v)| (to_snake_case(k), v.clone()))
        .collect()
}
