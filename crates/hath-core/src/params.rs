//! The `k=v;k=v` addendum grammar used in request paths and command
//! arguments.

use std::collections::HashMap;

/// Parses an addendum string into a key/value map.
///
/// Fragments are `;`-separated; each must split on `=` into exactly two
/// pieces, with whitespace around key and value trimmed. Anything else is
/// silently dropped. An empty input yields an empty map.
pub fn parse_addendum(add: &str) -> HashMap<String, String> {
    if add.is_empty() {
        return HashMap::new();
    }

    add.split(';')
        .filter_map(|fragment| {
            let parts: Vec<&str> = fragment.split('=').collect();
            match parts.as_slice() {
                [key, value] => Some((key.trim().to_string(), value.trim().to_string())),
                _ => None,
            }
        })
        .collect()
}
