//! Structured-field classification and normalisation.
//!
//! Header values are parsed as IETF Structured Fields per
//! <https://datatracker.ietf.org/doc/html/draft-ietf-httpbis-message-signatures-06>
//! and renormalised into covered components. A top-level item separator is
//! the exact byte pair `", "`; a lone comma is part of the value.

use crate::error::{Result, SigningError};

use super::inner_list::parse_inner_list;
use super::list::parse_list;
use super::map::parse_map;

/// Bytes allowed in a component name (and in dictionary keys)
pub(crate) fn allowed_for_key(b: u8) -> bool {
    b == b'_' || b == b'-' || b == b'.' || b == b'*' || b.is_ascii_lowercase() || b.is_ascii_digit()
}

/// Bytes allowed in an unquoted value
pub(crate) fn allowed_for_value(b: u8) -> bool {
    (0x20..=0x7f).contains(&b)
}

/// True when position `i` starts the top-level separator `", "`
pub(crate) fn end_of_item(src: &[u8], i: usize) -> bool {
    i + 1 < src.len() && src[i] == b',' && src[i + 1] == b' '
}

/// First index at or after `start` that is not a space
pub(crate) fn skip_spaces(src: &[u8], start: usize) -> usize {
    let mut k = start;
    while k < src.len() && src[k] == b' ' {
        k += 1;
    }
    k
}

/// Structured-field shape of a joined header value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    InnerList,
    List,
    Item,
    Dictionary,
}

/// Classify a non-empty joined value by scanning for the first telling byte
fn classify(src: &str) -> ValueKind {
    let bytes = src.as_bytes();
    if bytes[0] == b'(' {
        return ValueKind::InnerList;
    }
    if bytes[0] == b'"' {
        return ValueKind::List;
    }
    for &b in &bytes[1..] {
        if b == b'=' {
            return ValueKind::Dictionary;
        } else if b == b',' {
            return ValueKind::List;
        } else if !allowed_for_key(b) {
            return ValueKind::Item;
        }
    }
    ValueKind::Item
}

/// Turn one header `(name, [values..])` into its covered components.
///
/// The name is trimmed and lowercased and must stay within `[a-z0-9._*-]`.
/// Values are trimmed individually and joined with `", "` before being
/// classified; the expansion per shape is:
///
/// - item: `(name, value)`
/// - list: `(name, items joined with ", ")`
/// - inner list: `(name:0, "()")` then one prefix entry per length
/// - dictionary: `(name:key, raw value)` per key, in lexicographic key order
pub fn normalise(name: &str, values: &[String]) -> Result<Vec<(String, String)>> {
    let normalised = name.trim().to_ascii_lowercase();
    if normalised.bytes().any(|b| !allowed_for_key(b)) {
        return Err(SigningError::WrongKeySymbol(normalised));
    }

    let joined = values
        .iter()
        .map(|v| v.trim())
        .collect::<Vec<_>>()
        .join(", ");
    if joined.is_empty() {
        return Ok(vec![(normalised, String::new())]);
    }

    match classify(&joined) {
        ValueKind::Item => {
            let items = parse_list(&joined)?;
            let first = items
                .into_iter()
                .next()
                .ok_or(SigningError::UnknownMaterialValue(joined))?;
            Ok(vec![(normalised, first)])
        }
        ValueKind::List => {
            let items = parse_list(&joined)?;
            Ok(vec![(normalised, items.join(", "))])
        }
        ValueKind::InnerList => {
            let items = parse_inner_list(&joined)?;
            let mut out = vec![(format!("{normalised}:0"), "()".to_string())];
            for k in 1..=items.len() {
                out.push((
                    format!("{normalised}:{k}"),
                    format!("({})", items[..k].join(", ")),
                ));
            }
            Ok(out)
        }
        ValueKind::Dictionary => {
            let map = parse_map(&joined)?;
            let mut keys: Vec<String> = map.keys().cloned().collect();
            keys.sort();
            Ok(keys
                .into_iter()
                .map(|k| {
                    let v = map[&k].clone();
                    (format!("{normalised}:{k}"), v)
                })
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(value: &str) -> Vec<String> {
        vec![value.to_string()]
    }

    #[test]
    fn test_bare_item() {
        let out = normalise("Content-Type", &one("application/json")).unwrap();
        assert_eq!(out, vec![("content-type".into(), "application/json".into())]);
    }

    #[test]
    fn test_name_is_trimmed_and_lowercased() {
        let out = normalise(" Accept ", &one("*/*")).unwrap();
        assert_eq!(out[0].0, "accept");
    }

    #[test]
    fn test_invalid_name_rejected() {
        let err = normalise("bad header", &one("v")).unwrap_err();
        assert!(matches!(err, SigningError::WrongKeySymbol(_)));
    }

    #[test]
    fn test_empty_value_single_pair() {
        let out = normalise("empty", &one("   ")).unwrap();
        assert_eq!(out, vec![("empty".into(), String::new())]);
    }

    #[test]
    fn test_multiple_values_joined() {
        let out = normalise("via", &[" a ".to_string(), "b".to_string()]).unwrap();
        assert_eq!(out, vec![("via".into(), "a, b".into())]);
    }

    #[test]
    fn test_list_of_strings() {
        let out = normalise("list", &one(r#""one", "two""#)).unwrap();
        assert_eq!(out, vec![("list".into(), r#""one", "two""#.into())]);
    }

    #[test]
    fn test_inner_list_prefix_expansion() {
        let out = normalise("inner", &one("(a, b)")).unwrap();
        assert_eq!(
            out,
            vec![
                ("inner:0".into(), "()".into()),
                ("inner:1".into(), "(a)".into()),
                ("inner:2".into(), "(a, b)".into()),
            ]
        );
    }

    #[test]
    fn test_dictionary_expansion_is_sorted() {
        let out = normalise("dict", &one("b=2, a=1")).unwrap();
        assert_eq!(
            out,
            vec![("dict:a".into(), "1".into()), ("dict:b".into(), "2".into())]
        );
    }

    #[test]
    fn test_dictionary_with_quoted_value() {
        let out = normalise("dict", &one(r#"k="v w", l=2"#)).unwrap();
        assert_eq!(
            out,
            vec![
                ("dict:k".into(), r#""v w""#.into()),
                ("dict:l".into(), "2".into()),
            ]
        );
    }

    #[test]
    fn test_lone_comma_is_not_a_separator() {
        // only the byte pair `", "` separates items at the top level
        let out = normalise("item", &one("a,b")).unwrap();
        assert_eq!(out, vec![("item".into(), "a,b".into())]);
    }

    #[test]
    fn test_control_byte_rejected() {
        let err = normalise("item", &one("a\u{1}b")).unwrap_err();
        assert!(matches!(err, SigningError::WrongValueSymbol(_)));
    }

    #[test]
    fn test_imbalanced_quotes_rejected() {
        let err = normalise("list", &one(r#""unterminated"#)).unwrap_err();
        assert!(matches!(err, SigningError::ImbalancedQuotes(_)));
    }

    #[test]
    fn test_round_trip() {
        // normalising the output of normalise yields the same pairs
        for value in ["simple", "a, b, c", r#""x", "y""#, "a,b"] {
            let first = normalise("h", &one(value)).unwrap();
            assert_eq!(first.len(), 1);
            let (name, v) = &first[0];
            let second = normalise(name, &one(v)).unwrap();
            assert_eq!(&second, &first);
        }
    }
}
