//! Dictionary parsing: `key=value, key2="quoted", key3=(inner list)`.

use std::collections::HashMap;

use crate::error::{Result, SigningError};

use super::inner_list::extract_inner_list;
use super::parser::{allowed_for_key, allowed_for_value, end_of_item, skip_spaces};

/// Parse a dictionary-shaped value into its raw key/value entries.
///
/// Values keep their surface form: quoted strings keep their quotes, inner
/// lists keep their parens.
pub(crate) fn parse_map(src: &str) -> Result<HashMap<String, String>> {
    let bytes = src.as_bytes();
    let mut entries = HashMap::new();
    let mut i = 0usize;

    while i < bytes.len() {
        let key = get_key(src, i)?;
        i += key.len() + 1;
        if i >= bytes.len() {
            entries.insert(key, String::new());
            break;
        }
        let value = if bytes[i] == b'"' {
            extract_quoted_inner_value(&src[i..])?
        } else if bytes[i] == b'(' {
            let inner = extract_inner_list(&src[i..])?;
            format!("({inner})")
        } else {
            extract_inner_value(&src[i..])?
        };
        i += value.len();
        entries.insert(key, value);
        if end_of_item(bytes, i) {
            i = skip_spaces(bytes, i + 1);
        } else {
            i += 1;
        }
    }
    Ok(entries)
}

fn get_key(src: &str, start: usize) -> Result<String> {
    let bytes = src.as_bytes();
    let mut key: Vec<u8> = Vec::new();
    for &b in &bytes[start..] {
        if allowed_for_key(b) {
            key.push(b);
        } else if b == b'=' {
            return Ok(String::from_utf8_lossy(&key).into_owned());
        } else {
            return Err(SigningError::WrongKeySymbol(src[start..].to_string()));
        }
    }
    Err(SigningError::WrongKeySymbol(src[start..].to_string()))
}

fn extract_quoted_inner_value(src: &str) -> Result<String> {
    let bytes = src.as_bytes();
    let mut value: Vec<u8> = vec![bytes[0]];
    let mut i = 1usize;

    while i < bytes.len() {
        let b = bytes[i];
        if b == b'"' {
            value.push(b);
            return Ok(String::from_utf8_lossy(&value).into_owned());
        }
        value.push(b);
        if b == b'\\' {
            if end_of_item(bytes, i) || i + 1 >= bytes.len() {
                return Err(SigningError::WrongValueSymbol(src.to_string()));
            }
            value.push(bytes[i + 1]);
            i += 1;
        }
        i += 1;
    }
    Err(SigningError::WrongValueSymbol(src.to_string()))
}

fn extract_inner_value(src: &str) -> Result<String> {
    let bytes = src.as_bytes();
    let mut value: Vec<u8> = Vec::new();
    for (i, &b) in bytes.iter().enumerate() {
        if end_of_item(bytes, i) {
            break;
        }
        if !allowed_for_value(b) {
            return Err(SigningError::WrongValueSymbol(src.to_string()));
        }
        value.push(b);
    }
    Ok(String::from_utf8_lossy(&value).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_entries() {
        let m = parse_map("a=1, b=2").unwrap();
        assert_eq!(m.get("a").unwrap(), "1");
        assert_eq!(m.get("b").unwrap(), "2");
    }

    #[test]
    fn test_quoted_value() {
        let m = parse_map(r#"k="v, w", b=2"#).unwrap();
        assert_eq!(m.get("k").unwrap(), r#""v, w""#);
        assert_eq!(m.get("b").unwrap(), "2");
    }

    #[test]
    fn test_inner_list_value() {
        let m = parse_map("k=(a b), b=2").unwrap();
        assert_eq!(m.get("k").unwrap(), "(a b)");
        assert_eq!(m.get("b").unwrap(), "2");
    }

    #[test]
    fn test_bad_key() {
        assert!(matches!(
            parse_map("k v=1"),
            Err(SigningError::WrongKeySymbol(_))
        ));
    }
}
