//! Inner-list extraction: `(item item ...)` values.

use crate::error::{Result, SigningError};

use super::list::parse_list;
use super::parser::end_of_item;

/// Parse the items of an inner list, `(a, b)` style.
pub(crate) fn parse_inner_list(src: &str) -> Result<Vec<String>> {
    let inner = extract_inner_list(src)?;
    parse_list(&inner)
}

/// Return the raw content between the opening paren and its closing paren,
/// honouring quoted strings and backslash escapes.
pub(crate) fn extract_inner_list(src: &str) -> Result<String> {
    let bytes = src.as_bytes();
    let mut content: Vec<u8> = Vec::new();
    let mut quoted = false;
    let mut i = 1usize;

    while i < bytes.len() {
        let mut b = bytes[i];
        if quoted {
            if b == b'"' {
                quoted = false;
            }
            if b == b'\\' {
                content.push(b);
                if !end_of_item(bytes, i) {
                    i += 1;
                    if i >= bytes.len() {
                        return Err(SigningError::ImbalancedQuotes(src.to_string()));
                    }
                    b = bytes[i];
                }
            }
        } else {
            if b == b'"' {
                quoted = true;
            }
            if b == b')' {
                return Ok(String::from_utf8_lossy(&content).into_owned());
            }
        }
        content.push(b);
        i += 1;
    }
    Err(SigningError::WrongValueSymbol(src.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        assert_eq!(parse_inner_list("()").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_items() {
        assert_eq!(parse_inner_list("(a, b)").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_quoted_paren_is_content() {
        assert_eq!(extract_inner_list(r#"(")")"#).unwrap(), r#"")""#);
    }

    #[test]
    fn test_unclosed() {
        assert!(matches!(
            extract_inner_list("(a, b"),
            Err(SigningError::WrongValueSymbol(_))
        ));
    }
}
