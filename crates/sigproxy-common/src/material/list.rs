//! Top-level list parsing: bare tokens and quoted strings separated by `", "`.

use crate::error::{Result, SigningError};

use super::parser::{allowed_for_value, end_of_item, skip_spaces};

/// Split a joined header value into its top-level items.
///
/// Quoted strings keep their quotes and backslash escapes verbatim; unquoted
/// runs are validated against the printable-ASCII range.
pub(crate) fn parse_list(src: &str) -> Result<Vec<String>> {
    let bytes = src.as_bytes();
    let mut list = Vec::new();
    let mut item: Vec<u8> = Vec::new();
    let mut quoted = false;
    let mut i = 0usize;

    while i < bytes.len() {
        let b = bytes[i];
        if quoted {
            if b == b'"' {
                quoted = false;
                item.push(b);
                list.push(String::from_utf8_lossy(&item).into_owned());
                item.clear();
                i += 1;
                if end_of_item(bytes, i) {
                    i += 1;
                }
                i += 1;
                continue;
            }
            item.push(b);
            if b == b'\\' {
                i += 1;
                if i < bytes.len() {
                    item.push(bytes[i]);
                } else {
                    return Err(SigningError::ImbalancedQuotes(src.to_string()));
                }
            }
        } else if b == b'"' {
            quoted = true;
            item.push(b);
        } else {
            if end_of_item(bytes, i) {
                list.push(String::from_utf8_lossy(&item).into_owned());
                item.clear();
                i = skip_spaces(bytes, i + 1);
                continue;
            }
            if !allowed_for_value(b) {
                return Err(SigningError::WrongValueSymbol(src.to_string()));
            }
            item.push(b);
        }
        i += 1;
    }

    if !item.is_empty() {
        if quoted {
            return Err(SigningError::ImbalancedQuotes(src.to_string()));
        }
        list.push(String::from_utf8_lossy(&item).into_owned());
    }
    Ok(list)
}
