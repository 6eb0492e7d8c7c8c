/*
    SPDX-License-Identifier: AGPL-3.0-or-later
    SPDX-FileCopyrightText: 2025 Shomy
*/
//! Tag extraction for the ad-hoc `<tag>value</tag>` documents XML-DA speaks.
//! These responses are not always well-formed XML (duplicate tags, missing
//! root elements), so rather than bring in a conformant parser we walk the
//! text directly, the same way MTK's own tools do.

use crate::error::{Error, Result};

fn extract_tag<'a>(haystack: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = haystack.find(&open)? + open.len();
    let end = haystack[start..].find(&close)? + start;
    Some(&haystack[start..end])
}

/// Walks a `/`-separated tag path (e.g. `"arg/packet_length"`), returning the
/// innermost tag's text content parsed as `T`.
pub fn get_tag<T: std::str::FromStr>(xml: &str, path: &str) -> Result<T> {
    let mut current = xml.to_string();
    for segment in path.split('/') {
        current = extract_tag(&current, segment)
            .ok_or_else(|| Error::proto(format!("Missing XML tag '{}' in path '{}'", segment, path)))?
            .to_string();
    }
    current
        .parse::<T>()
        .map_err(|_| Error::proto(format!("Failed to parse XML tag '{}' contents", path)))
}

/// Like [`get_tag`], but accepts either decimal or `0x`-prefixed hex content.
pub fn get_tag_usize(xml: &str, path: &str) -> Result<usize> {
    let raw: String = get_tag(xml, path)?;
    let trimmed = raw.trim();
    match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        Some(hex) => {
            usize::from_str_radix(hex, 16).map_err(|_| Error::proto("Invalid hex usize in XML tag"))
        }
        None => trimmed.parse::<usize>().map_err(|_| Error::proto("Invalid usize in XML tag")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_flat_tag() {
        let doc = "<da><command>CMD:DOWNLOAD-FILE</command></da>";
        let cmd: String = get_tag(doc, "command").unwrap();
        assert_eq!(cmd, "CMD:DOWNLOAD-FILE");
    }

    #[test]
    fn reads_nested_tag_path() {
        let doc = "<da><arg><packet_length>0x4000</packet_length></arg></da>";
        assert_eq!(get_tag_usize(doc, "arg/packet_length").unwrap(), 0x4000);
    }

    #[test]
    fn missing_tag_errors() {
        let doc = "<da></da>";
        let result: Result<String> = get_tag(doc, "missing");
        assert!(result.is_err());
    }
}
