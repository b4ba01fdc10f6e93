//! Parsing of the raw `Key: Value` header block an endpoint is configured with.

/// Parse a rendered header block into ordered `(name, value)` pairs.
///
/// Each line of the form `Key: Value` contributes one header; the split is
/// on the first colon so values may contain colons themselves. Lines without
/// a colon are skipped. Keys and values are trimmed. A repeated name keeps
/// its first position and takes the last value.
pub fn parse_header_block(block: &str) -> Vec<(String, String)> {
    let mut headers = Vec::new();
    for line in block.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        set_header(&mut headers, key, value.trim().to_string());
    }
    headers
}

/// Insert or overwrite a header, matching names case-insensitively.
///
/// An existing entry keeps its position but takes the new spelling and value.
pub fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: String) {
    match headers
        .iter_mut()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
    {
        Some(entry) => *entry = (name.to_string(), value),
        None => headers.push((name.to_string(), value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(k: &str, v: &str) -> (String, String) {
        (k.to_string(), v.to_string())
    }

    #[test]
    fn empty_block_yields_no_headers() {
        assert!(parse_header_block("").is_empty());
        assert!(parse_header_block("\n\n").is_empty());
    }

    #[test]
    fn parses_lines_in_order_and_trims() {
        let headers = parse_header_block("  X-One :  1 \nX-Two: two\r\n");
        assert_eq!(headers, vec![pair("X-One", "1"), pair("X-Two", "two")]);
    }

    #[test]
    fn lines_without_colon_are_skipped() {
        let headers = parse_header_block("garbage\nX-Test: value\njust text");
        assert_eq!(headers, vec![pair("X-Test", "value")]);
    }

    #[test]
    fn value_may_contain_colons() {
        let headers = parse_header_block("X-Url: http://example.com:8080/x");
        assert_eq!(headers, vec![pair("X-Url", "http://example.com:8080/x")]);
    }

    #[test]
    fn last_duplicate_wins_but_keeps_first_position() {
        let headers = parse_header_block("A: 1\nB: 2\na: 3");
        assert_eq!(headers, vec![pair("a", "3"), pair("B", "2")]);
    }

    #[test]
    fn empty_key_is_skipped() {
        assert!(parse_header_block(": orphan").is_empty());
    }

    #[test]
    fn set_header_appends_new_names() {
        let mut headers = vec![pair("A", "1")];
        set_header(&mut headers, "B", "2".to_string());
        assert_eq!(headers, vec![pair("A", "1"), pair("B", "2")]);
    }
}
