//! SCGI netstring header-block parser.
//!
//! An SCGI request starts with `<len>:<block>,` where `len` is the byte
//! length of the block in ASCII decimal and the block is a sequence of
//! NUL-terminated `name` / `value` strings. CONTENT_LENGTH must be the
//! first pair and an `SCGI` = `1` pair must be present.

use crate::protocols::ProtocolError;

/// Largest accepted header block. A length prefix beyond this is treated
/// as malformed framing rather than an allocation request.
const MAX_HEADER_LEN: usize = 64 * 1024;

/// Digits in the length prefix of the largest accepted block.
const MAX_PREFIX_DIGITS: usize = 5;

/// Result of scanning the buffer for the header block.
#[derive(Debug)]
pub enum ParseResult {
    /// Header block parsed. `consumed` covers the prefix, the block, and
    /// the trailing comma.
    Complete {
        pairs: Vec<(String, String)>,
        consumed: usize,
    },
    /// Need more data.
    Incomplete,
    /// Malformed framing.
    Error(ProtocolError),
}

/// Parse the netstring-framed header block from the start of `input`.
pub fn parse_header(input: &[u8]) -> ParseResult {
    let colon = match input.iter().position(|&b| b == b':') {
        Some(pos) => pos,
        None => {
            if input.len() > MAX_PREFIX_DIGITS {
                return ParseResult::Error(ProtocolError::InvalidNetstring(
                    "length prefix too long".to_string(),
                ));
            }
            return ParseResult::Incomplete;
        }
    };

    if colon == 0 || colon > MAX_PREFIX_DIGITS {
        return ParseResult::Error(ProtocolError::InvalidNetstring(
            "bad length prefix".to_string(),
        ));
    }
    let prefix = &input[..colon];
    if !prefix.iter().all(|b| b.is_ascii_digit()) {
        return ParseResult::Error(ProtocolError::InvalidNetstring(format!(
            "non-numeric length prefix: {:?}",
            String::from_utf8_lossy(prefix)
        )));
    }
    // The prefix is at most five digits, so this cannot overflow.
    let len: usize = String::from_utf8_lossy(prefix).parse().unwrap_or(0);
    if len > MAX_HEADER_LEN {
        return ParseResult::Error(ProtocolError::InvalidNetstring(format!(
            "header block of {} bytes exceeds limit",
            len
        )));
    }

    let start = colon + 1;
    if input.len() < start + len + 1 {
        return ParseResult::Incomplete;
    }
    if input[start + len] != b',' {
        return ParseResult::Error(ProtocolError::InvalidNetstring(
            "missing terminator".to_string(),
        ));
    }

    match split_pairs(&input[start..start + len]) {
        Ok(pairs) => ParseResult::Complete {
            pairs,
            consumed: start + len + 1,
        },
        Err(e) => ParseResult::Error(e),
    }
}

/// Check the SCGI header requirements and return the declared content
/// length: CONTENT_LENGTH first, an SCGI = 1 pair present.
pub fn content_length(pairs: &[(String, String)]) -> Result<usize, ProtocolError> {
    let (name, value) = match pairs.first() {
        Some(pair) => pair,
        None => return Err(ProtocolError::MissingContentLength),
    };
    if name != "CONTENT_LENGTH" {
        return Err(ProtocolError::MissingContentLength);
    }
    let len = value
        .parse()
        .map_err(|_| ProtocolError::InvalidContentLength(value.clone()))?;

    if !pairs.iter().any(|(n, v)| n == "SCGI" && v == "1") {
        return Err(ProtocolError::MissingScgiMarker);
    }
    Ok(len)
}

fn split_pairs(block: &[u8]) -> Result<Vec<(String, String)>, ProtocolError> {
    if block.is_empty() {
        return Ok(Vec::new());
    }
    if block.last() != Some(&0) {
        return Err(ProtocolError::Malformed(
            "header block not NUL-terminated".to_string(),
        ));
    }

    let mut fields: Vec<&[u8]> = block.split(|&b| b == 0).collect();
    // The trailing NUL produces one empty field at the end.
    fields.pop();
    if fields.len() % 2 != 0 {
        return Err(ProtocolError::Malformed(
            "odd number of header fields".to_string(),
        ));
    }

    Ok(fields
        .chunks(2)
        .map(|pair| {
            (
                String::from_utf8_lossy(pair[0]).into_owned(),
                String::from_utf8_lossy(pair[1]).into_owned(),
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Frame a header block the way a web server would.
    pub(super) fn frame(pairs: &[(&str, &str)]) -> Vec<u8> {
        let mut block = Vec::new();
        for (name, value) in pairs {
            block.extend_from_slice(name.as_bytes());
            block.push(0);
            block.extend_from_slice(value.as_bytes());
            block.push(0);
        }
        let mut framed = format!("{}:", block.len()).into_bytes();
        framed.extend_from_slice(&block);
        framed.push(b',');
        framed
    }

    #[test]
    fn test_parse_valid_header() {
        let input = frame(&[("CONTENT_LENGTH", "5"), ("SCGI", "1")]);
        match parse_header(&input) {
            ParseResult::Complete { pairs, consumed } => {
                assert_eq!(consumed, input.len());
                assert_eq!(pairs[0], ("CONTENT_LENGTH".to_string(), "5".to_string()));
                assert_eq!(pairs[1], ("SCGI".to_string(), "1".to_string()));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_incomplete_header() {
        let input = frame(&[("CONTENT_LENGTH", "5"), ("SCGI", "1")]);
        match parse_header(&input[..input.len() - 3]) {
            ParseResult::Incomplete => {}
            other => panic!("unexpected: {:?}", other),
        }
        match parse_header(b"27") {
            ParseResult::Incomplete => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_corrupted_length_prefix() {
        match parse_header(b"xx:CONTENT_LENGTH\x000\x00,") {
            ParseResult::Error(ProtocolError::InvalidNetstring(_)) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_missing_terminator() {
        let mut input = frame(&[("CONTENT_LENGTH", "0"), ("SCGI", "1")]);
        let last = input.len() - 1;
        input[last] = b'X';
        match parse_header(&input) {
            ParseResult::Error(ProtocolError::InvalidNetstring(_)) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_oversized_header_rejected() {
        match parse_header(b"99999:") {
            ParseResult::Error(ProtocolError::InvalidNetstring(_)) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_block_without_trailing_nul() {
        match parse_header(b"4:ABCD,") {
            ParseResult::Error(ProtocolError::Malformed(_)) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_content_length_first_required() {
        let pairs = vec![
            ("SCGI".to_string(), "1".to_string()),
            ("CONTENT_LENGTH".to_string(), "5".to_string()),
        ];
        match content_length(&pairs) {
            Err(ProtocolError::MissingContentLength) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_scgi_marker_required() {
        let pairs = vec![("CONTENT_LENGTH".to_string(), "5".to_string())];
        match content_length(&pairs) {
            Err(ProtocolError::MissingScgiMarker) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_content_length_parsed() {
        let pairs = vec![
            ("CONTENT_LENGTH".to_string(), "12".to_string()),
            ("SCGI".to_string(), "1".to_string()),
        ];
        assert_eq!(content_length(&pairs).unwrap(), 12);
    }

    #[test]
    fn test_bad_content_length_value() {
        let pairs = vec![
            ("CONTENT_LENGTH".to_string(), "abc".to_string()),
            ("SCGI".to_string(), "1".to_string()),
        ];
        match content_length(&pairs) {
            Err(ProtocolError::InvalidContentLength(_)) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }
}
