use log::{debug, warn};

use crate::error::ProtocolError;

/// Fewer tokens than this and the record is not worth parsing.
pub const MIN_FIELDS: usize = 17;

const OPEN: char = '(';
const CLOSE: char = ')';

/// Extracts the whitespace separated tokens between `(` and `)`.
///
/// A response cut off before its closing parenthesis is still accepted, the
/// tokens then run to the end of the buffer minus the line terminator. Bytes
/// outside of ASCII (such as the trailing checksum) are dropped.
pub fn decode(raw: &[u8]) -> Result<Vec<String>, ProtocolError> {
    let text: String = raw
        .iter()
        .filter(|b| b.is_ascii())
        .map(|&b| b as char)
        .collect();
    let text = text.trim();
    debug!("Decoded text: {text}");

    let Some(body) = text.strip_prefix(OPEN) else {
        return Err(ProtocolError::MalformedFrame(format!(
            "missing opening delimiter: {:?}",
            text.chars().take(50).collect::<String>()
        )));
    };

    let payload = match body.find(CLOSE) {
        Some(end) => &body[..end],
        None => {
            let payload = body.trim_end_matches(['\r', '\n']);
            debug!("Using data without closing delimiter: {payload}");
            payload
        }
    };

    let fields: Vec<String> = payload.split_whitespace().map(str::to_string).collect();
    debug!("Parsed values count: {}", fields.len());
    if fields.len() < MIN_FIELDS {
        warn!("Values: {fields:?}");
        return Err(ProtocolError::MalformedFrame(format!(
            "{} fields, need at least {MIN_FIELDS}",
            fields.len()
        )));
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(count: usize) -> String {
        (1..=count)
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn well_formed_frame_keeps_token_order() {
        let raw = format!("({})\r\n", numbered(17));
        let fields = decode(raw.as_bytes()).unwrap();
        assert_eq!(fields.len(), 17);
        assert_eq!(fields, (1..=17).map(|i| i.to_string()).collect::<Vec<_>>());
    }

    #[test]
    fn checksum_after_closing_delimiter_is_ignored() {
        let mut raw = format!("({})", numbered(21)).into_bytes();
        raw.extend_from_slice(&[0xB7, 0x0A, b'\r']);
        let fields = decode(&raw).unwrap();
        assert_eq!(fields.len(), 21);
        assert_eq!(fields[20], "21");
    }

    #[test]
    fn truncated_frame_falls_back_to_buffer_end() {
        let raw = format!("({}\r\n", numbered(18));
        let fields = decode(raw.as_bytes()).unwrap();
        assert_eq!(fields.len(), 18);
        assert_eq!(fields.last().map(String::as_str), Some("18"));
    }

    #[test]
    fn missing_opening_delimiter_is_invalid() {
        let raw = format!("{})\r", numbered(21));
        assert!(matches!(
            decode(raw.as_bytes()),
            Err(ProtocolError::MalformedFrame(_))
        ));
    }

    #[test]
    fn too_few_fields_is_invalid() {
        let raw = format!("({})\r", numbered(16));
        assert!(matches!(
            decode(raw.as_bytes()),
            Err(ProtocolError::MalformedFrame(_))
        ));
    }

    #[test]
    fn empty_buffer_is_invalid() {
        assert!(decode(&[]).is_err());
    }

    #[test]
    fn non_ascii_bytes_are_dropped() {
        let mut raw = b"(".to_vec();
        raw.extend_from_slice(numbered(17).as_bytes());
        raw.insert(3, 0xFF);
        raw.push(b')');
        let fields = decode(&raw).unwrap();
        assert_eq!(fields.len(), 17);
    }

    #[test]
    fn leading_whitespace_before_delimiter_is_tolerated() {
        let raw = format!("\r\n({})\r", numbered(17));
        assert_eq!(decode(raw.as_bytes()).unwrap().len(), 17);
    }
}
