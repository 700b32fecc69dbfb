//! Extraction of the base64 report embedded in a response

use base64::engine::general_purpose::STANDARD;
use base64::{DecodeError, Engine as _};
use std::borrow::Cow;
use tracing::debug;

use crate::error::{Result, SoapCallError};

pub const REPORT_OPEN: &[u8] = b"<reportBytes>";
pub const REPORT_CLOSE: &[u8] = b"</reportBytes>";

/// Decode the `<reportBytes>` payload of `raw`.
///
/// The markers are located by plain substring search, first occurrence of
/// each, without regard to nesting. When the opening marker is missing or the
/// closing marker does not come after it, `raw` is returned untouched.
pub fn extract_report_bytes(raw: &[u8]) -> Result<Cow<'_, [u8]>> {
    let Some(payload) = embedded_payload(raw) else {
        debug!("No embedded report found, passing {} bytes through", raw.len());
        return Ok(Cow::Borrowed(raw));
    };

    // Line breaks are common in wrapped base64 and carry no data
    let cleaned: Vec<u8> = payload
        .iter()
        .copied()
        .filter(|b| *b != b'\r' && *b != b'\n')
        .collect();

    match STANDARD.decode(&cleaned) {
        Ok(decoded) => {
            debug!(
                "Decoded embedded report: {} base64 bytes -> {} bytes",
                cleaned.len(),
                decoded.len()
            );
            Ok(Cow::Owned(decoded))
        }
        Err(e) => Err(SoapCallError::Decode {
            message: format!("embedded report is not valid base64: {e}"),
            raw: raw.to_vec(),
            partial: decode_prefix(&cleaned, &e),
        }),
    }
}

/// Bytes strictly between the first opening and first closing marker
fn embedded_payload(raw: &[u8]) -> Option<&[u8]> {
    let open = find(raw, REPORT_OPEN)?;
    let close = find(raw, REPORT_CLOSE)?;
    let start = open + REPORT_OPEN.len();

    if close > open && close >= start {
        Some(&raw[start..close])
    } else {
        None
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Decode the complete 4-character groups that precede the first error
fn decode_prefix(input: &[u8], error: &DecodeError) -> Vec<u8> {
    let valid = match error {
        DecodeError::InvalidByte(offset, _) | DecodeError::InvalidLastSymbol(offset, _) => *offset,
        DecodeError::InvalidLength(len) => *len,
        DecodeError::InvalidPadding => 0,
    };
    let complete = (valid - valid % 4).min(input.len());

    input
        .get(..complete)
        .and_then(|prefix| STANDARD.decode(prefix).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_embedded_report() {
        let decoded = extract_report_bytes(b"<reportBytes>aGVsbG8=</reportBytes>").unwrap();
        assert_eq!(decoded.as_ref(), b"hello");
    }

    #[test]
    fn test_decodes_inside_soap_envelope() {
        let raw = b"<soap:Envelope><soap:Body><r><reportBytes>PGE+MTwvYT4=</reportBytes></r></soap:Body></soap:Envelope>";
        let decoded = extract_report_bytes(raw).unwrap();
        assert_eq!(decoded.as_ref(), b"<a>1</a>");
    }

    #[test]
    fn test_ignores_line_breaks_in_payload() {
        let decoded = extract_report_bytes(b"<reportBytes>aGVs\r\nbG8=\n</reportBytes>").unwrap();
        assert_eq!(decoded.as_ref(), b"hello");
    }

    #[test]
    fn test_without_marker_is_identity() {
        let inputs: [&[u8]; 4] = [
            b"",
            b"<a><b>hello</b></a>",
            b"</reportBytes> only a closing marker",
            b"\xff\xfe binary",
        ];
        for raw in inputs {
            let out = extract_report_bytes(raw).unwrap();
            assert!(matches!(out, Cow::Borrowed(_)));
            assert_eq!(out.as_ref(), raw);
        }
    }

    #[test]
    fn test_closing_before_opening_is_identity() {
        let raw = b"</reportBytes>x<reportBytes>aGVsbG8=";
        let out = extract_report_bytes(raw).unwrap();
        assert_eq!(out.as_ref(), raw);
    }

    #[test]
    fn test_first_markers_win() {
        let raw = b"<reportBytes>aGk=</reportBytes><reportBytes>aGVsbG8=</reportBytes>";
        let out = extract_report_bytes(raw).unwrap();
        assert_eq!(out.as_ref(), b"hi");
    }

    #[test]
    fn test_empty_payload_decodes_to_nothing() {
        let out = extract_report_bytes(b"<reportBytes></reportBytes>").unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_invalid_base64_keeps_raw_and_partial() {
        let raw = b"<reportBytes>aGVsbG8gd29y!!!!</reportBytes>";
        let err = extract_report_bytes(raw).unwrap_err();

        match err {
            SoapCallError::Decode {
                raw: original,
                partial,
                message,
            } => {
                assert_eq!(original, raw.to_vec());
                assert_eq!(partial, b"hello wor".to_vec());
                assert!(message.contains("not valid base64"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
