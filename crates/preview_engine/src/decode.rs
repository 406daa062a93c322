use chardetng::EncodingDetector;
use encoding_rs::Encoding;

const META_SNIFF_BYTES: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedHtml {
    pub html: String,
    pub encoding_label: String,
    /// Malformed sequences were replaced with U+FFFD.
    pub lossy: bool,
}

/// Decode raw bytes into UTF-8 using: BOM -> Content-Type charset -> `<meta charset>` -> chardetng.
///
/// Never fails: undecodable sequences become replacement characters and
/// `lossy` is set.
pub fn decode_html(bytes: &[u8], content_type: Option<&str>) -> DecodedHtml {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return decode_with(bytes, encoding);
    }

    if let Some(enc) = content_type
        .and_then(charset_from_content_type)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
    {
        return decode_with(bytes, enc);
    }

    // A UTF-16 label in a meta tag means UTF-8, the bytes being ASCII-compatible.
    if let Some(enc) = charset_from_meta(bytes)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .map(Encoding::output_encoding)
    {
        return decode_with(bytes, enc);
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let enc = detector.guess(None, true);
    decode_with(bytes, enc)
}

fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches(['"', '\'']).to_string())
        } else {
            None
        }
    })
}

/// Looks for `charset=` inside the first kilobyte, covering both
/// `<meta charset="x">` and the `http-equiv` form.
fn charset_from_meta(bytes: &[u8]) -> Option<String> {
    let head = &bytes[..bytes.len().min(META_SNIFF_BYTES)];
    let head = String::from_utf8_lossy(head).to_ascii_lowercase();
    let start = head.find("charset=")? + "charset=".len();
    let label: String = head[start..]
        .trim_start_matches(['"', '\''])
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
        .collect();
    (!label.is_empty()).then_some(label)
}

fn decode_with(bytes: &[u8], enc: &'static Encoding) -> DecodedHtml {
    let (text, used, had_errors) = enc.decode(bytes);
    DecodedHtml {
        html: text.into_owned(),
        encoding_label: used.name().to_string(),
        lossy: had_errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_charset_is_honoured() {
        let bytes = b"<html><head><meta charset=\"windows-1252\"></head><body>caf\xe9</body></html>";
        let decoded = decode_html(bytes, Some("text/html"));
        assert_eq!(decoded.encoding_label, "windows-1252");
        assert!(decoded.html.contains("caf\u{e9}"));
        assert!(!decoded.lossy);
    }

    #[test]
    fn header_charset_parsing_handles_quotes_and_case() {
        assert_eq!(
            charset_from_content_type("text/html; Charset=\"ISO-8859-1\""),
            Some("ISO-8859-1".to_string())
        );
        assert_eq!(charset_from_content_type("text/html"), None);
    }

    #[test]
    fn invalid_utf8_is_replaced_not_rejected() {
        let decoded = decode_html(b"ok \xff\xfe\xfd", Some("text/html; charset=utf-8"));
        assert!(decoded.lossy);
        assert!(decoded.html.starts_with("ok "));
    }
}
