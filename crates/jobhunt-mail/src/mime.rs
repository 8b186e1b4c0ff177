//! Minimal RFC 822 / MIME reader.
//!
//! Only what the digest parser needs: decoded `Message-Id`, `From`,
//! `Subject` and `Date` headers, plus the longest `text/plain` and
//! `text/html` bodies found anywhere in the part tree. Nothing here fails;
//! malformed input degrades to whatever text can be recovered.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine as _;
use chrono::{DateTime, Utc};
use encoding_rs::{Encoding, UTF_8};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Nested multiparts deeper than this are ignored.
const MAX_DEPTH: usize = 8;

/// The parts of a message the pipeline looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedMessage {
    /// `Message-Id` header, as sent
    pub message_id: String,
    /// Decoded `From` header
    pub from: String,
    /// Decoded `Subject` header
    pub subject: String,
    /// `Date` header, if it parses as RFC 2822
    pub date: Option<DateTime<Utc>>,
    /// Longest plain-text body
    pub plain: String,
    /// Longest HTML body
    pub html: String,
}

type Headers = Vec<(String, String)>;

/// Parse a raw RFC 822 message.
#[must_use]
pub fn parse_message(raw: &[u8]) -> ParsedMessage {
    let Some((head, body)) = split_head_body(raw) else {
        // No header block at all; treat everything as text.
        return ParsedMessage {
            plain: String::from_utf8_lossy(raw).into_owned(),
            ..ParsedMessage::default()
        };
    };
    let headers = parse_headers(head);

    let message_id = header(&headers, "message-id").unwrap_or_default().trim().to_string();
    let from = decode_rfc2047(header(&headers, "from").unwrap_or_default());
    let subject = decode_rfc2047(header(&headers, "subject").unwrap_or_default());
    let date = header(&headers, "date")
        .and_then(|d| DateTime::parse_from_rfc2822(d.trim()).ok())
        .map(|d| d.with_timezone(&Utc));

    let (mut plain, html) = extract_text_parts(&headers, body, 0);
    if plain.is_empty() && html.is_empty() {
        plain = String::from_utf8_lossy(body).into_owned();
    }

    ParsedMessage {
        message_id,
        from,
        subject,
        date,
        plain,
        html,
    }
}

/// Split at the first blank line. `None` when there is no header block.
fn split_head_body(raw: &[u8]) -> Option<(&[u8], &[u8])> {
    if let Some(rest) = raw.strip_prefix(b"\r\n") {
        return Some((&raw[..0], rest));
    }
    if let Some(rest) = raw.strip_prefix(b"\n") {
        return Some((&raw[..0], rest));
    }

    let crlf = find(raw, b"\r\n\r\n").map(|i| (i, 4));
    let lf = find(raw, b"\n\n").map(|i| (i, 2));
    let (idx, len) = match (crlf, lf) {
        (Some(a), Some(b)) => {
            if a.0 <= b.0 {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => {
            // Headers only, or not a message at all.
            return looks_like_header_line(raw).then_some((raw, &raw[raw.len()..]));
        }
    };
    Some((&raw[..idx], &raw[idx + len..]))
}

fn looks_like_header_line(raw: &[u8]) -> bool {
    let first = raw.split(|&b| b == b'\n').next().unwrap_or_default();
    first
        .iter()
        .position(|&b| b == b':')
        .is_some_and(|i| i > 0 && first[..i].iter().all(|b| b.is_ascii_graphic()))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Unfold and split header lines. Names are lower-cased.
fn parse_headers(head: &[u8]) -> Headers {
    let text = String::from_utf8_lossy(head);
    let mut headers: Headers = Vec::new();

    for line in text.split('\n') {
        let line = line.trim_end_matches('\r');
        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = headers.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
        }
    }
    headers
}

fn header<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
}

struct ContentType {
    media: String,
    params: HashMap<String, String>,
}

fn parse_content_type(value: &str) -> Option<ContentType> {
    let mut pieces = value.split(';');
    let media = pieces.next()?.trim().to_ascii_lowercase();
    if !media.contains('/') {
        return None;
    }

    let params = pieces
        .filter_map(|p| p.split_once('='))
        .map(|(k, v)| {
            (
                k.trim().to_ascii_lowercase(),
                v.trim().trim_matches('"').to_string(),
            )
        })
        .collect();

    Some(ContentType { media, params })
}

/// Longest (plain, html) pair in this entity and its children.
fn extract_text_parts(headers: &Headers, body: &[u8], depth: usize) -> (String, String) {
    let cte = header(headers, "content-transfer-encoding")
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    let Some(ct) = header(headers, "content-type").and_then(parse_content_type) else {
        // RFC 2045 default is text/plain
        return (decode_text(&decode_transfer(body, &cte), None), String::new());
    };
    let charset = ct.params.get("charset").map(String::as_str);

    if ct.media.starts_with("multipart/") {
        let Some(boundary) = ct.params.get("boundary").filter(|b| !b.is_empty()) else {
            return (decode_text(&decode_transfer(body, &cte), charset), String::new());
        };
        if depth >= MAX_DEPTH {
            return (String::new(), String::new());
        }

        let mut best_plain = String::new();
        let mut best_html = String::new();
        for part in split_multipart(body, boundary) {
            let (part_head, part_body) = split_head_body(part).unwrap_or((&part[..0], part));
            let part_headers = parse_headers(part_head);
            let (plain, html) = extract_text_parts(&part_headers, part_body, depth + 1);
            if plain.len() > best_plain.len() {
                best_plain = plain;
            }
            if html.len() > best_html.len() {
                best_html = html;
            }
        }
        return (best_plain, best_html);
    }

    let decoded = decode_transfer(body, &cte);
    if ct.media.starts_with("text/html") {
        (String::new(), decode_text(&decoded, charset))
    } else if ct.media.starts_with("text/plain") || depth == 0 {
        (decode_text(&decoded, charset), String::new())
    } else {
        // Attachments and other leaves
        (String::new(), String::new())
    }
}

/// Body parts between `--boundary` delimiter lines.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let delim = format!("--{boundary}");
    let delim = delim.as_bytes();
    let mut parts = Vec::new();
    let mut current: Option<usize> = None;
    let mut pos = 0;

    while pos < body.len() {
        let line_end = body[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(body.len(), |i| pos + i);
        let next = (line_end + 1).min(body.len());
        let line = &body[pos..line_end];

        if let Some(rest) = line.strip_prefix(delim) {
            let rest = trim_ascii_ws(rest);
            let closing = rest == b"--";
            if rest.is_empty() || closing {
                if let Some(start) = current {
                    let mut end = pos;
                    if end > start && body[end - 1] == b'\n' {
                        end -= 1;
                    }
                    if end > start && body[end - 1] == b'\r' {
                        end -= 1;
                    }
                    parts.push(&body[start..end.max(start)]);
                }
                if closing {
                    return parts;
                }
                current = Some(next);
            }
        }
        pos = next;
    }

    // Unterminated final part
    if let Some(start) = current {
        if start < body.len() {
            parts.push(&body[start..]);
        }
    }
    parts
}

fn trim_ascii_ws(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end.max(start)]
}

fn decode_transfer(body: &[u8], cte: &str) -> Vec<u8> {
    match cte {
        "base64" => decode_base64(body),
        "quoted-printable" => decode_quoted_printable(body),
        _ => body.to_vec(),
    }
}

fn decode_base64(body: &[u8]) -> Vec<u8> {
    let cleaned: Vec<u8> = body
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD
        .decode(&cleaned)
        .or_else(|_| {
            let unpadded = cleaned.strip_suffix(b"==").or_else(|| cleaned.strip_suffix(b"="));
            STANDARD_NO_PAD.decode(unpadded.unwrap_or(&cleaned))
        })
        .unwrap_or_default()
}

/// Decode quoted-printable (RFC 2045 section 6.7).
#[must_use]
pub fn decode_quoted_printable(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;

    while i < input.len() {
        let b = input[i];
        if b == b'=' {
            // Soft line break, possibly with transport padding before it
            let mut j = i + 1;
            while j < input.len() && (input[j] == b' ' || input[j] == b'\t') {
                j += 1;
            }
            if input.get(j) == Some(&b'\r') && input.get(j + 1) == Some(&b'\n') {
                i = j + 2;
                continue;
            }
            if input.get(j) == Some(&b'\n') {
                i = j + 1;
                continue;
            }
            if let (Some(hi), Some(lo)) = (
                input.get(i + 1).and_then(|c| hex_value(*c)),
                input.get(i + 2).and_then(|c| hex_value(*c)),
            ) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(b);
        i += 1;
    }
    out
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

fn decode_text(bytes: &[u8], charset: Option<&str>) -> String {
    let encoding = charset
        .and_then(|c| Encoding::for_label(c.trim().as_bytes()))
        .unwrap_or(UTF_8);
    encoding.decode(bytes).0.into_owned()
}

fn encoded_word() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"=\?([^?]+)\?([BbQq])\?([^?]*)\?=").expect("valid regex"))
}

/// Decode RFC 2047 encoded words in a header value.
///
/// Whitespace between two adjacent encoded words is dropped. Words with an
/// unknown charset or bad payload are kept verbatim.
#[must_use]
pub fn decode_rfc2047(value: &str) -> String {
    let value = value.trim();
    let mut out = String::with_capacity(value.len());
    let mut last = 0;
    let mut prev_encoded = false;

    for caps in encoded_word().captures_iter(value) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let between = &value[last..whole.start()];
        if !(prev_encoded && between.chars().all(char::is_whitespace)) {
            out.push_str(between);
        }

        if let Some(text) = decode_word(&caps[1], &caps[2], &caps[3]) {
            out.push_str(&text);
            prev_encoded = true;
        } else {
            out.push_str(whole.as_str());
            prev_encoded = false;
        }
        last = whole.end();
    }

    out.push_str(&value[last..]);
    out
}

fn decode_word(charset: &str, encoding: &str, payload: &str) -> Option<String> {
    // RFC 2231 language suffix: utf-8*en
    let charset = charset.split('*').next().unwrap_or(charset);
    let encoding_rs = Encoding::for_label(charset.trim().as_bytes())?;

    let bytes = if encoding.eq_ignore_ascii_case("b") {
        STANDARD
            .decode(payload)
            .or_else(|_| STANDARD_NO_PAD.decode(payload.trim_end_matches('=')))
            .ok()?
    } else {
        decode_quoted_printable(payload.replace('_', " ").as_bytes())
    };

    Some(encoding_rs.decode_without_bom_handling(&bytes).0.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_rfc2047() {
        assert_eq!(decode_rfc2047("=?UTF-8?B?Sm9iIGFsZXJ0?="), "Job alert");
        assert_eq!(
            decode_rfc2047("=?utf-8?Q?Caf=C3=A9_jobs?= =?utf-8?Q?_near_you?="),
            "Café jobs near you"
        );
        assert_eq!(
            decode_rfc2047("Re: =?ISO-8859-1?Q?M=FCnchen?= roles"),
            "Re: München roles"
        );
        assert_eq!(decode_rfc2047("  plain subject "), "plain subject");
        assert_eq!(decode_rfc2047("=?bogus-cs?Q?x?="), "=?bogus-cs?Q?x?=");
    }

    #[test]
    fn test_decode_quoted_printable() {
        assert_eq!(
            decode_quoted_printable(b"soft=\r\nbreak =3D ok=\nhere"),
            b"softbreak = okhere".to_vec()
        );
        assert_eq!(decode_quoted_printable(b"trailing =ZZ"), b"trailing =ZZ".to_vec());
    }

    #[test]
    fn test_multipart_alternative() {
        let raw = concat!(
            "Message-Id: <abc@mail.example>\r\n",
            "From: =?UTF-8?Q?LinkedIn_Job_Alerts?= <jobalerts-noreply@linkedin.com>\r\n",
            "Subject: Your job alert\r\n",
            "\tfor rust\r\n",
            "Date: Wed, 14 Oct 2026 09:30:00 +0000\r\n",
            "Content-Type: multipart/alternative; boundary=\"BOUND\"\r\n",
            "\r\n",
            "preamble\r\n",
            "--BOUND\r\n",
            "Content-Type: text/plain; charset=utf-8\r\n",
            "Content-Transfer-Encoding: quoted-printable\r\n",
            "\r\n",
            "See linkedin.com/jobs/view/1 =E2=80=94 now\r\n",
            "--BOUND\r\n",
            "Content-Type: text/html; charset=utf-8\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "PGh0bWw+PGJvZHk+SGk8L2JvZHk+\r\n",
            "PC9odG1sPg==\r\n",
            "--BOUND--\r\n",
        );

        let msg = parse_message(raw.as_bytes());
        assert_eq!(msg.message_id, "<abc@mail.example>");
        assert_eq!(msg.from, "LinkedIn Job Alerts <jobalerts-noreply@linkedin.com>");
        assert_eq!(msg.subject, "Your job alert for rust");
        assert!(msg.date.is_some());
        assert_eq!(msg.plain, "See linkedin.com/jobs/view/1 \u{2014} now");
        assert_eq!(msg.html, "<html><body>Hi</body></html>");
    }

    #[test]
    fn test_nested_multipart_keeps_longest() {
        let raw = concat!(
            "Subject: nested\n",
            "Content-Type: multipart/mixed; boundary=outer\n",
            "\n",
            "--outer\n",
            "Content-Type: multipart/alternative; boundary=inner\n",
            "\n",
            "--inner\n",
            "Content-Type: text/html\n",
            "\n",
            "<p>short</p>\n",
            "--inner\n",
            "Content-Type: text/html\n",
            "\n",
            "<p>much longer html</p>\n",
            "--inner--\n",
            "--outer\n",
            "Content-Type: application/pdf\n",
            "Content-Transfer-Encoding: base64\n",
            "\n",
            "JVBERi0=\n",
            "--outer--\n",
        );

        let msg = parse_message(raw.as_bytes());
        assert_eq!(msg.html, "<p>much longer html</p>");
        assert_eq!(msg.plain, "");
    }

    #[test]
    fn test_single_part_html_and_charset() {
        let raw = b"Subject: x\r\nContent-Type: text/html; charset=iso-8859-1\r\n\r\n<b>Z\xfcrich</b>";
        let msg = parse_message(raw);
        assert_eq!(msg.html, "<b>Zürich</b>");
        assert!(msg.plain.is_empty());
    }

    #[test]
    fn test_no_headers_falls_back_to_plain() {
        let msg = parse_message(b"just some text without headers");
        assert_eq!(msg.plain, "just some text without headers");
        assert!(msg.subject.is_empty());
    }
}
