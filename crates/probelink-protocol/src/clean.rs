//! Line cleaning: ANSI escape removal and prompt stripping.
//!
//! Firmware consoles colour their output and echo commands behind a prompt.
//! Neither belongs in a line handed to the aggregator or the raw sink.

use probelink_core::constants::{ESC, GENERIC_PROMPT};

/// Remove `ESC [ ... <final>` sequences from a byte line.
///
/// The walk is a two-state scan: after `ESC [`, bytes are skipped until the
/// first ASCII letter or `~`, both of which terminate the sequence and are
/// dropped with it. A lone `ESC` not followed by `[` is dropped as well.
///
/// # Examples
///
/// ```
/// use probelink_protocol::clean::strip_ansi;
///
/// assert_eq!(strip_ansi(b"\x1b[32mOK\x1b[0m"), b"OK".to_vec());
/// assert_eq!(strip_ansi(b"\x1b[2~tail"), b"tail".to_vec());
/// assert_eq!(strip_ansi(b"plain"), b"plain".to_vec());
/// ```
pub fn strip_ansi(line: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(line.len());
    let mut i = 0;

    while i < line.len() {
        let byte = line[i];
        if byte != ESC {
            out.push(byte);
            i += 1;
            continue;
        }

        // ESC without CSI introducer
        if line.get(i + 1) != Some(&b'[') {
            i += 1;
            continue;
        }

        i += 2;
        while i < line.len() {
            let b = line[i];
            i += 1;
            if b.is_ascii_alphabetic() || b == b'~' {
                break;
            }
        }
    }

    out
}

/// Remove a leading shell prompt.
///
/// The configured `prompt` is tried first, then the generic `"> "`. The
/// prompt is only removed when something non-blank remains, so a bare prompt
/// line survives unchanged.
///
/// # Examples
///
/// ```
/// use probelink_protocol::clean::strip_prompt;
///
/// assert_eq!(strip_prompt("> scanap", None), "scanap");
/// assert_eq!(strip_prompt("esp32> chipinfo", Some("esp32> ")), "chipinfo");
/// assert_eq!(strip_prompt(">  ", None), ">  ");
/// ```
pub fn strip_prompt<'a>(line: &'a str, prompt: Option<&str>) -> &'a str {
    let candidates = prompt.into_iter().chain(std::iter::once(GENERIC_PROMPT));

    for candidate in candidates {
        if candidate.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix(candidate)
            && !rest.trim().is_empty()
        {
            return rest;
        }
    }

    line
}

/// Full cleaning pass for one raw line.
///
/// Decodes lossily as UTF-8, strips ANSI, drops trailing whitespace and
/// stray control bytes, then strips the prompt.
pub fn clean_line(raw: &[u8], prompt: Option<&str>) -> String {
    let stripped = strip_ansi(raw);
    let text = String::from_utf8_lossy(&stripped);
    let text: String = text
        .chars()
        .filter(|c| !c.is_control() || *c == '\t')
        .collect();
    let text = text.trim_end();
    strip_prompt(text, prompt).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(b"\x1b[1;31mERROR\x1b[0m: bad", "ERROR: bad")]
    #[case(b"\x1b[K", "")]
    #[case(b"a\x1bb", "ab")]
    #[case(b"\x1b[", "")]
    #[case(b"\x1b[?25lhidden", "hidden")]
    fn test_strip_ansi(#[case] input: &[u8], #[case] expected: &str) {
        assert_eq!(strip_ansi(input), expected.as_bytes());
    }

    #[test]
    fn test_strip_ansi_does_not_eat_text_after_sequence() {
        // The sequence ends at the first letter, the rest is text.
        assert_eq!(strip_ansi(b"\x1b[0mAP #1: x"), b"AP #1: x".to_vec());
    }

    #[rstest]
    #[case("> version", None, "version")]
    #[case("version", None, "version")]
    #[case("> ", None, "> ")]
    #[case("marauder> scanap", Some("marauder> "), "scanap")]
    #[case("> scanap", Some("marauder> "), "scanap")]
    #[case("marauder> ", Some("marauder> "), "marauder> ")]
    fn test_strip_prompt(#[case] input: &str, #[case] prompt: Option<&str>, #[case] expected: &str) {
        assert_eq!(strip_prompt(input, prompt), expected);
    }

    #[test]
    fn test_clean_line_combines_passes() {
        let raw = b"\x1b[32m> Scan started\x1b[0m  \x07";
        assert_eq!(clean_line(raw, None), "Scan started");
    }

    #[test]
    fn test_clean_line_keeps_indentation() {
        assert_eq!(clean_line(b"  BSSID: aa:bb", None), "  BSSID: aa:bb");
    }

    #[test]
    fn test_clean_line_invalid_utf8() {
        let cleaned = clean_line(b"caf\xe9", None);
        assert!(cleaned.starts_with("caf"));
    }
}
