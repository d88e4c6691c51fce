//! Helpers for pulling labelled fields out of an aggregated record.

use std::str::FromStr;

use super::patterns::{KEY_VALUE, LEADING_NUMBER, MAC_ADDRESS};
use super::response::{SoftParseError, UNKNOWN_RSSI};

/// A record split into `Label: value` pairs and bare segments.
///
/// Records are joined with `", "` or `"\n"`; both separate segments here.
#[derive(Debug)]
pub(crate) struct Segments<'a> {
    labelled: Vec<(&'a str, &'a str)>,
    bare: Vec<&'a str>,
}

fn is_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= 24
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_' | '#' | '.'))
}

impl<'a> Segments<'a> {
    pub(crate) fn parse(text: &'a str) -> Self {
        let mut labelled = Vec::new();
        let mut bare = Vec::new();

        for segment in text.split('\n').flat_map(|line| line.split(", ")) {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            match segment.split_once(':') {
                Some((label, value)) if is_label(label.trim()) => {
                    labelled.push((label.trim(), value.trim()));
                }
                _ => bare.push(segment),
            }
        }

        Self { labelled, bare }
    }

    /// First non-empty value for any of `labels`, compared case-insensitively.
    pub(crate) fn get(&self, labels: &[&str]) -> Option<&'a str> {
        self.labelled
            .iter()
            .find(|(label, value)| {
                !value.is_empty() && labels.iter().any(|l| l.eq_ignore_ascii_case(label))
            })
            .map(|(_, value)| *value)
    }

    /// Every value for any of `labels`, including empty ones.
    pub(crate) fn all(&self, labels: &[&str]) -> Vec<&'a str> {
        self.labelled
            .iter()
            .filter(|(label, _)| labels.iter().any(|l| l.eq_ignore_ascii_case(label)))
            .map(|(_, value)| *value)
            .collect()
    }

    pub(crate) fn bare(&self) -> &[&'a str] {
        &self.bare
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.labelled.is_empty() && self.bare.is_empty()
    }
}

/// Parse the leading number of a value such as `"240 MHz"` or `"-61 dBm"`.
///
/// Records an [`SoftParseError::InvalidField`] when the value has no usable
/// number.
pub(crate) fn number<T: FromStr>(
    field: &'static str,
    value: &str,
    issues: &mut Vec<SoftParseError>,
) -> Option<T> {
    let parsed = LEADING_NUMBER
        .captures(value)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok());

    if parsed.is_none() {
        issues.push(SoftParseError::InvalidField {
            field,
            value: value.to_string(),
        });
    }
    parsed
}

/// Optional numeric field.
pub(crate) fn optional_number<T: FromStr>(
    segments: &Segments<'_>,
    labels: &[&str],
    field: &'static str,
    issues: &mut Vec<SoftParseError>,
) -> Option<T> {
    segments
        .get(labels)
        .and_then(|value| number(field, value, issues))
}

/// RSSI with the sentinel default.
pub(crate) fn rssi(segments: &Segments<'_>, issues: &mut Vec<SoftParseError>) -> i32 {
    match optional_number(segments, &["RSSI"], "rssi", issues) {
        Some(rssi) => rssi,
        None => {
            issues.push(SoftParseError::DefaultedField {
                field: "rssi",
                default: UNKNOWN_RSSI.to_string(),
            });
            UNKNOWN_RSSI
        }
    }
}

/// Lowercased MAC address, if `value` is one.
pub(crate) fn mac(value: &str) -> Option<String> {
    let value = value.trim();
    MAC_ADDRESS
        .is_match(value)
        .then(|| value.to_ascii_lowercase())
}

pub(crate) fn text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Split a `key=value` (or `key: value`) line.
pub(crate) fn key_value(line: &str) -> Option<(String, String)> {
    let caps = KEY_VALUE.captures(line)?;
    let key = caps.get(1)?.as_str().trim().to_ascii_lowercase();
    let value = caps.get(2).map_or("", |m| m.as_str()).to_string();
    Some((key, value))
}
