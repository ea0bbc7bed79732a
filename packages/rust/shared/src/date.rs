//! Warranty date normalization.
//!
//! The vendor page renders dates as `DD Mon YYYY`, usually behind a status
//! word (`Expires 01 Jan 2026`). Everything persisted or exported uses the
//! display format `MM/DD/YYYY`. [`DateNormalizer::normalize`] accepts both so
//! that a checkpoint written by [`display`] reads back to the same date.

use chrono::NaiveDate;

use crate::error::{EnrichError, Result};

/// Format of dates as scraped from the lookup provider.
pub const PROVIDER_FORMAT: &str = "%d %b %Y";

/// Format used for every persisted and exported date.
pub const DISPLAY_FORMAT: &str = "%m/%d/%Y";

/// Status words the provider is known to put in front of the date.
pub const DEFAULT_PREFIXES: &[&str] = &["Expires", "Expired"];

/// Turns raw date strings into canonical [`NaiveDate`] values.
#[derive(Debug, Clone)]
pub struct DateNormalizer {
    prefixes: Vec<String>,
}

impl DateNormalizer {
    /// Create a normalizer that strips the given prefix tokens.
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(Into::into)
                .filter(|p: &String| !p.trim().is_empty())
                .collect(),
        }
    }

    /// Parse `raw` into a canonical date.
    ///
    /// One leading prefix token is removed (case-insensitive, must be followed
    /// by whitespace), then the provider format and the display format are
    /// tried in that order.
    pub fn normalize(&self, raw: &str) -> Result<NaiveDate> {
        let stripped = self.strip_prefix(raw.trim());

        NaiveDate::parse_from_str(stripped, PROVIDER_FORMAT)
            .or_else(|_| NaiveDate::parse_from_str(stripped, DISPLAY_FORMAT))
            .map_err(|e| {
                EnrichError::parse(
                    raw,
                    format!("expected `DD Mon YYYY` or `MM/DD/YYYY`: {e}"),
                )
            })
    }

    fn strip_prefix<'a>(&self, value: &'a str) -> &'a str {
        for prefix in &self.prefixes {
            let Some(head) = value.get(..prefix.len()) else {
                continue;
            };
            if !head.eq_ignore_ascii_case(prefix) {
                continue;
            }
            let rest = &value[prefix.len()..];
            if rest.starts_with(char::is_whitespace) {
                return rest.trim_start();
            }
        }
        value
    }
}

impl Default for DateNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIXES.iter().copied())
    }
}

/// Render a date in the canonical display format (`MM/DD/YYYY`).
pub fn display(date: NaiveDate) -> String {
    date.format(DISPLAY_FORMAT).to_string()
}
