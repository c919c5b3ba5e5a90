//! Isolates error evidence in raw job logs.
//!
//! Every line is cleaned first (timestamp and terminal escapes removed,
//! whitespace trimmed) and all matching operates on the cleaned form. A line
//! qualifies when it contains one of the configured markers and none of the
//! configured noise phrases. Each qualifying line contributes a window of
//! surrounding lines; all windows of a file are joined and the result is
//! capped at [`MAX_SNIPPET_CHARS`].

use std::{borrow::Cow, ops::Range, sync::OnceLock};

use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};

use crate::{config::AnalysisConfig, models::ErrorSnippet};

/// Lines of context kept before a qualifying line.
pub const CONTEXT_BEFORE: usize = 3;
/// Lines kept from a qualifying line onwards, the line itself included.
pub const CONTEXT_AFTER: usize = 7;
pub const MAX_SNIPPET_CHARS: usize = 1000;
pub const SNIPPET_SEPARATOR: &str = "\n\n---\n\n";

/// Strip a leading ISO-8601 timestamp and terminal escape sequences, then trim.
///
/// Logs sometimes carry the escape byte already replaced by U+FFFD; that form is removed too.
pub fn clean_line(line: &str) -> Cow<'_, str> {
    static TIMESTAMP: OnceLock<Regex> = OnceLock::new();
    static ESCAPE: OnceLock<Regex> = OnceLock::new();
    let timestamp = TIMESTAMP.get_or_init(|| {
        Regex::new(r"^\s*\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?Z\s*").unwrap()
    });
    let escape = ESCAPE.get_or_init(|| Regex::new(r"(?:\x1b|\x{FFFD})\[[0-9;?]*[A-Za-z]").unwrap());
    match timestamp.replace(line, "") {
        Cow::Borrowed(rest) => match escape.replace_all(rest, "") {
            Cow::Borrowed(clean) => Cow::Borrowed(clean.trim()),
            Cow::Owned(clean) => Cow::Owned(clean.trim().to_string()),
        },
        Cow::Owned(rest) => Cow::Owned(escape.replace_all(&rest, "").trim().to_string()),
    }
}

/// Line range kept around a qualifying line at `index` in a file of `len` lines.
pub fn window(index: usize, len: usize) -> Range<usize> {
    index.saturating_sub(CONTEXT_BEFORE)..index.saturating_add(CONTEXT_AFTER).min(len)
}

/// Cut `text` to at most `max` characters.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn phrase_regex(phrases: &[String], case_insensitive: bool) -> Result<Option<Regex>> {
    let alternatives = phrases
        .iter()
        .filter(|p| !p.is_empty())
        .map(|p| regex::escape(p))
        .collect::<Vec<_>>();
    if alternatives.is_empty() {
        return Ok(None);
    }
    let regex = RegexBuilder::new(&alternatives.join("|"))
        .case_insensitive(case_insensitive)
        .build()
        .context("Failed to compile phrase list")?;
    Ok(Some(regex))
}

pub struct Extractor {
    markers: Option<Regex>,
    noise: Option<Regex>,
}

impl Extractor {
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        Ok(Self {
            markers: phrase_regex(&config.markers, config.case_insensitive)
                .context("Invalid error markers")?,
            noise: phrase_regex(&config.noise, config.case_insensitive)
                .context("Invalid noise phrases")?,
        })
    }

    /// Whether a cleaned line counts as a candidate error line.
    pub fn is_error_line(&self, line: &str) -> bool {
        let Some(markers) = &self.markers else {
            return false;
        };
        // Noise is only consulted for lines that already hit a marker.
        markers.is_match(line) && !self.noise.as_ref().is_some_and(|n| n.is_match(line))
    }

    /// Windows around every qualifying line. A window overlapping the
    /// previous one is merged into it, so no line appears twice.
    pub fn windows<S: AsRef<str>>(&self, lines: &[S]) -> Vec<Range<usize>> {
        let mut windows: Vec<Range<usize>> = Vec::new();
        for (index, line) in lines.iter().enumerate() {
            if !self.is_error_line(line.as_ref()) {
                continue;
            }
            let next = window(index, lines.len());
            match windows.last_mut() {
                Some(last) if next.start < last.end => last.end = last.end.max(next.end),
                _ => windows.push(next),
            }
        }
        windows
    }

    /// Extract the bounded snippet for `job` from a log's text.
    pub fn extract_text(&self, job: &str, text: &str) -> Option<ErrorSnippet> {
        let lines = text.lines().map(clean_line).collect::<Vec<_>>();
        let windows = self.windows(&lines);
        if windows.is_empty() {
            return None;
        }
        let joined = windows
            .into_iter()
            .map(|w| lines[w].join("\n"))
            .collect::<Vec<_>>()
            .join(SNIPPET_SEPARATOR);
        Some(ErrorSnippet {
            job: job.to_string(),
            text: truncate_chars(&joined, MAX_SNIPPET_CHARS).to_string(),
        })
    }

    /// Decode raw log bytes (invalid UTF-8 is replaced) and extract.
    pub fn extract(&self, job: &str, bytes: &[u8]) -> Option<ErrorSnippet> {
        self.extract_text(job, &String::from_utf8_lossy(bytes))
    }
}
