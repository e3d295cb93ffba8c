//! Catch result labelling
//!
//! Raw text comes from an external OCR reader; this module cleans it up,
//! matches it against the known-items table and bounds the whole read by a
//! timeout so a slow reader can never stall the fishing loop.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::VisionError;

/// Label reported when the result cannot be read or matched
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Minimum similarity for a fuzzy match to be accepted
const MATCH_THRESHOLD: f64 = 0.6;

/// External OCR reader for the catch result banner
pub trait ResultReader: Send + Sync {
    /// Read the raw text of the result banner
    fn read_raw(&self) -> Result<String, VisionError>;
}

/// Fuzzy matcher against the table of known item names
#[derive(Debug, Clone, Default)]
pub struct ItemMatcher {
    items: Vec<String>,
}

impl ItemMatcher {
    pub fn new<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            items: items.into_iter().map(Into::into).collect(),
        }
    }

    /// Return the best known item for the raw text, or [`UNKNOWN_LABEL`]
    pub fn best_match(&self, raw: &str) -> String {
        let cleaned = normalize(raw);
        if cleaned.is_empty() {
            return UNKNOWN_LABEL.to_string();
        }

        self.items
            .iter()
            .map(|item| (item, similarity(&cleaned, &normalize(item))))
            .filter(|(_, score)| *score >= MATCH_THRESHOLD)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map_or_else(|| UNKNOWN_LABEL.to_string(), |(item, _)| item.clone())
    }
}

/// Read and match the result label, giving up after `timeout`.
///
/// The reader runs on a helper thread; if it has not answered in time the
/// thread is left to finish on its own and the label falls back to
/// [`UNKNOWN_LABEL`].
pub fn read_label_with_timeout(
    reader: Arc<dyn ResultReader>,
    matcher: &ItemMatcher,
    timeout: Duration,
) -> String {
    let (tx, rx) = mpsc::channel();
    let spawned = thread::Builder::new()
        .name("result-reader".into())
        .spawn(move || {
            // Receiver may be gone after a timeout
            let _ = tx.send(reader.read_raw());
        });

    if let Err(e) = spawned {
        log::warn!("Could not start result reader: {}", e);
        return UNKNOWN_LABEL.to_string();
    }

    match rx.recv_timeout(timeout) {
        Ok(Ok(raw)) => {
            let label = matcher.best_match(&raw);
            log::debug!("Result text {:?} matched as {}", raw, label);
            label
        }
        Ok(Err(e)) => {
            log::warn!("Result reading failed: {}", e);
            UNKNOWN_LABEL.to_string()
        }
        Err(_) => {
            log::warn!("Result reading timed out after {:?}", timeout);
            UNKNOWN_LABEL.to_string()
        }
    }
}

/// Lowercase, keep letters/digits/spaces, collapse whitespace
fn normalize(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalised edit-distance similarity in [0, 1]
fn similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == cb {
                diagonal
            } else {
                1 + diagonal.min(above).min(row[j])
            };
            diagonal = above;
        }
    }

    row[b.len()]
}
