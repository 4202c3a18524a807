//! Answering over the corpus.
//!
//! [`Responder`] is the extension point for anything that turns a prompt and
//! a [`CorpusSnapshot`] into a reply. [`ExcerptResponder`] summarizes which
//! files are available with a short excerpt of each.

use std::fmt::Write;

use crate::preview::char_prefix;
use crate::registry::CorpusSnapshot;

pub const NO_DOCUMENTS_GUIDANCE: &str =
    "Please upload and process some documents before asking questions.";

const ANSWER_HEADER: &str = "Based on the processed documents:\n\n";

pub trait Responder: Send + Sync {
    fn answer(&self, prompt: &str, corpus: &CorpusSnapshot) -> String;
}

/// Lists every completed file per format bucket with its opening characters.
///
/// The prompt is not consulted; output depends only on the snapshot.
pub struct ExcerptResponder {
    excerpt_chars: usize,
}

impl ExcerptResponder {
    pub fn new(excerpt_chars: usize) -> Self {
        Self { excerpt_chars }
    }
}

impl Default for ExcerptResponder {
    fn default() -> Self {
        Self::new(100)
    }
}

impl Responder for ExcerptResponder {
    fn answer(&self, _prompt: &str, corpus: &CorpusSnapshot) -> String {
        if !corpus.has_completed() {
            return NO_DOCUMENTS_GUIDANCE.to_string();
        }

        let mut out = String::from(ANSWER_HEADER);
        for (format, names) in corpus.buckets() {
            let mut completed = corpus.completed_in(names).peekable();
            if completed.peek().is_none() {
                continue;
            }
            let _ = write!(out, "\n{} files:\n", format);
            for file in completed {
                let text = file.extracted_text().unwrap_or_default();
                let _ = write!(
                    out,
                    "- {}\n  Preview: {}...\n",
                    file.filename,
                    char_prefix(text, self.excerpt_chars)
                );
            }
        }
        out
    }
}
