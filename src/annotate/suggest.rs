use std::time::Instant;

use thiserror::Error;
use tracing::{info, warn};

use crate::document::{HostDocument, HostError, char_slice, char_to_byte_idx};

use super::decorate::clear_markers;
use super::{AnnotationId, AnnotationSession, TextSpan};

#[derive(Debug, Error)]
pub enum SuggestError {
    #[error("{0} is not a current annotation")]
    UnknownAnnotation(AnnotationId),
    #[error("text under {id} is now {found:?}, expected {expected:?}")]
    TextChanged {
        id: AnnotationId,
        expected: String,
        found: String,
    },
    #[error("document rebuild failed: {0}")]
    Rebuild(#[from] HostError),
}

/// `text` with the chars under `span` replaced by `replacement`.
pub fn substitute(text: &str, span: TextSpan, replacement: &str) -> String {
    let start = char_to_byte_idx(text, span.offset);
    let end = char_to_byte_idx(text, span.end());
    let mut rewritten = String::with_capacity(text.len() + replacement.len());
    rewritten.push_str(&text[..start]);
    rewritten.push_str(replacement);
    rewritten.push_str(&text[end..]);
    rewritten
}

impl AnnotationSession {
    /// Accept `replacement` for annotation `id`.
    ///
    /// The document is rebuilt wholesale from the rewritten text rather than
    /// patched, so every annotation is dropped and the new text is scheduled
    /// for analysis right away. Returns the new plain text.
    pub fn apply_suggestion<H: HostDocument + ?Sized>(
        &mut self,
        host: &mut H,
        id: AnnotationId,
        replacement: &str,
        now: Instant,
    ) -> Result<String, SuggestError> {
        let annotation = self
            .annotation(id)
            .ok_or(SuggestError::UnknownAnnotation(id))?;
        let span = annotation.span;
        let text = host.plain_text();
        let found = char_slice(&text, span.offset, span.end());
        if found != annotation.original_text {
            let err = SuggestError::TextChanged {
                id,
                expected: annotation.original_text.clone(),
                found: found.to_string(),
            };
            warn!(%err, "refusing stale suggestion");
            self.scheduler.request_now(&text, now);
            return Err(err);
        }

        let rewritten = substitute(&text, span, replacement);
        self.annotations.retain(|annotation| annotation.id != id);
        let rebuilt = host.replace_whole_document(&rewritten);
        self.discard_annotations();

        if let Err(err) = rebuilt {
            warn!(annotation = %id, %err, "document rebuild failed, resynchronizing");
            clear_markers(host);
            self.scheduler.request_now(&host.plain_text(), now);
            return Err(err.into());
        }

        info!(annotation = %id, replacement, "suggestion applied");
        self.scheduler.request_now(&rewritten, now);
        Ok(rewritten)
    }
}
