//! Projection of analyzer spans onto a [`HostDocument`].
//!
//! An [`AnnotationSession`] owns everything tied to one document instance:
//! the current annotations, the correlation from leaves back to
//! annotations, and the scheduler issuing analysis requests. All of it lives
//! on the thread that owns the document.

use std::fmt;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::analyzer::{AnalysisMatch, AnalysisOutcome};
use crate::config::Config;
use crate::document::{HostDocument, LeafId, char_slice};
use crate::language::LanguageDetector;
use crate::scheduler::{AnalysisRequest, AnalysisScheduler, Dispatch, Verdict};

mod correlation;
mod decorate;
pub mod index;
pub mod matcher;
pub mod splitter;
mod suggest;

pub use correlation::{CorrelationStore, invalidate_if_stale};
pub use decorate::{DecorationReport, MARKER_FRAGMENT, MARKER_PATTERN, clear_markers};
pub use suggest::{SuggestError, substitute};

/// `(offset, length)` in chars of the analyzed plain text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextSpan {
    pub offset: usize,
    pub length: usize,
}

impl TextSpan {
    pub fn new(offset: usize, length: usize) -> Self {
        Self { offset, length }
    }

    pub fn end(&self) -> usize {
        self.offset + self.length
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AnnotationId(u64);

impl AnnotationId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ann#{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Annotation {
    pub id: AnnotationId,
    pub span: TextSpan,
    pub message: String,
    pub replacements: Vec<String>,
    /// Text at `span` when the analysis was made.
    pub original_text: String,
    /// Leaves currently decorated for this annotation, in document order.
    pub carrying_leaf_ids: Vec<LeafId>,
}

impl Annotation {
    /// Same span over the same text. Message and replacements may differ.
    pub fn is_equivalent(&self, other: &Annotation) -> bool {
        self.span == other.span && self.original_text == other.original_text
    }
}

/// What happened to a finished analysis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion {
    Applied(DecorationReport),
    /// A newer generation already completed.
    Superseded,
    /// The document changed while the request was in flight.
    Outdated,
    /// The analyzer failed; previous annotations stay in place.
    Failed,
}

pub struct AnnotationSession {
    annotations: Vec<Annotation>,
    correlation: CorrelationStore,
    scheduler: AnalysisScheduler,
    next_id: u64,
    max_replacements: usize,
}

impl AnnotationSession {
    pub fn new(config: &Config) -> Self {
        let detector = LanguageDetector::new(&config.language);
        Self {
            annotations: Vec::new(),
            correlation: CorrelationStore::default(),
            scheduler: AnalysisScheduler::new(&config.scheduler, detector),
            next_id: 1,
            max_replacements: config.analyzer.max_replacements,
        }
    }

    /// Annotations in ascending span offset order.
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn annotation(&self, id: AnnotationId) -> Option<&Annotation> {
        self.annotations.iter().find(|annotation| annotation.id == id)
    }

    /// The annotation decorating `leaf`. With overlapping spans this is the
    /// one starting first.
    pub fn lookup(&self, leaf: LeafId) -> Option<&Annotation> {
        self.correlation.lookup(leaf).and_then(|id| self.annotation(id))
    }

    pub fn correlation(&self) -> &CorrelationStore {
        &self.correlation
    }

    pub fn scheduler(&self) -> &AnalysisScheduler {
        &self.scheduler
    }

    pub fn note_edit<H: HostDocument + ?Sized>(&mut self, host: &H, now: Instant) {
        self.scheduler.note_text(&host.plain_text(), now);
    }

    /// Analyze the current text as soon as the host is idle.
    pub fn request_now<H: HostDocument + ?Sized>(&mut self, host: &H, now: Instant) {
        self.scheduler.request_now(&host.plain_text(), now);
    }

    /// Advance the scheduler. Returns a request the caller must hand to an
    /// analyzer and feed back through [`AnnotationSession::complete`].
    pub fn poll<H: HostDocument + ?Sized>(
        &mut self,
        host: &mut H,
        now: Instant,
        host_idle: bool,
    ) -> Option<AnalysisRequest> {
        match self.scheduler.poll(now, host_idle)? {
            Dispatch::Analyze(request) => Some(request),
            Dispatch::Clear { generation } => {
                debug!(%generation, "empty document, dropping annotations");
                self.clear(host);
                None
            }
        }
    }

    pub fn complete<H: HostDocument + ?Sized>(
        &mut self,
        host: &mut H,
        outcome: AnalysisOutcome,
    ) -> Completion {
        let AnalysisOutcome { request, result } = outcome;
        if self.scheduler.complete(request.generation) == Verdict::Superseded {
            return Completion::Superseded;
        }
        let response = match result {
            Ok(response) => response,
            Err(err) => {
                warn!(
                    generation = %request.generation,
                    %err,
                    "analysis failed, keeping previous annotations"
                );
                return Completion::Failed;
            }
        };
        if host.plain_text() != request.text {
            debug!(
                generation = %request.generation,
                "document changed during analysis, discarding response"
            );
            self.scheduler.forget_dispatched(&request.text);
            return Completion::Outdated;
        }
        Completion::Applied(self.apply_matches(host, &request.text, &response.matches))
    }

    /// Replace the annotation set with `matches` reported over
    /// `analyzed_text` and decorate the document.
    pub fn apply_matches<H: HostDocument + ?Sized>(
        &mut self,
        host: &mut H,
        analyzed_text: &str,
        matches: &[AnalysisMatch],
    ) -> DecorationReport {
        let text_len = analyzed_text.chars().count();
        let mut incoming: Vec<Annotation> = matches
            .iter()
            .filter_map(|reported| {
                let span = validate_span(reported, text_len)?;
                Some(Annotation {
                    id: AnnotationId(0),
                    span,
                    message: reported.message.clone(),
                    replacements: reported
                        .replacements
                        .iter()
                        .take(self.max_replacements)
                        .cloned()
                        .collect(),
                    original_text: char_slice(analyzed_text, span.offset, span.end()).to_string(),
                    carrying_leaf_ids: Vec::new(),
                })
            })
            .collect();
        incoming.sort_by_key(|annotation| annotation.span.offset);

        let previous = std::mem::take(&mut self.annotations);
        let dropped = previous
            .iter()
            .filter(|old| invalidate_if_stale(old, &incoming))
            .count();
        let mut reusable: Vec<Option<&Annotation>> = previous.iter().map(Some).collect();
        for annotation in &mut incoming {
            let reused = reusable
                .iter_mut()
                .find(|slot| slot.is_some_and(|old| old.is_equivalent(annotation)))
                .and_then(Option::take);
            annotation.id = match reused {
                Some(old) => old.id,
                None => {
                    let id = AnnotationId(self.next_id);
                    self.next_id += 1;
                    id
                }
            };
        }

        info!(
            reported = matches.len(),
            kept = incoming.len(),
            dropped,
            "applying analysis"
        );
        self.annotations = incoming;
        self.decorate(host)
    }

    /// Clear every marker and decorate the current annotations again.
    pub fn decorate<H: HostDocument + ?Sized>(&mut self, host: &mut H) -> DecorationReport {
        let report = decorate::decorate_all(host, &mut self.annotations);
        self.correlation.rebuild(&self.annotations);
        report
    }

    /// Forget every annotation and remove its markers.
    pub fn clear<H: HostDocument + ?Sized>(&mut self, host: &mut H) {
        clear_markers(host);
        self.discard_annotations();
    }

    fn discard_annotations(&mut self) {
        self.annotations.clear();
        self.correlation.clear();
    }
}

fn validate_span(reported: &AnalysisMatch, text_len: usize) -> Option<TextSpan> {
    if reported.offset < 0 || reported.length <= 0 {
        warn!(
            offset = reported.offset,
            length = reported.length,
            "skipping malformed span"
        );
        return None;
    }
    let offset = usize::try_from(reported.offset).ok()?;
    let length = usize::try_from(reported.length).ok()?;
    if offset >= text_len {
        warn!(offset, length, text_len, "skipping span beyond the text");
        return None;
    }
    let end = offset.saturating_add(length).min(text_len);
    if end - offset != length {
        warn!(offset, length, text_len, "clipping span to the text end");
    }
    Some(TextSpan::new(offset, end - offset))
}

#[cfg(test)]
#[path = "annotate_tests.rs"]
mod annotate_tests;
