use tracing::{debug, warn};

use crate::document::{HostDocument, LeafId, LeafKind};

use super::index::index_leaves;
use super::matcher::match_span;
use super::splitter::isolate_range;
use super::{Annotation, TextSpan};

/// Substring identifying every fragment this engine applies.
pub const MARKER_PATTERN: &str = "proofmark-annotation";

/// Style fragment applied to leaves carrying an annotation.
pub const MARKER_FRAGMENT: &str = "proofmark-annotation: underline wavy red";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecorationReport {
    /// Markers removed before reapplying.
    pub cleared: usize,
    /// Leaves that received a marker.
    pub decorated: usize,
    /// Touched leaves that could not carry a marker.
    pub skipped: usize,
}

/// Remove every marker previously applied to the document.
pub fn clear_markers<H: HostDocument + ?Sized>(host: &mut H) -> usize {
    let marked: Vec<LeafId> = host
        .leaves()
        .iter()
        .filter(|leaf| leaf.kind == LeafKind::Text)
        .filter(|leaf| {
            host.leaf_style(leaf.id)
                .iter()
                .any(|fragment| fragment.contains(MARKER_PATTERN))
        })
        .map(|leaf| leaf.id)
        .collect();
    for leaf in &marked {
        if let Err(err) = host.clear_leaf_style(*leaf, MARKER_PATTERN) {
            warn!(%leaf, %err, "failed to clear marker");
        }
    }
    marked.len()
}

/// Clear every marker, then mark each annotation's span again.
///
/// `annotations` must be sorted by span offset. Ranges are re-derived after
/// every split, so each span is matched against the tree as earlier spans
/// left it.
pub(crate) fn decorate_all<H: HostDocument + ?Sized>(
    host: &mut H,
    annotations: &mut [Annotation],
) -> DecorationReport {
    let mut report = DecorationReport {
        cleared: clear_markers(host),
        ..DecorationReport::default()
    };
    for annotation in annotations.iter_mut() {
        annotation.carrying_leaf_ids.clear();
    }

    for current in 0..annotations.len() {
        let span = annotations[current].span;
        let span_end = span.end();
        let mut cursor = span.offset;

        while cursor < span_end {
            let ranges = index_leaves(host);
            let Some(touch) = match_span(&ranges, TextSpan::new(cursor, span_end - cursor))
                .into_iter()
                .next()
            else {
                break;
            };
            let next_cursor = touch.range.end.min(span_end);
            if touch.range.kind == LeafKind::Break {
                cursor = next_cursor;
                continue;
            }

            match isolate_range(host, &touch) {
                Ok(isolation) => {
                    if isolation.split() {
                        for earlier in &mut annotations[..current] {
                            replace_retired(
                                &mut earlier.carrying_leaf_ids,
                                touch.range.leaf,
                                &isolation.pieces,
                            );
                        }
                    }
                    match host.set_leaf_style(isolation.leaf, MARKER_FRAGMENT) {
                        Ok(()) => {
                            let carrying = &mut annotations[current].carrying_leaf_ids;
                            if !carrying.contains(&isolation.leaf) {
                                carrying.push(isolation.leaf);
                            }
                            report.decorated += 1;
                        }
                        Err(err) => {
                            warn!(annotation = %annotations[current].id, leaf = %isolation.leaf, %err, "leaf refused marker");
                            report.skipped += 1;
                        }
                    }
                }
                Err(err) => {
                    warn!(
                        annotation = %annotations[current].id,
                        leaf = %touch.range.leaf,
                        %err,
                        "skipping leaf that cannot be split"
                    );
                    report.skipped += 1;
                }
            }
            cursor = next_cursor;
        }
    }

    debug!(
        annotations = annotations.len(),
        decorated = report.decorated,
        skipped = report.skipped,
        "decoration pass finished"
    );
    report
}

fn replace_retired(carrying: &mut Vec<LeafId>, retired: LeafId, pieces: &[LeafId]) {
    if let Some(position) = carrying.iter().position(|leaf| *leaf == retired) {
        carrying.splice(position..=position, pieces.iter().copied());
    }
}
