use super::TextSpan;
use super::index::LeafRange;

/// A leaf touched by a span, with the covered part in leaf-local chars.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LeafTouch {
    pub range: LeafRange,
    pub local_start: usize,
    pub local_end: usize,
}

impl LeafTouch {
    /// True when the span covers the whole leaf and no split is needed.
    pub fn covers_leaf(&self) -> bool {
        self.local_start == 0 && self.local_end == self.range.len()
    }
}

/// Leaves overlapping `span`, in document order. Empty leaves have nothing
/// to mark and are never reported.
pub fn match_span(ranges: &[LeafRange], span: TextSpan) -> Vec<LeafTouch> {
    let span_end = span.end();
    ranges
        .iter()
        .filter(|range| !range.is_empty() && span.offset < range.end && span_end > range.start)
        .map(|range| LeafTouch {
            range: *range,
            local_start: span.offset.saturating_sub(range.start),
            local_end: range.len().min(span_end - range.start),
        })
        .collect()
}
