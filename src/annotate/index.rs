use crate::document::{HostDocument, LeafId, LeafKind};

/// Position of one leaf in plain-text coordinates. Only valid until the
/// next update of the document it was computed from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LeafRange {
    pub leaf: LeafId,
    pub kind: LeafKind,
    pub start: usize,
    pub end: usize,
}

impl LeafRange {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Flatten the document into contiguous leaf ranges covering `[0, text_len)`.
pub fn index_leaves<H: HostDocument + ?Sized>(host: &H) -> Vec<LeafRange> {
    let mut start = 0;
    host.leaves()
        .into_iter()
        .map(|leaf| {
            let end = start + leaf.char_len();
            let range = LeafRange {
                leaf: leaf.id,
                kind: leaf.kind,
                start,
                end,
            };
            start = end;
            range
        })
        .collect()
}
