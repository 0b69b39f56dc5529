use crate::document::{HostDocument, HostError, LeafId, LeafKind};

use super::matcher::LeafTouch;

/// Result of cutting a touched leaf down to the covered range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Isolation {
    /// The leaf covering exactly the touched range.
    pub leaf: LeafId,
    /// Every leaf that now stands where the touched leaf stood, in order.
    pub pieces: Vec<LeafId>,
}

impl Isolation {
    pub fn split(&self) -> bool {
        self.pieces.len() > 1
    }
}

/// Split `touch.range.leaf` so the covered chars form a leaf of their own.
///
/// Cuts at `local_end` first and then at `local_start` on the left piece, so
/// the start cut never needs adjusted offsets. Every range computed before
/// this call is stale afterwards.
pub fn isolate_range<H: HostDocument + ?Sized>(
    host: &mut H,
    touch: &LeafTouch,
) -> Result<Isolation, HostError> {
    let original = touch.range.leaf;
    if touch.range.kind != LeafKind::Text {
        return Err(HostError::NotSplittable(original));
    }
    let len = touch.range.len();
    if touch.local_start >= touch.local_end || touch.local_end > len {
        return Err(HostError::SplitOutOfRange {
            leaf: original,
            offset: touch.local_start,
            len,
        });
    }

    let mut target = original;
    let mut suffix = None;
    if touch.local_end < len {
        let split = host.split_leaf(target, touch.local_end)?;
        target = split.left;
        suffix = Some(split.right);
    }

    let mut prefix = None;
    if touch.local_start > 0 {
        let split = host.split_leaf(target, touch.local_start)?;
        prefix = Some(split.left);
        target = split.right;
    }

    let pieces = prefix
        .into_iter()
        .chain(std::iter::once(target))
        .chain(suffix)
        .collect();
    Ok(Isolation {
        leaf: target,
        pieces,
    })
}
