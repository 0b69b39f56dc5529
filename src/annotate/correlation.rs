use std::collections::HashMap;

use crate::document::LeafId;

use super::{Annotation, AnnotationId};

/// Maps leaves back to the annotations decorating them.
#[derive(Debug, Default)]
pub struct CorrelationStore {
    by_leaf: HashMap<LeafId, Vec<AnnotationId>>,
}

impl CorrelationStore {
    pub fn rebuild(&mut self, annotations: &[Annotation]) {
        self.by_leaf.clear();
        for annotation in annotations {
            for leaf in &annotation.carrying_leaf_ids {
                self.by_leaf.entry(*leaf).or_default().push(annotation.id);
            }
        }
    }

    pub fn clear(&mut self) {
        self.by_leaf.clear();
    }

    /// The earliest annotation (by span offset) carried by `leaf`.
    pub fn lookup(&self, leaf: LeafId) -> Option<AnnotationId> {
        self.by_leaf.get(&leaf).and_then(|ids| ids.first().copied())
    }

    pub fn annotations_on(&self, leaf: LeafId) -> &[AnnotationId] {
        self.by_leaf.get(&leaf).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn decorated_leaves(&self) -> usize {
        self.by_leaf.len()
    }
}

/// True when `annotation` has no equivalent in `latest`.
pub fn invalidate_if_stale(annotation: &Annotation, latest: &[Annotation]) -> bool {
    !latest
        .iter()
        .any(|candidate| candidate.is_equivalent(annotation))
}
