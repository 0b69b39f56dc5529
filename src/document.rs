use std::fmt;

use thiserror::Error;

mod content;
mod paths;
mod tree;

pub use content::{char_slice, char_to_byte_idx};
pub use tree::{BLOCK_SEPARATOR, TreeDocument};

/// Identity of a leaf as issued by the host document.
///
/// Stable across text edits and style changes, retired by a split.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LeafId(u64);

impl LeafId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for LeafId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "leaf#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeafKind {
    /// A run of uniformly styled text.
    Text,
    /// Separator between two text blocks. Addressable, never splittable.
    Break,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Leaf<'a> {
    pub id: LeafId,
    pub kind: LeafKind,
    pub text: &'a str,
}

impl Leaf<'_> {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SplitLeaf {
    pub left: LeafId,
    pub right: LeafId,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScreenRect {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl ScreenRect {
    pub fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn bottom(&self) -> u16 {
        self.y.saturating_add(self.height)
    }

    pub fn contains(&self, column: u16, row: u16) -> bool {
        column >= self.x
            && column < self.x.saturating_add(self.width)
            && row >= self.y
            && row < self.bottom()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("unknown {0}")]
    UnknownLeaf(LeafId),
    #[error("{0} is not a splittable text leaf")]
    NotSplittable(LeafId),
    #[error("offset {offset} is not an interior position of {leaf} (length {len})")]
    SplitOutOfRange {
        leaf: LeafId,
        offset: usize,
        len: usize,
    },
    #[error("{0} does not carry style fragments")]
    NotStylable(LeafId),
    #[error("offset {0} does not address editable text")]
    OffsetOutOfRange(usize),
}

/// Capabilities the annotation engine needs from the document it decorates.
///
/// `&self` methods are read transactions and `&mut self` methods are update
/// transactions. Implementations own node identity; callers must not cache
/// anything derived from [`HostDocument::leaves`] across an update.
pub trait HostDocument {
    /// All leaves in depth-first document order.
    fn leaves(&self) -> Vec<Leaf<'_>>;

    /// Plain text used for every offset. Equal to the concatenation of
    /// [`HostDocument::leaves`] by construction.
    fn plain_text(&self) -> String {
        self.leaves().iter().map(|leaf| leaf.text).collect()
    }

    /// Split a text leaf at a char offset strictly inside it. Both pieces
    /// receive new ids and inherit the leaf's style fragments.
    fn split_leaf(&mut self, leaf: LeafId, offset: usize) -> Result<SplitLeaf, HostError>;

    /// Add a style fragment. Setting a fragment twice is a no-op.
    fn set_leaf_style(&mut self, leaf: LeafId, fragment: &str) -> Result<(), HostError>;

    /// Remove every fragment containing `pattern`.
    fn clear_leaf_style(&mut self, leaf: LeafId, pattern: &str) -> Result<(), HostError>;

    fn leaf_style(&self, leaf: LeafId) -> &[String];

    /// Discard the whole tree and rebuild it from `text`. All ids are retired.
    fn replace_whole_document(&mut self, text: &str) -> Result<(), HostError>;
}

/// Where leaves ended up on screen after the last layout.
pub trait LeafGeometry {
    fn screen_rect_for_leaf(&self, leaf: LeafId) -> Option<ScreenRect>;
}

#[cfg(test)]
#[path = "document_tests.rs"]
mod document_tests;
