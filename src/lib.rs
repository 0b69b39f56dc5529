//! Live writing feedback for structured text documents.
//!
//! Analyzer findings arrive as `(offset, length)` spans over the document's
//! plain text. [`annotate`] projects them onto the leaves of a styled span
//! tree, splitting leaves at span boundaries and marking the pieces, and
//! keeps that projection correct while the document keeps changing.

pub mod analyzer;
pub mod annotate;
pub mod config;
pub mod document;
pub mod language;
pub mod popup;
pub mod render;
pub mod scheduler;
pub mod theme;
