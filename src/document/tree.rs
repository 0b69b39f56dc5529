use std::collections::HashMap;

use tdoc::{ChecklistItem, Document, InlineStyle, Paragraph, ParagraphType, Span};
use tracing::warn;

use super::content::{
    ensure_document_initialized, insert_char_into, remove_char_from_text, span_has_text_leaf,
    split_text,
};
use super::paths::{
    ParagraphPath, SpanPath, SpanPointer, sibling_spans_mut, span_chain, span_mut, span_ref,
};
use super::{HostDocument, HostError, Leaf, LeafId, LeafKind, SplitLeaf};

/// Plain-text rendering of the boundary between two text blocks.
pub const BLOCK_SEPARATOR: &str = "\n\n";

#[derive(Clone, Debug, PartialEq, Eq)]
enum LeafLocation {
    Text {
        pointer: SpanPointer,
        splittable: bool,
    },
    Break,
}

#[derive(Clone, Debug)]
struct Slot {
    id: LeafId,
    location: LeafLocation,
}

/// A [`HostDocument`] over a `tdoc` tree.
///
/// Each addressable span is one text leaf. Blocks (leaf paragraphs and
/// checklist items) are separated by [`BLOCK_SEPARATOR`] break leaves.
/// Style fragments live beside the tree, keyed by leaf id.
pub struct TreeDocument {
    document: Document,
    slots: Vec<Slot>,
    styles: HashMap<LeafId, Vec<String>>,
    next_id: u64,
}

impl TreeDocument {
    pub fn new(mut document: Document) -> Self {
        ensure_document_initialized(&mut document);
        let mut tree = Self {
            document,
            slots: Vec::new(),
            styles: HashMap::new(),
            next_id: 1,
        };
        tree.reassign_ids();
        tree
    }

    pub fn from_plain_text(text: &str) -> Self {
        Self::new(document_from_plain_text(text))
    }

    pub fn contains_leaf(&self, leaf: LeafId) -> bool {
        self.slot_index(leaf).is_some()
    }

    /// Inline styles applying to a text leaf, outermost span first.
    pub fn inline_styles(&self, leaf: LeafId) -> Vec<InlineStyle> {
        let Some(LeafLocation::Text { pointer, .. }) = self
            .slot_index(leaf)
            .map(|index| &self.slots[index].location)
        else {
            return Vec::new();
        };
        span_chain(&self.document, pointer)
            .map(|chain| {
                chain
                    .into_iter()
                    .map(|span| span.style)
                    .filter(|style| *style != InlineStyle::None)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Insert `ch` at a plain-text offset. An offset on a block boundary
    /// appends to the text leaf before it.
    pub fn insert_char(&mut self, offset: usize, ch: char) -> Result<(), HostError> {
        let (pointer, local) = self
            .text_position(offset, true)
            .ok_or(HostError::OffsetOutOfRange(offset))?;
        let span = span_mut(&mut self.document, &pointer).ok_or(HostError::OffsetOutOfRange(offset))?;
        insert_char_into(&mut span.text, local, ch);
        Ok(())
    }

    /// Remove the char at a plain-text offset. Block breaks cannot be removed.
    pub fn remove_char(&mut self, offset: usize) -> Result<(), HostError> {
        let (pointer, local) = self
            .text_position(offset, false)
            .ok_or(HostError::OffsetOutOfRange(offset))?;
        let span = span_mut(&mut self.document, &pointer).ok_or(HostError::OffsetOutOfRange(offset))?;
        if remove_char_from_text(&mut span.text, local) {
            Ok(())
        } else {
            Err(HostError::OffsetOutOfRange(offset))
        }
    }

    fn text_position(&self, offset: usize, allow_end: bool) -> Option<(SpanPointer, usize)> {
        let mut start = 0;
        for slot in &self.slots {
            let len = self.slot_text(slot).chars().count();
            let end = start + len;
            if let LeafLocation::Text { pointer, .. } = &slot.location {
                let hit = if allow_end {
                    offset >= start && offset <= end
                } else {
                    offset >= start && offset < end
                };
                if hit {
                    return Some((pointer.clone(), offset - start));
                }
            }
            start = end;
        }
        None
    }

    fn slot_index(&self, leaf: LeafId) -> Option<usize> {
        self.slots.iter().position(|slot| slot.id == leaf)
    }

    fn slot_text<'a>(&'a self, slot: &Slot) -> &'a str {
        match &slot.location {
            LeafLocation::Text { pointer, .. } => span_ref(&self.document, pointer)
                .map(|span| span.text.as_str())
                .unwrap_or(""),
            LeafLocation::Break => BLOCK_SEPARATOR,
        }
    }

    fn fresh_id(&mut self) -> LeafId {
        let id = LeafId::new(self.next_id);
        self.next_id += 1;
        id
    }

    fn reassign_ids(&mut self) {
        let locations = collect_locations(&self.document);
        let mut slots = Vec::with_capacity(locations.len());
        for location in locations {
            slots.push(Slot {
                id: self.fresh_id(),
                location,
            });
        }
        self.slots = slots;
        self.styles.clear();
    }

    /// Re-walk the tree after a structural change, pairing `ids` with the
    /// new locations in order.
    fn relocate(&mut self, ids: Vec<LeafId>) {
        let locations = collect_locations(&self.document);
        if locations.len() != ids.len() {
            warn!(
                expected = ids.len(),
                found = locations.len(),
                "leaf layout diverged from id table, reissuing ids"
            );
            self.reassign_ids();
            return;
        }
        self.slots = ids
            .into_iter()
            .zip(locations)
            .map(|(id, location)| Slot { id, location })
            .collect();
    }
}

impl HostDocument for TreeDocument {
    fn leaves(&self) -> Vec<Leaf<'_>> {
        self.slots
            .iter()
            .map(|slot| Leaf {
                id: slot.id,
                kind: match slot.location {
                    LeafLocation::Text { .. } => LeafKind::Text,
                    LeafLocation::Break => LeafKind::Break,
                },
                text: self.slot_text(slot),
            })
            .collect()
    }

    fn split_leaf(&mut self, leaf: LeafId, offset: usize) -> Result<SplitLeaf, HostError> {
        let index = self.slot_index(leaf).ok_or(HostError::UnknownLeaf(leaf))?;
        let pointer = match &self.slots[index].location {
            LeafLocation::Text {
                pointer,
                splittable: true,
            } => pointer.clone(),
            _ => return Err(HostError::NotSplittable(leaf)),
        };
        let len = self.slot_text(&self.slots[index]).chars().count();
        if offset == 0 || offset >= len {
            return Err(HostError::SplitOutOfRange { leaf, offset, len });
        }

        let (spans, idx) =
            sibling_spans_mut(&mut self.document, &pointer).ok_or(HostError::UnknownLeaf(leaf))?;
        let mut right_span = spans[idx].clone();
        let (left_text, right_text) = split_text(&right_span.text, offset);
        spans[idx].text = left_text;
        right_span.text = right_text;
        spans.insert(idx + 1, right_span);

        let left = self.fresh_id();
        let right = self.fresh_id();
        if let Some(fragments) = self.styles.remove(&leaf) {
            self.styles.insert(left, fragments.clone());
            self.styles.insert(right, fragments);
        }

        let mut ids: Vec<LeafId> = self.slots.iter().map(|slot| slot.id).collect();
        ids.splice(index..=index, [left, right]);
        self.relocate(ids);
        Ok(SplitLeaf { left, right })
    }

    fn set_leaf_style(&mut self, leaf: LeafId, fragment: &str) -> Result<(), HostError> {
        let index = self.slot_index(leaf).ok_or(HostError::UnknownLeaf(leaf))?;
        if self.slots[index].location == LeafLocation::Break {
            return Err(HostError::NotStylable(leaf));
        }
        let fragments = self.styles.entry(leaf).or_default();
        if !fragments.iter().any(|existing| existing == fragment) {
            fragments.push(fragment.to_string());
        }
        Ok(())
    }

    fn clear_leaf_style(&mut self, leaf: LeafId, pattern: &str) -> Result<(), HostError> {
        if self.slot_index(leaf).is_none() {
            return Err(HostError::UnknownLeaf(leaf));
        }
        if let Some(fragments) = self.styles.get_mut(&leaf) {
            fragments.retain(|fragment| !fragment.contains(pattern));
            if fragments.is_empty() {
                self.styles.remove(&leaf);
            }
        }
        Ok(())
    }

    fn leaf_style(&self, leaf: LeafId) -> &[String] {
        self.styles.get(&leaf).map(Vec::as_slice).unwrap_or(&[])
    }

    fn replace_whole_document(&mut self, text: &str) -> Result<(), HostError> {
        self.document = document_from_plain_text(text);
        self.reassign_ids();
        Ok(())
    }
}

fn document_from_plain_text(text: &str) -> Document {
    let paragraphs = text
        .split(BLOCK_SEPARATOR)
        .map(|part| Paragraph::new_text().with_content(vec![Span::new_text(part)]))
        .collect();
    Document::new().with_paragraphs(paragraphs)
}

fn collect_locations(document: &Document) -> Vec<LeafLocation> {
    let mut collector = LocationCollector::default();
    for (idx, paragraph) in document.paragraphs.iter().enumerate() {
        let mut path = ParagraphPath::new_root(idx);
        collector.paragraph(paragraph, &mut path);
    }
    collector.locations
}

#[derive(Default)]
struct LocationCollector {
    locations: Vec<LeafLocation>,
    blocks: usize,
}

impl LocationCollector {
    fn paragraph(&mut self, paragraph: &Paragraph, path: &mut ParagraphPath) {
        if paragraph.paragraph_type().is_leaf() {
            self.block(paragraph.content(), path);
        }
        for (child_index, child) in paragraph.children().iter().enumerate() {
            path.push_child(child_index);
            self.paragraph(child, path);
            path.pop();
        }
        for (entry_index, entry) in paragraph.entries().iter().enumerate() {
            for (child_index, child) in entry.iter().enumerate() {
                path.push_entry(entry_index, child_index);
                self.paragraph(child, path);
                path.pop();
            }
        }
        if paragraph.paragraph_type() == ParagraphType::Checklist {
            for (item_index, item) in paragraph.checklist_items().iter().enumerate() {
                self.checklist_item(item, path, &[item_index]);
            }
        }
    }

    fn checklist_item(&mut self, item: &ChecklistItem, path: &mut ParagraphPath, indices: &[usize]) {
        path.push_checklist_item(indices.to_vec());
        self.block(&item.content, path);
        path.pop();

        for (child_index, child) in item.children.iter().enumerate() {
            let mut child_indices = indices.to_vec();
            child_indices.push(child_index);
            self.checklist_item(child, path, &child_indices);
        }
    }

    fn block(&mut self, spans: &[Span], path: &ParagraphPath) {
        if self.blocks > 0 {
            self.locations.push(LeafLocation::Break);
        }
        self.blocks += 1;
        for (index, span) in spans.iter().enumerate() {
            let mut span_path = SpanPath::new(vec![index]);
            self.span(span, path, &mut span_path);
        }
    }

    fn span(&mut self, span: &Span, path: &ParagraphPath, span_path: &mut SpanPath) {
        if span_has_text_leaf(span) {
            self.locations.push(LeafLocation::Text {
                pointer: SpanPointer {
                    paragraph_path: path.clone(),
                    span_path: span_path.clone(),
                },
                splittable: span.children.is_empty(),
            });
        }
        for (child_index, child) in span.children.iter().enumerate() {
            span_path.push(child_index);
            self.span(child, path, span_path);
            span_path.pop();
        }
    }
}
