use tdoc::{ChecklistItem, Document, Paragraph, Span};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct ParagraphPath {
    steps: Vec<PathStep>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum PathStep {
    Root(usize),
    Child(usize),
    Entry {
        entry_index: usize,
        paragraph_index: usize,
    },
    ChecklistItem {
        indices: Vec<usize>,
    },
}

impl ParagraphPath {
    pub(crate) fn new_root(idx: usize) -> Self {
        Self {
            steps: vec![PathStep::Root(idx)],
        }
    }

    pub(crate) fn from_steps(steps: Vec<PathStep>) -> Self {
        Self { steps }
    }

    pub(crate) fn push_child(&mut self, idx: usize) {
        self.steps.push(PathStep::Child(idx));
    }

    pub(crate) fn push_entry(&mut self, entry_index: usize, paragraph_index: usize) {
        self.steps.push(PathStep::Entry {
            entry_index,
            paragraph_index,
        });
    }

    pub(crate) fn push_checklist_item(&mut self, indices: Vec<usize>) {
        self.steps.push(PathStep::ChecklistItem { indices });
    }

    pub(crate) fn pop(&mut self) {
        if self.steps.len() > 1 {
            self.steps.pop();
        }
    }

    pub(crate) fn steps(&self) -> &[PathStep] {
        &self.steps
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct SpanPath {
    indices: Vec<usize>,
}

impl SpanPath {
    pub(crate) fn new(indices: Vec<usize>) -> Self {
        Self { indices }
    }

    pub(crate) fn push(&mut self, idx: usize) {
        self.indices.push(idx);
    }

    pub(crate) fn pop(&mut self) {
        self.indices.pop();
    }

    pub(crate) fn indices(&self) -> &[usize] {
        &self.indices
    }
}

/// Address of one span: the block holding it plus the index path through
/// nested spans.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct SpanPointer {
    pub paragraph_path: ParagraphPath,
    pub span_path: SpanPath,
}

pub(crate) fn paragraph_ref<'a>(document: &'a Document, path: &ParagraphPath) -> Option<&'a Paragraph> {
    let mut iter = path.steps().iter();
    let first = iter.next()?;
    let mut paragraph = match first {
        PathStep::Root(idx) => document.paragraphs.get(*idx)?,
        _ => return None,
    };
    for step in iter {
        paragraph = match step {
            PathStep::Child(idx) => match paragraph {
                Paragraph::Quote { children } => children.get(*idx)?,
                _ => return None,
            },
            PathStep::Entry {
                entry_index,
                paragraph_index,
            } => match paragraph {
                Paragraph::OrderedList { entries } | Paragraph::UnorderedList { entries } => {
                    entries.get(*entry_index)?.get(*paragraph_index)?
                }
                _ => return None,
            },
            PathStep::ChecklistItem { .. } => return None,
            PathStep::Root(_) => return None,
        };
    }
    Some(paragraph)
}

pub(crate) fn paragraph_mut<'a>(
    document: &'a mut Document,
    path: &ParagraphPath,
) -> Option<&'a mut Paragraph> {
    let mut iter = path.steps().iter();
    let first = iter.next()?;
    let mut paragraph = match first {
        PathStep::Root(idx) => document.paragraphs.get_mut(*idx)?,
        _ => return None,
    };
    for step in iter {
        paragraph = match step {
            PathStep::Child(idx) => {
                let Paragraph::Quote { children } = paragraph else {
                    return None;
                };
                children.get_mut(*idx)?
            }
            PathStep::Entry {
                entry_index,
                paragraph_index,
            } => match paragraph {
                Paragraph::OrderedList { entries } | Paragraph::UnorderedList { entries } => {
                    entries.get_mut(*entry_index)?.get_mut(*paragraph_index)?
                }
                _ => return None,
            },
            PathStep::ChecklistItem { .. } => return None,
            PathStep::Root(_) => return None,
        };
    }
    Some(paragraph)
}

fn split_checklist_step(path: &ParagraphPath) -> Option<(ParagraphPath, &[usize])> {
    let steps = path.steps();
    let (idx, step) = steps
        .iter()
        .enumerate()
        .find(|(_, s)| matches!(s, PathStep::ChecklistItem { .. }))?;
    let PathStep::ChecklistItem { indices } = step else {
        return None;
    };
    Some((ParagraphPath::from_steps(steps[..idx].to_vec()), indices))
}

pub(crate) fn checklist_item_ref<'a>(
    document: &'a Document,
    path: &ParagraphPath,
) -> Option<&'a ChecklistItem> {
    let (paragraph_path, indices) = split_checklist_step(path)?;
    let paragraph = paragraph_ref(document, &paragraph_path)?;
    let mut item = paragraph.checklist_items().get(*indices.first()?)?;
    for &idx in &indices[1..] {
        item = item.children.get(idx)?;
    }
    Some(item)
}

pub(crate) fn checklist_item_mut<'a>(
    document: &'a mut Document,
    path: &ParagraphPath,
) -> Option<&'a mut ChecklistItem> {
    let (paragraph_path, indices) = split_checklist_step(path)?;
    let indices = indices.to_vec();
    let paragraph = paragraph_mut(document, &paragraph_path)?;
    let Paragraph::Checklist { items } = paragraph else {
        return None;
    };
    let mut item = items.get_mut(*indices.first()?)?;
    for &idx in &indices[1..] {
        item = item.children.get_mut(idx)?;
    }
    Some(item)
}

fn block_spans<'a>(document: &'a Document, path: &ParagraphPath) -> Option<&'a [Span]> {
    if let Some(item) = checklist_item_ref(document, path) {
        return Some(item.content.as_slice());
    }
    let spans: &[Span] = paragraph_ref(document, path)?.content();
    Some(spans)
}

fn block_spans_mut<'a>(document: &'a mut Document, path: &ParagraphPath) -> Option<&'a mut Vec<Span>> {
    if split_checklist_step(path).is_some() {
        return Some(&mut checklist_item_mut(document, path)?.content);
    }
    Some(paragraph_mut(document, path)?.content_mut())
}

pub(crate) fn span_ref<'a>(document: &'a Document, pointer: &SpanPointer) -> Option<&'a Span> {
    let mut iter = pointer.span_path.indices().iter();
    let first = iter.next()?;
    let mut span = block_spans(document, &pointer.paragraph_path)?.get(*first)?;
    for idx in iter {
        span = span.children.get(*idx)?;
    }
    Some(span)
}

/// The addressed span preceded by every span containing it, outermost first.
pub(crate) fn span_chain<'a>(document: &'a Document, pointer: &SpanPointer) -> Option<Vec<&'a Span>> {
    let mut iter = pointer.span_path.indices().iter();
    let first = iter.next()?;
    let mut span = block_spans(document, &pointer.paragraph_path)?.get(*first)?;
    let mut chain = vec![span];
    for idx in iter {
        span = span.children.get(*idx)?;
        chain.push(span);
    }
    Some(chain)
}

pub(crate) fn span_mut<'a>(document: &'a mut Document, pointer: &SpanPointer) -> Option<&'a mut Span> {
    let (spans, idx) = sibling_spans_mut(document, pointer)?;
    spans.get_mut(idx)
}

/// The vector holding the addressed span, and the span's index in it.
pub(crate) fn sibling_spans_mut<'a>(
    document: &'a mut Document,
    pointer: &SpanPointer,
) -> Option<(&'a mut Vec<Span>, usize)> {
    let (last, prefix) = pointer.span_path.indices().split_last()?;
    let mut spans = block_spans_mut(document, &pointer.paragraph_path)?;
    for idx in prefix {
        spans = &mut spans.get_mut(*idx)?.children;
    }
    if *last >= spans.len() {
        return None;
    }
    Some((spans, *last))
}
