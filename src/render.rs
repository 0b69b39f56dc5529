use std::collections::HashMap;

use ratatui::{
    style::{Modifier, Style},
    text::{Line, Span},
};
use unicode_width::UnicodeWidthChar;

use tdoc::InlineStyle;

use crate::annotate::MARKER_PATTERN;
use crate::document::{HostDocument, LeafGeometry, LeafId, LeafKind, ScreenRect, TreeDocument};
use crate::theme::Theme;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CursorVisualPosition {
    pub line: usize,
    pub column: u16,
}

/// One run of a leaf on one rendered line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LeafPlacement {
    pub line: usize,
    pub column: u16,
    pub width: u16,
}

#[derive(Debug)]
pub struct RenderResult {
    pub lines: Vec<Line<'static>>,
    pub caret: Option<CursorVisualPosition>,
    pub total_lines: usize,
    pub placements: HashMap<LeafId, Vec<LeafPlacement>>,
}

pub struct RenderOptions<'a> {
    pub theme: &'a Theme,
    /// Caret as a plain-text char offset.
    pub caret: Option<usize>,
    /// Leaves drawn with the active marker background.
    pub active_leaves: &'a [LeafId],
}

pub fn render_document(
    tree: &TreeDocument,
    width: usize,
    options: &RenderOptions<'_>,
) -> RenderResult {
    let mut renderer = Renderer::new(width.max(1));
    let leaves = tree.leaves();
    let mut fragments = Vec::new();
    let mut offset = 0;
    let mut caret_placed = false;

    for (index, leaf) in leaves.iter().enumerate() {
        let len = leaf.char_len();
        match leaf.kind {
            LeafKind::Break => {
                renderer.flush_block(&mut fragments);
                renderer.push_blank_line();
            }
            LeafKind::Text => {
                let ends_block = leaves
                    .get(index + 1)
                    .is_none_or(|next| next.kind != LeafKind::Text);
                let caret_local = options.caret.filter(|caret| {
                    !caret_placed
                        && *caret >= offset
                        && (*caret < offset + len || (*caret == offset + len && ends_block))
                });
                caret_placed |= caret_local.is_some();
                let style = leaf_style(tree, leaf.id, options);
                tokenize_text(
                    leaf.text,
                    style,
                    leaf.id,
                    caret_local.map(|caret| caret - offset),
                    &mut fragments,
                );
            }
        }
        offset += len;
    }
    renderer.flush_block(&mut fragments);
    renderer.finish()
}

fn leaf_style(tree: &TreeDocument, leaf: LeafId, options: &RenderOptions<'_>) -> Style {
    let style = tree
        .inline_styles(leaf)
        .into_iter()
        .fold(Style::default(), |base, inline| {
            merge_style(base, inline, options.theme)
        });
    let marked = tree
        .leaf_style(leaf)
        .iter()
        .any(|fragment| fragment.contains(MARKER_PATTERN));
    if marked {
        style.patch(options.theme.marker_style(options.active_leaves.contains(&leaf)))
    } else {
        style
    }
}

fn merge_style(base: Style, inline: InlineStyle, theme: &Theme) -> Style {
    match inline {
        InlineStyle::None => base,
        InlineStyle::Bold => base.add_modifier(Modifier::BOLD),
        InlineStyle::Italic => base.add_modifier(Modifier::ITALIC),
        InlineStyle::Highlight => base.patch(theme.highlight_style()),
        InlineStyle::Underline => base.add_modifier(Modifier::UNDERLINED),
        InlineStyle::Strike => base.add_modifier(Modifier::CROSSED_OUT),
        InlineStyle::Link => base
            .patch(theme.link_style())
            .add_modifier(Modifier::UNDERLINED),
        InlineStyle::Code => base.add_modifier(Modifier::DIM),
    }
}

struct Renderer {
    wrap_width: usize,
    caret: Option<CursorVisualPosition>,
    lines: Vec<Line<'static>>,
    placements: HashMap<LeafId, Vec<LeafPlacement>>,
}

impl Renderer {
    fn new(wrap_width: usize) -> Self {
        Self {
            wrap_width,
            caret: None,
            lines: Vec::new(),
            placements: HashMap::new(),
        }
    }

    fn flush_block(&mut self, fragments: &mut Vec<FragmentItem>) {
        let lines = wrap_fragments(fragments, self.wrap_width);
        fragments.clear();
        self.consume_lines(lines);
    }

    fn push_blank_line(&mut self) {
        self.lines.push(Line::from(""));
    }

    fn consume_lines(&mut self, outputs: Vec<LineOutput>) {
        for output in outputs {
            let line_index = self.lines.len();
            let spans: Vec<Span<'static>> = output
                .spans
                .into_iter()
                .map(|segment| Span::styled(segment.text, segment.style))
                .collect();
            if let Some(column) = output.caret {
                self.caret = Some(CursorVisualPosition {
                    line: line_index,
                    column,
                });
            }
            for (leaf, column, width) in output.placements {
                self.placements.entry(leaf).or_default().push(LeafPlacement {
                    line: line_index,
                    column,
                    width,
                });
            }
            self.lines.push(Line::from(spans));
        }
    }

    fn finish(mut self) -> RenderResult {
        if self.lines.is_empty() {
            self.lines.push(Line::from(""));
        }
        let total_lines = self.lines.len();
        RenderResult {
            lines: self.lines,
            caret: self.caret,
            total_lines,
            placements: self.placements,
        }
    }
}

#[derive(Clone)]
struct LineSegment {
    text: String,
    style: Style,
}

struct LineOutput {
    spans: Vec<LineSegment>,
    caret: Option<u16>,
    placements: Vec<(LeafId, u16, u16)>,
}

#[derive(Clone)]
struct Fragment {
    text: String,
    style: Style,
    kind: FragmentKind,
    width: usize,
    leaf: LeafId,
    /// Caret column relative to the fragment start.
    caret: Option<usize>,
}

#[derive(Clone, Copy)]
enum FragmentKind {
    Word,
    Whitespace,
}

#[derive(Clone)]
enum FragmentItem {
    Token(Fragment),
    LineBreak,
}

fn tokenize_text(
    text: &str,
    style: Style,
    leaf: LeafId,
    caret: Option<usize>,
    fragments: &mut Vec<FragmentItem>,
) {
    let mut builder: Option<TokenBuilder> = None;
    let mut pending_caret = false;
    let mut char_count = 0;

    for (char_index, ch) in text.chars().enumerate() {
        char_count = char_index + 1;
        if caret == Some(char_index) {
            pending_caret = true;
        }
        if ch == '\r' {
            continue;
        }
        if ch == '\n' {
            if let Some(mut token) = builder.take() {
                token.take_caret(&mut pending_caret);
                fragments.push(FragmentItem::Token(token.finish()));
            } else if pending_caret {
                fragments.push(FragmentItem::Token(caret_fragment(style, leaf)));
                pending_caret = false;
            }
            fragments.push(FragmentItem::LineBreak);
            continue;
        }

        let expanded: &[char] = if ch == '\t' {
            &[' '; 4]
        } else {
            std::slice::from_ref(&ch)
        };

        for actual in expanded {
            let is_whitespace = actual.is_whitespace();
            if builder
                .as_ref()
                .is_some_and(|existing| existing.kind_matches(is_whitespace))
            {
                if let Some(current) = builder.as_mut() {
                    current.take_caret(&mut pending_caret);
                    current.push_char(*actual);
                }
            } else {
                if let Some(existing) = builder.take() {
                    fragments.push(FragmentItem::Token(existing.finish()));
                }
                let mut new_builder = TokenBuilder::new(style, leaf, is_whitespace);
                new_builder.take_caret(&mut pending_caret);
                new_builder.push_char(*actual);
                builder = Some(new_builder);
            }
        }
    }

    if caret == Some(char_count) {
        pending_caret = true;
    }
    if let Some(mut token) = builder {
        token.take_caret(&mut pending_caret);
        fragments.push(FragmentItem::Token(token.finish()));
    } else if pending_caret {
        fragments.push(FragmentItem::Token(caret_fragment(style, leaf)));
    }
}

fn caret_fragment(style: Style, leaf: LeafId) -> Fragment {
    Fragment {
        text: String::new(),
        style,
        kind: FragmentKind::Word,
        width: 0,
        leaf,
        caret: Some(0),
    }
}

struct TokenBuilder {
    text: String,
    style: Style,
    kind: FragmentKind,
    width: usize,
    leaf: LeafId,
    caret: Option<usize>,
}

impl TokenBuilder {
    fn new(style: Style, leaf: LeafId, is_whitespace: bool) -> Self {
        Self {
            text: String::new(),
            style,
            kind: if is_whitespace {
                FragmentKind::Whitespace
            } else {
                FragmentKind::Word
            },
            width: 0,
            leaf,
            caret: None,
        }
    }

    fn kind_matches(&self, is_whitespace: bool) -> bool {
        matches!(
            (self.kind, is_whitespace),
            (FragmentKind::Whitespace, true) | (FragmentKind::Word, false)
        )
    }

    fn take_caret(&mut self, pending: &mut bool) {
        if std::mem::take(pending) {
            self.caret = Some(self.width);
        }
    }

    fn push_char(&mut self, ch: char) {
        self.text.push(ch);
        self.width += UnicodeWidthChar::width(ch).unwrap_or(0);
    }

    fn finish(self) -> Fragment {
        Fragment {
            text: self.text,
            style: self.style,
            kind: self.kind,
            width: self.width,
            leaf: self.leaf,
            caret: self.caret,
        }
    }
}

fn wrap_fragments(fragments: &[FragmentItem], width: usize) -> Vec<LineOutput> {
    let mut outputs = Vec::new();
    let mut builder = LineBuilder::new();
    let mut pending_whitespace: Vec<Fragment> = Vec::new();

    for fragment in fragments {
        match fragment {
            FragmentItem::LineBreak => {
                builder.consume_pending(&mut pending_whitespace);
                outputs.push(builder.build_line());
                builder = LineBuilder::new();
            }
            FragmentItem::Token(token) => match token.kind {
                FragmentKind::Whitespace => {
                    pending_whitespace.push(token.clone());
                }
                FragmentKind::Word => {
                    let whitespace_width: usize =
                        pending_whitespace.iter().map(|item| item.width).sum();
                    if builder.width > 0 && builder.width + whitespace_width + token.width > width
                    {
                        builder.consume_pending(&mut pending_whitespace);
                        outputs.push(builder.build_line());
                        builder = LineBuilder::new();
                    }
                    builder.consume_pending(&mut pending_whitespace);
                    builder.append_token(token.clone());
                }
            },
        }
    }

    builder.consume_pending(&mut pending_whitespace);
    outputs.push(builder.build_line());
    outputs
}

struct LineBuilder {
    segments: Vec<LineSegment>,
    caret: Option<u16>,
    placements: Vec<(LeafId, u16, u16)>,
    width: usize,
}

impl LineBuilder {
    fn new() -> Self {
        Self {
            segments: Vec::new(),
            caret: None,
            placements: Vec::new(),
            width: 0,
        }
    }

    fn consume_pending(&mut self, pending_whitespace: &mut Vec<Fragment>) {
        for fragment in pending_whitespace.drain(..) {
            self.append_token(fragment);
        }
    }

    fn append_token(&mut self, fragment: Fragment) {
        let column = self.width as u16;
        if let Some(offset) = fragment.caret {
            self.caret = Some((self.width + offset) as u16);
        }
        if fragment.text.is_empty() {
            return;
        }
        let width = fragment.width as u16;
        match self.placements.last_mut() {
            Some((leaf, start, run)) if *leaf == fragment.leaf && *start + *run == column => {
                *run += width;
            }
            _ => self.placements.push((fragment.leaf, column, width)),
        }
        self.segments.push(LineSegment {
            text: fragment.text,
            style: fragment.style,
        });
        self.width += fragment.width;
    }

    fn build_line(mut self) -> LineOutput {
        if self.segments.is_empty() {
            self.segments.push(LineSegment {
                text: String::new(),
                style: Style::default(),
            });
        }
        LineOutput {
            spans: self.segments,
            caret: self.caret,
            placements: self.placements,
        }
    }
}

/// Rendered leaf positions mapped onto a scrolled screen area.
#[derive(Clone, Debug, Default)]
pub struct ScreenLayout {
    area: ScreenRect,
    scroll: usize,
    placements: HashMap<LeafId, Vec<LeafPlacement>>,
}

impl ScreenLayout {
    pub fn new(area: ScreenRect, scroll: usize, result: &RenderResult) -> Self {
        Self {
            area,
            scroll,
            placements: result.placements.clone(),
        }
    }

    pub fn area(&self) -> ScreenRect {
        self.area
    }

    fn to_screen(&self, placement: &LeafPlacement) -> Option<ScreenRect> {
        let visible = placement.line >= self.scroll
            && placement.line < self.scroll + self.area.height as usize;
        visible.then(|| {
            ScreenRect::new(
                self.area.x.saturating_add(placement.column),
                self.area.y + (placement.line - self.scroll) as u16,
                placement.width,
                1,
            )
        })
    }

    /// The leaf drawn at a screen cell.
    pub fn leaf_at(&self, column: u16, row: u16) -> Option<LeafId> {
        self.placements.iter().find_map(|(leaf, placements)| {
            placements
                .iter()
                .filter_map(|placement| self.to_screen(placement))
                .any(|rect| rect.contains(column, row))
                .then_some(*leaf)
        })
    }
}

impl LeafGeometry for ScreenLayout {
    fn screen_rect_for_leaf(&self, leaf: LeafId) -> Option<ScreenRect> {
        self.placements
            .get(&leaf)?
            .iter()
            .find_map(|placement| self.to_screen(placement))
    }
}
