use std::collections::HashMap;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use tdoc::{Document, InlineStyle, Paragraph, Span};

use super::*;
use crate::analyzer::{AnalysisResponse, Analyzer, AnalyzerError};
use crate::document::{HostDocument, TreeDocument};
use crate::scheduler::SchedulerState;

/// Answers with a scripted batch per request text.
#[derive(Default)]
struct FakeAnalyzer {
    responses: HashMap<String, Vec<AnalysisMatch>>,
}

impl FakeAnalyzer {
    fn with(mut self, text: &str, matches: Vec<AnalysisMatch>) -> Self {
        self.responses.insert(text.to_string(), matches);
        self
    }
}

impl Analyzer for FakeAnalyzer {
    fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse, AnalyzerError> {
        self.responses
            .get(&request.text)
            .cloned()
            .map(|matches| AnalysisResponse { matches })
            .ok_or_else(|| AnalyzerError::Service("no scripted response".to_string()))
    }
}

fn session() -> AnnotationSession {
    AnnotationSession::new(&Config::default())
}

fn leaf_text(tree: &TreeDocument, leaf: LeafId) -> String {
    tree.leaves()
        .iter()
        .find(|candidate| candidate.id == leaf)
        .map(|candidate| candidate.text.to_string())
        .unwrap_or_default()
}

fn carried_texts(tree: &TreeDocument, annotation: &Annotation) -> Vec<String> {
    annotation
        .carrying_leaf_ids
        .iter()
        .map(|leaf| leaf_text(tree, *leaf))
        .collect()
}

fn marked_texts(tree: &TreeDocument) -> Vec<String> {
    tree.leaves()
        .iter()
        .filter(|leaf| {
            tree.leaf_style(leaf.id)
                .iter()
                .any(|fragment| fragment == MARKER_FRAGMENT)
        })
        .map(|leaf| leaf.text.to_string())
        .collect()
}

fn leaf_texts(tree: &TreeDocument) -> Vec<String> {
    tree.leaves().iter().map(|leaf| leaf.text.to_string()).collect()
}

/// Issue a request for the current text right away.
fn dispatch(session: &mut AnnotationSession, tree: &mut TreeDocument, now: Instant) -> AnalysisRequest {
    session.request_now(&*tree, now);
    session
        .poll(tree, now, true)
        .expect("request should be dispatched")
}

#[test]
fn marked_leaf_matches_the_span_substring() {
    let text = "Hello world";
    let mut tree = TreeDocument::from_plain_text(text);
    let mut session = session();
    let report = session.apply_matches(&mut tree, text, &[AnalysisMatch::new(5, 3, "typo", &[])]);

    assert_eq!(report.decorated, 1);
    let annotation = &session.annotations()[0];
    assert_eq!(annotation.carrying_leaf_ids.len(), 1);
    assert_eq!(carried_texts(&tree, annotation), vec![char_slice(text, 5, 8)]);
    assert_eq!(annotation.original_text, " wo");
    assert_eq!(tree.plain_text(), text);
}

#[test]
fn span_across_a_leaf_boundary_marks_both_parts() {
    let paragraph = Paragraph::new_text()
        .with_content(vec![Span::new_text("Hello"), Span::new_text(" world")]);
    let mut tree = TreeDocument::new(Document::new().with_paragraphs(vec![paragraph]));
    let mut session = session();
    session.apply_matches(&mut tree, "Hello world", &[AnalysisMatch::new(3, 5, "x", &[])]);

    let annotation = &session.annotations()[0];
    assert_eq!(carried_texts(&tree, annotation), vec!["lo", " wo"]);
    assert_eq!(leaf_texts(&tree), vec!["Hel", "lo", " wo", "rld"]);
    assert_eq!(marked_texts(&tree).concat(), "lo wo");
    assert_eq!(tree.plain_text(), "Hello world");
}

#[test]
fn decorating_twice_is_idempotent() {
    let text = "Ths is a smple sentence.";
    let mut tree = TreeDocument::from_plain_text(text);
    let mut session = session();
    session.apply_matches(
        &mut tree,
        text,
        &[
            AnalysisMatch::new(0, 3, "spelling", &["This"]),
            AnalysisMatch::new(9, 5, "spelling", &["simple"]),
        ],
    );
    let carrying: Vec<Vec<LeafId>> = session
        .annotations()
        .iter()
        .map(|annotation| annotation.carrying_leaf_ids.clone())
        .collect();
    let marked = marked_texts(&tree);
    let leaves = leaf_texts(&tree);

    let report = session.decorate(&mut tree);
    assert_eq!(report.cleared, 2);
    assert_eq!(report.decorated, 2);
    let again: Vec<Vec<LeafId>> = session
        .annotations()
        .iter()
        .map(|annotation| annotation.carrying_leaf_ids.clone())
        .collect();
    assert_eq!(again, carrying);
    assert_eq!(marked_texts(&tree), marked);
    assert_eq!(leaf_texts(&tree), leaves);
}

#[test]
fn late_response_for_an_older_generation_is_ignored() {
    let text = "Ein Satz mit Fehlern drin";
    let mut tree = TreeDocument::from_plain_text(text);
    let mut session = session();
    let now = Instant::now();
    let first = dispatch(&mut session, &mut tree, now);
    let second = dispatch(&mut session, &mut tree, now);
    assert!(first.generation < second.generation);

    let newer = FakeAnalyzer::default().with(text, vec![AnalysisMatch::new(13, 7, "newer", &[])]);
    let older = FakeAnalyzer::default().with(text, vec![AnalysisMatch::new(0, 3, "older", &[])]);

    let applied = session.complete(
        &mut tree,
        AnalysisOutcome {
            result: newer.analyze(&second),
            request: second,
        },
    );
    assert!(matches!(applied, Completion::Applied(_)));
    let late = session.complete(
        &mut tree,
        AnalysisOutcome {
            result: older.analyze(&first),
            request: first,
        },
    );
    assert_eq!(late, Completion::Superseded);

    let messages: Vec<&str> = session
        .annotations()
        .iter()
        .map(|annotation| annotation.message.as_str())
        .collect();
    assert_eq!(messages, vec!["newer"]);
    assert_eq!(marked_texts(&tree), vec!["Fehlern"]);
}

#[test]
fn accepting_a_suggestion_rewrites_and_reschedules() {
    let text = "I saw teh dog";
    let mut tree = TreeDocument::from_plain_text(text);
    let mut session = session();
    session.apply_matches(&mut tree, text, &[AnalysisMatch::new(6, 3, "typo", &["the", "tea"])]);
    let id = session.annotations()[0].id;

    let now = Instant::now();
    let rewritten = session.apply_suggestion(&mut tree, id, "the", now).unwrap();
    assert_eq!(rewritten, "I saw the dog");
    assert_eq!(tree.plain_text(), "I saw the dog");
    assert!(session.annotation(id).is_none());
    assert!(session.annotations().is_empty());
    assert!(marked_texts(&tree).is_empty());
    assert_eq!(
        session.scheduler().state(),
        SchedulerState::IdleScheduled { fallback_at: now }
    );

    let request = session.poll(&mut tree, now, false).unwrap();
    assert_eq!(request.text, "I saw the dog");
}

#[test]
fn german_typo_round_trip() {
    let text = "Dies ist ein Beispieltxt.";
    let analyzer = FakeAnalyzer::default()
        .with(
            text,
            vec![AnalysisMatch::new(13, 11, "Rechtschreibfehler", &["Beispieltext"])],
        )
        .with("Dies ist ein Beispieltext.", Vec::new());
    let mut tree = TreeDocument::from_plain_text(text);
    let mut session = session();
    let now = Instant::now();

    let request = dispatch(&mut session, &mut tree, now);
    let completion = session.complete(
        &mut tree,
        AnalysisOutcome {
            result: analyzer.analyze(&request),
            request,
        },
    );
    assert!(matches!(completion, Completion::Applied(report) if report.decorated == 1));
    assert_eq!(marked_texts(&tree), vec!["Beispieltxt"]);

    let clicked = tree
        .leaves()
        .iter()
        .find(|leaf| leaf.text == "Beispieltxt")
        .map(|leaf| leaf.id)
        .unwrap();
    let annotation = session.lookup(clicked).unwrap();
    assert_eq!(annotation.message, "Rechtschreibfehler");
    let (id, replacement) = (annotation.id, annotation.replacements[0].clone());

    session.apply_suggestion(&mut tree, id, &replacement, now).unwrap();
    assert_eq!(tree.plain_text(), "Dies ist ein Beispieltext.");

    let request = session.poll(&mut tree, now, true).unwrap();
    let completion = session.complete(
        &mut tree,
        AnalysisOutcome {
            result: analyzer.analyze(&request),
            request,
        },
    );
    assert!(matches!(completion, Completion::Applied(_)));
    assert!(session.annotations().is_empty());
    assert_eq!(session.correlation().decorated_leaves(), 0);
    assert!(marked_texts(&tree).is_empty());
}

#[test]
fn malformed_spans_are_skipped_individually() {
    let text = "Hello world";
    let mut tree = TreeDocument::from_plain_text(text);
    let mut session = session();
    session.apply_matches(
        &mut tree,
        text,
        &[
            AnalysisMatch::new(-1, 2, "negative offset", &[]),
            AnalysisMatch::new(3, -1, "negative length", &[]),
            AnalysisMatch::new(0, 0, "empty", &[]),
            AnalysisMatch::new(11, 1, "past the end", &[]),
            AnalysisMatch::new(6, 100, "runs over", &[]),
        ],
    );
    let annotations = session.annotations();
    assert_eq!(annotations.len(), 1);
    assert_eq!(annotations[0].span, TextSpan::new(6, 5));
    assert_eq!(annotations[0].original_text, "world");
    assert_eq!(marked_texts(&tree), vec!["world"]);
}

#[test]
fn analyzer_failure_keeps_previous_annotations() {
    let text = "Ths is fine";
    let mut tree = TreeDocument::from_plain_text(text);
    let mut session = session();
    let now = Instant::now();
    let request = dispatch(&mut session, &mut tree, now);
    session.complete(
        &mut tree,
        AnalysisOutcome {
            result: Ok(AnalysisResponse {
                matches: vec![AnalysisMatch::new(0, 3, "spelling", &["This"])],
            }),
            request,
        },
    );

    let request = dispatch(&mut session, &mut tree, now);
    let completion = session.complete(
        &mut tree,
        AnalysisOutcome {
            result: Err(AnalyzerError::Status {
                status: 503,
                body: "unavailable".to_string(),
            }),
            request,
        },
    );
    assert_eq!(completion, Completion::Failed);
    assert_eq!(session.annotations().len(), 1);
    assert_eq!(marked_texts(&tree), vec!["Ths"]);
}

#[test]
fn overlapping_spans_share_split_pieces() {
    let text = "Hello world";
    let mut tree = TreeDocument::from_plain_text(text);
    let mut session = session();
    session.apply_matches(
        &mut tree,
        text,
        &[
            AnalysisMatch::new(4, 4, "second", &[]),
            AnalysisMatch::new(0, 7, "first", &[]),
        ],
    );
    assert_eq!(session.annotations()[0].message, "first");
    assert_eq!(leaf_texts(&tree), vec!["Hell", "o w", "o", "rld"]);

    let first = &session.annotations()[0];
    let second = &session.annotations()[1];
    assert_eq!(carried_texts(&tree, first), vec!["Hell", "o w"]);
    assert_eq!(carried_texts(&tree, second), vec!["o w", "o"]);

    let shared = second.carrying_leaf_ids[0];
    assert_eq!(session.lookup(shared).map(|found| found.id), Some(first.id));
    assert_eq!(session.correlation().annotations_on(shared), [first.id, second.id]);
    let tail = second.carrying_leaf_ids[1];
    assert_eq!(session.lookup(tail).map(|found| found.id), Some(second.id));
    assert_eq!(tree.plain_text(), text);
}

#[test]
fn stale_suggestion_is_refused_and_reanalyzed() {
    let text = "I saw teh dog";
    let mut tree = TreeDocument::from_plain_text(text);
    let mut session = session();
    session.apply_matches(&mut tree, text, &[AnalysisMatch::new(6, 3, "typo", &["the"])]);
    let id = session.annotations()[0].id;
    tree.insert_char(7, 'x').unwrap();

    let now = Instant::now();
    let result = session.apply_suggestion(&mut tree, id, "the", now);
    assert!(matches!(
        result,
        Err(SuggestError::TextChanged { ref found, .. }) if found == "txe"
    ));
    assert_eq!(tree.plain_text(), "I saw txeh dog");
    assert!(session.scheduler().is_pending());
}

#[test]
fn unknown_annotation_is_reported() {
    let mut tree = TreeDocument::from_plain_text("text");
    let mut session = session();
    let result = session.apply_suggestion(&mut tree, AnnotationId(42), "x", Instant::now());
    assert!(matches!(result, Err(SuggestError::UnknownAnnotation(_))));
}

#[test]
fn response_for_changed_text_is_outdated() {
    let text = "Some words here";
    let mut tree = TreeDocument::from_plain_text(text);
    let mut session = session();
    let now = Instant::now();
    let request = dispatch(&mut session, &mut tree, now);
    tree.insert_char(4, 's').unwrap();
    session.note_edit(&tree, now);

    let completion = session.complete(
        &mut tree,
        AnalysisOutcome {
            result: Ok(AnalysisResponse {
                matches: vec![AnalysisMatch::new(0, 4, "x", &[])],
            }),
            request,
        },
    );
    assert_eq!(completion, Completion::Outdated);
    assert!(session.annotations().is_empty());
    assert!(marked_texts(&tree).is_empty());
    assert!(session.scheduler().is_pending());
}

#[test]
fn equivalent_annotations_keep_their_id() {
    let text = "Ths and tht";
    let mut tree = TreeDocument::from_plain_text(text);
    let mut session = session();
    session.apply_matches(
        &mut tree,
        text,
        &[
            AnalysisMatch::new(0, 3, "spelling", &["This"]),
            AnalysisMatch::new(8, 3, "spelling", &["that"]),
        ],
    );
    let kept = session.annotations()[1].id;
    let previous = session.annotations().to_vec();

    session.apply_matches(&mut tree, text, &[AnalysisMatch::new(8, 3, "reworded", &["that"])]);
    assert_eq!(session.annotations().len(), 1);
    assert_eq!(session.annotations()[0].id, kept);
    assert!(invalidate_if_stale(&previous[0], session.annotations()));
    assert!(!invalidate_if_stale(&previous[1], session.annotations()));
    assert_eq!(marked_texts(&tree), vec!["tht"]);
}

#[test]
fn replacements_are_capped() {
    let text = "colour";
    let mut tree = TreeDocument::from_plain_text(text);
    let mut session = session();
    session.apply_matches(
        &mut tree,
        text,
        &[AnalysisMatch::new(0, 6, "variant", &["color", "collar", "cooler", "clour"])],
    );
    assert_eq!(
        session.annotations()[0].replacements,
        vec!["color", "collar", "cooler"]
    );
}

#[test]
fn spans_skip_block_breaks_and_unsplittable_leaves() {
    let mut tree = TreeDocument::from_plain_text("First\n\nSecond");
    let mut session = session();
    session.apply_matches(
        &mut tree,
        "First\n\nSecond",
        &[AnalysisMatch::new(3, 5, "crosses blocks", &[])],
    );
    assert_eq!(carried_texts(&tree, &session.annotations()[0]), vec!["st", "S"]);

    let mut container = Span::new_text("outer");
    container.style = InlineStyle::Bold;
    container.children = vec![Span::new_text("inner")];
    let document =
        Document::new().with_paragraphs(vec![Paragraph::new_text().with_content(vec![container])]);
    let mut tree = TreeDocument::new(document);
    let report = session.apply_matches(&mut tree, "outerinner", &[AnalysisMatch::new(3, 4, "x", &[])]);
    assert_eq!(report.skipped, 1);
    assert_eq!(carried_texts(&tree, &session.annotations()[0]), vec!["in"]);
    assert_eq!(tree.plain_text(), "outerinner");
}

#[test]
fn emptied_document_drops_annotations() {
    let mut tree = TreeDocument::from_plain_text("ab");
    let mut session = session();
    session.apply_matches(&mut tree, "ab", &[AnalysisMatch::new(0, 2, "x", &[])]);
    tree.remove_char(1).unwrap();
    tree.remove_char(0).unwrap();

    let start = Instant::now();
    session.note_edit(&tree, start);
    assert!(
        session
            .poll(&mut tree, start + Duration::from_millis(800), true)
            .is_none()
    );
    assert!(session.annotations().is_empty());
    assert!(marked_texts(&tree).is_empty());
}

#[test]
fn text_restored_after_an_outdated_response_is_analyzed() {
    let text = "I saw teh dog";
    let mut tree = TreeDocument::from_plain_text(text);
    let mut session = session();
    let now = Instant::now();
    let request = dispatch(&mut session, &mut tree, now);

    tree.insert_char(13, 'x').unwrap();
    session.note_edit(&tree, now);
    let completion = session.complete(
        &mut tree,
        AnalysisOutcome {
            result: Ok(AnalysisResponse {
                matches: vec![AnalysisMatch::new(6, 3, "typo", &["the"])],
            }),
            request,
        },
    );
    assert_eq!(completion, Completion::Outdated);

    tree.remove_char(13).unwrap();
    session.note_edit(&tree, now);
    let retry = session
        .poll(&mut tree, now + Duration::from_secs(5), true)
        .expect("restored text should be analyzed again");
    assert_eq!(retry.text, text);

    let analyzer = FakeAnalyzer::default().with(text, vec![AnalysisMatch::new(6, 3, "typo", &["the"])]);
    let result = analyzer.analyze(&retry);
    let completion = session.complete(&mut tree, AnalysisOutcome { request: retry, result });
    assert!(matches!(completion, Completion::Applied(_)));
    assert_eq!(marked_texts(&tree), vec!["teh"]);
}
