use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::config::SchedulerConfig;
use crate::language::LanguageDetector;

/// Monotonic tag assigned to each analysis request when it is issued.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    /// Waiting for typing to pause. Every text change moves the deadline.
    Debouncing { deadline: Instant },
    /// Settled; waiting for the host to go idle, or for the fallback.
    IdleScheduled { fallback_at: Instant },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub generation: Generation,
    pub text: String,
    pub language: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dispatch {
    Analyze(AnalysisRequest),
    /// The text is empty. Annotations should be cleared without a request.
    Clear { generation: Generation },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Highest generation seen so far; its outcome may be applied.
    Latest,
    /// A newer generation already completed.
    Superseded,
}

/// Debounce, idle wait and generation ordering for analysis requests.
///
/// The scheduler never aborts anything. A request overtaken by a newer one
/// still completes; its verdict is [`Verdict::Superseded`].
#[derive(Debug)]
pub struct AnalysisScheduler {
    debounce: Duration,
    idle_timeout: Duration,
    detector: LanguageDetector,
    state: SchedulerState,
    pending_text: Option<String>,
    last_dispatched: Option<String>,
    forced: bool,
    next_generation: u64,
    highest_seen: u64,
    in_flight: BTreeSet<Generation>,
}

impl AnalysisScheduler {
    pub fn new(config: &SchedulerConfig, detector: LanguageDetector) -> Self {
        Self {
            debounce: config.debounce(),
            idle_timeout: config.idle_timeout(),
            detector,
            state: SchedulerState::Idle,
            pending_text: None,
            last_dispatched: None,
            forced: false,
            next_generation: 1,
            highest_seen: 0,
            in_flight: BTreeSet::new(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_pending(&self) -> bool {
        self.state != SchedulerState::Idle
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn highest_seen(&self) -> Option<Generation> {
        (self.highest_seen > 0).then_some(Generation(self.highest_seen))
    }

    /// Earliest instant at which [`AnalysisScheduler::poll`] can make progress.
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.state {
            SchedulerState::Idle => None,
            SchedulerState::Debouncing { deadline } => Some(deadline),
            SchedulerState::IdleScheduled { fallback_at } => Some(fallback_at),
        }
    }

    /// Record the current text after an edit. Restarts the debounce only
    /// when the text actually changed.
    pub fn note_text(&mut self, text: &str, now: Instant) {
        let latest = self
            .pending_text
            .as_deref()
            .or(self.last_dispatched.as_deref());
        if latest == Some(text) {
            return;
        }
        trace!(chars = text.chars().count(), "text changed, restarting debounce");
        self.pending_text = Some(text.to_string());
        self.state = SchedulerState::Debouncing {
            deadline: now + self.debounce,
        };
    }

    /// Schedule `text` for analysis without waiting for the debounce.
    pub fn request_now(&mut self, text: &str, now: Instant) {
        self.pending_text = Some(text.to_string());
        self.forced = true;
        self.state = SchedulerState::IdleScheduled { fallback_at: now };
    }

    /// Advance timers. `host_idle` reports that no input arrived during the
    /// last polling interval.
    pub fn poll(&mut self, now: Instant, host_idle: bool) -> Option<Dispatch> {
        match self.state {
            SchedulerState::Idle => None,
            SchedulerState::Debouncing { deadline } => {
                if now < deadline {
                    return None;
                }
                self.state = SchedulerState::IdleScheduled {
                    fallback_at: now + self.idle_timeout,
                };
                if host_idle { self.dispatch() } else { None }
            }
            SchedulerState::IdleScheduled { fallback_at } => {
                if host_idle || now >= fallback_at {
                    self.dispatch()
                } else {
                    None
                }
            }
        }
    }

    fn dispatch(&mut self) -> Option<Dispatch> {
        self.state = SchedulerState::Idle;
        let text = self.pending_text.take()?;
        let forced = std::mem::take(&mut self.forced);
        if !forced && self.last_dispatched.as_deref() == Some(text.as_str()) {
            debug!("text unchanged since last request, skipping analysis");
            return None;
        }

        let generation = self.issue();
        self.last_dispatched = Some(text.clone());
        if text.trim().is_empty() {
            // Nothing to analyze; the clear counts as completed immediately.
            self.highest_seen = generation.0;
            debug!(%generation, "empty text, clearing annotations");
            return Some(Dispatch::Clear { generation });
        }

        let language = self.detector.detect(&text);
        self.in_flight.insert(generation);
        debug!(%generation, %language, chars = text.chars().count(), "dispatching analysis");
        Some(Dispatch::Analyze(AnalysisRequest {
            generation,
            text,
            language,
        }))
    }

    fn issue(&mut self) -> Generation {
        let generation = Generation(self.next_generation);
        self.next_generation += 1;
        generation
    }

    /// `text` was sent but its response was never applied. A later request
    /// for the same text must not be skipped as unchanged.
    pub fn forget_dispatched(&mut self, text: &str) {
        if self.last_dispatched.as_deref() == Some(text) {
            self.last_dispatched = None;
        }
    }

    /// Classify a finished request. Failed requests must be reported too so
    /// that an older success arriving later cannot overwrite newer state.
    pub fn complete(&mut self, generation: Generation) -> Verdict {
        self.in_flight.remove(&generation);
        if generation.0 > self.highest_seen {
            self.highest_seen = generation.0;
            Verdict::Latest
        } else {
            debug!(%generation, highest = self.highest_seen, "response superseded");
            Verdict::Superseded
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler() -> AnalysisScheduler {
        AnalysisScheduler::new(&SchedulerConfig::default(), LanguageDetector::default())
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn analyze(dispatch: Option<Dispatch>) -> AnalysisRequest {
        match dispatch {
            Some(Dispatch::Analyze(request)) => request,
            other => panic!("expected an analysis request, got {other:?}"),
        }
    }

    #[test]
    fn keystrokes_restart_the_debounce() {
        let start = Instant::now();
        let mut scheduler = scheduler();
        scheduler.note_text("Hel", start);
        scheduler.note_text("Hello", start + ms(500));
        assert_eq!(scheduler.poll(start + ms(900), true), None);
        assert_eq!(
            scheduler.state(),
            SchedulerState::Debouncing {
                deadline: start + ms(1300)
            }
        );
        let request = analyze(scheduler.poll(start + ms(1300), true));
        assert_eq!(request.text, "Hello");
        assert_eq!(request.generation.get(), 1);
        assert!(!scheduler.is_pending());
    }

    #[test]
    fn unchanged_text_does_not_restart_the_timer() {
        let start = Instant::now();
        let mut scheduler = scheduler();
        scheduler.note_text("Hello", start);
        scheduler.note_text("Hello", start + ms(700));
        assert_eq!(scheduler.next_deadline(), Some(start + ms(800)));
    }

    #[test]
    fn busy_host_waits_for_the_idle_fallback() {
        let start = Instant::now();
        let mut scheduler = scheduler();
        scheduler.note_text("Some text here", start);
        assert_eq!(scheduler.poll(start + ms(800), false), None);
        assert_eq!(scheduler.poll(start + ms(1500), false), None);
        let request = analyze(scheduler.poll(start + ms(1800), false));
        assert_eq!(request.text, "Some text here");
        assert_eq!(scheduler.in_flight_count(), 1);
    }

    #[test]
    fn idle_report_dispatches_before_the_fallback() {
        let start = Instant::now();
        let mut scheduler = scheduler();
        scheduler.note_text("Some text here", start);
        assert_eq!(scheduler.poll(start + ms(800), false), None);
        assert!(scheduler.poll(start + ms(850), true).is_some());
    }

    #[test]
    fn already_analyzed_text_is_not_sent_twice() {
        let start = Instant::now();
        let mut scheduler = scheduler();
        scheduler.note_text("Hello there", start);
        analyze(scheduler.poll(start + ms(800), true));
        scheduler.note_text("Hello there!", start + ms(900));
        scheduler.note_text("Hello there", start + ms(950));
        assert_eq!(scheduler.poll(start + ms(2000), true), None);
    }

    #[test]
    fn request_now_bypasses_the_debounce() {
        let start = Instant::now();
        let mut scheduler = scheduler();
        scheduler.request_now("I saw the dog", start);
        let request = analyze(scheduler.poll(start, false));
        assert_eq!(request.text, "I saw the dog");

        scheduler.request_now("I saw the dog", start + ms(10));
        assert!(scheduler.poll(start + ms(10), false).is_some());
    }

    #[test]
    fn empty_text_clears_instead_of_requesting() {
        let start = Instant::now();
        let mut scheduler = scheduler();
        scheduler.note_text("   ", start);
        let dispatch = scheduler.poll(start + ms(800), true);
        assert!(matches!(dispatch, Some(Dispatch::Clear { .. })));
        assert_eq!(scheduler.in_flight_count(), 0);
    }

    #[test]
    fn older_generation_arriving_late_is_superseded() {
        let start = Instant::now();
        let mut scheduler = scheduler();
        scheduler.request_now("first version", start);
        let first = analyze(scheduler.poll(start, true));
        scheduler.request_now("second version", start);
        let second = analyze(scheduler.poll(start, true));
        assert!(first.generation < second.generation);
        assert_eq!(scheduler.in_flight_count(), 2);

        assert_eq!(scheduler.complete(second.generation), Verdict::Latest);
        assert_eq!(scheduler.complete(first.generation), Verdict::Superseded);
        assert_eq!(scheduler.highest_seen(), Some(second.generation));
        assert_eq!(scheduler.in_flight_count(), 0);
    }

    #[test]
    fn clear_supersedes_requests_still_in_flight() {
        let start = Instant::now();
        let mut scheduler = scheduler();
        scheduler.request_now("some words", start);
        let request = analyze(scheduler.poll(start, true));
        scheduler.request_now("", start);
        assert!(matches!(
            scheduler.poll(start, true),
            Some(Dispatch::Clear { .. })
        ));
        assert_eq!(scheduler.complete(request.generation), Verdict::Superseded);
    }

    #[test]
    fn forgotten_text_is_dispatched_again() {
        let start = Instant::now();
        let mut scheduler = scheduler();
        scheduler.note_text("I saw teh dog", start);
        let first = analyze(scheduler.poll(start + ms(900), true));

        scheduler.note_text("I saw teh dog", start + ms(1000));
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        scheduler.forget_dispatched("something else");
        scheduler.note_text("I saw teh dog", start + ms(1000));
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        scheduler.forget_dispatched("I saw teh dog");
        scheduler.note_text("I saw teh dog", start + ms(1000));
        let second = analyze(scheduler.poll(start + ms(1900), true));
        assert_eq!(second.text, "I saw teh dog");
        assert!(second.generation > first.generation);
    }
}
