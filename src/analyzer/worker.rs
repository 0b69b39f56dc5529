use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;

use tracing::{debug, warn};

use super::{AnalysisOutcome, Analyzer, AnalyzerError};
use crate::scheduler::AnalysisRequest;

/// Runs analyzer calls off the main thread and hands outcomes back over a
/// channel. Each request gets its own short-lived thread so a slow response
/// never delays a newer one.
pub struct AnalysisWorker {
    analyzer: Arc<dyn Analyzer>,
    sender: Sender<AnalysisOutcome>,
    receiver: Receiver<AnalysisOutcome>,
}

impl AnalysisWorker {
    pub fn new(analyzer: Arc<dyn Analyzer>) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            analyzer,
            sender,
            receiver,
        }
    }

    /// Start `request`. If no thread can be spawned the failure is reported
    /// as an outcome so the scheduler still sees the generation complete.
    pub fn submit(&self, request: AnalysisRequest) {
        let analyzer = Arc::clone(&self.analyzer);
        let sender = self.sender.clone();
        let generation = request.generation;
        let spawned = thread::Builder::new()
            .name(format!("proofmark-analyze-{}", generation.get()))
            .spawn({
                let request = request.clone();
                move || {
                    let result = analyzer.analyze(&request);
                    if sender.send(AnalysisOutcome { request, result }).is_err() {
                        debug!(%generation, "session gone, dropping analysis outcome");
                    }
                }
            });
        if let Err(err) = spawned {
            warn!(%generation, %err, "failed to spawn analysis thread");
            let _ = self.sender.send(AnalysisOutcome {
                request,
                result: Err(AnalyzerError::Spawn(err)),
            });
        }
    }

    pub fn try_recv(&self) -> Option<AnalysisOutcome> {
        match self.receiver.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Every outcome that has arrived so far, in arrival order.
    pub fn drain(&self) -> Vec<AnalysisOutcome> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{AnalysisMatch, AnalysisResponse};
    use crate::config::SchedulerConfig;
    use crate::language::LanguageDetector;
    use crate::scheduler::{AnalysisScheduler, Dispatch};
    use std::time::{Duration, Instant};

    struct Echo;

    impl Analyzer for Echo {
        fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse, AnalyzerError> {
            if request.text.contains("fail") {
                return Err(AnalyzerError::Service("boom".to_string()));
            }
            Ok(AnalysisResponse {
                matches: vec![AnalysisMatch::new(0, 1, &request.language, &[])],
            })
        }
    }

    fn request(text: &str) -> AnalysisRequest {
        let mut scheduler =
            AnalysisScheduler::new(&SchedulerConfig::default(), LanguageDetector::default());
        let now = Instant::now();
        scheduler.request_now(text, now);
        match scheduler.poll(now, true) {
            Some(Dispatch::Analyze(request)) => request,
            other => panic!("unexpected dispatch {other:?}"),
        }
    }

    fn wait_for(worker: &AnalysisWorker) -> AnalysisOutcome {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(outcome) = worker.try_recv() {
                return outcome;
            }
            assert!(Instant::now() < deadline, "worker produced no outcome");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn outcomes_come_back_with_their_request() {
        let worker = AnalysisWorker::new(Arc::new(Echo));
        worker.submit(request("hi you"));
        let outcome = wait_for(&worker);
        assert_eq!(outcome.request.text, "hi you");
        let response = outcome.result.unwrap();
        assert_eq!(response.matches[0].message, "en-US");
    }

    #[test]
    fn failures_are_delivered_as_outcomes() {
        let worker = AnalysisWorker::new(Arc::new(Echo));
        worker.submit(request("this will fail"));
        let outcome = wait_for(&worker);
        assert!(matches!(outcome.result, Err(AnalyzerError::Service(_))));
        assert!(worker.drain().is_empty());
    }
}
