//! Drives one training run: the epoch loop, throttled progress reporting,
//! periodic cooperative yields, and the final evaluation on the test split.

use super::sequence_regressor::SequenceRegressor;
use crate::domain::errors::ForecastError;
use crate::domain::ml::model::{EvaluationMetrics, TrainingSession, clamp_epochs};
use crate::domain::ml::windowing::Dataset;
use crate::domain::ports::EpochHook;
use crate::infrastructure::observability::Metrics;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorSettings {
    /// Minimum wall-clock gap between two progress events.
    pub progress_interval: Duration,
    /// Yield to the scheduler after every `yield_every` epochs (0 disables).
    pub yield_every: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            progress_interval: Duration::from_millis(500),
            yield_every: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingProgress {
    pub epoch: usize,
    pub total_epochs: usize,
    pub loss: f64,
    pub elapsed_seconds: f64,
    pub progress_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingSummary {
    pub session_id: Uuid,
    pub epochs: usize,
    pub batch_size: usize,
    pub final_loss: f64,
    pub elapsed_seconds: f64,
    pub evaluation: EvaluationMetrics,
}

/// Events delivered in epoch order on the caller's channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TrainingEvent {
    Progress(TrainingProgress),
    Completed(TrainingSummary),
    Failed { message: String },
}

/// Drops intermediate reports closer than `interval`; never drops the final one.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    interval: Duration,
    last_emit: Option<Instant>,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
        }
    }

    pub fn should_emit(&mut self, now: Instant, is_final: bool) -> bool {
        let due = self
            .last_emit
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval);
        if is_final || due {
            self.last_emit = Some(now);
            true
        } else {
            false
        }
    }
}

struct ProgressReporter<'a> {
    session: &'a TrainingSession,
    throttle: ProgressThrottle,
    yield_every: usize,
    events: &'a UnboundedSender<TrainingEvent>,
    metrics: &'a Metrics,
}

#[async_trait]
impl<'a> EpochHook for ProgressReporter<'a> {
    async fn on_epoch_end(&mut self, epoch: usize, total_epochs: usize, loss: f64) {
        self.metrics.record_epoch(loss);

        let is_final = epoch == total_epochs;
        if self.throttle.should_emit(Instant::now(), is_final) {
            let progress = TrainingProgress {
                epoch,
                total_epochs,
                loss,
                elapsed_seconds: self.session.elapsed_seconds(),
                progress_percent: epoch as f64 / total_epochs as f64 * 100.0,
            };
            let _ = self.events.send(TrainingEvent::Progress(progress));
        }

        if self.yield_every > 0 && epoch % self.yield_every == 0 && !is_final {
            debug!("TrainingOrchestrator: yielding after epoch {}", epoch);
            tokio::task::yield_now().await;
        }
    }
}

/// Clears the in-flight flag on every exit path.
pub struct TrainingGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for TrainingGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

pub struct TrainingOrchestrator {
    settings: OrchestratorSettings,
    in_flight: Arc<AtomicBool>,
    metrics: Metrics,
}

impl TrainingOrchestrator {
    pub fn new(settings: OrchestratorSettings, metrics: Metrics) -> Self {
        Self {
            settings,
            in_flight: Arc::new(AtomicBool::new(false)),
            metrics,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn is_training(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Claim the single training slot, or fail if a run is already in flight.
    pub fn begin(&self) -> Result<TrainingGuard, ForecastError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| {
                self.metrics.inc_training_runs("rejected");
                ForecastError::TrainingInProgress
            })?;
        Ok(TrainingGuard {
            flag: self.in_flight.clone(),
        })
    }

    pub async fn run(
        &self,
        regressor: &mut SequenceRegressor,
        dataset: &Dataset,
        epochs: usize,
        events: &UnboundedSender<TrainingEvent>,
    ) -> Result<TrainingSummary, ForecastError> {
        let _guard = self.begin()?;

        match self.run_session(regressor, dataset, epochs, events).await {
            Ok(summary) => {
                self.metrics.inc_training_runs("completed");
                self.metrics.evaluation_rmse.set(summary.evaluation.rmse);
                info!(
                    "TrainingOrchestrator: session {} completed in {:.2}s (loss={:.6}, rmse={:.6})",
                    summary.session_id,
                    summary.elapsed_seconds,
                    summary.final_loss,
                    summary.evaluation.rmse
                );
                let _ = events.send(TrainingEvent::Completed(summary.clone()));
                Ok(summary)
            }
            Err(e) => {
                self.metrics.inc_training_runs("failed");
                error!("TrainingOrchestrator: training failed: {}", e);
                let _ = events.send(TrainingEvent::Failed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run_session(
        &self,
        regressor: &mut SequenceRegressor,
        dataset: &Dataset,
        epochs: usize,
        events: &UnboundedSender<TrainingEvent>,
    ) -> Result<TrainingSummary, ForecastError> {
        let epochs = clamp_epochs(epochs);
        let session =
            TrainingSession::start(epochs, regressor.effective_batch_size(dataset.train.len()));
        info!(
            "TrainingOrchestrator: session {} starting ({} epochs, batch {}, {} train / {} test windows)",
            session.id,
            session.epochs,
            session.batch_size,
            dataset.train.len(),
            dataset.test.len()
        );

        let mut reporter = ProgressReporter {
            session: &session,
            throttle: ProgressThrottle::new(self.settings.progress_interval),
            yield_every: self.settings.yield_every,
            events,
            metrics: &self.metrics,
        };

        let (final_loss, evaluation) = regressor.train_on(dataset, epochs, &mut reporter).await?;

        Ok(TrainingSummary {
            session_id: session.id,
            epochs: session.epochs,
            batch_size: session.batch_size,
            final_loss,
            elapsed_seconds: session.elapsed_seconds(),
            evaluation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ml::model::{ModelState, ModelTopology};
    use crate::domain::ml::windowing::WindowBuilder;
    use crate::infrastructure::mock::{MockBackendFactory, MockBehavior};
    use tokio::sync::mpsc;

    fn dataset() -> Dataset {
        let series: Vec<f64> = (0..30).map(|i| (i % 7) as f64 / 7.0).collect();
        let windows = WindowBuilder::build_windows(&series, 4, 2).unwrap();
        WindowBuilder::split(windows, 0.8).unwrap()
    }

    fn built(factory: MockBackendFactory) -> SequenceRegressor {
        let mut regressor = SequenceRegressor::new(Arc::new(factory), 256);
        regressor.build(ModelTopology::new(4, 2)).unwrap();
        regressor
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<TrainingEvent>) -> Vec<TrainingEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_throttle_keeps_first_and_final() {
        let mut throttle = ProgressThrottle::new(Duration::from_millis(500));
        let t0 = Instant::now();

        assert!(throttle.should_emit(t0, false));
        assert!(!throttle.should_emit(t0 + Duration::from_millis(100), false));
        assert!(!throttle.should_emit(t0 + Duration::from_millis(499), false));
        assert!(throttle.should_emit(t0 + Duration::from_millis(500), false));
        assert!(throttle.should_emit(t0 + Duration::from_millis(501), true));
    }

    #[tokio::test]
    async fn test_every_epoch_reported_in_order_without_throttle() {
        let orchestrator = TrainingOrchestrator::new(
            OrchestratorSettings {
                progress_interval: Duration::ZERO,
                yield_every: 3,
            },
            Metrics::default(),
        );
        let mut regressor = built(MockBackendFactory::new());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let summary = orchestrator
            .run(&mut regressor, &dataset(), 7, &tx)
            .await
            .unwrap();

        let events = drain(&mut rx);
        let epochs: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                TrainingEvent::Progress(p) => Some(p.epoch),
                _ => None,
            })
            .collect();
        assert_eq!(epochs, vec![1, 2, 3, 4, 5, 6, 7]);
        assert!(matches!(events.last(), Some(TrainingEvent::Completed(_))));
        assert_eq!(summary.epochs, 7);
        assert!(!orchestrator.is_training());
    }

    #[tokio::test]
    async fn test_throttled_run_never_drops_final_epoch() {
        let orchestrator = TrainingOrchestrator::new(
            OrchestratorSettings {
                progress_interval: Duration::from_secs(3600),
                yield_every: 3,
            },
            Metrics::default(),
        );
        let mut regressor = built(MockBackendFactory::new());
        let (tx, mut rx) = mpsc::unbounded_channel();

        orchestrator
            .run(&mut regressor, &dataset(), 10, &tx)
            .await
            .unwrap();

        let progress: Vec<TrainingProgress> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                TrainingEvent::Progress(p) => Some(p),
                _ => None,
            })
            .collect();
        assert_eq!(progress.len(), 2);
        assert_eq!(progress[0].epoch, 1);
        assert_eq!(progress[1].epoch, 10);
        assert_eq!(progress[1].progress_percent, 100.0);
    }

    #[tokio::test]
    async fn test_completion_includes_evaluation() {
        let orchestrator =
            TrainingOrchestrator::new(OrchestratorSettings::default(), Metrics::default());
        let mut regressor = built(MockBackendFactory::new());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let summary = orchestrator
            .run(&mut regressor, &dataset(), 0, &tx)
            .await
            .unwrap();

        assert_eq!(summary.epochs, 1);
        assert_ne!(summary.evaluation, EvaluationMetrics::PLACEHOLDER);
        assert!(
            (summary.evaluation.rmse - summary.evaluation.mse.sqrt()).abs() < 1e-12
        );
        match drain(&mut rx).last() {
            Some(TrainingEvent::Completed(done)) => assert_eq!(done, &summary),
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reentrant_run_is_rejected() {
        let orchestrator =
            TrainingOrchestrator::new(OrchestratorSettings::default(), Metrics::default());
        let mut regressor = built(MockBackendFactory::new());
        let (tx, _rx) = mpsc::unbounded_channel();

        let guard = orchestrator.begin().unwrap();
        assert!(orchestrator.is_training());

        let err = orchestrator
            .run(&mut regressor, &dataset(), 3, &tx)
            .await
            .unwrap_err();
        assert!(matches!(err, ForecastError::TrainingInProgress));

        drop(guard);
        assert!(!orchestrator.is_training());
        assert!(orchestrator.run(&mut regressor, &dataset(), 1, &tx).await.is_ok());
    }

    #[tokio::test]
    async fn test_failure_is_propagated_and_reported() {
        let orchestrator =
            TrainingOrchestrator::new(OrchestratorSettings::default(), Metrics::default());
        let mut regressor = built(MockBackendFactory::with_behavior(MockBehavior {
            fail_on_epoch: Some(1),
            ..Default::default()
        }));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let err = orchestrator
            .run(&mut regressor, &dataset(), 4, &tx)
            .await
            .unwrap_err();

        assert!(matches!(err, ForecastError::Backend(_)));
        assert!(matches!(
            drain(&mut rx).last(),
            Some(TrainingEvent::Failed { .. })
        ));
        assert!(!orchestrator.is_training());
    }

    #[tokio::test]
    async fn test_evaluation_failure_fails_run_without_committing() {
        let orchestrator =
            TrainingOrchestrator::new(OrchestratorSettings::default(), Metrics::default());
        let mut regressor = built(MockBackendFactory::with_behavior(MockBehavior {
            fail_loss: true,
            ..Default::default()
        }));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let err = orchestrator
            .run(&mut regressor, &dataset(), 2, &tx)
            .await
            .unwrap_err();

        assert!(matches!(err, ForecastError::Backend(_)));
        assert_eq!(regressor.state(), ModelState::Built);
        assert!(matches!(
            drain(&mut rx).last(),
            Some(TrainingEvent::Failed { .. })
        ));
    }

    /// Epoch counts seen by a competing task while `epochs` run with `yield_every = 3`.
    async fn epochs_seen_by_competing_task(epochs: usize) -> Vec<usize> {
        let orchestrator = Arc::new(TrainingOrchestrator::new(
            OrchestratorSettings {
                progress_interval: Duration::ZERO,
                yield_every: 3,
            },
            Metrics::default(),
        ));
        let factory = MockBackendFactory::new();
        let mut regressor = built(factory.clone());
        let (tx, _rx) = mpsc::unbounded_channel();

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));
        let observer = {
            let (orchestrator, stats) = (orchestrator.clone(), factory.stats.clone());
            let (seen, stop) = (seen.clone(), stop.clone());
            tokio::spawn(async move {
                while !stop.load(Ordering::SeqCst) {
                    if orchestrator.is_training() {
                        seen.lock().unwrap().push(stats.epochs.load(Ordering::SeqCst));
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        orchestrator
            .run(&mut regressor, &dataset(), epochs, &tx)
            .await
            .unwrap();
        stop.store(true, Ordering::SeqCst);
        observer.await.unwrap();

        let mut seen = seen.lock().unwrap().clone();
        seen.dedup();
        seen
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_yields_every_k_epochs() {
        assert_eq!(epochs_seen_by_competing_task(8).await, vec![3, 6]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_no_yield_after_final_epoch() {
        assert_eq!(epochs_seen_by_competing_task(6).await, vec![3]);
        assert!(epochs_seen_by_competing_task(2).await.is_empty());
    }
}
