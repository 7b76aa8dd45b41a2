//! Metric Producers
//!
//! One task per metric kind samples its source on a fixed interval and
//! publishes the formatted reading. A failed sample publishes the sentinel
//! `"-"` instead; producers never stop on a bad sample.
//!
//! The `observers` producer has no external source. It reads the broker's
//! subscriber count on each tick and, in eager mode, also whenever the
//! count changes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::ProducerSettings;
use crate::application::ports::{MetricSource, SourceError};
use crate::domain::event::Event;
use crate::domain::metric::{FormatError, MetricKind, format_observers};
use crate::infrastructure::broker::{PublishReport, SharedBroker};
use crate::infrastructure::metrics;

// =============================================================================
// Configuration
// =============================================================================

/// Scheduling configuration shared by all producers.
#[derive(Debug, Clone, Copy)]
pub struct ProducerConfig {
    /// Time between samples.
    pub interval: Duration,
    /// Publish the observer count as soon as it changes.
    pub observers_eager: bool,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            observers_eager: false,
        }
    }
}

impl From<&ProducerSettings> for ProducerConfig {
    fn from(settings: &ProducerSettings) -> Self {
        Self {
            interval: settings.interval,
            observers_eager: settings.observers_eager,
        }
    }
}

// =============================================================================
// Producer State Tracking
// =============================================================================

/// Tracks the sampling health of one producer.
#[derive(Debug)]
pub struct ProducerState {
    kind: MetricKind,
    samples_ok: AtomicU64,
    samples_failed: AtomicU64,
    last_ok: AtomicBool,
    last_sample_at: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
}

impl ProducerState {
    /// Create state for a producer that has not sampled yet.
    #[must_use]
    pub const fn new(kind: MetricKind) -> Self {
        Self {
            kind,
            samples_ok: AtomicU64::new(0),
            samples_failed: AtomicU64::new(0),
            last_ok: AtomicBool::new(false),
            last_sample_at: RwLock::new(None),
            last_error: RwLock::new(None),
        }
    }

    /// Record a successful sample.
    pub fn record_success(&self) {
        self.samples_ok.fetch_add(1, Ordering::Relaxed);
        self.last_ok.store(true, Ordering::Relaxed);
        *self.last_sample_at.write() = Some(Utc::now());
        *self.last_error.write() = None;
    }

    /// Record a failed sample.
    pub fn record_failure(&self, error: String) {
        self.samples_failed.fetch_add(1, Ordering::Relaxed);
        self.last_ok.store(false, Ordering::Relaxed);
        *self.last_sample_at.write() = Some(Utc::now());
        *self.last_error.write() = Some(error);
    }

    /// Metric this producer publishes.
    #[must_use]
    pub const fn kind(&self) -> MetricKind {
        self.kind
    }

    /// Whether the most recent sample succeeded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.last_ok.load(Ordering::Relaxed)
    }

    /// Whether at least one sample has been taken.
    #[must_use]
    pub fn has_sampled(&self) -> bool {
        self.last_sample_at.read().is_some()
    }

    /// Point-in-time view for reporting.
    #[must_use]
    pub fn status(&self) -> ProducerStatus {
        ProducerStatus {
            kind: self.kind.as_str(),
            ok: self.is_ok(),
            samples_ok: self.samples_ok.load(Ordering::Relaxed),
            samples_failed: self.samples_failed.load(Ordering::Relaxed),
            last_sample_at: *self.last_sample_at.read(),
            last_error: self.last_error.read().clone(),
        }
    }
}

/// Serializable producer status.
#[derive(Debug, Clone, Serialize)]
pub struct ProducerStatus {
    /// Metric kind.
    pub kind: &'static str,
    /// Whether the last sample succeeded.
    pub ok: bool,
    /// Successful samples.
    pub samples_ok: u64,
    /// Failed samples.
    pub samples_failed: u64,
    /// Time of the last sample.
    pub last_sample_at: Option<DateTime<Utc>>,
    /// Error from the last sample, if it failed.
    pub last_error: Option<String>,
}

// =============================================================================
// Producer
// =============================================================================

/// Why a sample could not be turned into a reading.
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    /// The source could not be read.
    #[error(transparent)]
    Source(#[from] SourceError),
    /// The source output could not be parsed.
    #[error("unparsable output: {0}")]
    Format(#[from] FormatError),
}

enum Reading {
    Source(Arc<dyn MetricSource>),
    SubscriberCount,
}

/// Periodic sampler for a single metric.
pub struct MetricProducer {
    kind: MetricKind,
    reading: Reading,
    broker: SharedBroker,
    state: Arc<ProducerState>,
    config: ProducerConfig,
    cancel: CancellationToken,
}

impl MetricProducer {
    /// Create a producer that reads `kind` from an external source.
    #[must_use]
    pub fn sampled(
        kind: MetricKind,
        source: Arc<dyn MetricSource>,
        broker: SharedBroker,
        config: ProducerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            kind,
            reading: Reading::Source(source),
            broker,
            state: Arc::new(ProducerState::new(kind)),
            config,
            cancel,
        }
    }

    /// Create the producer for the viewer count.
    #[must_use]
    pub fn observers(
        broker: SharedBroker,
        config: ProducerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            kind: MetricKind::Observers,
            reading: Reading::SubscriberCount,
            broker,
            state: Arc::new(ProducerState::new(MetricKind::Observers)),
            config,
            cancel,
        }
    }

    /// Sampling state, for health reporting.
    #[must_use]
    pub fn state(&self) -> Arc<ProducerState> {
        Arc::clone(&self.state)
    }

    /// Read and format one sample.
    ///
    /// # Errors
    ///
    /// Returns `SampleError` if the source fails or its output is malformed.
    pub async fn sample(&self) -> Result<String, SampleError> {
        match &self.reading {
            Reading::Source(source) => {
                let raw = source.read(self.kind).await?;
                Ok(self.kind.format(&raw)?)
            }
            Reading::SubscriberCount => Ok(format_observers(self.broker.subscriber_count())),
        }
    }

    /// Take one sample and publish it (or the sentinel on failure).
    pub async fn tick(&self) -> PublishReport {
        let started = Instant::now();
        let event = match self.sample().await {
            Ok(payload) => {
                self.state.record_success();
                Event::new(self.kind, payload)
            }
            Err(e) => {
                tracing::warn!(kind = %self.kind, error = %e, "Metric sample failed");
                self.state.record_failure(e.to_string());
                metrics::record_source_failure(self.kind);
                Event::sentinel(self.kind)
            }
        };
        metrics::record_sample_duration(self.kind, started.elapsed());

        self.broker.publish(event)
    }

    /// Run the sampling loop until cancelled.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let eager =
            self.config.observers_eager && matches!(self.reading, Reading::SubscriberCount);
        let mut count_rx = self.broker.watch_subscriber_count();

        tracing::debug!(kind = %self.kind, interval_ms = self.config.interval.as_millis(), eager, "Producer started");

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
                changed = count_rx.changed(), if eager => {
                    if changed.is_err() {
                        break;
                    }
                    self.tick().await;
                }
            }
        }

        tracing::debug!(kind = %self.kind, "Producer stopped");
    }
}

// =============================================================================
// Producer Set
// =============================================================================

/// The fixed set of producers started at boot.
pub struct ProducerSet {
    states: Vec<Arc<ProducerState>>,
    handles: Vec<JoinHandle<()>>,
}

impl ProducerSet {
    /// Spawn one producer per sampled metric plus the observer producer.
    #[must_use]
    pub fn spawn(
        source: &Arc<dyn MetricSource>,
        broker: &SharedBroker,
        config: ProducerConfig,
        cancel: &CancellationToken,
    ) -> Self {
        let producers = MetricKind::SAMPLED
            .into_iter()
            .map(|kind| {
                MetricProducer::sampled(
                    kind,
                    Arc::clone(source),
                    Arc::clone(broker),
                    config,
                    cancel.clone(),
                )
            })
            .chain(std::iter::once(MetricProducer::observers(
                Arc::clone(broker),
                config,
                cancel.clone(),
            )));

        let mut states = Vec::with_capacity(MetricKind::ALL.len());
        let mut handles = Vec::with_capacity(MetricKind::ALL.len());
        for producer in producers {
            states.push(producer.state());
            handles.push(tokio::spawn(producer.run()));
        }

        tracing::info!(producers = handles.len(), "Metric producers started");
        Self { states, handles }
    }

    /// Sampling state of every producer.
    #[must_use]
    pub fn states(&self) -> Vec<Arc<ProducerState>> {
        self.states.clone()
    }

    /// Wait for every producer to stop (after cancellation).
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Producer task failed");
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;

    use super::*;
    use crate::application::ports::MockMetricSource;
    use crate::infrastructure::broker::EventBroker;

    fn broker() -> SharedBroker {
        Arc::new(EventBroker::with_defaults())
    }

    fn source_returning(kind: MetricKind, raw: &'static str) -> Arc<dyn MetricSource> {
        let mut source = MockMetricSource::new();
        source
            .expect_read()
            .with(eq(kind))
            .returning(move |_| Ok(raw.to_string()));
        Arc::new(source)
    }

    fn failing_source() -> Arc<dyn MetricSource> {
        let mut source = MockMetricSource::new();
        source.expect_read().returning(|_| {
            Err(SourceError::Exit {
                program: "vcgencmd".to_string(),
                status: "exit status: 255".to_string(),
                stderr: "VCHI initialization failed".to_string(),
            })
        });
        Arc::new(source)
    }

    fn producer(kind: MetricKind, source: Arc<dyn MetricSource>, broker: &SharedBroker) -> MetricProducer {
        MetricProducer::sampled(
            kind,
            source,
            Arc::clone(broker),
            ProducerConfig::default(),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn tick_publishes_formatted_reading() {
        let broker = broker();
        let mut handle = broker.subscribe();
        let producer = producer(
            MetricKind::Temp,
            source_returning(MetricKind::Temp, "temp=42.8'C\n"),
            &broker,
        );

        let report = producer.tick().await;
        assert_eq!(report.delivered, 1);

        let event = handle.try_recv().unwrap();
        assert_eq!(event.kind(), MetricKind::Temp);
        assert_eq!(event.payload(), "42.8 °C");

        let status = producer.state().status();
        assert!(status.ok);
        assert_eq!(status.samples_ok, 1);
        assert!(status.last_error.is_none());
    }

    #[tokio::test]
    async fn source_failure_publishes_sentinel() {
        let broker = broker();
        let mut handle = broker.subscribe();
        let producer = producer(MetricKind::Volt, failing_source(), &broker);

        producer.tick().await;

        let event = handle.try_recv().unwrap();
        assert_eq!(event.kind(), MetricKind::Volt);
        assert!(event.is_sentinel());

        let status = producer.state().status();
        assert!(!status.ok);
        assert_eq!(status.samples_failed, 1);
        assert!(status.last_error.unwrap().contains("VCHI"));
    }

    #[tokio::test]
    async fn malformed_output_publishes_sentinel() {
        let broker = broker();
        let mut handle = broker.subscribe();
        let producer = producer(
            MetricKind::Clock,
            source_returning(MetricKind::Clock, "error=\n"),
            &broker,
        );

        let err = producer.sample().await.unwrap_err();
        assert!(matches!(err, SampleError::Format(FormatError::InvalidNumber { .. })));

        producer.tick().await;
        assert!(handle.try_recv().unwrap().is_sentinel());
    }

    #[tokio::test]
    async fn failure_then_recovery_clears_error() {
        let broker = broker();
        let mut source = MockMetricSource::new();
        let mut seq = mockall::Sequence::new();
        source
            .expect_read()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("garbage".to_string()));
        source
            .expect_read()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("frequency(45)=1500000000\n".to_string()));
        let producer = producer(MetricKind::Clock, Arc::new(source), &broker);
        let mut handle = broker.subscribe();

        producer.tick().await;
        producer.tick().await;

        assert!(handle.try_recv().unwrap().is_sentinel());
        assert_eq!(handle.try_recv().unwrap().payload(), "1.50 GHz");
        let state = producer.state();
        assert!(state.is_ok());
        assert_eq!(state.status().samples_failed, 1);
        assert!(state.status().last_error.is_none());
    }

    #[tokio::test]
    async fn observers_reads_subscriber_count() {
        let broker = broker();
        let producer = MetricProducer::observers(
            Arc::clone(&broker),
            ProducerConfig::default(),
            CancellationToken::new(),
        );

        assert_eq!(producer.sample().await.unwrap(), "0 people here");

        let mut handle = broker.subscribe();
        producer.tick().await;
        assert_eq!(handle.try_recv().unwrap().payload(), "1 person here");

        let _other = broker.subscribe();
        assert_eq!(producer.sample().await.unwrap(), "2 people here");
    }

    #[tokio::test(start_paused = true)]
    async fn run_keeps_sampling_after_failures() {
        let broker = broker();
        let mut handle = broker.subscribe();
        let cancel = CancellationToken::new();
        let producer = MetricProducer::sampled(
            MetricKind::Mem,
            failing_source(),
            Arc::clone(&broker),
            ProducerConfig::default(),
            cancel.clone(),
        );
        let state = producer.state();
        let task = tokio::spawn(producer.run());

        for _ in 0..3 {
            assert!(handle.recv().await.unwrap().is_sentinel());
        }
        assert!(state.status().samples_failed >= 3);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn eager_observers_publish_on_count_change() {
        let broker = broker();
        let mut handle = broker.subscribe();
        let cancel = CancellationToken::new();
        let config = ProducerConfig {
            interval: Duration::from_secs(3600),
            observers_eager: true,
        };
        let task = tokio::spawn(
            MetricProducer::observers(Arc::clone(&broker), config, cancel.clone()).run(),
        );

        // first tick fires immediately
        let first = tokio::time::timeout(Duration::from_secs(1), handle.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.payload(), "1 person here");

        let _second = broker.subscribe();
        let update = tokio::time::timeout(Duration::from_secs(1), handle.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(update.payload(), "2 people here");

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn producer_set_spawns_every_metric() {
        let broker = broker();
        let mut handle = broker.subscribe();
        let cancel = CancellationToken::new();
        let source = failing_source();

        let set = ProducerSet::spawn(&source, &broker, ProducerConfig::default(), &cancel);
        let kinds: Vec<_> = set.states().iter().map(|s| s.kind()).collect();
        assert_eq!(kinds, MetricKind::ALL);

        let mut seen = std::collections::HashSet::new();
        while seen.len() < MetricKind::ALL.len() {
            let event = tokio::time::timeout(Duration::from_secs(2), handle.recv())
                .await
                .unwrap()
                .unwrap();
            seen.insert(event.kind());
        }

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), set.join())
            .await
            .unwrap();
    }
}
