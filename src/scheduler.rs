//! Periodic sweep scheduler.
//!
//! Runs the reconciliation sweep on a fixed interval, gated on a
//! connectivity probe: when the network is unreachable the tick is skipped
//! and delivery waits for the next one rather than failing loudly.

use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::pipeline::IngestionPipeline;

/// How long a connectivity probe may take before it counts as offline.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

// ── Connectivity ────────────────────────────────────────────────────

/// Pre-sweep network reachability check.
#[async_trait]
pub trait Connectivity: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// Never skips a sweep. Used when no probe address is configured.
pub struct AlwaysOnline;

#[async_trait]
impl Connectivity for AlwaysOnline {
    async fn is_online(&self) -> bool {
        true
    }
}

/// Probes a `host:port` with a plain TCP connect.
pub struct TcpProbe {
    addr: String,
}

impl TcpProbe {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl Connectivity for TcpProbe {
    async fn is_online(&self) -> bool {
        let addr = self.addr.clone();
        let reachable = tokio::task::spawn_blocking(move || {
            let Ok(mut addrs) = addr.to_socket_addrs() else {
                return false;
            };
            addrs.any(|a| TcpStream::connect_timeout(&a, PROBE_TIMEOUT).is_ok())
        })
        .await
        .unwrap_or(false);

        if !reachable {
            debug!(addr = %self.addr, "Connectivity probe failed");
        }
        reachable
    }
}

// ── Scheduler ───────────────────────────────────────────────────────

/// Handle to the background sweep loop.
pub struct SweepScheduler {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SweepScheduler {
    /// Spawn the sweep loop. The first sweep runs after one full interval.
    pub fn spawn(
        pipeline: Arc<IngestionPipeline>,
        interval: Duration,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // Consume the immediate first tick; sweeps start one interval in.
            ticker.tick().await;

            info!(interval_secs = interval.as_secs(), "Sweep scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if !connectivity.is_online().await {
                            info!("Network unreachable, skipping sweep");
                            continue;
                        }
                        if let Err(e) = pipeline.run_sweep().await {
                            warn!(error = %e, "Sweep failed");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("Sweep scheduler stopping");
                            break;
                        }
                    }
                }
            }
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Request shutdown and wait for the loop to exit.
    ///
    /// A sweep already in flight finishes naturally before the loop observes
    /// the signal.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;

    use crate::channels::api::{ApiChannel, ApiResponse};
    use crate::channels::email::EmailChannel;
    use crate::config::EmailConfig;
    use crate::error::{ChannelError, PipelineError};
    use crate::events::MessageEvents;
    use crate::pipeline::{ForwardProcessor, MessageSource, NewSms, SmsMessage};
    use crate::store::LibSqlBackend;

    struct OkEmail;

    #[async_trait]
    impl EmailChannel for OkEmail {
        async fn send(
            &self,
            _to: &[String],
            _subject: &str,
            _body: &str,
            _config: &EmailConfig,
        ) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    struct OffApi;

    #[async_trait]
    impl ApiChannel for OffApi {
        async fn send(
            &self,
            _endpoint: &str,
            _message: &SmsMessage,
            _sender_name: Option<&str>,
            _auth_token: Option<&str>,
        ) -> Result<ApiResponse, ChannelError> {
            Err(ChannelError::NotConfigured {
                name: "api".into(),
                reason: "disabled in tests".into(),
            })
        }
    }

    /// Counts how many times the sweep fetched from it.
    struct CountingSource {
        fetches: AtomicUsize,
        messages: Mutex<Vec<NewSms>>,
    }

    impl CountingSource {
        fn new(messages: Vec<NewSms>) -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                messages: Mutex::new(messages),
            }
        }
    }

    #[async_trait]
    impl MessageSource for CountingSource {
        async fn fetch_all(&self) -> Result<Vec<NewSms>, PipelineError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.messages.lock().unwrap().clone())
        }
    }

    struct NeverOnline;

    #[async_trait]
    impl Connectivity for NeverOnline {
        async fn is_online(&self) -> bool {
            false
        }
    }

    async fn test_pipeline(
        source: Arc<CountingSource>,
    ) -> Arc<IngestionPipeline> {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let processor = Arc::new(ForwardProcessor::new(
            db.clone(),
            Arc::new(OkEmail),
            Arc::new(OffApi),
        ));
        Arc::new(IngestionPipeline::new(
            db,
            processor,
            source,
            MessageEvents::new(),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_runs_sweeps_on_interval() {
        let source = Arc::new(CountingSource::new(vec![NewSms {
            id: "sms-1".into(),
            sender: "FRIEND".into(),
            body: "hi".into(),
            timestamp: Utc::now().timestamp_millis(),
            is_read: false,
            kind: 1,
        }]));
        let pipeline = test_pipeline(source.clone()).await;

        let scheduler = SweepScheduler::spawn(
            pipeline,
            Duration::from_secs(60),
            Arc::new(AlwaysOnline),
        );

        // Two intervals elapse under the paused clock.
        tokio::time::sleep(Duration::from_secs(130)).await;
        scheduler.shutdown().await;

        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn offline_ticks_skip_the_sweep() {
        let source = Arc::new(CountingSource::new(vec![]));
        let pipeline = test_pipeline(source.clone()).await;

        let scheduler = SweepScheduler::spawn(
            pipeline,
            Duration::from_secs(60),
            Arc::new(NeverOnline),
        );

        tokio::time::sleep(Duration::from_secs(130)).await;
        scheduler.shutdown().await;

        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_before_first_tick_runs_no_sweep() {
        let source = Arc::new(CountingSource::new(vec![]));
        let pipeline = test_pipeline(source.clone()).await;

        let scheduler = SweepScheduler::spawn(
            pipeline,
            Duration::from_secs(3600),
            Arc::new(AlwaysOnline),
        );
        scheduler.shutdown().await;

        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn tcp_probe_reports_unreachable_address_offline() {
        // Reserved TEST-NET-1 address, nothing listens there.
        let probe = TcpProbe::new("192.0.2.1:9");
        assert!(!probe.is_online().await);
    }

    #[tokio::test]
    async fn always_online_is_online() {
        assert!(AlwaysOnline.is_online().await);
    }
}
