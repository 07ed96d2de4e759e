//! Ingestion pipeline — the two entry points into the processor.
//!
//! Real-time path: a capture event arrives, the message is persisted as
//! unforwarded, processed once, and observers are notified. Sweep path: the
//! local mirror is reconciled against the platform source of record, then
//! every message still unforwarded is replayed through the same processor.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::events::MessageEvents;
use crate::pipeline::processor::ForwardProcessor;
use crate::pipeline::types::{ForwardResult, SmsMessage};
use crate::store::Database;

// ── External message source ─────────────────────────────────────────

/// A raw captured message, before it enters the local mirror.
///
/// `id` is the platform's stable message identifier; when a capture event
/// arrives without one, a random id is assigned (such a message can still
/// be forwarded, it just cannot be reconciled against the source of record).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSms {
    #[serde(default)]
    pub id: String,
    pub sender: String,
    pub body: String,
    /// Epoch milliseconds, as delivered by the platform.
    pub timestamp: i64,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default = "default_kind")]
    pub kind: i64,
}

fn default_kind() -> i64 {
    1
}

impl NewSms {
    fn into_message(self) -> SmsMessage {
        let id = if self.id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            self.id
        };
        let received_at = DateTime::<Utc>::from_timestamp_millis(self.timestamp)
            .unwrap_or_else(Utc::now);
        let mut message = SmsMessage::new(id, self.sender, self.body, received_at);
        message.is_read = self.is_read;
        message.kind = self.kind;
        message
    }
}

/// The platform source of record, consumed only by the sweep's
/// reconciliation step.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// All messages currently known to the platform.
    async fn fetch_all(&self) -> std::result::Result<Vec<NewSms>, PipelineError>;
}

// ── Sweep report ────────────────────────────────────────────────────

/// Summary of one reconciliation sweep.
///
/// The sweep as a whole succeeds even when individual messages fail —
/// failures are observable here and in the logs, never escalated.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Messages newly mirrored from the source of record.
    pub discovered: usize,
    /// Unforwarded messages replayed through the processor.
    pub processed: usize,
    /// Replays that delivered on at least one channel.
    pub forwarded: usize,
    /// Replays that delivered on no channel.
    pub failed: usize,
}

// ── Pipeline ────────────────────────────────────────────────────────

/// Owns the two ingestion entry points and the change notifier.
pub struct IngestionPipeline {
    store: Arc<dyn Database>,
    processor: Arc<ForwardProcessor>,
    source: Arc<dyn MessageSource>,
    events: MessageEvents,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn Database>,
        processor: Arc<ForwardProcessor>,
        source: Arc<dyn MessageSource>,
        events: MessageEvents,
    ) -> Self {
        Self {
            store,
            processor,
            source,
            events,
        }
    }

    pub fn events(&self) -> &MessageEvents {
        &self.events
    }

    /// Real-time path: persist a freshly captured message and process it.
    ///
    /// The "messages changed" notification is fire-and-forget; it can never
    /// fail the pipeline.
    pub async fn handle_incoming(&self, incoming: NewSms) -> Result<ForwardResult> {
        let message = incoming.into_message();
        debug!(message_id = %message.id, sender = %message.sender, "New message captured");

        let inserted = self.store.insert_message_if_absent(&message).await?;
        let message = if inserted {
            message
        } else {
            // Already mirrored, e.g. by a concurrent sweep. The stored row
            // carries the authoritative forward state (including any recorded
            // API delivery), so process that instead of the fresh capture.
            debug!(message_id = %message.id, "Message already mirrored, using stored row");
            self.store
                .get_message(&message.id)
                .await?
                .unwrap_or(message)
        };
        let result = self.processor.process(&message).await;

        self.events.notify();
        Ok(result)
    }

    /// Sweep path: reconcile the mirror, then replay unforwarded messages.
    ///
    /// Messages are processed sequentially; one message's failure does not
    /// abort the sweep.
    pub async fn run_sweep(&self) -> Result<SweepReport> {
        info!("Reconciliation sweep started");
        let mut report = SweepReport::default();

        let known = self
            .source
            .fetch_all()
            .await
            .map_err(crate::error::Error::Pipeline)?;

        for incoming in known {
            let message = incoming.into_message();
            match self.store.insert_message_if_absent(&message).await {
                Ok(true) => report.discovered += 1,
                Ok(false) => {}
                Err(e) => {
                    // Keep reconciling the rest of the mirror.
                    warn!(message_id = %message.id, error = %e, "Failed to mirror message");
                }
            }
        }

        let unforwarded = self.store.list_unforwarded().await?;
        info!(
            discovered = report.discovered,
            unforwarded = unforwarded.len(),
            "Mirror reconciled"
        );

        for message in &unforwarded {
            let result = self.processor.process(message).await;
            report.processed += 1;
            if result.success {
                report.forwarded += 1;
            } else {
                report.failed += 1;
            }
            debug!(message_id = %message.id, detail = %result.detail, "Sweep processed message");
        }

        if report.discovered > 0 || report.forwarded > 0 {
            self.events.notify();
        }

        info!(
            discovered = report.discovered,
            processed = report.processed,
            forwarded = report.forwarded,
            failed = report.failed,
            "Reconciliation sweep finished"
        );
        Ok(report)
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use crate::channels::api::{ApiChannel, ApiResponse};
    use crate::channels::email::EmailChannel;
    use crate::config::EmailConfig;
    use crate::error::ChannelError;
    use crate::pipeline::rules::FilterRule;
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
        ) -> std::result::Result<(), ChannelError> {
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
        ) -> std::result::Result<ApiResponse, ChannelError> {
            Err(ChannelError::NotConfigured {
                name: "api".into(),
                reason: "disabled in tests".into(),
            })
        }
    }

    /// API mock that succeeds and counts its calls.
    struct CountingApi {
        calls: Mutex<usize>,
    }

    impl CountingApi {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(0),
            })
        }

        fn call_count(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl ApiChannel for CountingApi {
        async fn send(
            &self,
            _endpoint: &str,
            _message: &SmsMessage,
            _sender_name: Option<&str>,
            _auth_token: Option<&str>,
        ) -> std::result::Result<ApiResponse, ChannelError> {
            *self.calls.lock().unwrap() += 1;
            Ok(ApiResponse {
                success: true,
                message: "ok".into(),
                data: None,
            })
        }
    }

    /// Source of record mock with a fixed message set.
    struct FixedSource {
        messages: Mutex<Vec<NewSms>>,
    }

    impl FixedSource {
        fn new(messages: Vec<NewSms>) -> Self {
            Self {
                messages: Mutex::new(messages),
            }
        }
    }

    #[async_trait]
    impl MessageSource for FixedSource {
        async fn fetch_all(&self) -> std::result::Result<Vec<NewSms>, PipelineError> {
            Ok(self.messages.lock().unwrap().clone())
        }
    }

    fn new_sms(id: &str, sender: &str, body: &str) -> NewSms {
        NewSms {
            id: id.into(),
            sender: sender.into(),
            body: body.into(),
            timestamp: Utc::now().timestamp_millis(),
            is_read: false,
            kind: 1,
        }
    }

    async fn pipeline_with_source(
        source: Arc<dyn MessageSource>,
    ) -> (Arc<LibSqlBackend>, IngestionPipeline) {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let processor = Arc::new(ForwardProcessor::new(
            db.clone(),
            Arc::new(OkEmail),
            Arc::new(OffApi),
        ));
        let pipeline =
            IngestionPipeline::new(db.clone(), processor, source, MessageEvents::new());
        (db, pipeline)
    }

    async fn seed_bank_rule(db: &LibSqlBackend) {
        let mut rule = FilterRule::new("bank", vec!["a@x.com".into()]);
        rule.sender_contains = Some("BANK".into());
        db.insert_rule(&rule).await.unwrap();
        db.save_email_config(&EmailConfig {
            smtp_server: "smtp.example.com".into(),
            smtp_port: 465,
            username: "u".into(),
            password: "p".into(),
            from_address: "gw@example.com".into(),
            use_ssl: true,
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn realtime_path_persists_processes_and_notifies() {
        let source = Arc::new(FixedSource::new(vec![]));
        let (db, pipeline) = pipeline_with_source(source).await;
        seed_bank_rule(&db).await;

        let mut sub = pipeline.events().subscribe();

        let result = pipeline
            .handle_incoming(new_sms("sms-1", "BANK-ALERT", "OTP 1234"))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.destinations, vec!["a@x.com"]);

        let stored = db.get_message("sms-1").await.unwrap().unwrap();
        assert!(stored.forwarded);
        assert_eq!(stored.forwarded_to, vec!["a@x.com"]);
        assert!(stored.forwarded_at.is_some());

        assert!(sub.changed().await);
    }

    #[tokio::test]
    async fn realtime_failure_keeps_message_unforwarded() {
        let source = Arc::new(FixedSource::new(vec![]));
        let (db, pipeline) = pipeline_with_source(source).await;
        // No rules, no configs: both branches fail.

        let result = pipeline
            .handle_incoming(new_sms("sms-1", "BANK", "hi"))
            .await
            .unwrap();
        assert!(!result.success);

        let stored = db.get_message("sms-1").await.unwrap().unwrap();
        assert!(!stored.forwarded);
    }

    #[tokio::test]
    async fn sweep_discovers_and_forwards_unmirrored_messages() {
        let source = Arc::new(FixedSource::new(vec![
            new_sms("sms-1", "BANK", "OTP 1111"),
            new_sms("sms-2", "FRIEND", "lunch?"),
        ]));
        let (db, pipeline) = pipeline_with_source(source).await;
        seed_bank_rule(&db).await;

        let report = pipeline.run_sweep().await.unwrap();
        assert_eq!(report.discovered, 2);
        assert_eq!(report.processed, 2);
        assert_eq!(report.forwarded, 1); // only the BANK message matched
        assert_eq!(report.failed, 1);

        assert!(db.get_message("sms-1").await.unwrap().unwrap().forwarded);
        assert!(!db.get_message("sms-2").await.unwrap().unwrap().forwarded);
    }

    #[tokio::test]
    async fn sweep_reconciliation_is_idempotent() {
        let source = Arc::new(FixedSource::new(vec![new_sms("sms-1", "FRIEND", "hey")]));
        let (db, pipeline) = pipeline_with_source(source).await;

        let first = pipeline.run_sweep().await.unwrap();
        assert_eq!(first.discovered, 1);

        let second = pipeline.run_sweep().await.unwrap();
        assert_eq!(second.discovered, 0);

        // Exactly one stored row per external id.
        assert_eq!(db.list_messages(100).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sweep_skips_already_forwarded_messages() {
        let source = Arc::new(FixedSource::new(vec![new_sms("sms-1", "BANK", "OTP")]));
        let (db, pipeline) = pipeline_with_source(source).await;
        seed_bank_rule(&db).await;

        let first = pipeline.run_sweep().await.unwrap();
        assert_eq!(first.forwarded, 1);

        // Forwarded on the first pass, nothing left to replay.
        let second = pipeline.run_sweep().await.unwrap();
        assert_eq!(second.processed, 0);
    }

    #[tokio::test]
    async fn sweep_continues_past_individual_failures() {
        // sms-1 has no matching rule (fails); sms-2 matches and forwards.
        let source = Arc::new(FixedSource::new(vec![
            new_sms("sms-1", "NOBODY", "noise"),
            new_sms("sms-2", "BANK", "OTP"),
        ]));
        let (db, pipeline) = pipeline_with_source(source).await;
        seed_bank_rule(&db).await;

        let report = pipeline.run_sweep().await.unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(report.forwarded, 1);
        assert_eq!(report.failed, 1);
        assert!(db.get_message("sms-2").await.unwrap().unwrap().forwarded);
    }

    #[tokio::test]
    async fn realtime_insert_is_noop_when_sweep_already_mirrored() {
        let source = Arc::new(FixedSource::new(vec![new_sms("sms-1", "FRIEND", "original")]));
        let (db, pipeline) = pipeline_with_source(source).await;

        pipeline.run_sweep().await.unwrap();

        // Same id races in through the real-time path with a different body.
        let mut dup = new_sms("sms-1", "FRIEND", "changed");
        dup.is_read = true;
        pipeline.handle_incoming(dup).await.unwrap();

        let stored = db.get_message("sms-1").await.unwrap().unwrap();
        assert_eq!(stored.body, "original");
    }

    #[tokio::test]
    async fn duplicate_capture_does_not_repeat_api_delivery() {
        use crate::config::ApiConfig;

        let source = Arc::new(FixedSource::new(vec![]));
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        db.save_api_config(&ApiConfig {
            enabled: true,
            api_url: "https://sink.example.com/sms".into(),
            auth_token: String::new(),
            custom_sender_name: String::new(),
        })
        .await
        .unwrap();

        let api = CountingApi::new();
        let processor = Arc::new(ForwardProcessor::new(
            db.clone(),
            Arc::new(OkEmail),
            api.clone(),
        ));
        let pipeline =
            IngestionPipeline::new(db.clone(), processor, source, MessageEvents::new());

        let result = pipeline
            .handle_incoming(new_sms("sms-1", "SHOP", "receipt"))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(api.call_count(), 1);

        // The same capture event arrives again. The stored row already has
        // the API delivery recorded, so no second POST goes out.
        let result = pipeline
            .handle_incoming(new_sms("sms-1", "SHOP", "receipt"))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(api.call_count(), 1);
    }

    #[tokio::test]
    async fn missing_id_gets_a_generated_one() {
        let source = Arc::new(FixedSource::new(vec![]));
        let (db, pipeline) = pipeline_with_source(source).await;

        let mut sms = new_sms("", "FRIEND", "hi");
        sms.id = String::new();
        pipeline.handle_incoming(sms).await.unwrap();

        let stored = db.list_messages(10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert!(!stored[0].id.is_empty());
    }

    #[tokio::test]
    async fn epoch_millis_timestamp_is_preserved() {
        let source = Arc::new(FixedSource::new(vec![]));
        let (db, pipeline) = pipeline_with_source(source).await;

        let mut sms = new_sms("sms-1", "FRIEND", "hi");
        sms.timestamp = 1_700_000_000_000;
        pipeline.handle_incoming(sms).await.unwrap();

        let stored = db.get_message("sms-1").await.unwrap().unwrap();
        assert_eq!(stored.received_at.timestamp_millis(), 1_700_000_000_000);
    }
}
