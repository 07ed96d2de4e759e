use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use sms_gateway::channels::{HttpApiChannel, SmtpChannel};
use sms_gateway::config::{ApiConfig, EmailConfig, GatewayConfig};
use sms_gateway::error::PipelineError;
use sms_gateway::events::MessageEvents;
use sms_gateway::pipeline::{ForwardProcessor, IngestionPipeline, MessageSource, NewSms};
use sms_gateway::scheduler::{AlwaysOnline, Connectivity, SweepScheduler, TcpProbe};
use sms_gateway::store::{Database, LibSqlBackend};

/// Sweep source of record backed by a JSON-lines file.
///
/// Stands in for the platform message provider at the process boundary:
/// every sweep re-reads the whole file, and the pipeline's idempotent mirror
/// insert makes repeated reads harmless. When no file is configured the
/// sweep only replays messages already in the mirror.
struct FileSource {
    path: Option<String>,
}

#[async_trait]
impl MessageSource for FileSource {
    async fn fetch_all(&self) -> Result<Vec<NewSms>, PipelineError> {
        let Some(path) = &self.path else {
            return Ok(Vec::new());
        };

        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| PipelineError::SourceFetch(format!("{path}: {e}")))?;

        let mut messages = Vec::new();
        for (lineno, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<NewSms>(line) {
                Ok(sms) => messages.push(sms),
                Err(e) => {
                    warn!(path = %path, line = lineno + 1, error = %e, "Skipping malformed source line");
                }
            }
        }
        Ok(messages)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = GatewayConfig::from_env().context("invalid gateway configuration")?;

    eprintln!("📨 SMS Gateway v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path);
    eprintln!(
        "   Sweep interval: {}s",
        config.sweep_interval.as_secs()
    );

    // ── Store ────────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(Path::new(&config.db_path))
            .await
            .with_context(|| format!("failed to open database at {}", config.db_path))?,
    );

    // Seed channel config from env on first start; stored config wins later.
    if db.get_email_config().await?.is_none() {
        if let Some(email) = EmailConfig::from_env() {
            db.save_email_config(&email).await?;
            eprintln!("   Email: seeded from environment ({})", email.smtp_server);
        } else {
            eprintln!("   Email: not configured");
        }
    }
    if db.get_api_config().await?.is_none() {
        if let Some(api) = ApiConfig::from_env() {
            db.save_api_config(&api).await?;
            eprintln!("   API: seeded from environment ({})", api.api_url);
        } else {
            eprintln!("   API: disabled");
        }
    }

    // ── Pipeline ─────────────────────────────────────────────────────────
    let processor = Arc::new(ForwardProcessor::new(
        Arc::clone(&db),
        Arc::new(SmtpChannel::new()),
        Arc::new(HttpApiChannel::new().context("failed to build HTTP client")?),
    ));

    let source_path = std::env::var("SMS_GW_SOURCE_FILE").ok();
    if let Some(path) = &source_path {
        eprintln!("   Source file: {path}");
    }
    let pipeline = Arc::new(IngestionPipeline::new(
        Arc::clone(&db),
        processor,
        Arc::new(FileSource { path: source_path }),
        MessageEvents::new(),
    ));

    let connectivity: Arc<dyn Connectivity> = match &config.probe_addr {
        Some(addr) => {
            eprintln!("   Connectivity probe: {addr}");
            Arc::new(TcpProbe::new(addr.clone()))
        }
        None => Arc::new(AlwaysOnline),
    };
    let scheduler = SweepScheduler::spawn(
        Arc::clone(&pipeline),
        config.sweep_interval,
        connectivity,
    );

    eprintln!("   Feed capture events as JSON lines on stdin. Ctrl-C to exit.\n");

    // ── Capture loop ─────────────────────────────────────────────────────
    // Each stdin line is one captured message, e.g.
    // {"id":"abc","sender":"BANK","body":"OTP 1234","timestamp":1700000000000}
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        let sms: NewSms = match serde_json::from_str(line) {
                            Ok(sms) => sms,
                            Err(e) => {
                                warn!(error = %e, "Ignoring malformed capture line");
                                continue;
                            }
                        };
                        match pipeline.handle_incoming(sms).await {
                            Ok(result) if result.success => {
                                info!(destinations = ?result.destinations, "Message forwarded");
                            }
                            Ok(result) => {
                                info!(detail = %result.detail, "Message not forwarded");
                            }
                            Err(e) => {
                                warn!(error = %e, "Failed to ingest message");
                            }
                        }
                    }
                    Ok(None) => {
                        info!("stdin closed, shutting down");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "stdin read failed, shutting down");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received ctrl-c, shutting down");
                break;
            }
        }
    }

    scheduler.shutdown().await;
    Ok(())
}
