use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use taskweave_core::config::EventsOutConfig;
use taskweave_core::hooks::{EventPublisher, WorkflowEvent};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};

/// Special path that sends lines to stdout instead of a file.
pub const STDOUT_TARGET: &str = "stdout:";

#[derive(Serialize)]
struct Envelope<'a> {
    topic: &'a str,
    #[serde(flatten)]
    event: &'a WorkflowEvent,
}

enum Message {
    Line(String),
    /// Acknowledged once every earlier line is written.
    Flush(oneshot::Sender<()>),
}

/// Appends one JSON line per event to a file (or stdout).
///
/// Publishing only enqueues; a background task owns the writer. With
/// `drop_when_full` a full channel drops the line and bumps the counter,
/// otherwise the publisher waits for room. `flush` always waits.
#[derive(Clone)]
pub struct JsonlEventPublisher {
    tx: mpsc::Sender<Message>,
    dropped: Arc<AtomicU64>,
    drop_when_full: bool,
}

impl JsonlEventPublisher {
    /// Starts the writer task. Returns `None` when events output is disabled.
    pub async fn start(cfg: &EventsOutConfig) -> Result<Option<Self>> {
        if !cfg.enabled || cfg.path.trim().is_empty() {
            return Ok(None);
        }

        let to_stdout = cfg.path == STDOUT_TARGET;
        let mut writer: Box<dyn tokio::io::AsyncWrite + Unpin + Send> = if to_stdout {
            Box::new(tokio::io::stdout())
        } else {
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&cfg.path)
                .await
                .map_err(|e| anyhow::anyhow!("failed to open events output {}: {e}", cfg.path))?;
            Box::new(file)
        };

        let (tx, mut rx) = mpsc::channel::<Message>(cfg.channel_capacity.max(1));
        let path = cfg.path.clone();

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let mut line = match message {
                    Message::Line(line) => line,
                    Message::Flush(ack) => {
                        let _ = ack.send(());
                        continue;
                    }
                };
                if !line.ends_with('\n') {
                    line.push('\n');
                }
                let written = match writer.write_all(line.as_bytes()).await {
                    Ok(()) => writer.flush().await,
                    Err(e) => Err(e),
                };
                if let Err(e) = written {
                    tracing::warn!(
                        target: "taskweave.events_out",
                        path = %path,
                        error = %e,
                        "events writer stopped"
                    );
                    return;
                }
            }
        });

        Ok(Some(Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
            drop_when_full: cfg.drop_when_full,
        }))
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    async fn send_line(&self, line: String) {
        let message = Message::Line(line);
        if self.drop_when_full {
            if self.tx.try_send(message).is_err() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        } else if self.tx.send(message).await.is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[async_trait]
impl EventPublisher for JsonlEventPublisher {
    async fn publish(&self, topic: &str, event: &WorkflowEvent) -> Result<()> {
        let line = serde_json::to_string(&Envelope { topic, event })?;
        self.send_line(line).await;
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Message::Flush(ack))
            .await
            .map_err(|_| anyhow::anyhow!("events writer is not running"))?;
        done.await
            .map_err(|_| anyhow::anyhow!("events writer stopped before flushing"))
    }
}

/// Emits every event as a structured `tracing` record.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventPublisher;

#[async_trait]
impl EventPublisher for TracingEventPublisher {
    async fn publish(&self, topic: &str, event: &WorkflowEvent) -> Result<()> {
        let payload = serde_json::to_string(event)?;
        tracing::info!(
            target: "taskweave.events",
            topic,
            event_type = event.event_type(),
            workflow_id = event.workflow_id(),
            payload = %payload,
            "event"
        );
        Ok(())
    }
}
