//! Processing loop and lifecycle.
//!
//! One logical thread of control: block on a group read, route the entry
//! through the dispatcher, append any outbound act, acknowledge, repeat.
//! Exactly one entry is in flight at a time, so per-actor command ordering
//! falls out of the per-stream group order. Transport failures propagate and
//! take the process down; the orchestrator restarts it and the unacked entry
//! is redelivered.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};

use crate::app::AyayeApp;
use crate::config::Config;
use crate::dispatch::{App, Dispatch, Dispatcher};
use crate::error::Result;
use crate::event::EventKind;
use crate::generation::Generator;
use crate::meta::{self, AppMeta};
use crate::queue::QueueClient;
use crate::registry::{AppRecord, Registry};

/// The daemon: configuration, collaborators, and this instance's
/// registration, all owned by one struct built once at startup.
pub struct Worker {
    queue: Arc<dyn QueueClient>,
    dispatcher: Dispatcher,
    group: String,
    consumer: String,
    fact_stream: String,
    act_stream: String,
    block: Duration,
    registration: AppRecord,
}

impl Worker {
    /// Run the startup sequence: ensure both consumer groups exist and
    /// upsert this app's registration with the declared capability metadata.
    /// Safe to run against a store that already has everything in place.
    pub async fn startup(
        config: &Config,
        queue: Arc<dyn QueueClient>,
        registry: Arc<dyn Registry>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self> {
        let consumer = config.worker.consumer_id()?.to_string();
        let group = meta::DAEMON.to_string();

        queue
            .ensure_group(&config.worker.fact_stream, &group)
            .await?;
        queue
            .ensure_group(&config.worker.act_stream, &group)
            .await?;

        let registration = match registry.lookup_app(meta::WHO).await? {
            Some(record) => record,
            None => registry.create_app(meta::WHO).await?,
        };
        // Self-healing registration: the capability description always
        // reflects the running build.
        let registration = registry
            .update_app_meta(registration.id, &AppMeta::declared().to_value())
            .await?;

        tracing::info!(
            who = meta::WHO,
            group = %group,
            consumer = %consumer,
            app_id = %registration.id,
            "Worker ready"
        );

        let app: Arc<dyn App> = Arc::new(AyayeApp::new(
            registry.clone(),
            generator,
            registration.id,
        ));
        Ok(Self {
            queue,
            dispatcher: Dispatcher::new(app, registry),
            group,
            consumer,
            fact_stream: config.worker.fact_stream.clone(),
            act_stream: config.worker.act_stream.clone(),
            block: config.worker.block_timeout(),
            registration,
        })
    }

    /// This instance's registration record.
    pub fn registration(&self) -> &AppRecord {
        &self.registration
    }

    /// One steady-state iteration: read at most one entry, process it, and
    /// acknowledge it. Returns whether an entry was seen (a read timeout is
    /// not an event: no metrics, no acknowledgment).
    pub async fn process_one(&self) -> Result<bool> {
        let streams = [self.fact_stream.as_str(), self.act_stream.as_str()];
        let Some(entry) = self
            .queue
            .read_next(&self.group, &self.consumer, &streams, self.block)
            .await?
        else {
            return Ok(false);
        };

        let started = Instant::now();

        match EventKind::of_entry(entry.fields.keys().map(String::as_str)) {
            Some(kind) => {
                match kind {
                    EventKind::Fact => counter!("ayaye_facts_read").increment(1),
                    EventKind::Act => counter!("ayaye_acts_read").increment(1),
                }

                // Transport errors propagate before the ack, so the entry is
                // redelivered after restart.
                let outcome = self.dispatcher.dispatch(kind, &entry).await?;
                self.settle(&entry.stream, &entry.id, outcome).await?;
            }
            None => {
                // Neither a fact nor an act: drop as poison rather than
                // redeliver forever.
                tracing::error!(
                    stream = %entry.stream,
                    entry_id = %entry.id,
                    "Entry carries no fact/act payload, dropping"
                );
                counter!("ayaye_poison_total").increment(1);
            }
        }

        self.queue
            .acknowledge(&entry.stream, &self.group, &entry.id)
            .await?;

        histogram!("ayaye_process_seconds").record(started.elapsed().as_secs_f64());
        Ok(true)
    }

    /// Act on a dispatch outcome: append the outbound act on success, count
    /// and log everything else. The caller acknowledges afterwards either
    /// way.
    async fn settle(&self, stream: &str, entry_id: &str, outcome: Dispatch) -> Result<()> {
        match outcome {
            Dispatch::Handled { outbound: Some(act) } => {
                let payload = act.encode()?;
                let id = self.queue.append(&self.act_stream, "act", &payload).await?;
                counter!("ayaye_acts_written").increment(1);
                tracing::info!(
                    entity_id = %act.entity_id,
                    entry_id = %id,
                    "Outbound act appended"
                );
            }
            Dispatch::Handled { outbound: None } => {}
            Dispatch::Skipped(reason) => {
                counter!("ayaye_events_skipped", "reason" => reason.as_str()).increment(1);
                tracing::debug!(
                    stream = %stream,
                    entry_id = %entry_id,
                    reason = reason.as_str(),
                    "Event skipped"
                );
            }
            Dispatch::Poison(error) => {
                // Decided policy: drop-and-log. Acknowledging keeps a
                // malformed producer from wedging the group.
                counter!("ayaye_poison_total").increment(1);
                tracing::error!(error = %error, "Poison entry dropped");
            }
            Dispatch::HandlerFailed(error) => {
                // Handled-but-unsuccessful: no outbound act, no redelivery.
                counter!("ayaye_handler_failures_total").increment(1);
                tracing::error!(
                    stream = %stream,
                    entry_id = %entry_id,
                    error = %error,
                    "Handler failed; entry acknowledged without a reply"
                );
            }
        }
        Ok(())
    }

    /// Run the steady-state loop until the shutdown signal resolves.
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("Shutdown signal received, stopping between iterations");
                    return Ok(());
                }
                processed = self.process_one() => {
                    processed?;
                }
            }
        }
    }
}
