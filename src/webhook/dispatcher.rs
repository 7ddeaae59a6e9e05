//! Webhook dispatcher: turns delivered messages into conversation steps.
//!
//! Each qualifying text message becomes one job on the message pool, so the
//! HTTP acknowledgment never waits on the store or the messenger. Work for
//! one phone number is serialized by `UserLocks`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument, warn};

use crate::channels::{ErrorReply, Messenger, replies};
use crate::config::WorkerConfig;
use crate::conversation::{Action, StateUpdate, User, decide, normalize, resolve_user};
use crate::pipeline::{IngestionJob, IngestionPipeline, candidate_token, validate_url};
use crate::store::Database;
use crate::webhook::payload::WebhookEnvelope;
use crate::worker::{ActiveJobs, TaskPool, UserLocks};

/// A text message pulled out of a webhook envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMessage {
    pub from: String,
    pub message_id: String,
    /// Original body, untouched.
    pub body: String,
    pub contact_name: Option<String>,
}

/// Every non-empty text message in the envelope, in delivery order.
pub fn collect_text_messages(envelope: &WebhookEnvelope) -> Vec<TextMessage> {
    let mut out = Vec::new();
    for change in envelope.entry.iter().flat_map(|e| &e.changes) {
        if !change.carries_messages() {
            debug!(field = ?change.field, "Skipping non-message change");
            continue;
        }
        for message in &change.value.messages {
            let Some(body) = message.kind.text_body() else {
                debug!(
                    from = %message.from,
                    kind = message.kind.label(),
                    "Ignoring non-text message"
                );
                continue;
            };
            out.push(TextMessage {
                from: message.from.clone(),
                message_id: message.id.clone(),
                body: body.to_string(),
                contact_name: change.value.contact_name(&message.from).map(String::from),
            });
        }
    }
    out
}

/// Routes inbound messages through the state machine and starts ingestion.
pub struct Dispatcher {
    store: Arc<dyn Database>,
    messenger: Arc<dyn Messenger>,
    pipeline: Arc<IngestionPipeline>,
    locks: Arc<UserLocks>,
    active_jobs: ActiveJobs,
    messages: TaskPool,
    ingestions: TaskPool,
}

impl Dispatcher {
    /// `locks` must be the same set the pipeline uses for its final write.
    pub fn new(
        store: Arc<dyn Database>,
        messenger: Arc<dyn Messenger>,
        pipeline: Arc<IngestionPipeline>,
        locks: Arc<UserLocks>,
        workers: &WorkerConfig,
    ) -> Self {
        Self {
            store,
            messenger,
            pipeline,
            locks,
            active_jobs: ActiveJobs::new(),
            messages: TaskPool::new(
                "messages",
                workers.max_concurrent_messages,
                workers.max_queued_jobs,
            ),
            ingestions: TaskPool::new(
                "ingestions",
                workers.max_concurrent_ingestions,
                workers.max_queued_jobs,
            ),
        }
    }

    /// Schedule every text message in the envelope. Returns how many were
    /// accepted by the message pool.
    pub fn dispatch(self: &Arc<Self>, envelope: &WebhookEnvelope) -> usize {
        let mut scheduled = 0;
        for message in collect_text_messages(envelope) {
            let this = Arc::clone(self);
            let from = message.from.clone();
            match self.messages.spawn(async move { this.handle_text(message).await }) {
                Ok(_) => scheduled += 1,
                Err(e) => warn!(from = %from, error = %e, "Dropping message"),
            }
        }
        scheduled
    }

    /// Process one text message end to end.
    #[instrument(skip_all, fields(from = %message.from, message_id = %message.message_id))]
    pub async fn handle_text(&self, message: TextMessage) {
        let _guard = self.locks.lock(&message.from).await;

        let user = match resolve_user(
            self.store.as_ref(),
            &message.from,
            message.contact_name.as_deref(),
        )
        .await
        {
            Ok(user) => user,
            Err(e) => {
                error!(from = %message.from, error = %e, "Failed to get or create user");
                self.send(&message.from, ErrorReply::General.text()).await;
                return;
            }
        };

        let normalized = normalize(&message.body);
        let decision = decide(&user.state, &normalized);
        info!(
            user_id = %user.id,
            step = %user.state.step,
            action = decision.action.label(),
            "Processing text message"
        );

        match decision.action {
            Action::SendWelcome => {
                if self.send(&user.phone_number, replies::welcome()).await {
                    self.apply(&user, decision.update).await;
                }
            }
            Action::PromptForUrl => {
                if self.send(&user.phone_number, replies::url_request()).await {
                    self.apply(&user, decision.update).await;
                }
            }
            Action::SendFallback => {
                self.send(&user.phone_number, replies::unknown()).await;
            }
            Action::ValidateAndIngest => self.start_ingestion(user, &message.body).await,
        }
    }

    /// Validate the URL in `body` and hand it to the ingestion pool.
    async fn start_ingestion(&self, user: User, body: &str) {
        let profile = match validate_url(candidate_token(body)) {
            Ok(profile) => profile,
            Err(e) => {
                info!(user_id = %user.id, reason = %e, "Invalid profile URL");
                self.send(&user.phone_number, ErrorReply::InvalidUrl.text()).await;
                return;
            }
        };

        let Some(job_guard) = self.active_jobs.try_start(&user.phone_number) else {
            info!(user_id = %user.id, "Ingestion already running");
            self.send(&user.phone_number, replies::already_processing()).await;
            return;
        };

        let mut state = user.state.clone();
        state.start_processing(&profile.canonical);
        if let Err(e) = self.store.update_user_state(user.id, &state).await {
            error!(user_id = %user.id, error = %e, "Failed to update user");
            self.send(&user.phone_number, ErrorReply::General.text()).await;
            return;
        }

        let job = IngestionJob {
            user_id: user.id,
            phone_number: user.phone_number.clone(),
            profile_url: profile.canonical.clone(),
        };
        // The job waits for the processing notice so replies stay in order.
        let (noticed_tx, noticed_rx) = oneshot::channel::<()>();
        let pipeline = Arc::clone(&self.pipeline);
        let spawned = self.ingestions.spawn(async move {
            let _ = noticed_rx.await;
            pipeline.run_exclusive(job, job_guard).await;
        });

        if let Err(e) = spawned {
            warn!(user_id = %user.id, error = %e, "Ingestion refused");
            state.await_retry();
            if let Err(e) = self.store.update_user_state(user.id, &state).await {
                error!(user_id = %user.id, error = %e, "Failed to reset user");
            }
            self.send(&user.phone_number, ErrorReply::General.text()).await;
            return;
        }

        // Best effort; ingestion goes ahead even if the notice is lost.
        self.send(&user.phone_number, replies::processing(&profile.canonical)).await;
        let _ = noticed_tx.send(());
    }

    async fn apply(&self, user: &User, update: Option<StateUpdate>) {
        let Some(update) = update else {
            return;
        };
        let mut state = user.state.clone();
        update.apply(&mut state);
        if let Err(e) = self.store.update_user_state(user.id, &state).await {
            error!(user_id = %user.id, error = %e, "Failed to update user");
        }
    }

    /// Send a text; failures are logged. Returns whether it went out.
    async fn send(&self, to: &str, text: String) -> bool {
        match self.messenger.send_text(to, &text).await {
            Ok(()) => true,
            Err(e) => {
                warn!(to, error = %e, "Failed to send message");
                false
            }
        }
    }

    /// Whether an ingestion job is running for this phone number.
    pub fn is_ingesting(&self, phone_number: &str) -> bool {
        self.active_jobs.is_active(phone_number)
    }

    /// Finish queued work before shutdown. Messages drain first since
    /// they may still enqueue ingestions.
    pub async fn drain(&self, wait: Duration) {
        let messages = self.messages.drain(wait).await;
        let ingestions = self.ingestions.drain(wait).await;
        info!(messages, ingestions, "Worker pools drained");
    }
}
