//! Streaming completion orchestrator
//!
//! [`ChatCompletionStream`] runs one user turn end to end: it resolves or
//! creates the session, appends the user message, streams the provider's
//! reply while publishing cumulative snapshots, appends the assistant
//! message and persists the session. A session is only ever persisted with
//! both halves of the exchange.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::chat::{Message, Role, Session};
use crate::error::{as_chat_error, ChatStreamError, Result};
use crate::providers::{CompletionRequest, Provider};
use crate::storage::SessionGateway;
use crate::tokenizer::TokenCounter;

pub mod types;

pub use types::{CompletionInput, CompletionOutput, Stage};

/// Creates the bounded snapshot channel
///
/// The orchestrator waits for capacity before each send, so a slow consumer
/// slows the provider stream down instead of growing a queue.
pub fn output_channel(
    capacity: usize,
) -> (
    mpsc::Sender<CompletionOutput>,
    mpsc::Receiver<CompletionOutput>,
) {
    mpsc::channel(capacity.max(1))
}

/// Drives one request/response cycle per [`execute`](Self::execute) call
///
/// Cloning is cheap; clones share the gateway, provider, counter and output
/// channel.
#[derive(Clone)]
pub struct ChatCompletionStream {
    gateway: Arc<dyn SessionGateway>,
    provider: Arc<dyn Provider>,
    counter: Arc<dyn TokenCounter>,
    output: mpsc::Sender<CompletionOutput>,
}

impl ChatCompletionStream {
    /// Creates an orchestrator publishing snapshots on `output`
    pub fn new(
        gateway: Arc<dyn SessionGateway>,
        provider: Arc<dyn Provider>,
        counter: Arc<dyn TokenCounter>,
        output: mpsc::Sender<CompletionOutput>,
    ) -> Self {
        Self {
            gateway,
            provider,
            counter,
            output,
        }
    }

    /// Runs one user turn and returns the final assistant text
    ///
    /// # Errors
    ///
    /// Each stage fails with its own [`ChatStreamError`] variant:
    /// `SessionLookup` / `SessionCreation` while resolving, `MessageCreation`,
    /// `SessionEnded` or `OversizedMessage` for the user turn,
    /// `ProviderRequest` and `Streaming` for the provider, `MessageCreation`
    /// for the assistant turn and `Persistence` for the final save.
    /// Triggering `cancel` during the provider exchange returns `Canceled`.
    /// Nothing is persisted on any error.
    pub async fn execute(
        &self,
        input: CompletionInput,
        cancel: CancellationToken,
    ) -> Result<CompletionOutput> {
        tracing::debug!(stage = %Stage::Resolving, chat_id = %input.chat_id, "Completion stage");
        let (mut session, is_new) = self.resolve_session(&input).await?;
        let model = session.config().model.name.clone();

        let user_message =
            Message::create(Role::User, input.user_message.as_str(), &model, self.counter.as_ref())
                .map_err(|e| ChatStreamError::MessageCreation(e.to_string()))?;
        let evicted = session.add_message(user_message)?;
        if evicted > 0 {
            tracing::debug!(
                chat_id = %session.id(),
                evicted,
                token_usage = session.token_usage(),
                "Evicted messages for user turn"
            );
        }

        tracing::debug!(stage = %Stage::Requesting, chat_id = %session.id(), "Completion stage");
        let request = CompletionRequest::from_session(&session);
        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(canceled(Stage::Requesting, session.id())),
            result = self.provider.stream_completion(request) => result.map_err(|e| {
                tracing::error!(provider = self.provider.name(), "Provider request failed: {:#}", e);
                retag(e, Stage::Requesting)
            })?,
        };

        tracing::debug!(stage = %Stage::Streaming, chat_id = %session.id(), "Completion stage");
        let mut content = String::new();
        let mut consumer_open = true;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(canceled(Stage::Streaming, session.id())),
                next = stream.next() => next,
            };

            let delta = match next {
                None => break,
                Some(Ok(delta)) => delta,
                Some(Err(e)) => {
                    tracing::error!(chat_id = %session.id(), "Provider stream failed: {:#}", e);
                    return Err(retag(e, Stage::Streaming));
                }
            };

            if delta.content.is_empty() {
                continue;
            }
            content.push_str(&delta.content);

            if !consumer_open {
                continue;
            }
            let snapshot = CompletionOutput {
                chat_id: session.id().to_string(),
                user_id: session.user_id().to_string(),
                content: content.clone(),
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(canceled(Stage::Streaming, session.id())),
                sent = self.output.send(snapshot) => {
                    if sent.is_err() {
                        tracing::warn!(
                            chat_id = %session.id(),
                            "Snapshot consumer went away; finishing exchange without emitting"
                        );
                        consumer_open = false;
                    }
                }
            }
        }
        drop(stream);

        tracing::debug!(stage = %Stage::Finalizing, chat_id = %session.id(), "Completion stage");
        let assistant_message =
            Message::create(Role::Assistant, content.as_str(), &model, self.counter.as_ref())
                .map_err(|e| ChatStreamError::MessageCreation(e.to_string()))?;
        session.add_message(assistant_message)?;

        tracing::debug!(stage = %Stage::Persisting, chat_id = %session.id(), "Completion stage");
        let persisted = if is_new {
            self.gateway.create(&session).await
        } else {
            self.gateway.save(&session).await
        };
        persisted.map_err(|e| {
            tracing::error!(chat_id = %session.id(), "Failed to persist session: {:#}", e);
            ChatStreamError::Persistence(format!("{:#}", e))
        })?;

        tracing::info!(
            chat_id = %session.id(),
            created = is_new,
            retained = session.count_retained_messages(),
            token_usage = session.token_usage(),
            "Completion persisted"
        );

        Ok(CompletionOutput {
            chat_id: session.id().to_string(),
            user_id: session.user_id().to_string(),
            content,
        })
    }

    /// Loads the session or builds a new one; the flag is true for new sessions
    async fn resolve_session(&self, input: &CompletionInput) -> Result<(Session, bool)> {
        if !input.chat_id.trim().is_empty() {
            match self.gateway.find_by_id(&input.chat_id).await {
                Ok(Some(session)) => return Ok((session, false)),
                Ok(None) => {}
                Err(e) => {
                    return Err(ChatStreamError::SessionLookup(format!("{:#}", e)).into());
                }
            }
        }

        let id = if input.chat_id.trim().is_empty() {
            Uuid::new_v4().to_string()
        } else {
            input.chat_id.clone()
        };

        let session = self
            .new_session(id, input)
            .map_err(|e| ChatStreamError::SessionCreation(e.to_string()))?;
        tracing::info!(chat_id = %session.id(), user_id = %session.user_id(), "Created session");
        Ok((session, true))
    }

    fn new_session(&self, id: String, input: &CompletionInput) -> Result<Session> {
        let config = input.config.session_config();
        let system = Message::create(
            Role::System,
            input.config.initial_system_message.as_str(),
            &config.model.name,
            self.counter.as_ref(),
        )?;
        Session::create_with_id(id, input.user_id.as_str(), system, config)
    }
}

fn canceled(stage: Stage, chat_id: &str) -> anyhow::Error {
    tracing::info!(stage = %stage, chat_id = %chat_id, "Completion canceled");
    ChatStreamError::Canceled.into()
}

/// Tags a provider failure with the variant for `stage`, keeping an
/// existing tag of the same kind instead of nesting it
fn retag(err: anyhow::Error, stage: Stage) -> anyhow::Error {
    match (stage, as_chat_error(&err)) {
        (Stage::Requesting, Some(ChatStreamError::ProviderRequest(_)))
        | (Stage::Streaming, Some(ChatStreamError::Streaming(_))) => err,
        (Stage::Requesting, _) => ChatStreamError::ProviderRequest(format!("{:#}", err)).into(),
        _ => ChatStreamError::Streaming(format!("{:#}", err)).into(),
    }
}
