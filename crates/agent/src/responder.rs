//! The exchange: one inbound message in, one reply out.

use std::sync::Arc;
use std::time::Duration;

use chatbridge_config::AppConfig;
use chatbridge_core::channel::{InboundEvent, ReplyChannel};
use chatbridge_core::error::{ChannelError, ProviderError};
use chatbridge_core::memory::ConversationHistory;
use chatbridge_core::message::Role;
use chatbridge_core::provider::{Provider, ProviderRequest};
use tracing::{debug, error, info};

use crate::context::ContextAssembler;
use crate::locks::UserLocks;

/// What the user receives for one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The model answered; the turn was recorded in history.
    Model(String),
    /// The completion failed; nothing was recorded.
    Fallback(String),
}

impl Reply {
    pub fn text(&self) -> &str {
        match self {
            Reply::Model(text) | Reply::Fallback(text) => text,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Reply::Fallback(_))
    }
}

/// Answers inbound messages with the configured provider, keeping a rolling
/// per-user history.
pub struct ChatAgent {
    /// The completion provider
    provider: Arc<dyn Provider>,

    /// Per-user conversation history
    history: Arc<dyn ConversationHistory>,

    /// Builds `[system, ...history, user]`
    assembler: ContextAssembler,

    /// The model to request
    model: String,

    /// Sampling temperature, provider default when unset
    temperature: Option<f32>,

    /// Max tokens per reply, provider default when unset
    max_tokens: Option<u32>,

    /// Upper bound on a single completion call
    timeout: Duration,

    /// Sent instead of the model reply when the completion fails
    fallback_reply: String,

    /// Per-user serialization; `None` allows same-user exchanges to interleave
    locks: Option<UserLocks>,
}

impl ChatAgent {
    /// Create an agent with a 30s timeout, the default fallback text and
    /// per-user serialization enabled.
    pub fn new(
        provider: Arc<dyn Provider>,
        history: Arc<dyn ConversationHistory>,
        assembler: ContextAssembler,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            history,
            assembler,
            model: model.into(),
            temperature: None,
            max_tokens: None,
            timeout: Duration::from_secs(30),
            fallback_reply: chatbridge_config::DEFAULT_FALLBACK_REPLY.to_string(),
            locks: Some(UserLocks::new()),
        }
    }

    /// Create an agent from application config.
    pub fn from_config(
        provider: Arc<dyn Provider>,
        history: Arc<dyn ConversationHistory>,
        assembler: ContextAssembler,
        config: &AppConfig,
    ) -> Self {
        Self::new(provider, history, assembler, config.model.clone())
            .with_temperature(config.provider.temperature)
            .with_max_tokens(config.provider.max_tokens)
            .with_timeout(config.provider.request_timeout())
            .with_fallback_reply(config.fallback_reply.clone())
            .with_serialization(config.history.serialize_per_user)
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_fallback_reply(mut self, text: impl Into<String>) -> Self {
        self.fallback_reply = text.into();
        self
    }

    /// Enable or disable per-user serialization.
    pub fn with_serialization(mut self, enabled: bool) -> Self {
        self.locks = enabled.then(UserLocks::new);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn system_prompt(&self) -> &str {
        self.assembler.system_prompt()
    }

    /// Answer `text` from `user_id`. Never fails: any completion error becomes
    /// the fallback reply.
    pub async fn respond(&self, user_id: &str, text: &str) -> Reply {
        let _guard = match &self.locks {
            Some(locks) => Some(locks.lock(user_id).await),
            None => None,
        };

        let history = self.history.history(user_id);
        debug!(user_id, history_len = history.len(), "Assembling context");

        let mut request = ProviderRequest::new(&self.model, self.assembler.assemble(history, text));
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;

        match self.complete(request).await {
            Ok(reply) => {
                self.history.append(user_id, Role::User, text);
                self.history.append(user_id, Role::Assistant, &reply);
                info!(user_id, reply_len = reply.len(), "Exchange completed");
                Reply::Model(reply)
            }
            Err(e) => {
                error!(user_id, provider = self.provider.name(), error = %e, "Completion failed, sending fallback");
                Reply::Fallback(self.fallback_reply.clone())
            }
        }
    }

    /// Answer an inbound event and deliver the reply through `channel`.
    pub async fn handle_event(
        &self,
        channel: &dyn ReplyChannel,
        event: &InboundEvent,
    ) -> Result<Reply, ChannelError> {
        let reply = self.respond(&event.user_id, &event.text).await;
        channel.reply(&event.reply_handle, reply.text()).await?;
        Ok(reply)
    }

    /// Drop idle per-user locks. Returns how many were removed.
    pub fn prune_locks(&self) -> usize {
        self.locks.as_ref().map_or(0, UserLocks::prune)
    }

    async fn complete(&self, request: ProviderRequest) -> Result<String, ProviderError> {
        let response = tokio::time::timeout(self.timeout, self.provider.complete(request))
            .await
            .map_err(|_| ProviderError::Timeout(self.timeout.as_secs()))??;

        if response.content.trim().is_empty() {
            return Err(ProviderError::InvalidResponse("empty reply text".into()));
        }
        Ok(response.content)
    }
}
