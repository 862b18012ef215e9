//! services/journal/src/adapters/chat_llm.rs
//!
//! This module contains the adapter for the check-in conversation LLM.
//! It implements the `CompletionService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use for_me_core::{
    domain::{ChatMessage, ChatRole},
    ports::{CompletionService, PortError, PortResult},
};
use tracing::{debug, warn};

/// Shown in place of a reply when the service returns no choices.
pub const EMPTY_REPLY_FALLBACK: &str = "Sorry, I couldn't come up with a reply.";

const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 100;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `CompletionService` using an OpenAI-compatible chat API.
#[derive(Clone)]
pub struct OpenAiChatAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiChatAdapter {
    /// Creates a new `OpenAiChatAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    fn to_request_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage, OpenAIError> {
        let content = message.content.as_str();
        Ok(match message.role {
            ChatRole::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(content)
                .build()?
                .into(),
            ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
                .content(content)
                .build()?
                .into(),
            ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(content)
                .build()?
                .into(),
        })
    }
}

/// Transport problems are retryable; everything the API answered is not.
fn map_openai_error(error: OpenAIError) -> PortError {
    match error {
        OpenAIError::Reqwest(e) => PortError::Unavailable(e.to_string()),
        OpenAIError::ApiError(api) => PortError::Rejected(api.message),
        other => PortError::Unexpected(other.to_string()),
    }
}

//=========================================================================================
// `CompletionService` Trait Implementation
//=========================================================================================

#[async_trait]
impl CompletionService for OpenAiChatAdapter {
    async fn complete(&self, messages: &[ChatMessage]) -> PortResult<String> {
        let request_messages = messages
            .iter()
            .map(Self::to_request_message)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(request_messages)
            .temperature(TEMPERATURE)
            .max_tokens(MAX_TOKENS)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        debug!("Sending {} messages to {}", messages.len(), self.model);
        let response = self.client.chat().create(request).await.map_err(map_openai_error)?;

        match response.choices.first() {
            Some(choice) => Ok(choice.message.content.clone().unwrap_or_default().trim().to_string()),
            None => {
                warn!("Completion response carried no choices.");
                Ok(EMPTY_REPLY_FALLBACK.to_string())
            }
        }
    }
}
