//! OpenAI chat completions as the model collaborator.

use async_trait::async_trait;
use log::{debug, warn};
use openai::chat::{ChatCompletion, ChatCompletionMessage, ChatCompletionMessageRole};

use crate::core::{ModelClient, ModelError, Personality, RequestContext};

/// Referenced messages longer than this are cut before being sent as context
const MAX_REFERENCE_CHARS: usize = 4000;

pub struct OpenAiModel {
    model: String,
}

impl OpenAiModel {
    /// The API key is read from the environment by the `openai` crate
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }
}

fn message(role: ChatCompletionMessageRole, content: String) -> ChatCompletionMessage {
    ChatCompletionMessage {
        role,
        content: Some(content),
        name: None,
        function_call: None,
        tool_call_id: None,
        tool_calls: None,
    }
}

/// System prompt, the message being replied to (if any), then the user's text
fn build_messages(
    personality: &Personality,
    content: &str,
    context: &RequestContext,
) -> Vec<ChatCompletionMessage> {
    let mut messages = vec![message(
        ChatCompletionMessageRole::System,
        personality.system_prompt.clone(),
    )];

    if let Some(ref referenced) = context.reference_content {
        let referenced: String = referenced.chars().take(MAX_REFERENCE_CHARS).collect();
        messages.push(message(
            ChatCompletionMessageRole::User,
            format!("The user is replying to this message:\n{referenced}"),
        ));
    }

    messages.push(message(ChatCompletionMessageRole::User, content.to_string()));
    messages
}

#[async_trait]
impl ModelClient for OpenAiModel {
    async fn invoke(
        &self,
        personality: &Personality,
        content: &str,
        context: &RequestContext,
    ) -> Result<String, ModelError> {
        let messages = build_messages(personality, content, context);
        debug!(
            "Calling {} for {} with {} message(s)",
            self.model,
            personality.id,
            messages.len()
        );

        let completion = ChatCompletion::builder(&self.model, messages)
            .create()
            .await
            .map_err(|e| {
                warn!("OpenAI request failed for {}: {e}", personality.id);
                ModelError::Api(e.to_string())
            })?;

        completion
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .filter(|text| !text.trim().is_empty())
            .ok_or(ModelError::Empty)
    }
}
