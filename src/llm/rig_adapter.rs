//! Bridges rig's `CompletionModel` to our `LlmProvider` trait.

use async_trait::async_trait;
use rig::completion::CompletionModel;
use rig::message::{AssistantContent, Message};
use rust_decimal::Decimal;

use crate::error::LlmError;
use crate::llm::costs::model_cost;
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role,
};

/// Adapter over any rig completion model (Anthropic, OpenAI).
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
}

impl<M> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn cost_per_token(&self) -> (Decimal, Decimal) {
        model_cost(&self.model_name)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let preamble = request.system_prompt();
        let prompt = user_prompt(&request);

        let mut builder = self.model.completion_request(Message::user(prompt));
        if let Some(preamble) = preamble {
            builder = builder.preamble(preamble);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(u64::from(max_tokens));
        }

        let response = builder.send().await.map_err(|e| LlmError::RequestFailed {
            provider: self.model_name.clone(),
            reason: e.to_string(),
        })?;

        let content: String = response
            .choice
            .iter()
            .filter_map(|c| match c {
                AssistantContent::Text(text) => Some(text.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        if content.is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.model_name.clone(),
                reason: "completion contained no text".into(),
            });
        }

        let output_tokens = u32::try_from(response.usage.output_tokens).unwrap_or(u32::MAX);
        Ok(CompletionResponse {
            content,
            input_tokens: u32::try_from(response.usage.input_tokens).unwrap_or(u32::MAX),
            output_tokens,
            finish_reason: finish_reason(output_tokens, request.max_tokens),
        })
    }
}

/// rig doesn't surface a provider-neutral stop reason. Reaching the
/// requested token cap is the one case we can tell apart.
fn finish_reason(output_tokens: u32, max_tokens: Option<u32>) -> FinishReason {
    match max_tokens {
        Some(limit) if output_tokens >= limit => FinishReason::Length,
        _ => FinishReason::Unknown,
    }
}

/// Non-system messages flattened into one user prompt.
///
/// Requests are single-turn, so this is normally just the one user message.
fn user_prompt(request: &CompletionRequest) -> String {
    request
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::ChatMessage;

    #[test]
    fn user_prompt_skips_system_messages() {
        let request = CompletionRequest::new(vec![
            ChatMessage::system("be terse"),
            ChatMessage::user("summarize this"),
        ]);
        assert_eq!(user_prompt(&request), "summarize this");
    }

    #[test]
    fn token_cap_reads_as_length() {
        assert_eq!(finish_reason(1024, Some(1024)), FinishReason::Length);
        assert_eq!(finish_reason(310, Some(1024)), FinishReason::Unknown);
        assert_eq!(finish_reason(5000, None), FinishReason::Unknown);
    }
}
