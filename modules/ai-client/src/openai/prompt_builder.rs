use tracing::debug;

use super::types::{ChatRequest, WireMessage};
use super::{Completion, OpenAi, StructuredOutput, TokenUsage};
use crate::error::{AiError, Result};

const DEFAULT_TOKEN_LIMIT: u32 = 4096;

pub struct OpenAiPromptBuilder {
    agent: OpenAi,
    input: String,
    preamble: Option<String>,
    temperature: Option<f32>,
    token_limit: u32,
    schema: Option<(String, serde_json::Value)>,
}

impl OpenAiPromptBuilder {
    pub(crate) fn new(agent: OpenAi, input: String) -> Self {
        Self {
            agent,
            input,
            preamble: None,
            temperature: None,
            token_limit: DEFAULT_TOKEN_LIMIT,
            schema: None,
        }
    }

    pub fn preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = Some(preamble.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn token_limit(mut self, limit: u32) -> Self {
        self.token_limit = limit;
        self
    }

    /// Constrain the response to the JSON schema of `T`.
    pub fn structured<T: StructuredOutput>(self) -> Self {
        self.schema(T::type_name(), T::openai_schema())
    }

    /// Constrain the response to an explicit JSON schema.
    pub fn schema(mut self, name: impl Into<String>, schema: serde_json::Value) -> Self {
        self.schema = Some((name.into(), schema));
        self
    }

    /// Send the prompt. Returns the raw message text; callers decide how to
    /// parse it so a malformed body never loses the token usage.
    pub async fn send(self) -> Result<Completion> {
        let mut request = ChatRequest::new(&self.agent.model).token_limit(self.token_limit);

        if let Some(ref preamble) = self.preamble {
            request = request.message(WireMessage::system(preamble));
        }
        request = request.message(WireMessage::user(&self.input));

        if let Some(temp) = self.temperature {
            request = request.temperature(temp);
        }
        if let Some((name, schema)) = self.schema {
            request = request.json_schema(&name, schema);
        }

        let response = self.agent.client().chat(&request).await?;
        let usage = response
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AiError::EmptyResponse(self.agent.model.clone()))?;

        debug!(
            model = %self.agent.model,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "OpenAI completion received"
        );

        Ok(Completion { content, usage })
    }
}
