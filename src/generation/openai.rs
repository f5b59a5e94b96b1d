//! OpenAI-compatible chat completions client.

use super::{Generation, GenerationError, Generator, Prompt};
use crate::config::GenerationConfig;
use crate::http;
use crate::retrieval::SourceCitation;
use crate::tokens;
use reqwest::blocking::Client;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Blocking chat client; one request per answer, no streaming.
pub struct OpenAiGenerator {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiGenerator {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: String,
        temperature: f32,
        max_tokens: u32,
        timeout: Duration,
    ) -> crate::error::Result<Self> {
        let auth = format!("Bearer {}", api_key.trim());
        let client = http::json_client(&[(AUTHORIZATION, auth.as_str())], timeout, "OpenAI")?;
        Ok(Self {
            client,
            endpoint: http::endpoint(base_url, "chat/completions"),
            model,
            temperature,
            max_tokens,
        })
    }

    pub fn from_config(config: &GenerationConfig) -> crate::error::Result<Self> {
        let api_key = http::api_key_from_env(&config.api_key_env)?;
        Self::new(
            &api_key,
            &config.base_url,
            config.model.clone(),
            config.temperature,
            config.max_tokens,
            Duration::from_secs(config.timeout_secs),
        )
    }
}

impl Generator for OpenAiGenerator {
    fn generate(
        &self,
        prompt: &Prompt,
        _sources: &[SourceCitation],
    ) -> Result<Generation, GenerationError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(GenerationError::RateLimited);
        }
        if !resp.status().is_success() {
            let (status, body) = http::failure_body(resp);
            return Err(GenerationError::Service { status, body });
        }

        let parsed: ChatResponse = resp
            .json()
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;
        parsed.into_generation(prompt)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
}

impl ChatResponse {
    fn into_generation(self, prompt: &Prompt) -> Result<Generation, GenerationError> {
        let text = self
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(GenerationError::EmptyAnswer)?;

        let (input_tokens, output_tokens) = match self.usage {
            Some(usage) => (usage.prompt_tokens, usage.completion_tokens),
            None => (
                tokens::count(&prompt.system) + tokens::count(&prompt.user),
                tokens::count(&text),
            ),
        };

        Ok(Generation {
            text,
            input_tokens,
            output_tokens,
        })
    }
}
