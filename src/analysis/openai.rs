//! Chat-completion based extraction service.

use super::{parse_candidates, Analyzer, TopicCandidate};
use crate::config::Prompts;
use crate::error::{PodsiftError, Result};
use crate::feed::Item;
use crate::transcription::Transcript;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, info, instrument};

/// Finds future-episode suggestions with an OpenAI chat model.
pub struct OpenAiAnalyzer {
    client: Client<OpenAIConfig>,
    model: String,
    prompts: Prompts,
}

impl OpenAiAnalyzer {
    pub fn new(client: Client<OpenAIConfig>, model: &str, prompts: Prompts) -> Self {
        Self {
            client,
            model: model.to_string(),
            prompts,
        }
    }

    fn build_messages(&self, item: &Item, transcript: &Transcript) -> Result<Vec<ChatCompletionRequestMessage>> {
        let mut vars = HashMap::new();
        vars.insert("title".to_string(), item.title.clone());
        vars.insert("transcript".to_string(), transcript.format_with_timestamps());
        if !self.prompts.variables.contains_key("podcast") {
            vars.insert("podcast".to_string(), "this show".to_string());
        }

        let system_message = self.prompts.render_with_custom(&self.prompts.analysis.system, &vars);
        let user_message = self.prompts.render_with_custom(&self.prompts.analysis.user, &vars);

        Ok(vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system_message)
                .build()
                .map_err(|e| PodsiftError::InvalidInput(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_message)
                .build()
                .map_err(|e| PodsiftError::InvalidInput(e.to_string()))?
                .into(),
        ])
    }
}

#[async_trait]
impl Analyzer for OpenAiAnalyzer {
    #[instrument(skip(self, transcript), fields(item_id = %item.id))]
    async fn extract(&self, item: &Item, transcript: &Transcript) -> Result<Vec<TopicCandidate>> {
        info!("Analyzing transcript with {}", self.model);

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(self.build_messages(item, transcript)?)
            .temperature(0.2)
            .max_completion_tokens(4000u32)
            .build()
            .map_err(|e| PodsiftError::InvalidInput(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| PodsiftError::OpenAI(format!("Failed to get analysis response: {}", e)))?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .ok_or_else(|| PodsiftError::MalformedResponse("Empty response from LLM".to_string()))?;

        debug!("Analysis response: {}", content.chars().take(500).collect::<String>());

        let candidates = parse_candidates(content)?;
        info!("Found {} candidate(s)", candidates.len());
        Ok(candidates)
    }
}
