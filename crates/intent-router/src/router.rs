use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::classifier::IntentClassifier;
use crate::external_client::ExternalWorkflowClient;
use crate::llm_client::{truncate_sentence_aware, ChatHistory, LlmClient};
use crate::skills::SkillRegistry;

#[derive(Debug, Clone)]
pub struct IntentRouterConfig {
    /// Intent name that gates the external workflow call (§4.12 step 2).
    pub external_intent_name: String,
    pub reply_max_chars: usize,
    pub llm_system_prompt: String,
    pub llm_history_turns: usize,
    pub no_answer_message: String,
}

impl Default for IntentRouterConfig {
    fn default() -> Self {
        Self {
            external_intent_name: "external_request".to_string(),
            reply_max_chars: 400,
            llm_system_prompt: "You are a concise voice assistant.".to_string(),
            llm_history_turns: 6,
            no_answer_message: "I don't have an answer for that yet.".to_string(),
        }
    }
}

/// Ties the classifier, skill registry, external workflow client, and local
/// LLM client into the five-step routing contract (§4.12).
pub struct IntentRouter {
    classifier: IntentClassifier,
    skills: SkillRegistry,
    external_client: Option<Arc<dyn ExternalWorkflowClient>>,
    llm_client: Option<Arc<dyn LlmClient>>,
    config: IntentRouterConfig,
    history: Mutex<ChatHistory>,
}

impl IntentRouter {
    pub fn new(
        classifier: IntentClassifier,
        skills: SkillRegistry,
        external_client: Option<Arc<dyn ExternalWorkflowClient>>,
        llm_client: Option<Arc<dyn LlmClient>>,
        config: IntentRouterConfig,
    ) -> Self {
        let history = ChatHistory::new(config.llm_system_prompt.clone(), config.llm_history_turns);
        Self {
            classifier,
            skills,
            external_client,
            llm_client,
            config,
            history: Mutex::new(history),
        }
    }

    pub async fn route(&self, transcript: &str) -> String {
        let sanitized = voice_registry::pre_clean_for_tts(transcript);
        let prediction = self.classifier.classify(&sanitized);

        if prediction.intent == self.config.external_intent_name {
            if let Some(client) = &self.external_client {
                match client.call(&sanitized).await {
                    Ok(reply) => return reply,
                    Err(e) => warn!(error = %e, "external workflow call failed, falling through"),
                }
            }
        }

        if let Some(skill) = self.skills.find(&prediction.intent, &sanitized) {
            return skill.handle(&sanitized);
        }

        if let Some(llm) = &self.llm_client {
            let history_snapshot = self.history.lock().clone();
            match llm.chat(&history_snapshot, &sanitized).await {
                Ok(reply) => {
                    let capped = truncate_sentence_aware(&reply, self.config.reply_max_chars);
                    self.history.lock().push(sanitized, capped.clone());
                    return capped;
                }
                Err(e) => warn!(error = %e, "llm chat call failed, no further fallback"),
            }
        }

        self.config.no_answer_message.clone()
    }
}
