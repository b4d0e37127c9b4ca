pub mod classifier;
pub mod error;
pub mod external_client;
pub mod llm_client;
pub mod router;
pub mod skills;

pub use classifier::{default_classifier, keyword_matcher, IntentClassifier, IntentMatcher, IntentPrediction};
pub use error::RouterError;
pub use external_client::{ExternalWorkflowClient, HttpWorkflowClient};
pub use llm_client::{truncate_sentence_aware, ChatHistory, ChatMessage, ChatRole, HttpLlmClient, LlmClient};
pub use router::{IntentRouter, IntentRouterConfig};
pub use skills::{GreetingSkill, Skill, SkillRegistry};
