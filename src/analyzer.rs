use crate::analysis::{Analysis, extract_json, filter_items};
use crate::error::{Error, Result};
use crate::llm::LlmClient;
use crate::profile::UserProfile;
use crate::prompt::build_messages;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

/// Meal analysis over the shared LLM client
pub struct MealAnalyzer {
    llm: Arc<LlmClient>,
}

impl MealAnalyzer {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn analyze(&self, meal: &str, profile: &UserProfile) -> Result<Analysis> {
        let meal = meal.trim();
        if meal.is_empty() {
            return Err(Error::InvalidRequest("meal description is empty".into()));
        }

        let messages = build_messages(meal, profile);
        let completion = self.llm.chat(&messages, self.llm.default_options()).await?;

        let mut parsed = extract_json(&completion.content);
        let removed_items = filter_items(&mut parsed, &profile.restrictions);
        if !removed_items.is_empty() {
            info!(
                "Removed {} item(s) conflicting with dietary restrictions",
                removed_items.len()
            );
        }

        Ok(Analysis {
            parsed,
            removed_items,
            raw: completion.content,
            usage: completion.usage,
            analyzed_at: Utc::now(),
        })
    }
}
