use std::sync::Arc;

use async_trait::async_trait;
use carline_core::config::CompletionStrategy;
use carline_core::domain::{user_text, Message};

use crate::intent::keyword_hits;
use crate::llm::{LlmClient, LlmError};

pub const SALES_BUDGET_KEYWORDS: &[&str] =
    &["תקציב", "מחיר", "₪", "שקל", "אלף", "budget", "עד", "בסביבות", "כ-"];

pub const SALES_CAR_TYPE_KEYWORDS: &[&str] = &[
    "משפחתי",
    "suv",
    "יוקרה",
    "קטן",
    "היברידי",
    "חסכוני",
    "כלכלי",
    "חדש",
    "יד ראשונה",
    "ליסינג",
    "רכב",
    "אוטו",
    "משפחה",
];

pub const RENTAL_DATE_KEYWORDS: &[&str] = &["/", "תאריך", "date"];
pub const RENTAL_TIME_KEYWORDS: &[&str] = &[":", "שעה", "בשעה", "time"];
pub const RENTAL_BRANCH_KEYWORDS: &[&str] = &["סניף", "branch", "נתב\"ג", "שדה תעופה"];

pub const RENTAL_CHECKLIST: &str = "pickup date (DD/MM/YYYY), pickup time (HH:MM), return date (DD/MM/YYYY), return time (HH:MM), pickup branch ID, return branch ID";
pub const SALES_CHECKLIST: &str =
    "budget range and car type preference (family/SUV/economical/luxury)";

/// Decides whether the user has supplied every required slot.
#[async_trait]
pub trait CompletionOracle: Send + Sync {
    fn strategy(&self) -> CompletionStrategy;

    async fn is_complete(&self, history: &[Message]) -> Result<bool, LlmError>;
}

/// Complete when every keyword group has at least one hit in the user turns.
#[derive(Clone, Debug)]
pub struct KeywordConjunctionOracle {
    groups: Vec<&'static [&'static str]>,
}

impl KeywordConjunctionOracle {
    pub fn new(groups: Vec<&'static [&'static str]>) -> Self {
        Self { groups }
    }

    pub fn sales() -> Self {
        Self::new(vec![SALES_BUDGET_KEYWORDS, SALES_CAR_TYPE_KEYWORDS])
    }

    pub fn rental() -> Self {
        Self::new(vec![RENTAL_DATE_KEYWORDS, RENTAL_TIME_KEYWORDS, RENTAL_BRANCH_KEYWORDS])
    }

    pub fn matches(&self, history: &[Message]) -> bool {
        let text = user_text(history).to_lowercase();
        !self.groups.is_empty() && self.groups.iter().all(|group| keyword_hits(&text, group) > 0)
    }
}

#[async_trait]
impl CompletionOracle for KeywordConjunctionOracle {
    fn strategy(&self) -> CompletionStrategy {
        CompletionStrategy::Keyword
    }

    async fn is_complete(&self, history: &[Message]) -> Result<bool, LlmError> {
        Ok(self.matches(history))
    }
}

/// Asks the text generator to judge the user turns against a literal checklist.
pub struct SemanticOracle {
    llm: Arc<dyn LlmClient>,
    checklist: String,
}

impl SemanticOracle {
    pub fn new(llm: Arc<dyn LlmClient>, checklist: impl Into<String>) -> Self {
        Self { llm, checklist: checklist.into() }
    }

    pub fn rental(llm: Arc<dyn LlmClient>) -> Self {
        Self::new(llm, RENTAL_CHECKLIST)
    }

    pub fn sales(llm: Arc<dyn LlmClient>) -> Self {
        Self::new(llm, SALES_CHECKLIST)
    }

    pub fn prompt(&self, user_text: &str) -> String {
        format!(
            "Decide whether ALL of the following information is present in the user messages.\n\
             Required info: {}\n\
             User messages:\n{}\n\n\
             Answer with exactly one word: true or false.",
            self.checklist, user_text
        )
    }
}

#[async_trait]
impl CompletionOracle for SemanticOracle {
    fn strategy(&self) -> CompletionStrategy {
        CompletionStrategy::Semantic
    }

    async fn is_complete(&self, history: &[Message]) -> Result<bool, LlmError> {
        let text = user_text(history);
        if text.trim().is_empty() {
            return Ok(false);
        }
        let verdict = self.llm.complete(&self.prompt(&text)).await?;
        Ok(parse_verdict(&verdict))
    }
}

/// Earliest whole-word `true`/`false`, case-insensitive. Anything else is `false`.
pub fn parse_verdict(text: &str) -> bool {
    text.split(|ch: char| !ch.is_alphanumeric())
        .map(str::to_ascii_lowercase)
        .find_map(|token| match token.as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        })
        .unwrap_or(false)
}

pub fn oracle_for(
    strategy: CompletionStrategy,
    keyword: KeywordConjunctionOracle,
    semantic: SemanticOracle,
) -> Arc<dyn CompletionOracle> {
    match strategy {
        CompletionStrategy::Keyword => Arc::new(keyword),
        CompletionStrategy::Semantic => Arc::new(semantic),
    }
}
