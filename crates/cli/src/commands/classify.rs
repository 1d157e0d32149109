use carline_agent::intent::{IntentClassifier, KeywordIntentClassifier};
use carline_core::domain::Message;
use serde_json::json;

/// Scores free text with the keyword classifier. Works offline.
pub fn run(text: &str) -> super::CommandResult {
    let history = [Message::user(text)];
    let score = KeywordIntentClassifier::new().score(&history);
    let intent = score.intent();

    super::CommandResult::success_with_data(
        "classify",
        format!("intent resolved to {}", intent.as_str()),
        Some(json!({
            "intent": intent.as_str(),
            "rental_hits": score.rental,
            "sales_hits": score.sales,
        })),
    )
}
