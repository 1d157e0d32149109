use carline_core::domain::{user_text, Intent, Message};

pub const RENTAL_KEYWORDS: &[&str] = &[
    "השכרה",
    "להשכיר",
    "לשכור",
    "rental",
    "rent",
    "השכר",
    "לתקופה",
    "לכמה ימים",
    "לשבוע",
    "לחודש",
    "זמני",
    "קצר טווח",
];

pub const SALES_KEYWORDS: &[&str] = &[
    "לקנות",
    "קניה",
    "מכירה",
    "רכישה",
    "purchase",
    "buy",
    "sale",
    "יד ראשונה",
    "זירו קמ",
    "ליסינג",
    "מימון",
    "תשלומים",
    "לרכוש",
    "בעלות",
    "קבע",
    "ארוך טווח",
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IntentScore {
    pub rental: usize,
    pub sales: usize,
}

impl IntentScore {
    pub fn intent(&self) -> Intent {
        match self.rental.cmp(&self.sales) {
            std::cmp::Ordering::Greater => Intent::Rental,
            std::cmp::Ordering::Less => Intent::Sales,
            std::cmp::Ordering::Equal => Intent::Unknown,
        }
    }
}

pub trait IntentClassifier: Send + Sync {
    fn score(&self, history: &[Message]) -> IntentScore;

    fn classify(&self, history: &[Message]) -> Intent {
        self.score(history).intent()
    }
}

/// Counts how many distinct rental and sales keywords occur in the user turns.
#[derive(Clone, Debug, Default)]
pub struct KeywordIntentClassifier;

impl KeywordIntentClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl IntentClassifier for KeywordIntentClassifier {
    fn score(&self, history: &[Message]) -> IntentScore {
        let text = user_text(history).to_lowercase();
        IntentScore {
            rental: keyword_hits(&text, RENTAL_KEYWORDS),
            sales: keyword_hits(&text, SALES_KEYWORDS),
        }
    }
}

pub(crate) fn keyword_hits(text: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|keyword| text.contains(&keyword.to_lowercase())).count()
}

#[cfg(test)]
mod tests {
    use carline_core::domain::{Intent, Message};

    use super::{IntentClassifier, IntentScore, KeywordIntentClassifier};

    fn classify(turns: &[&str]) -> Intent {
        let history: Vec<Message> = turns.iter().map(|turn| Message::user(*turn)).collect();
        KeywordIntentClassifier::new().classify(&history)
    }

    #[test]
    fn rental_phrasing_wins() {
        assert_eq!(classify(&["אני רוצה להשכיר רכב לשבוע"]), Intent::Rental);
        assert_eq!(classify(&["I need a RENTAL for the weekend"]), Intent::Rental);
    }

    #[test]
    fn sales_phrasing_wins() {
        assert_eq!(classify(&["מעוניין לקנות רכב יד ראשונה"]), Intent::Sales);
        assert_eq!(classify(&["looking to buy"]), Intent::Sales);
    }

    #[test]
    fn ties_and_silence_are_unknown() {
        assert_eq!(classify(&[]), Intent::Unknown);
        assert_eq!(classify(&["שלום"]), Intent::Unknown);
        assert_eq!(classify(&["לשכור או לקנות?"]), Intent::Unknown);
    }

    #[test]
    fn only_user_turns_are_scored() {
        let history = vec![
            Message::user("שלום"),
            Message::assistant("רוצה לקנות או להשכיר? ליסינג?"),
            Message::user("להשכיר"),
        ];
        let score = KeywordIntentClassifier::new().score(&history);
        assert_eq!(score, IntentScore { rental: 2, sales: 0 });
        assert_eq!(score.intent(), Intent::Rental);
    }

    #[test]
    fn repeated_keyword_counts_once() {
        // "להשכיר" also contains "השכר".
        let history = vec![Message::user("לקנות לקנות לקנות"), Message::user("להשכיר לשבוע")];
        let score = KeywordIntentClassifier::new().score(&history);
        assert_eq!(score.sales, 1);
        assert_eq!(score.rental, 3);
    }

    #[test]
    fn classification_is_deterministic() {
        let history = vec![Message::user("ליסינג לשנתיים, מימון")];
        let classifier = KeywordIntentClassifier::new();
        let first = classifier.classify(&history);
        for _ in 0..10 {
            assert_eq!(classifier.classify(&history), first);
        }
        assert_eq!(first, Intent::Sales);
    }
}
