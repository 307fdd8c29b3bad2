//! Deterministic transaction classification.
//!
//! Rules are tried in order and the first match wins. Matching is
//! case-insensitive: `contains` rules look for a substring anywhere in the
//! description, `prefix` rules require the description to start with the
//! pattern's words. Nothing matched means `unclassified`.

use reckon_core::{ClassifierRule, MatchKind, Transaction, TransactionType};

struct CompiledRule {
    needle: String,
    words: Vec<String>,
    kind: MatchKind,
    label: TransactionType,
}

impl CompiledRule {
    fn matches(&self, upper_desc: &str) -> bool {
        match self.kind {
            MatchKind::Contains => upper_desc.contains(&self.needle),
            MatchKind::Prefix => {
                let mut desc_words = upper_desc.split_whitespace();
                !self.words.is_empty()
                    && self
                        .words
                        .iter()
                        .all(|w| desc_words.next().is_some_and(|d| d == w))
            }
        }
    }
}

pub struct Classifier {
    rules: Vec<CompiledRule>,
}

impl Classifier {
    pub fn new(rules: &[ClassifierRule]) -> Self {
        let rules = rules
            .iter()
            .filter(|r| !r.pattern.trim().is_empty())
            .map(|r| {
                let needle = r.pattern.to_uppercase();
                CompiledRule {
                    words: needle.split_whitespace().map(str::to_string).collect(),
                    needle,
                    kind: r.kind,
                    label: TransactionType::new(r.transaction_type.clone()),
                }
            })
            .collect();
        Self { rules }
    }

    pub fn classify(&self, txn: &Transaction) -> TransactionType {
        self.classify_description(&txn.description)
    }

    pub fn classify_description(&self, description: &str) -> TransactionType {
        let upper = description.to_uppercase();
        self.rules
            .iter()
            .find(|r| r.matches(&upper))
            .map(|r| r.label.clone())
            .unwrap_or_default()
    }

    /// Label every transaction in place.
    pub fn apply(&self, txns: &mut [Transaction]) {
        for txn in txns.iter_mut() {
            txn.transaction_type = self.classify(txn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reckon_core::ClassifierConfig;

    fn defaults() -> Classifier {
        Classifier::new(&ClassifierConfig::default().rules)
    }

    #[test]
    fn test_payment_codes() {
        let c = defaults();
        assert_eq!(c.classify_description("DD BRITISH GAS").as_str(), "direct_debit");
        assert_eq!(c.classify_description("vis amazon uk").as_str(), "card_payment");
        assert_eq!(c.classify_description("))) PRET A MANGER").as_str(), "contactless");
        assert_eq!(c.classify_description("CR EMPLOYER LTD").as_str(), "credit");
    }

    #[test]
    fn test_prefix_needs_whole_word() {
        let c = defaults();
        // "CRAFT" starts with "CR" but is not the CR code
        assert!(c.classify_description("CRAFT SUPPLIES").is_unclassified());
        assert_eq!(c.classify_description("DDX LTD").as_str(), TransactionType::UNCLASSIFIED);
    }

    #[test]
    fn test_first_match_wins_on_overlap() {
        let rules = vec![
            ClassifierRule::new("interest", "interest", MatchKind::Contains),
            ClassifierRule::new("interest charge", "fee", MatchKind::Contains),
        ];
        let c = Classifier::new(&rules);
        assert_eq!(c.classify_description("OVERDRAFT INTEREST CHARGE").as_str(), "interest");

        let reversed: Vec<ClassifierRule> = rules.into_iter().rev().collect();
        let c = Classifier::new(&reversed);
        assert_eq!(c.classify_description("OVERDRAFT INTEREST CHARGE").as_str(), "fee");

        // Default order puts the specific rule first
        assert_eq!(defaults().classify_description("INTEREST CHARGE").as_str(), "fee");
        assert_eq!(defaults().classify_description("GROSS INTEREST").as_str(), "interest");
    }

    #[test]
    fn test_multi_word_prefix_and_empty_rules() {
        let c = Classifier::new(&[
            ClassifierRule::new("", "never", MatchKind::Contains),
            ClassifierRule::new("Standing order", "standing_order", MatchKind::Prefix),
        ]);
        assert_eq!(c.classify_description("STANDING  ORDER TO SAVER").as_str(), "standing_order");
        assert!(c.classify_description("ORDER STANDING").is_unclassified());
        assert!(c.classify_description("").is_unclassified());
    }
}
