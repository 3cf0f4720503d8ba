#![forbid(unsafe_code)]

use crate::{ContractViolation, SchemaVersion, Validate};

pub const QUESTION_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 6;
pub const MAX_PROMPT_LEN: usize = 512;
pub const MAX_OPTION_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionCard {
    pub schema_version: SchemaVersion,
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_choice: u8,
}

impl QuestionCard {
    pub fn v1(
        prompt: impl Into<String>,
        options: Vec<String>,
        correct_choice: u8,
    ) -> Result<Self, ContractViolation> {
        let card = Self {
            schema_version: QUESTION_CONTRACT_VERSION,
            prompt: prompt.into(),
            options,
            correct_choice,
        };
        card.validate()?;
        Ok(card)
    }

    pub fn has_choice(&self, choice: u8) -> bool {
        usize::from(choice) < self.options.len()
    }
}

impl Validate for QuestionCard {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != QUESTION_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "question_card.schema_version",
                reason: "must match QUESTION_CONTRACT_VERSION",
            });
        }
        if self.prompt.trim().is_empty() || self.prompt.len() > MAX_PROMPT_LEN {
            return Err(ContractViolation::InvalidValue {
                field: "question_card.prompt",
                reason: "must be non-empty and <= 512 chars",
            });
        }
        if !(MIN_OPTIONS..=MAX_OPTIONS).contains(&self.options.len()) {
            return Err(ContractViolation::InvalidRange {
                field: "question_card.options",
                min: MIN_OPTIONS as f64,
                max: MAX_OPTIONS as f64,
                got: self.options.len() as f64,
            });
        }
        if self
            .options
            .iter()
            .any(|o| o.trim().is_empty() || o.len() > MAX_OPTION_LEN)
        {
            return Err(ContractViolation::InvalidValue {
                field: "question_card.options",
                reason: "each option must be non-empty and <= 128 chars",
            });
        }
        if !self.has_choice(self.correct_choice) {
            return Err(ContractViolation::InvalidValue {
                field: "question_card.correct_choice",
                reason: "must index into options",
            });
        }
        Ok(())
    }
}

/// Ordered question set; round `i` asks card `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionBank {
    cards: Vec<QuestionCard>,
}

impl QuestionBank {
    pub fn v1(cards: Vec<QuestionCard>) -> Result<Self, ContractViolation> {
        let bank = Self { cards };
        bank.validate()?;
        Ok(bank)
    }

    pub fn mvp_default() -> Self {
        let card = |prompt: &str, options: [&str; 4], correct: u8| QuestionCard {
            schema_version: QUESTION_CONTRACT_VERSION,
            prompt: prompt.to_string(),
            options: options.iter().map(|o| o.to_string()).collect(),
            correct_choice: correct,
        };
        Self {
            cards: vec![
                card(
                    "WHICH DATA STRUCTURE GIVES O(1) AVERAGE LOOKUP BY KEY?",
                    ["LINKED LIST", "HASH MAP", "BINARY HEAP", "STACK"],
                    1,
                ),
                card(
                    "HOW MANY MILLISECONDS ARE IN ONE MINUTE?",
                    ["1,000", "6,000", "60,000", "3,600,000"],
                    2,
                ),
                card(
                    "WHAT DOES A LEDGER TIMESTAMP ANCHOR IN THIS GAME?",
                    ["THE ROUND CLOCK", "THE AVATAR", "THE WALLET", "THE THEME"],
                    0,
                ),
            ],
        }
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn card_for_round(&self, round_index: u32) -> Option<&QuestionCard> {
        self.cards.get(usize::try_from(round_index).ok()?)
    }

    pub fn round_count(&self) -> u32 {
        u32::try_from(self.cards.len()).unwrap_or(u32::MAX)
    }
}

impl Validate for QuestionBank {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.cards.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "question_bank.cards",
                reason: "must not be empty",
            });
        }
        for c in &self.cards {
            c.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_question_01_default_bank_validates() {
        let bank = QuestionBank::mvp_default();
        assert!(bank.validate().is_ok());
        assert_eq!(bank.round_count(), 3);
        assert!(bank.card_for_round(3).is_none());
    }

    #[test]
    fn at_question_02_correct_choice_must_index_options() {
        let err = QuestionCard::v1("Q?", vec!["a".to_string(), "b".to_string()], 2);
        assert!(err.is_err());
    }
}
