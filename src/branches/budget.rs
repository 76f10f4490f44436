//! Token counting for model prompts.

use anyhow::{Context, Result};
use tiktoken_rs::CoreBPE;

use crate::errors::BranchError;

/// Counts tokens with the model's BPE, falling back to `cl100k_base` for
/// models the tokenizer tables do not know (local and prefixed models).
pub struct TokenBudgeter {
    bpe: CoreBPE,
}

impl TokenBudgeter {
    pub fn for_model(model: &str) -> Result<Self> {
        let bpe = match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => bpe,
            Err(_) => {
                tracing::debug!(model, "No tokenizer for model, using cl100k_base");
                tiktoken_rs::cl100k_base().context("Failed to load cl100k_base tokenizer")?
            }
        };
        Ok(Self { bpe })
    }

    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    /// Token count of `text`, or `TokenBudgetExceeded` when it is over `budget`.
    pub fn ensure_within_budget(
        &self,
        branch: &str,
        text: &str,
        budget: usize,
    ) -> Result<usize, BranchError> {
        let tokens = self.count(text);
        if tokens > budget {
            return Err(BranchError::TokenBudgetExceeded {
                branch: branch.to_string(),
                tokens,
                budget,
            });
        }
        Ok(tokens)
    }
}

impl std::fmt::Debug for TokenBudgeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBudgeter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_model_falls_back_to_cl100k() {
        let budgeter = TokenBudgeter::for_model("lm_studio/qwen2.5-coder").unwrap();
        assert!(budgeter.count("hello world") > 0);
        assert_eq!(budgeter.count(""), 0);
    }

    #[test]
    fn test_budget_enforced() {
        let budgeter = TokenBudgeter::for_model("gpt-4o-mini").unwrap();
        let text = "word ".repeat(50);
        let tokens = budgeter.ensure_within_budget("security", &text, 1_000).unwrap();
        assert!(tokens >= 50);

        let err = budgeter.ensure_within_budget("security", &text, 10).unwrap_err();
        assert!(matches!(
            &err,
            BranchError::TokenBudgetExceeded { branch, budget: 10, .. } if branch == "security"
        ));
        assert!(err.to_string().contains("> 10"));
    }
}
