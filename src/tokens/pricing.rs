//! Model pricing and cost estimation.
//!
//! Prices are USD per one million tokens, keyed by provider and model name.

use crate::types::Usage;
use crate::{Error, ErrorContext, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceEntry {
    /// USD per 1M input tokens.
    pub input: f64,
    /// USD per 1M output tokens.
    pub output: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub provider: String,
    pub model: String,
    pub input_cost_per_1m: f64,
    pub output_cost_per_1m: f64,
    pub currency: String,
}

impl ModelPricing {
    pub fn new(provider: &str, model: &str, entry: PriceEntry) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            input_cost_per_1m: entry.input,
            output_cost_per_1m: entry.output,
            currency: "USD".into(),
        }
    }

    pub fn calculate_cost(&self, input_tokens: u64, output_tokens: u64) -> CostEstimate {
        let ic = (input_tokens as f64 / 1_000_000.0) * self.input_cost_per_1m;
        let oc = (output_tokens as f64 / 1_000_000.0) * self.output_cost_per_1m;
        CostEstimate {
            model: self.model.clone(),
            input_tokens,
            output_tokens,
            input_cost: ic,
            output_cost: oc,
            total_cost: ic + oc,
            currency: self.currency.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostEstimate {
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
    pub currency: String,
}

impl CostEstimate {
    pub fn format(&self) -> String {
        format!("{} {:.6}", self.currency, self.total_cost)
    }

    pub fn format_detailed(&self) -> String {
        if self.total_cost < 0.01 {
            format!("{:.4}¢", self.total_cost * 100.0)
        } else {
            format!("${:.4}", self.total_cost)
        }
    }
}

/// Immutable `(provider, model) → price` table handed to every response.
///
/// YAML overlays use the same shape as the serialized table:
///
/// ```yaml
/// openai:
///   gpt-4o: { input: 2.5, output: 10.0 }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceTable {
    providers: BTreeMap<String, BTreeMap<String, PriceEntry>>,
}

/// Release suffixes that keep a listed model's price: dates, `-001` style
/// revisions, and `-latest`.
static RELEASE_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:-\d{4}-?\d{2}-?\d{2}|-\d{3}|-latest)$").expect("valid suffix regex")
});

static BUILTIN: Lazy<Arc<PriceTable>> = Lazy::new(|| Arc::new(PriceTable::builtin_table()));

const BUILTIN_PRICES: &[(&str, &str, f64, f64)] = &[
    ("openai", "gpt-4o", 2.5, 10.0),
    ("openai", "gpt-4o-mini", 0.15, 0.6),
    ("openai", "gpt-4-turbo", 10.0, 30.0),
    ("openai", "gpt-4", 30.0, 60.0),
    ("openai", "gpt-3.5-turbo", 0.5, 1.5),
    ("anthropic", "claude-3-5-sonnet", 3.0, 15.0),
    ("anthropic", "claude-3-opus", 15.0, 75.0),
    ("anthropic", "claude-3-sonnet", 3.0, 15.0),
    ("anthropic", "claude-3-haiku", 0.25, 1.25),
    ("gemini", "gemini-1.5-flash", 0.075, 0.3),
    ("gemini", "gemini-1.5-pro", 1.25, 5.0),
    ("gemini", "gemini-1.0-pro", 0.5, 1.5),
    ("vertex", "gemini-1.5-flash", 0.075, 0.3),
    ("vertex", "gemini-1.5-pro", 1.25, 5.0),
    ("cohere", "command-r-plus", 3.0, 15.0),
    ("cohere", "command-r", 0.5, 1.5),
    ("groq", "llama3-70b-8192", 0.59, 0.79),
    ("groq", "llama3-8b-8192", 0.05, 0.08),
    ("groq", "mixtral-8x7b-32768", 0.24, 0.24),
    ("groq", "gemma-7b-it", 0.07, 0.07),
];

impl PriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the built-in table.
    pub fn builtin() -> Arc<PriceTable> {
        BUILTIN.clone()
    }

    fn builtin_table() -> Self {
        let mut table = Self::new();
        for (provider, model, input, output) in BUILTIN_PRICES {
            table.insert(provider, model, PriceEntry { input: *input, output: *output });
        }
        table
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid price table: {}", e),
                ErrorContext::new().with_source("price_table"),
            )
        })
    }

    pub fn insert(&mut self, provider: &str, model: &str, entry: PriceEntry) {
        self.providers
            .entry(provider.to_string())
            .or_default()
            .insert(model.to_string(), entry);
    }

    /// Entries of `overlay` replace entries of `self` with the same key.
    pub fn merge(mut self, overlay: &PriceTable) -> Self {
        for (provider, models) in &overlay.providers {
            for (model, entry) in models {
                self.insert(provider, model, *entry);
            }
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.providers.values().all(BTreeMap::is_empty)
    }

    fn lookup_in(&self, provider: &str, model: &str) -> Option<ModelPricing> {
        let models = self.providers.get(provider)?;
        if let Some(entry) = models.get(model) {
            return Some(ModelPricing::new(provider, model, *entry));
        }
        // `claude-3-haiku-20240307` prices as `claude-3-haiku`; `gpt-4.1-nano` is not `gpt-4`.
        models
            .iter()
            .filter(|(name, _)| {
                model
                    .strip_prefix(name.as_str())
                    .is_some_and(|rest| RELEASE_SUFFIX.is_match(rest))
            })
            .max_by_key(|(name, _)| name.len())
            .map(|(name, entry)| ModelPricing::new(provider, name, *entry))
    }

    pub fn lookup(&self, provider: &str, model: &str) -> Option<ModelPricing> {
        if let Some(found) = self.lookup_in(provider, model) {
            return Some(found);
        }
        match provider {
            "vertex" => self.lookup_in("gemini", model),
            // LiteLLM routes to any provider; model names may carry a `provider/` prefix.
            "litellm" => {
                let (hint, bare) = match model.split_once('/') {
                    Some((hint, bare)) => (Some(hint), bare),
                    None => (None, model),
                };
                hint.and_then(|h| self.lookup_in(h, bare)).or_else(|| {
                    self.providers
                        .keys()
                        .find_map(|p| self.lookup_in(p, bare))
                })
            }
            _ => None,
        }
    }

    /// Cost in USD, or `None` when the model is unknown.
    pub fn cost(&self, provider: &str, model: &str, usage: &Usage) -> Option<f64> {
        self.lookup(provider, model)
            .map(|p| p.calculate_cost(usage.input_tokens, usage.output_tokens).total_cost)
    }
}
