//! Cost calculation from token usage.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`PriceTable`] | `(provider, model)` prices, built in or loaded from YAML |
//! | [`ModelPricing`] | Pricing information for one model |
//! | [`CostEstimate`] | Cost breakdown for one usage record |
//!
//! ```rust
//! use ai_call::tokens::PriceTable;
//! use ai_call::types::Usage;
//!
//! let table = PriceTable::builtin();
//! let cost = table.cost("openai", "gpt-4o-mini", &Usage::new(1_000, 200));
//! assert!(cost.is_some());
//! assert!(table.cost("openai", "not-a-model", &Usage::new(1, 1)).is_none());
//! ```

mod pricing;

pub use pricing::{CostEstimate, ModelPricing, PriceEntry, PriceTable};
