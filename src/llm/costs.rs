//! Static per-model pricing and run-level token accounting.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};

/// USD per million tokens (input, output), matched by model-name prefix.
/// More specific prefixes come first.
const PRICES_PER_MILLION: &[(&str, Decimal, Decimal)] = &[
    ("llama-3.3-70b", dec!(0.59), dec!(0.79)),
    ("llama-3.1-8b", dec!(0.05), dec!(0.08)),
    ("claude-3-5-haiku", dec!(0.80), dec!(4.00)),
    ("claude-haiku", dec!(1.00), dec!(5.00)),
    ("claude-sonnet", dec!(3.00), dec!(15.00)),
    ("claude-opus", dec!(15.00), dec!(75.00)),
    ("gpt-4o-mini", dec!(0.15), dec!(0.60)),
    ("gpt-4o", dec!(2.50), dec!(10.00)),
    ("gpt-4.1-mini", dec!(0.40), dec!(1.60)),
    ("gpt-4.1", dec!(2.00), dec!(8.00)),
];

/// Per-token (input, output) price for `model`, zero when unknown.
pub fn model_cost(model: &str) -> (Decimal, Decimal) {
    let million = dec!(1000000);
    PRICES_PER_MILLION
        .iter()
        .find(|(prefix, _, _)| model.starts_with(prefix))
        .map(|(_, input, output)| (*input / million, *output / million))
        .unwrap_or((Decimal::ZERO, Decimal::ZERO))
}

/// Token usage and estimated cost accumulated over a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageReport {
    pub model: String,
    pub requests: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub estimated_cost_usd: Decimal,
}

/// Provider wrapper that counts tokens for every completed request.
pub struct MeteredProvider {
    inner: Arc<dyn LlmProvider>,
    totals: Mutex<UsageReport>,
}

impl MeteredProvider {
    pub fn new(inner: Arc<dyn LlmProvider>) -> Self {
        let totals = UsageReport {
            model: inner.model_name().to_string(),
            ..UsageReport::default()
        };
        Self {
            inner,
            totals: Mutex::new(totals),
        }
    }

    /// Current totals.
    pub fn snapshot(&self) -> UsageReport {
        self.totals
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn record(&self, response: &CompletionResponse) {
        let (input_price, output_price) = self.inner.cost_per_token();
        let mut totals = self
            .totals
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        totals.requests += 1;
        totals.input_tokens += u64::from(response.input_tokens);
        totals.output_tokens += u64::from(response.output_tokens);
        totals.estimated_cost_usd += input_price * Decimal::from(response.input_tokens)
            + output_price * Decimal::from(response.output_tokens);
    }
}

#[async_trait]
impl LlmProvider for MeteredProvider {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn cost_per_token(&self) -> (Decimal, Decimal) {
        self.inner.cost_per_token()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let response = self.inner.complete(request).await?;
        self.record(&response);
        Ok(response)
    }
}
