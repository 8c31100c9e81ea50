//! Token and cost accounting for LLM calls.

use std::{collections::VecDeque, fmt, sync::Mutex};

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{info, warn};

use crate::llm::{LlmUsage, UsageObserver};

const HISTORY_LIMIT: usize = 100;
const PREVIEW_CHARS: usize = 100;

struct ModelPricing {
    model: &'static str,
    /// USD per 1k prompt tokens.
    input: f64,
    /// USD per 1k completion tokens.
    output: f64,
}

const PRICING: &[ModelPricing] = &[
    ModelPricing {
        model: "gpt-4o",
        input: 0.0025,
        output: 0.01,
    },
    ModelPricing {
        model: "gpt-4o-mini",
        input: 0.00015,
        output: 0.0006,
    },
    ModelPricing {
        model: "gpt-4",
        input: 0.03,
        output: 0.06,
    },
    ModelPricing {
        model: "gpt-3.5-turbo",
        input: 0.001,
        output: 0.002,
    },
];

const EXPENSIVE_MODELS: &[&str] = &["gpt-4", "gpt-4o"];
const CHEAP_MODELS: &[&str] = &["gpt-4o-mini", "gpt-3.5-turbo"];

/// Cost in USD, or 0 for models without a known price.
pub fn calculate_cost(model: &str, prompt_tokens: u64, completion_tokens: u64) -> f64 {
    let Some(pricing) = PRICING.iter().find(|p| p.model == model) else {
        warn!(model, "unknown model, cost not tracked");
        return 0.0;
    };
    prompt_tokens as f64 / 1000.0 * pricing.input
        + completion_tokens as f64 / 1000.0 * pricing.output
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    pub timestamp: DateTime<Local>,
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cost: f64,
    pub prompt_preview: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenStats {
    pub total_calls: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub average_tokens_per_call: f64,
    pub call_history: VecDeque<CallRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EfficiencyRating {
    NoData,
    Good,
    Fair,
    NeedsOptimisation,
}

impl fmt::Display for EfficiencyRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EfficiencyRating::NoData => "no data",
            EfficiencyRating::Good => "good",
            EfficiencyRating::Fair => "fair",
            EfficiencyRating::NeedsOptimisation => "needs optimisation",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone)]
pub struct EfficiencyAnalysis {
    pub rating: EfficiencyRating,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Per-run usage accumulator handed to the LLM client as its observer.
#[derive(Default)]
pub struct TokenMonitor {
    stats: Mutex<TokenStats>,
}

fn preview(prompt: &str) -> String {
    let mut out: String = prompt.chars().take(PREVIEW_CHARS).collect();
    if prompt.chars().count() > PREVIEW_CHARS {
        out.push_str("...");
    }
    out
}

impl TokenMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> TokenStats {
        self.stats.lock().expect("TokenMonitor poisoned").clone()
    }

    pub fn reset(&self) {
        *self.stats.lock().expect("TokenMonitor poisoned") = TokenStats::default();
        info!("token statistics reset");
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.snapshot())
    }

    fn record_at(&self, usage: &LlmUsage, prompt: &str, timestamp: DateTime<Local>) {
        let mut stats = self.stats.lock().expect("TokenMonitor poisoned");
        stats.total_calls += 1;
        stats.total_tokens += usage.total_tokens;
        stats.total_cost += usage.cost;
        stats.average_tokens_per_call = stats.total_tokens as f64 / stats.total_calls as f64;

        stats.call_history.push_back(CallRecord {
            timestamp,
            model: usage.model.clone(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            cost: usage.cost,
            prompt_preview: preview(prompt),
        });
        while stats.call_history.len() > HISTORY_LIMIT {
            stats.call_history.pop_front();
        }

        info!(
            model = %usage.model,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            cost = usage.cost,
            total_calls = stats.total_calls,
            total_tokens = stats.total_tokens,
            "llm call recorded"
        );
    }

    /// Human-readable totals plus the five most recent calls.
    pub fn report(&self) -> String {
        let stats = self.snapshot();
        if stats.total_calls == 0 {
            return "No token usage recorded".to_string();
        }

        let mut output = String::new();
        output.push_str("Token usage report\n");
        output.push_str(&"=".repeat(50));
        output.push('\n');
        output.push_str(&format!("Total calls: {}\n", stats.total_calls));
        output.push_str(&format!("Total tokens: {}\n", stats.total_tokens));
        output.push_str(&format!("Total cost: ${:.4} USD\n", stats.total_cost));
        output.push_str(&format!(
            "Average per call: {} tokens\n\n",
            stats.average_tokens_per_call.round()
        ));
        output.push_str("Recent calls:\n---\n");

        for (i, call) in stats.call_history.iter().rev().take(5).enumerate() {
            output.push_str(&format!(
                "{}. [{}] {}\n",
                i + 1,
                call.timestamp.format("%H:%M:%S"),
                call.model
            ));
            output.push_str(&format!(
                "   Tokens: {}+{}={}\n",
                call.prompt_tokens, call.completion_tokens, call.total_tokens
            ));
            output.push_str(&format!("   Cost: ${:.6}\n", call.cost));
            output.push_str(&format!("   Prompt: {}\n\n", call.prompt_preview));
        }

        output
    }

    pub fn efficiency_analysis(&self) -> EfficiencyAnalysis {
        let stats = self.snapshot();
        let mut warnings = Vec::new();
        let mut recommendations = Vec::new();

        if stats.total_calls == 0 {
            return EfficiencyAnalysis {
                rating: EfficiencyRating::NoData,
                warnings,
                recommendations: vec![
                    "Analysis becomes available once LLM calls have been made".to_string(),
                ],
            };
        }

        let mut rating = EfficiencyRating::Good;
        let avg_tokens = stats.average_tokens_per_call;
        if avg_tokens > 8000.0 {
            rating = EfficiencyRating::NeedsOptimisation;
            warnings.push("Average tokens per call is high, consider shorter prompts".to_string());
            recommendations.push("Process long texts in smaller segments".to_string());
            recommendations.push("Use a cheaper model such as gpt-4o-mini for simple tasks".to_string());
        } else if avg_tokens > 4000.0 {
            rating = EfficiencyRating::Fair;
            recommendations.push("Trim unnecessary input from prompts".to_string());
        }

        let avg_cost = stats.total_cost / stats.total_calls as f64;
        if avg_cost > 0.1 {
            warnings.push("Average cost per call is high, consider a cheaper model".to_string());
            recommendations.push("Use gpt-4o-mini for simple tasks".to_string());
        }

        if stats.call_history.len() >= 10 {
            let recent: Vec<&CallRecord> = stats.call_history.iter().rev().take(10).collect();
            let span = recent[0].timestamp - recent[recent.len() - 1].timestamp;
            let minutes = span.num_milliseconds() as f64 / 60_000.0;
            let calls_per_minute = if minutes > 0.0 {
                recent.len() as f64 / minutes
            } else {
                f64::INFINITY
            };
            if calls_per_minute > 10.0 {
                warnings.push("Call rate is high, watch the provider's rate limits".to_string());
                recommendations.push("Cache results locally to avoid repeated calls".to_string());
            }
        }

        let count_in = |models: &[&str]| {
            stats
                .call_history
                .iter()
                .filter(|call| models.contains(&call.model.as_str()))
                .count()
        };
        if count_in(EXPENSIVE_MODELS) > count_in(CHEAP_MODELS) * 2 {
            recommendations.push("Route more simple tasks to an economical model".to_string());
        }

        EfficiencyAnalysis {
            rating,
            warnings,
            recommendations,
        }
    }
}

impl UsageObserver for TokenMonitor {
    fn record(&self, usage: &LlmUsage, prompt: &str) {
        self.record_at(usage, prompt, Local::now());
    }
}
