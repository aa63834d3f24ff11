//! Curated pricing overlay.
//!
//! Provider catalogs are sparse about pricing; this offline-curated table
//! corrects them after deduplication without touching the fetch pipeline.
//! Entries are keyed by `(source, id)` with a fallback to the id minus a
//! trailing date suffix, so `claude-sonnet-4-20250514` picks up the
//! `claude-sonnet-4` row.

use std::sync::OnceLock;

use regex::Regex;
use tollgate::pricing::ModelRates;

use crate::model::{ModelInfo, ModelPricing, Source};

/// One curated pricing row. Rates are USD per million tokens, kept as
/// string literals so the table stays readable.
#[derive(Debug, Clone, Copy)]
pub struct CuratedRow {
    /// Source the row applies to.
    pub source: Source,
    /// Model id, without date suffix.
    pub id: &'static str,
    /// USD per million input tokens.
    pub input: &'static str,
    /// USD per million output tokens.
    pub output: &'static str,
}

/// The curated table. Ground truth maintained by hand; provider data that
/// disagrees is overridden.
pub const CURATED_PRICING: &[CuratedRow] = &[
    CuratedRow { source: Source::Openai, id: "gpt-4o", input: "2.50", output: "10.00" },
    CuratedRow { source: Source::Openai, id: "gpt-4o-mini", input: "0.15", output: "0.60" },
    CuratedRow { source: Source::Openai, id: "gpt-4.1", input: "2.00", output: "8.00" },
    CuratedRow { source: Source::Openai, id: "gpt-4.1-mini", input: "0.40", output: "1.60" },
    CuratedRow { source: Source::Openai, id: "o3-mini", input: "1.10", output: "4.40" },
    CuratedRow { source: Source::Anthropic, id: "claude-opus-4", input: "15.00", output: "75.00" },
    CuratedRow { source: Source::Anthropic, id: "claude-sonnet-4", input: "3.00", output: "15.00" },
    CuratedRow { source: Source::Anthropic, id: "claude-3-7-sonnet", input: "3.00", output: "15.00" },
    CuratedRow { source: Source::Anthropic, id: "claude-3-5-haiku", input: "0.80", output: "4.00" },
    CuratedRow { source: Source::Google, id: "gemini-2.5-pro", input: "1.25", output: "10.00" },
    CuratedRow { source: Source::Google, id: "gemini-2.0-flash", input: "0.10", output: "0.40" },
    CuratedRow { source: Source::Google, id: "gemini-1.5-pro", input: "1.25", output: "5.00" },
    CuratedRow { source: Source::AsiOne, id: "asi1-mini", input: "0.10", output: "0.40" },
    CuratedRow { source: Source::AsiOne, id: "asi1-fast", input: "0.20", output: "0.80" },
    CuratedRow { source: Source::AsiOne, id: "asi1-extended", input: "0.40", output: "1.60" },
    CuratedRow { source: Source::AsiCloud, id: "meta-llama/llama-3.3-70b-instruct", input: "0.12", output: "0.30" },
    CuratedRow { source: Source::AsiCloud, id: "qwen/qwen2.5-72b-instruct", input: "0.13", output: "0.40" },
];

/// Strips a trailing `-YYYYMMDD` or `-YYYY-MM-DD` date suffix.
#[must_use]
pub fn strip_date_suffix(id: &str) -> &str {
    static DATE_SUFFIX: OnceLock<Regex> = OnceLock::new();
    let re = DATE_SUFFIX
        .get_or_init(|| Regex::new(r"-(\d{8}|\d{4}-\d{2}-\d{2})$").expect("valid regex"));
    re.find(id).map_or(id, |m| &id[..m.start()])
}

/// Looks up curated rates for `(source, id)`, trying the exact id first
/// and the date-stripped id second.
#[must_use]
pub fn curated_rates(source: Source, id: &str) -> Option<ModelRates> {
    let find = |key: &str| {
        CURATED_PRICING
            .iter()
            .find(|row| row.source == source && row.id.eq_ignore_ascii_case(key))
    };
    let row = find(id).or_else(|| find(strip_date_suffix(id)))?;
    let input = row.input.parse().ok()?;
    let output = row.output.parse().ok()?;
    Some(ModelRates { input, output })
}

/// Overlays curated pricing onto a deduplicated catalog.
///
/// A matching row replaces the model's top-level pricing with the source's
/// own rates; models without a row keep whatever the fetcher attached.
pub fn overlay_pricing(models: &mut [ModelInfo]) {
    for model in models {
        if let Some(rates) = curated_rates(model.source, &model.id) {
            model.pricing = Some(ModelPricing {
                provider: model.source.to_string(),
                rates,
            });
        }
    }
}
