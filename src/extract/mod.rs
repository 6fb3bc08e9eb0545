pub mod api;
pub mod html;
pub mod rendered;

use async_trait::async_trait;

use crate::classifier::Classification;
use crate::record::{NormInput, NormRecord};

/// A content-extraction strategy. Never fails: every failure mode is
/// encoded into the returned record's status/error_reason.
#[async_trait]
pub trait ExtractStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn extract(&self, input: &NormInput) -> NormRecord;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// Structured LeyChile JSON API.
    Api,
    /// Generic rendered-page extraction.
    Rendered,
    /// LeyChile rendered fallback (content frame + container waits).
    Leychile,
}

impl StrategyKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "api" => Some(StrategyKind::Api),
            "rendered" | "universal" => Some(StrategyKind::Rendered),
            "leychile" => Some(StrategyKind::Leychile),
            _ => None,
        }
    }
}

/// Strategy selection is a pure function of classification output; an
/// explicit CLI choice overrides it. Structured sources (including a public
/// URL missing its id, which the API strategy fails without a network call)
/// go to the API path; everything else falls back to the rendered path.
pub fn select_strategy(
    classification: &Classification,
    requested: Option<StrategyKind>,
) -> StrategyKind {
    if let Some(kind) = requested {
        return kind;
    }
    match classification {
        Classification::StructuredApi { .. }
        | Classification::StructuredPublic { .. }
        | Classification::MissingNormId => StrategyKind::Api,
        Classification::Unstructured => StrategyKind::Rendered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::classify;

    #[test]
    fn structured_urls_select_api() {
        let c = classify("https://www.bcn.cl/leychile/navegar?idNorma=28650");
        assert_eq!(select_strategy(&c, None), StrategyKind::Api);

        let c = classify("https://www.bcn.cl/leychile/navegar");
        assert_eq!(select_strategy(&c, None), StrategyKind::Api);
    }

    #[test]
    fn unstructured_urls_fall_back_to_rendered() {
        let c = classify("https://www.minsal.cl/reglamento/");
        assert_eq!(select_strategy(&c, None), StrategyKind::Rendered);
    }

    #[test]
    fn explicit_request_wins() {
        let c = classify("https://www.bcn.cl/leychile/navegar?idNorma=28650");
        assert_eq!(
            select_strategy(&c, Some(StrategyKind::Leychile)),
            StrategyKind::Leychile
        );
    }

    #[test]
    fn strategy_names_parse() {
        assert_eq!(StrategyKind::parse("API"), Some(StrategyKind::Api));
        assert_eq!(StrategyKind::parse("universal"), Some(StrategyKind::Rendered));
        assert_eq!(StrategyKind::parse("leychile"), Some(StrategyKind::Leychile));
        assert_eq!(StrategyKind::parse("ftp"), None);
    }
}
