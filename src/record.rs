use serde::Serialize;
use serde_json::Value;

/// One row of the input metadata feed (CSV row or bare CLI URL).
#[derive(Debug, Clone, Default)]
pub struct NormInput {
    pub source: Option<String>,
    pub name: Option<String>,
    pub hierarchy: Option<String>,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub public_url: String,
    pub data_source_url: Option<String>,
    pub expert_comments: Option<String>,
}

impl NormInput {
    /// Bare URL with no feed metadata.
    pub fn from_url(url: &str) -> Self {
        Self {
            public_url: url.to_string(),
            ..Default::default()
        }
    }

    /// Dedup key: the feed-provided norm name, falling back to the URL.
    pub fn dedup_name(&self) -> String {
        self.name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| self.public_url.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Ok,
    Error,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Ok => "ok",
            RecordStatus::Error => "error",
        }
    }

}

/// One normalized legal document, as produced by an extraction strategy.
///
/// `status = Error` rows carry the reason in `error_reason` and nothing in
/// `clean_text`/`raw_payload`. `status = Ok` rows with empty content can
/// exist in flight (a page with no textual body) but are never persisted;
/// the upsert decision table skips them.
#[derive(Debug, Clone, Serialize)]
pub struct NormRecord {
    pub source: Option<String>,
    pub name: String,
    pub hierarchy: Option<String>,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub public_url: String,
    pub data_source_url: Option<String>,
    pub clean_text: Option<String>,
    pub raw_payload: Option<Value>,
    pub expert_comments: Option<String>,
    pub error_reason: Option<String>,
    pub status: RecordStatus,
    /// Raw upstream response body kept for the audit artifact when the
    /// upstream rejected us or returned garbage. Never persisted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
}

impl NormRecord {
    fn base(input: &NormInput) -> Self {
        Self {
            source: input.source.clone(),
            name: input.dedup_name(),
            hierarchy: input.hierarchy.clone(),
            description: input.description.clone(),
            keywords: input.keywords.clone(),
            public_url: input.public_url.clone(),
            data_source_url: input.data_source_url.clone(),
            clean_text: None,
            raw_payload: None,
            expert_comments: input.expert_comments.clone(),
            error_reason: None,
            status: RecordStatus::Ok,
            diagnostics: None,
        }
    }

    pub fn success(
        input: &NormInput,
        clean_text: String,
        raw_payload: Value,
        data_source_url: Option<String>,
    ) -> Self {
        let mut rec = Self::base(input);
        rec.clean_text = Some(clean_text);
        rec.raw_payload = Some(raw_payload);
        if data_source_url.is_some() {
            rec.data_source_url = data_source_url;
        }
        rec
    }

    pub fn failure(input: &NormInput, reason: impl Into<String>) -> Self {
        let mut rec = Self::base(input);
        rec.status = RecordStatus::Error;
        rec.error_reason = Some(reason.into());
        rec
    }

    pub fn failure_with_body(
        input: &NormInput,
        reason: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        let mut rec = Self::failure(input, reason);
        rec.diagnostics = Some(body.into());
        rec
    }

    /// An extraction that found nothing but also hit no error. Never stored.
    pub fn empty(input: &NormInput) -> Self {
        Self::base(input)
    }

    /// Successful means: usable text AND a raw payload. This is the guard
    /// the upsert decision table evaluates.
    pub fn is_successful(&self) -> bool {
        let has_text = self
            .clean_text
            .as_deref()
            .map(|t| !t.is_empty())
            .unwrap_or(false);
        let has_payload = self
            .raw_payload
            .as_ref()
            .map(|v| !v.is_null())
            .unwrap_or(false);
        has_text && has_payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_record_is_successful() {
        let input = NormInput::from_url("https://example.org/norma");
        let rec = NormRecord::success(&input, "text".into(), json!({"html": []}), None);
        assert!(rec.is_successful());
        assert_eq!(rec.status, RecordStatus::Ok);
        assert!(rec.error_reason.is_none());
    }

    #[test]
    fn failure_record_carries_reason_only() {
        let input = NormInput::from_url("https://example.org/norma");
        let rec = NormRecord::failure(&input, "HTTP 500");
        assert!(!rec.is_successful());
        assert_eq!(rec.status, RecordStatus::Error);
        assert!(rec.clean_text.is_none());
        assert!(rec.raw_payload.is_none());
        assert_eq!(rec.error_reason.as_deref(), Some("HTTP 500"));
    }

    #[test]
    fn empty_text_is_not_successful() {
        let input = NormInput::from_url("https://example.org/norma");
        let rec = NormRecord::success(&input, String::new(), json!({}), None);
        assert!(!rec.is_successful());
    }

    #[test]
    fn dedup_name_falls_back_to_url() {
        let bare = NormInput::from_url("https://example.org/norma");
        assert_eq!(bare.dedup_name(), "https://example.org/norma");

        let named = NormInput {
            name: Some("Ley 16.744".into()),
            ..NormInput::from_url("https://example.org/norma")
        };
        assert_eq!(named.dedup_name(), "Ley 16.744");
    }
}
