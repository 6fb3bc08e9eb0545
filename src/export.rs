use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::pipeline::ProcessedNorm;

/// Write the full per-URL outcome list (raw payloads included) as a
/// timestamped, pretty-printed JSON artifact for audit.
pub fn write_results(dir: &Path, label: &str, outcomes: &[ProcessedNorm]) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create results dir {}", dir.display()))?;

    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("{}_{}.json", label.replace(' ', "_").to_lowercase(), stamp));

    let json = serde_json::to_string_pretty(outcomes)?;
    fs::write(&path, json)
        .with_context(|| format!("failed to write results to {}", path.display()))?;

    info!("Results exported: {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Disposition;
    use crate::record::{NormInput, NormRecord};
    use serde_json::json;

    #[test]
    fn artifact_is_pretty_json_with_payloads() {
        let dir = tempfile::tempdir().unwrap();
        let input = NormInput::from_url("https://example.org/n");
        let outcomes = vec![ProcessedNorm {
            disposition: Disposition::Inserted,
            needs_review: false,
            record: NormRecord::success(
                &input,
                "texto".into(),
                json!({"idNorma": "1"}),
                None,
            ),
        }];

        let path = write_results(dir.path(), "LeyChile API", &outcomes).unwrap();
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("leychile_api_"));

        let content = fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed[0]["disposition"], "inserted");
        assert_eq!(parsed[0]["raw_payload"]["idNorma"], "1");
        // Pretty-printed, not a single line.
        assert!(content.lines().count() > 1);
    }
}
