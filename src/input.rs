use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::warn;

use crate::record::NormInput;

/// Read the norm metadata feed: a CSV with a header row carrying at least
/// `url_publica`. Header names are trimmed and lowercased; rows without a
/// public URL are skipped with a warning.
pub fn read_norms_csv(path: &Path) -> Result<Vec<NormInput>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read input feed {}", path.display()))?;
    parse_norms_csv(&content)
}

fn parse_norms_csv(content: &str) -> Result<Vec<NormInput>> {
    let mut lines = content.lines();
    let header = lines.next().context("input feed is empty")?;
    let columns: Vec<String> = split_line(header)
        .into_iter()
        .map(|c| c.trim().to_lowercase())
        .collect();

    if !columns.iter().any(|c| c == "url_publica") {
        bail!("input feed has no url_publica column");
    }

    let mut inputs = Vec::new();
    for (i, line) in lines.enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_line(line);
        let row: HashMap<&str, &str> = columns
            .iter()
            .zip(fields.iter())
            .map(|(c, f)| (c.as_str(), f.trim()))
            .collect();

        let Some(url) = row.get("url_publica").filter(|u| !u.is_empty()) else {
            warn!("Row {} has no url_publica, skipping", i + 2);
            continue;
        };

        inputs.push(NormInput {
            source: get(&row, "fuente"),
            name: get(&row, "nombre_norma"),
            hierarchy: get(&row, "jerarquia"),
            description: get(&row, "descripcion"),
            keywords: row
                .get("palabras_clave")
                .map(|k| {
                    k.split([';', ','])
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            public_url: url.to_string(),
            data_source_url: get(&row, "url_fuente_datos"),
            expert_comments: get(&row, "comentarios_experto"),
        });
    }
    Ok(inputs)
}

fn get(row: &HashMap<&str, &str>, key: &str) -> Option<String> {
    row.get(key)
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
}

/// Quote-aware comma split; `""` inside a quoted field is an escaped quote.
fn split_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_spanish_headers() {
        let csv = "Fuente,Nombre_Norma,URL_Publica,Palabras_Clave\n\
                   BCN,Ley 16.744,https://www.bcn.cl/leychile/navegar?idNorma=28650,seguridad; trabajo\n";
        let inputs = parse_norms_csv(csv).unwrap();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].source.as_deref(), Some("BCN"));
        assert_eq!(inputs[0].name.as_deref(), Some("Ley 16.744"));
        assert_eq!(inputs[0].keywords, vec!["seguridad", "trabajo"]);
    }

    #[test]
    fn quoted_fields_keep_commas() {
        let csv = "url_publica,descripcion\n\
                   https://example.org,\"Reglamento, texto refundido\"\n";
        let inputs = parse_norms_csv(csv).unwrap();
        assert_eq!(
            inputs[0].description.as_deref(),
            Some("Reglamento, texto refundido")
        );
    }

    #[test]
    fn rows_without_url_are_skipped() {
        let csv = "url_publica,fuente\n,BCN\nhttps://example.org,BCN\n";
        let inputs = parse_norms_csv(csv).unwrap();
        assert_eq!(inputs.len(), 1);
    }

    #[test]
    fn missing_url_column_is_an_error() {
        assert!(parse_norms_csv("fuente,nombre_norma\nBCN,Ley\n").is_err());
    }
}
