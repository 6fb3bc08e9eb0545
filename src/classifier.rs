use url::Url;

const API_PATH: &str = "/servicios/Navegar/get_norma_json";
const PUBLIC_PATH: &str = "/leychile/navegar";
const API_TEMPLATE: &str = "https://nuevo.leychile.cl/servicios/Navegar/get_norma_json?idNorma=";

/// Where a public URL routes and, for structured sources, the resolved
/// machine-readable endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Already a structured API URL; used verbatim.
    StructuredApi { endpoint: String },
    /// Public navigate URL carrying an `idNorma`; translated to the API.
    StructuredPublic { endpoint: String },
    /// Public navigate URL without `idNorma`. The structured extractor must
    /// fail this without touching the network.
    MissingNormId,
    /// Matches neither structured pattern; handled by the rendered path.
    Unstructured,
}

/// Map a public URL to a source kind and canonical endpoint.
pub fn classify(url: &str) -> Classification {
    if url.contains(API_PATH) {
        return Classification::StructuredApi {
            endpoint: url.to_string(),
        };
    }

    if url.contains(PUBLIC_PATH) {
        let id = Url::parse(url).ok().and_then(|parsed| {
            parsed
                .query_pairs()
                .find(|(k, _)| k == "idNorma")
                .map(|(_, v)| v.into_owned())
        });
        return match id {
            Some(id) if !id.is_empty() => Classification::StructuredPublic {
                endpoint: format!("{}{}", API_TEMPLATE, id),
            },
            _ => Classification::MissingNormId,
        };
    }

    Classification::Unstructured
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_passes_through() {
        let url = "https://nuevo.leychile.cl/servicios/Navegar/get_norma_json?idNorma=28650";
        assert_eq!(
            classify(url),
            Classification::StructuredApi {
                endpoint: url.to_string()
            }
        );
    }

    #[test]
    fn public_url_resolves_to_api_template() {
        let c = classify("https://www.bcn.cl/leychile/navegar?idNorma=28650&idParte=0");
        assert_eq!(
            c,
            Classification::StructuredPublic {
                endpoint: "https://nuevo.leychile.cl/servicios/Navegar/get_norma_json?idNorma=28650"
                    .to_string()
            }
        );
    }

    #[test]
    fn public_url_without_id_is_missing() {
        let c = classify("https://www.bcn.cl/leychile/navegar?idParte=0");
        assert_eq!(c, Classification::MissingNormId);
    }

    #[test]
    fn empty_id_is_missing() {
        let c = classify("https://www.bcn.cl/leychile/navegar?idNorma=");
        assert_eq!(c, Classification::MissingNormId);
    }

    #[test]
    fn other_domains_are_unstructured() {
        assert_eq!(
            classify("https://www.minsal.cl/reglamento-sanitario/"),
            Classification::Unstructured
        );
    }
}
