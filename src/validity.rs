use serde_json::Value;

/// Whether a norm is currently in legal force, inferred from a payload
/// whose schema varies by source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vigency {
    Valid,
    Invalid,
    /// No recognized currency indicator found. Does not block processing,
    /// but the record needs manual review.
    Unknown,
}

const PROBE_KEYS: [&str; 3] = ["esVigente", "estadoNorma", "vigencia"];
const END_DATE_SENTINEL: &str = "0000-00-00";

/// Infer vigency from an untyped payload. Probes the top level first, then
/// each first-level nested object, for the recognized indicator keys.
pub fn infer(payload: &Value) -> Vigency {
    if let Some((key, value)) = find_indicator(payload) {
        return resolve(key, value);
    }
    Vigency::Unknown
}

/// The norm's own id, for log lines. Both spellings occur in the wild.
pub fn norm_id(payload: &Value) -> String {
    payload
        .get("idNorma")
        .or_else(|| payload.get("IdNorma"))
        .map(value_to_string)
        .unwrap_or_else(|| "(sin id)".to_string())
}

fn find_indicator(payload: &Value) -> Option<(&'static str, &Value)> {
    let root = payload.as_object()?;

    for key in PROBE_KEYS {
        if let Some(v) = root.get(key) {
            return Some((key, v));
        }
    }

    for child in root.values() {
        if let Some(obj) = child.as_object() {
            for key in PROBE_KEYS {
                if let Some(v) = obj.get(key) {
                    return Some((key, v));
                }
            }
        }
    }

    None
}

fn resolve(key: &str, value: &Value) -> Vigency {
    match key {
        // An end-of-validity date that is empty, null, or the sentinel
        // means the norm is still in force.
        "vigencia" => match value.as_object() {
            Some(obj) => match obj.get("fin_vigencia") {
                None | Some(Value::Null) => Vigency::Valid,
                Some(Value::String(s)) if s.is_empty() || s == END_DATE_SENTINEL => Vigency::Valid,
                Some(_) => Vigency::Invalid,
            },
            None => Vigency::Unknown,
        },
        "esVigente" => {
            if truthy(value) {
                Vigency::Valid
            } else {
                Vigency::Invalid
            }
        }
        "estadoNorma" => match value.as_str() {
            Some(s) => {
                let upper = s.to_uppercase();
                if upper.contains("NO VIGENTE") {
                    Vigency::Invalid
                } else if upper.contains("VIGENTE") {
                    Vigency::Valid
                } else {
                    Vigency::Unknown
                }
            }
            None => Vigency::Unknown,
        },
        _ => Vigency::Unknown,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty() && s != "0" && !s.eq_ignore_ascii_case("false"),
        _ => true,
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn vigencia_without_end_date_is_valid() {
        assert_eq!(infer(&json!({"vigencia": {"fin_vigencia": ""}})), Vigency::Valid);
        assert_eq!(infer(&json!({"vigencia": {"fin_vigencia": null}})), Vigency::Valid);
        assert_eq!(
            infer(&json!({"vigencia": {"fin_vigencia": "0000-00-00"}})),
            Vigency::Valid
        );
        assert_eq!(infer(&json!({"vigencia": {}})), Vigency::Valid);
    }

    #[test]
    fn vigencia_with_end_date_is_invalid() {
        assert_eq!(
            infer(&json!({"vigencia": {"fin_vigencia": "2020-01-01"}})),
            Vigency::Invalid
        );
    }

    #[test]
    fn es_vigente_truthiness() {
        assert_eq!(infer(&json!({"esVigente": true})), Vigency::Valid);
        assert_eq!(infer(&json!({"esVigente": false})), Vigency::Invalid);
        assert_eq!(infer(&json!({"esVigente": 1})), Vigency::Valid);
        assert_eq!(infer(&json!({"esVigente": "0"})), Vigency::Invalid);
    }

    #[test]
    fn estado_norma_substring_match() {
        assert_eq!(infer(&json!({"estadoNorma": "VIGENTE"})), Vigency::Valid);
        assert_eq!(infer(&json!({"estadoNorma": "NO VIGENTE"})), Vigency::Invalid);
        assert_eq!(infer(&json!({"estadoNorma": "norma vigente"})), Vigency::Valid);
        assert_eq!(infer(&json!({"estadoNorma": "derogada"})), Vigency::Unknown);
    }

    #[test]
    fn nested_indicator_is_found() {
        let payload = json!({"metadatos": {"estadoNorma": "VIGENTE"}, "html": []});
        assert_eq!(infer(&payload), Vigency::Valid);
    }

    #[test]
    fn no_indicator_is_unknown() {
        assert_eq!(infer(&json!({})), Vigency::Unknown);
        assert_eq!(infer(&json!({"html": [{"t": "<p>x</p>"}]})), Vigency::Unknown);
        assert_eq!(infer(&json!("not an object")), Vigency::Unknown);
    }

    #[test]
    fn norm_id_both_spellings() {
        assert_eq!(norm_id(&json!({"idNorma": "28650"})), "28650");
        assert_eq!(norm_id(&json!({"IdNorma": 28650})), "28650");
        assert_eq!(norm_id(&json!({})), "(sin id)");
    }
}
