use serde_json::Value;
use tracing::{debug, warn};

use crate::utils::constants::EXPIRES_IN_FIELD;

/// Token and lifetime pulled out of an exchange response.
///
/// An empty `value` means the response carried no usable token; a
/// non-positive `expires_in` means the lifetime is unknown.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedToken {
    pub value: String,
    pub expires_in: i64,
}

impl ParsedToken {
    pub fn is_usable(&self) -> bool {
        !self.value.is_empty()
    }
}

/// Extract the token at `token_field` and the top-level `expires_in`.
///
/// `token_field` is either a dotted path (`data.token`, `tokens.0`) or a
/// JSON pointer (`/data/token`). Missing or mistyped fields never fail,
/// they yield an empty value / zero lifetime.
pub fn parse_response(body: &[u8], token_field: &str) -> ParsedToken {
    let json: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "exchange response is not valid JSON");
            return ParsedToken::default();
        }
    };

    let value = lookup(&json, token_field)
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .unwrap_or_default();
    if value.is_empty() {
        warn!(token_field, "token field missing or empty in exchange response");
    }

    let expires_in = json.get(EXPIRES_IN_FIELD).and_then(as_seconds).unwrap_or(0);
    debug!(expires_in, has_token = !value.is_empty(), "exchange response parsed");

    ParsedToken { value, expires_in }
}

fn lookup<'a>(json: &'a Value, path: &str) -> Option<&'a Value> {
    if path.starts_with('/') {
        return json.pointer(path);
    }
    path.split('.').try_fold(json, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Integer, float (truncated) or numeric string
fn as_seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(body: Value, field: &str) -> ParsedToken {
        parse_response(body.to_string().as_bytes(), field)
    }

    #[test]
    fn standard_oauth_response() {
        let parsed = parse(json!({"access_token": "abc123", "expires_in": 3600}), "access_token");
        assert_eq!(parsed, ParsedToken { value: "abc123".into(), expires_in: 3600 });
        assert!(parsed.is_usable());
    }

    #[test]
    fn nested_paths_and_pointers() {
        let body = json!({"data": {"token": "nested", "list": ["first", "second"]}, "expires_in": 60});
        assert_eq!(parse(body.clone(), "data.token").value, "nested");
        assert_eq!(parse(body.clone(), "data.list.1").value, "second");
        assert_eq!(parse(body, "/data/token").value, "nested");
    }

    #[test]
    fn expiry_accepts_strings_and_floats() {
        assert_eq!(parse(json!({"access_token": "t", "expires_in": "1800"}), "access_token").expires_in, 1800);
        assert_eq!(parse(json!({"access_token": "t", "expires_in": 59.9}), "access_token").expires_in, 59);
        assert_eq!(parse(json!({"access_token": "t", "expires_in": true}), "access_token").expires_in, 0);
    }

    #[test]
    fn missing_fields_yield_empty_token_and_zero_expiry() {
        let parsed = parse(json!({"error": "invalid_client"}), "access_token");
        assert_eq!(parsed, ParsedToken::default());
        assert!(!parsed.is_usable());

        let no_expiry = parse(json!({"access_token": "abc"}), "access_token");
        assert_eq!(no_expiry, ParsedToken { value: "abc".into(), expires_in: 0 });
    }

    #[test]
    fn non_string_token_is_not_usable() {
        let parsed = parse(json!({"access_token": 42, "expires_in": 10}), "access_token");
        assert!(!parsed.is_usable());
        assert_eq!(parsed.expires_in, 10);
    }

    #[test]
    fn garbage_body_does_not_fail() {
        assert_eq!(parse_response(b"<html>bad gateway</html>", "access_token"), ParsedToken::default());
        assert_eq!(parse_response(b"", "access_token"), ParsedToken::default());
    }
}
