//! Hiding credentials in captured HTTP logs.
//!
//! Query parameters, headers and JSON body fields whose names look like
//! secrets are replaced by [`MASK`] before a log leaves the transport.

use indexmap::IndexMap;
use serde_json::Value;
use url::Url;

pub const MASK: &str = "*****";

/// Query parameter and JSON field names to mask, compared case-insensitively.
const SENSITIVE_FIELDS: &[&str] = &[
    "access_token",
    "api_key",
    "apikey",
    "token",
    "secret",
    "password",
    "auth",
];

const SENSITIVE_HEADERS: &[&str] = &["authorization", "x-api-key", "x-auth-token", "cookie"];

fn is_sensitive_field(name: &str) -> bool {
    SENSITIVE_FIELDS.iter().any(|f| name.eq_ignore_ascii_case(f))
}

/// Mask sensitive query parameters, leaving the raw encoding of the rest intact.
pub fn mask_url(url: &Url) -> Url {
    let Some(query) = url.query() else {
        return url.clone();
    };

    let masked_query = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if is_sensitive_field(key) => format!("{key}={MASK}"),
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&");

    let mut masked = url.clone();
    masked.set_query(Some(&masked_query));
    masked
}

pub fn mask_headers(headers: &IndexMap<String, String>) -> IndexMap<String, String> {
    headers
        .iter()
        .map(|(k, v)| {
            let sensitive = SENSITIVE_HEADERS.iter().any(|h| k.eq_ignore_ascii_case(h));
            (k.clone(), if sensitive { MASK.to_string() } else { v.clone() })
        })
        .collect()
}

/// Mask sensitive fields of a JSON body at any depth. Non-JSON text is returned unchanged.
pub fn mask_body(text: &str) -> String {
    match serde_json::from_str::<Value>(text) {
        Ok(mut doc) => {
            if mask_value(&mut doc) {
                doc.to_string()
            } else {
                text.to_string()
            }
        }
        Err(_) => text.to_string(),
    }
}

fn mask_value(value: &mut Value) -> bool {
    match value {
        Value::Object(map) => {
            let mut changed = false;
            for (key, v) in map.iter_mut() {
                if is_sensitive_field(key) && !v.is_null() {
                    *v = Value::String(MASK.into());
                    changed = true;
                } else {
                    changed |= mask_value(v);
                }
            }
            changed
        }
        Value::Array(items) => items.iter_mut().fold(false, |acc, v| mask_value(v) || acc),
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn url_masks_only_sensitive_params() -> eyre::Result<()> {
        let url = Url::parse("https://petstore.swagger.io/v2/user/login?username=pass&password=aa")?;
        assert_eq!(
            mask_url(&url).as_str(),
            "https://petstore.swagger.io/v2/user/login?username=pass&password=*****"
        );
        Ok(())
    }

    #[test]
    fn url_keeps_encoding_and_repeated_keys() -> eyre::Result<()> {
        let url = Url::parse("https://api.example.com/?Token=one&token=two&name=john%20doe")?;
        assert_eq!(
            mask_url(&url).query(),
            Some("Token=*****&token=*****&name=john%20doe")
        );
        Ok(())
    }

    #[test]
    fn url_without_query() -> eyre::Result<()> {
        let url = Url::parse("https://api.example.com/users")?;
        assert_eq!(mask_url(&url), url);
        Ok(())
    }

    #[test]
    fn headers_are_masked_case_insensitively() {
        let headers = IndexMap::from([
            ("Authorization".to_string(), "Bearer secret".to_string()),
            ("content-type".to_string(), "application/json".to_string()),
        ]);
        let masked = mask_headers(&headers);
        assert_eq!(masked["Authorization"], MASK);
        assert_eq!(masked["content-type"], "application/json");
    }

    #[test]
    fn body_masks_nested_passwords() -> eyre::Result<()> {
        let body = json!([
            {"username": "Brud", "password": "password123"},
            {"username": "Michael", "password": "password"}
        ])
        .to_string();
        let masked: Value = serde_json::from_str(&mask_body(&body))?;
        assert_eq!(
            masked,
            json!([
                {"username": "Brud", "password": MASK},
                {"username": "Michael", "password": MASK}
            ])
        );
        Ok(())
    }

    #[test]
    fn body_untouched_when_nothing_to_mask() {
        assert_eq!(mask_body(r#"{"name":  "doggie"}"#), r#"{"name":  "doggie"}"#);
        assert_eq!(mask_body("plain text"), "plain text");
    }
}
