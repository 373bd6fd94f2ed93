//! OAuth proxy for the workspace integration.
//!
//! The agent platform runs the authorization-code flow against the bridge.
//! The bridge fills in what the platform cannot (owner, response type, the
//! server's client id), converts the platform's form-encoded token request
//! into the JSON body the workspace expects, and attaches the server's
//! client credentials so the secret never leaves the bridge.
//!
//! Token responses are normalised: success bodies must carry an
//! `access_token`, and error bodies are reduced to the standard
//! `{error, error_description}` pair with credentials redacted.

use crate::config::OAuthConfig;
use crate::error::{redact, Provider};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const FORM: &str = "application/x-www-form-urlencoded";

/// Error codes defined by RFC 6749 §5.2 and §4.1.2.1.
const STANDARD_ERRORS: &[&str] = &[
    "invalid_request",
    "invalid_client",
    "invalid_grant",
    "unauthorized_client",
    "unsupported_grant_type",
    "invalid_scope",
    "access_denied",
    "server_error",
    "temporarily_unavailable",
];

/// Where to send the user for consent, given the incoming query string.
pub fn authorize_redirect(config: &OAuthConfig, raw_query: Option<&str>) -> Url {
    let mut pairs: Vec<(String, String)> = Vec::new();
    for (k, v) in url::form_urlencoded::parse(raw_query.unwrap_or_default().as_bytes()) {
        set(&mut pairs, &k, &v);
    }
    if !pairs.iter().any(|(k, _)| k == "owner") {
        pairs.push(("owner".into(), "user".into()));
    }
    if !pairs.iter().any(|(k, _)| k == "response_type") {
        pairs.push(("response_type".into(), "code".into()));
    }
    if let Some(id) = &config.client_id {
        set(&mut pairs, "client_id", id);
    }

    let mut url = config.authorize_url.clone();
    url.query_pairs_mut().extend_pairs(&pairs);
    url
}

/// Replace the value of `key` in place, or append it.
fn set(pairs: &mut Vec<(String, String)>, key: &str, value: &str) {
    match pairs.iter_mut().find(|(k, _)| k == key) {
        Some(pair) => pair.1 = value.to_string(),
        None => pairs.push((key.to_string(), value.to_string())),
    }
}

/// An incoming token request, as received.
#[derive(Clone, Copy)]
pub struct TokenRequest<'a> {
    pub content_type: Option<&'a str>,
    pub authorization: Option<&'a str>,
    pub body: &'a [u8],
}

/// What the bridge answers: a status and a JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenResponse {
    pub status: u16,
    pub body: Value,
}

impl TokenResponse {
    fn error(status: u16, code: &str, description: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": code, "error_description": description.into() }),
        }
    }
}

/// Client for the token endpoint.
pub struct TokenExchange<'a> {
    pub client: &'a reqwest::Client,
    pub config: &'a OAuthConfig,
    pub api_version: &'a str,
    pub timeout: Duration,
}

impl TokenExchange<'_> {
    /// Forward `req` to the token endpoint and normalise the answer.
    pub async fn exchange(&self, req: TokenRequest<'_>) -> TokenResponse {
        let payload = match parse_payload(req.content_type, req.body) {
            Ok(payload) => payload,
            Err(description) => return TokenResponse::error(400, "invalid_request", description),
        };

        let caller_secret = payload
            .get("client_secret")
            .and_then(Value::as_str)
            .map(str::to_string);
        let mut secrets: Vec<&str> = Vec::new();
        secrets.extend(self.config.client_secret.as_deref());
        secrets.extend(caller_secret.as_deref());
        secrets.extend(req.authorization.and_then(|a| a.split_once(' ')).map(|(_, cred)| cred.trim()));

        let mut builder = self
            .client
            .post(self.config.token_url.clone())
            .header("Notion-Version", self.api_version)
            .timeout(self.timeout)
            .json(&payload);
        builder = match (&self.config.client_id, &self.config.client_secret) {
            (Some(id), Some(secret)) => builder.basic_auth(id, Some(secret)),
            _ => match req.authorization {
                Some(auth) => builder.header(reqwest::header::AUTHORIZATION, auth),
                None => builder,
            },
        };

        let response = match builder.send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("Token endpoint unreachable: {}", e.without_url());
                return TokenResponse::error(
                    502,
                    "temporarily_unavailable",
                    format!("{} token endpoint is unreachable", Provider::OAuth),
                );
            }
        };

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        info!("Token exchange answered HTTP {}", status);

        if (200..300).contains(&status) {
            normalize_success(status, &text)
        } else {
            normalize_error(status, &text, &secrets)
        }
    }
}

/// Turn a form or JSON body into a JSON object.
fn parse_payload(content_type: Option<&str>, body: &[u8]) -> Result<Map<String, Value>, String> {
    let media = content_type
        .unwrap_or("application/json")
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if media == FORM {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body)
            .map_err(|_| "token request body is not valid form data".to_string())?;
        debug!("Converted {} form field(s) to JSON", pairs.len());
        // Repeated keys: the last value wins.
        return Ok(pairs
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect());
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("token request body must be a JSON object".into()),
        Err(_) => Err("token request body is neither JSON nor form data".into()),
    }
}

fn normalize_success(status: u16, text: &str) -> TokenResponse {
    let mut body = match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => map,
        _ => {
            return TokenResponse::error(502, "server_error", "token endpoint returned a non-JSON body")
        }
    };
    let has_token = body
        .get("access_token")
        .and_then(Value::as_str)
        .is_some_and(|t| !t.is_empty());
    if !has_token {
        return TokenResponse::error(502, "server_error", "token endpoint returned no access_token");
    }

    body.remove("client_secret");
    body.entry("token_type")
        .or_insert_with(|| Value::String("bearer".into()));
    TokenResponse {
        status,
        body: Value::Object(body),
    }
}

fn normalize_error(status: u16, text: &str, secrets: &[&str]) -> TokenResponse {
    let json = serde_json::from_str::<Value>(text).ok();
    let field = |name: &str| {
        json.as_ref()
            .and_then(|j| j.get(name))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    let fallback_code = if status >= 500 {
        "server_error"
    } else {
        "invalid_request"
    };
    let code = field("error")
        .filter(|c| STANDARD_ERRORS.contains(&c.as_str()))
        .unwrap_or_else(|| fallback_code.to_string());
    // Free-form bodies (HTML error pages, stack traces) are never echoed.
    let description = field("error_description")
        .or_else(|| field("message"))
        .unwrap_or_else(|| format!("token endpoint returned HTTP {status}"));

    TokenResponse::error(status, &code, redact(&description, secrets))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(client_id: Option<&str>) -> OAuthConfig {
        OAuthConfig {
            client_id: client_id.map(str::to_string),
            ..OAuthConfig::default()
        }
    }

    fn query(url: &Url) -> Vec<(String, String)> {
        url.query_pairs().into_owned().collect()
    }

    #[test]
    fn authorize_fills_defaults() {
        let url = authorize_redirect(&config(None), Some("state=xyz&redirect_uri=https%3A%2F%2Fchat.example%2Fcb"));
        assert!(url.as_str().starts_with("https://api.notion.com/v1/oauth/authorize?"));
        let q = query(&url);
        assert!(q.contains(&("state".into(), "xyz".into())));
        assert!(q.contains(&("redirect_uri".into(), "https://chat.example/cb".into())));
        assert!(q.contains(&("owner".into(), "user".into())));
        assert!(q.contains(&("response_type".into(), "code".into())));
    }

    #[test]
    fn authorize_keeps_caller_values_but_overrides_client_id() {
        let url = authorize_redirect(
            &config(Some("server-id")),
            Some("owner=workspace&client_id=caller-id&response_type=token"),
        );
        let q = query(&url);
        assert!(q.contains(&("owner".into(), "workspace".into())));
        assert!(q.contains(&("response_type".into(), "token".into())));
        assert!(q.contains(&("client_id".into(), "server-id".into())));
        assert_eq!(q.iter().filter(|(k, _)| k == "client_id").count(), 1);
    }

    #[test]
    fn form_body_last_value_wins() {
        let map = parse_payload(
            Some("application/x-www-form-urlencoded; charset=utf-8"),
            b"grant_type=authorization_code&code=a&code=b",
        )
        .unwrap();
        assert_eq!(map["grant_type"], "authorization_code");
        assert_eq!(map["code"], "b");
    }

    #[test]
    fn json_body_must_be_object() {
        assert!(parse_payload(None, br#"{"code":"a"}"#).is_ok());
        assert!(parse_payload(Some("application/json"), b"[1,2]").is_err());
        assert!(parse_payload(Some("application/json"), b"not json").is_err());
    }

    #[test]
    fn success_strips_secret_and_defaults_token_type() {
        let r = normalize_success(200, r#"{"access_token":"tok","client_secret":"s3cret!"}"#);
        assert_eq!(r.status, 200);
        assert_eq!(r.body["token_type"], "bearer");
        assert!(r.body.get("client_secret").is_none());
    }

    #[test]
    fn success_without_token_is_server_error() {
        let r = normalize_success(200, r#"{"workspace_id":"w"}"#);
        assert_eq!(r.status, 502);
        assert_eq!(r.body["error"], "server_error");
    }

    #[test]
    fn error_keeps_standard_code_and_redacts() {
        let r = normalize_error(
            400,
            r#"{"error":"invalid_grant","error_description":"bad code for secret abcd1234"}"#,
            &["abcd1234"],
        );
        assert_eq!(r.status, 400);
        assert_eq!(r.body["error"], "invalid_grant");
        assert_eq!(r.body["error_description"], "bad code for secret [redacted]");
    }

    #[test]
    fn error_replaces_nonstandard_code() {
        let r = normalize_error(401, r#"{"error":"unauthorized","message":"nope"}"#, &[]);
        assert_eq!(r.body["error"], "invalid_request");
        assert_eq!(r.body["error_description"], "nope");

        let r = normalize_error(503, "upstream down", &[]);
        assert_eq!(r.body["error"], "server_error");
        assert_eq!(r.body["error_description"], "token endpoint returned HTTP 503");
    }

    #[test]
    fn error_never_echoes_opaque_body() {
        let r = normalize_error(
            500,
            "<html>Traceback: code=ntn_oauth_AbCdEf refresh_token=rt_live_9f8e7d</html>",
            &["server-secret"],
        );
        assert_eq!(r.status, 500);
        assert_eq!(r.body["error"], "server_error");
        let text = r.body.to_string();
        assert!(!text.contains("rt_live_9f8e7d"));
        assert!(!text.contains("ntn_oauth_AbCdEf"));
        assert_eq!(r.body["error_description"], "token endpoint returned HTTP 500");

        // JSON without a description field is summarised the same way.
        let r = normalize_error(400, r#"{"error":"invalid_grant","debug":"code=abc"}"#, &[]);
        assert_eq!(r.body["error"], "invalid_grant");
        assert_eq!(r.body["error_description"], "token endpoint returned HTTP 400");
    }
}
