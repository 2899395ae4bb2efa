//! HTTP plumbing shared by the wire-protocol clients.

use modelrelay_core::error::ProviderError;
use serde::de::DeserializeOwned;
use tracing::warn;

/// Build a reqwest client with the provider's timeout.
pub(crate) fn build_client(timeout_secs: u64) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ProviderError::Network(format!("failed to create HTTP client: {e}")))
}

/// Failures before a status line arrives are connectivity problems.
pub(crate) fn transport_error(e: reqwest::Error) -> ProviderError {
    ProviderError::Network(e.to_string())
}

/// Check the status and decode a JSON body.
///
/// Non-2xx becomes `ApiError` carrying the status code; a body that cannot
/// be decoded becomes `MalformedResponse`.
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    provider_id: &str,
) -> Result<T, ProviderError> {
    let status = response.status().as_u16();

    if !response.status().is_success() {
        let error_body = response.text().await.unwrap_or_default();
        warn!(provider = %provider_id, status, body = %error_body, "Provider returned error");
        return Err(ProviderError::ApiError {
            status_code: status,
            message: error_body,
        });
    }

    let text = response.text().await.map_err(transport_error)?;
    decode(&text)
}

pub(crate) fn decode<T: DeserializeOwned>(text: &str) -> Result<T, ProviderError> {
    serde_json::from_str(text)
        .map_err(|e| ProviderError::MalformedResponse(format!("Failed to parse response: {e}")))
}

/// Merge a model's extra parameters into a request body, overriding keys.
pub(crate) fn merge_extra_params(
    body: &mut serde_json::Value,
    extra: &serde_json::Map<String, serde_json::Value>,
) {
    if let Some(obj) = body.as_object_mut() {
        for (k, v) in extra {
            obj.insert(k.clone(), v.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, serde::Deserialize)]
    struct Sample {
        ok: bool,
    }

    #[test]
    fn decode_valid_json() {
        let p: Sample = decode(r#"{"ok": true}"#).unwrap();
        assert!(p.ok);
    }

    #[test]
    fn decode_garbage_is_malformed() {
        let err = decode::<Sample>("<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));
    }

    #[test]
    fn extra_params_override_body() {
        let mut body = serde_json::json!({"temperature": 0.7, "model": "m"});
        let mut extra = serde_json::Map::new();
        extra.insert("temperature".into(), serde_json::json!(0.1));
        extra.insert("top_p".into(), serde_json::json!(0.9));
        merge_extra_params(&mut body, &extra);
        assert_eq!(body["temperature"], 0.1);
        assert_eq!(body["top_p"], 0.9);
        assert_eq!(body["model"], "m");
    }
}
