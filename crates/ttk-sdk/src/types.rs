//! Request and response types for the resilient API client

use crate::error::{ApiError, Result};
use crate::retry::Idempotency;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// An outbound API call
///
/// `url` may be absolute or relative to the client's base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    /// Overrides the idempotency derived from `method`
    pub idempotency: Option<Idempotency>,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            idempotency: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `value` as the JSON body
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value).map_err(|e| ApiError::InvalidRequest {
            message: format!("Failed to serialize request body: {}", e),
        })?;
        Ok(self.header("Content-Type", "application/json").body(body))
    }

    pub fn idempotency(mut self, idempotency: Idempotency) -> Self {
        self.idempotency = Some(idempotency);
        self
    }

    pub fn effective_idempotency(&self) -> Idempotency {
        self.idempotency
            .unwrap_or_else(|| Idempotency::for_method(&self.method))
    }
}

/// A response that completed the call, with the number of attempts it took
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub attempts: u32,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| ApiError::InvalidRequest {
            message: format!("Failed to parse response body: {}", e),
        })
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_idempotency_override() {
        let request = ApiRequest::post("/campaign/get/");
        assert_eq!(request.effective_idempotency(), Idempotency::NonIdempotent);

        let request = request.idempotency(Idempotency::Idempotent);
        assert_eq!(request.effective_idempotency(), Idempotency::Idempotent);
    }

    #[test]
    fn test_json_body_sets_content_type() {
        let request = ApiRequest::post("/ad/create/")
            .json(&json!({ "name": "spring" }))
            .unwrap();

        assert_eq!(
            request.headers,
            vec![("Content-Type".to_string(), "application/json".to_string())]
        );
        assert_eq!(request.body.unwrap(), Bytes::from(r#"{"name":"spring"}"#));
    }

    #[test]
    fn test_response_helpers() {
        let response = ApiResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from(r#"{"code":0}"#),
            attempts: 1,
        };
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["code"], 0);
        assert_eq!(response.text(), r#"{"code":0}"#);
    }
}
