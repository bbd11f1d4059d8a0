/// RunPod REST API client, used only on the termination path.
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;

use crate::terminate::RemoteTerminator;

const BASE_URL: &str = "https://rest.runpod.io/v1";

pub struct RunPodClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RunPodClient {
    pub fn new(api_key: &str) -> Result<Self, String> {
        // The terminate call is one-shot with no retry loop above it; an
        // unbounded hang here would leave the pod running forever.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| format!("http client error: {e}"))?;
        Ok(Self {
            http,
            base_url: BASE_URL.to_string(),
            api_key: api_key.to_string(),
        })
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Cheap key check at startup: listing pods with a valid key returns
    /// 2xx. A failure here is only a warning — the remote path may still be
    /// retried at termination time, and the local fallback remains.
    pub async fn verify_api_key(&self) -> Result<bool, String> {
        let url = format!("{}/pods", self.base_url);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| format!("API key verification request failed: {e}"))?;

        let status = resp.status();
        if status.is_success() {
            Ok(true)
        } else {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body.trim(), "API key verification failed");
            Ok(false)
        }
    }
}

impl RemoteTerminator for RunPodClient {
    async fn terminate(&self, pod_id: &str) -> Result<bool, String> {
        let url = format!("{}/pods/{pod_id}", self.base_url);
        let resp = self
            .http
            .delete(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| format!("terminate request failed: {e}"))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        let success = response_indicates_success(status, &body);
        if !success {
            tracing::error!(
                pod_id = %pod_id,
                status = %status,
                body = %body.trim(),
                "terminate request rejected"
            );
        }
        Ok(success)
    }
}

/// The only part of an API response the monitor cares about.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// The API's success flag: a 2xx status whose body (when it is JSON at all)
/// carries no `error` field.
fn response_indicates_success(status: StatusCode, body: &str) -> bool {
    if !status.is_success() {
        return false;
    }
    match serde_json::from_str::<ApiResponse>(body) {
        // `error: null` deserializes to None, same as an absent field.
        Ok(resp) => resp.error.is_none(),
        // Empty or non-JSON body on a 2xx still counts as success.
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_2xx_with_empty_body_is_success() {
        assert!(response_indicates_success(StatusCode::OK, ""));
        assert!(response_indicates_success(StatusCode::NO_CONTENT, ""));
    }

    #[test]
    fn test_2xx_with_clean_json_is_success() {
        assert!(response_indicates_success(
            StatusCode::OK,
            r#"{"id":"pod-abc","desiredStatus":"TERMINATED"}"#
        ));
    }

    #[test]
    fn test_2xx_with_error_field_is_failure() {
        assert!(!response_indicates_success(
            StatusCode::OK,
            r#"{"error":"pod is locked"}"#
        ));
    }

    #[test]
    fn test_null_error_field_is_success() {
        assert!(response_indicates_success(
            StatusCode::OK,
            r#"{"id":"pod-abc","error":null}"#
        ));
    }

    #[test]
    fn test_non_2xx_is_failure_regardless_of_body() {
        assert!(!response_indicates_success(StatusCode::UNAUTHORIZED, ""));
        assert!(!response_indicates_success(
            StatusCode::NOT_FOUND,
            r#"{"id":"pod-abc"}"#
        ));
    }

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// One-shot HTTP server: answers the first request with a canned
    /// response and closes. Enough to exercise the real client.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = sock.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\n\
                 content-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            sock.write_all(response.as_bytes()).await.unwrap();
            sock.shutdown().await.ok();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_terminate_pod_success_over_http() {
        let base = serve_once("200 OK", r#"{"id":"pod-abc"}"#).await;
        let client = RunPodClient::new("rpa_test_key").unwrap().with_base_url(&base);
        assert_eq!(client.terminate("pod-abc").await, Ok(true));
    }

    #[tokio::test]
    async fn test_terminate_pod_unauthorized_is_clean_failure() {
        let base = serve_once("401 Unauthorized", r#"{"error":"invalid api key"}"#).await;
        let client = RunPodClient::new("rpa_bad_key").unwrap().with_base_url(&base);
        // An answered-but-rejected call is Ok(false), not a transport error.
        assert_eq!(client.terminate("pod-abc").await, Ok(false));
    }

    #[tokio::test]
    async fn test_verify_api_key_paths() {
        let base = serve_once("200 OK", r#"{"pods":[]}"#).await;
        let client = RunPodClient::new("rpa_test_key").unwrap().with_base_url(&base);
        assert_eq!(client.verify_api_key().await, Ok(true));

        let base = serve_once("401 Unauthorized", "").await;
        let client = RunPodClient::new("rpa_bad_key").unwrap().with_base_url(&base);
        assert_eq!(client.verify_api_key().await, Ok(false));
    }
}
