//! Client for the deployment backend.
//!
//! [`DeploymentApi`] is the seam the wizard talks through; [`HttpDeploymentApi`]
//! is the HTTP/JSON implementation. Every failure is reported as an
//! [`ApiError`] and nothing is retried.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{ApiError, Error, Result};
use crate::models::{
    CreatedDeployment, DeploymentId, DeploymentRecord, DeploymentRequest, LogsResponse, Metadata,
    StatusResponse,
};

/// Result of a single backend call.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Operations the wizard needs from the deployment backend.
#[async_trait]
pub trait DeploymentApi: Send + Sync {
    /// `POST /webapps/`
    async fn create_deployment(&self, request: &DeploymentRequest) -> ApiResult<CreatedDeployment>;

    /// `GET /webapps/`
    async fn list_deployments(&self) -> ApiResult<Vec<DeploymentRecord>>;

    /// `GET /webapps/{id}/`
    async fn get_deployment(&self, id: &DeploymentId) -> ApiResult<DeploymentRecord>;

    /// `GET /webapps/{id}/status/`
    async fn get_status(&self, id: &DeploymentId) -> ApiResult<StatusResponse>;

    /// `GET /webapps/{id}/logs/`
    async fn get_logs(&self, id: &DeploymentId) -> ApiResult<LogsResponse>;

    /// `GET /metadata/`
    async fn get_metadata(&self) -> ApiResult<Metadata>;
}

/// HTTP implementation of [`DeploymentApi`].
#[derive(Clone, Debug)]
pub struct HttpDeploymentApi {
    client: Client,
    base_url: String,
}

impl HttpDeploymentApi {
    /// Builds a client from configuration.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(client, &config.api_url))
    }

    /// Wraps an existing reqwest client.
    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Joins an endpoint path onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = self.endpoint(path);
        debug!(%method, %url, "backend request");
        self.client.request(method, url)
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ApiResult<T> {
        let response = builder.send().await?;
        decode(response).await
    }
}

/// Turns a response into `T`, or into the uniform error shape.
async fn decode<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        return Err(error_from_body(status.as_u16(), &text));
    }

    serde_json::from_str(&text)
        .map_err(|e| ApiError::Transport(format!("invalid response body: {}", e)))
}

/// Builds the error for a non-2xx response.
///
/// A JSON body is passed through as parsed, any other non-empty body as a
/// JSON string, and an empty body becomes a transport message.
pub fn error_from_body(status: u16, text: &str) -> ApiError {
    if text.trim().is_empty() {
        return ApiError::Transport(format!("Request failed with status code {}", status));
    }
    let body = serde_json::from_str(text)
        .unwrap_or_else(|_| serde_json::Value::String(text.to_string()));
    ApiError::Response { status, body }
}

fn webapp_path(id: &DeploymentId, suffix: &str) -> String {
    format!("webapps/{}/{}", id.as_str(), suffix)
}

#[async_trait]
impl DeploymentApi for HttpDeploymentApi {
    async fn create_deployment(&self, request: &DeploymentRequest) -> ApiResult<CreatedDeployment> {
        self.send(self.request(Method::POST, "webapps/").json(request))
            .await
    }

    async fn list_deployments(&self) -> ApiResult<Vec<DeploymentRecord>> {
        self.send(self.request(Method::GET, "webapps/")).await
    }

    async fn get_deployment(&self, id: &DeploymentId) -> ApiResult<DeploymentRecord> {
        self.send(self.request(Method::GET, &webapp_path(id, ""))).await
    }

    async fn get_status(&self, id: &DeploymentId) -> ApiResult<StatusResponse> {
        self.send(self.request(Method::GET, &webapp_path(id, "status/")))
            .await
    }

    async fn get_logs(&self, id: &DeploymentId) -> ApiResult<LogsResponse> {
        self.send(self.request(Method::GET, &webapp_path(id, "logs/")))
            .await
    }

    async fn get_metadata(&self) -> ApiResult<Metadata> {
        self.send(self.request(Method::GET, "metadata/")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn api() -> HttpDeploymentApi {
        HttpDeploymentApi::new(&ClientConfig::default()).unwrap()
    }

    #[test]
    fn endpoints_join_on_base_url() {
        let api = HttpDeploymentApi::with_client(Client::new(), "http://localhost:8000/api/");
        assert_eq!(api.endpoint(""), "http://localhost:8000/api/");
        assert_eq!(api.endpoint("webapps/"), "http://localhost:8000/api/webapps/");
        assert_eq!(api.endpoint("/metadata/"), "http://localhost:8000/api/metadata/");
    }

    #[test]
    fn webapp_paths_keep_trailing_slash() {
        let id = DeploymentId::new("6f1c");
        let api = api();
        assert_eq!(
            api.endpoint(&webapp_path(&id, "")),
            "http://localhost:8000/api/webapps/6f1c/"
        );
        assert_eq!(
            api.endpoint(&webapp_path(&id, "status/")),
            "http://localhost:8000/api/webapps/6f1c/status/"
        );
        assert_eq!(
            api.endpoint(&webapp_path(&id, "logs/")),
            "http://localhost:8000/api/webapps/6f1c/logs/"
        );
    }

    #[test]
    fn json_error_body_is_passed_through() {
        let err = error_from_body(400, r#"{"region": ["\"mars\" is not a valid choice."]}"#);
        assert_eq!(err.status(), Some(400));
        assert_eq!(
            err.body(),
            Some(&json!({"region": ["\"mars\" is not a valid choice."]}))
        );
    }

    #[test]
    fn text_error_body_becomes_json_string() {
        let err = error_from_body(500, "Internal Server Error");
        assert_eq!(err.body(), Some(&json!("Internal Server Error")));
    }

    #[test]
    fn empty_error_body_is_transport_message() {
        let err = error_from_body(404, "");
        assert_eq!(
            err,
            ApiError::Transport("Request failed with status code 404".to_string())
        );
    }

    #[tokio::test]
    async fn unreachable_backend_is_transport_error() {
        // Port 9 (discard) is not expected to serve HTTP.
        let api = HttpDeploymentApi::with_client(Client::new(), "http://127.0.0.1:9/api");
        let err = api.get_metadata().await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
    }
}
