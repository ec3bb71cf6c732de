//! ARM REST client.
//!
//! This module provides the HTTP client for the Azure Resource Manager
//! control plane, including long-running operation polling.

use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode, header::HeaderMap};
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::error::{ArmApiError, ArmStateError, Result};

use super::provider::ResourceProvider;
use super::types::{ErrorBody, ErrorEnvelope, OperationStatus, OperationStatusBody, Page, ResourceId};

/// Public Azure cloud management endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://management.azure.com";

/// Header carrying the operation status URL.
const HEADER_ASYNC_OPERATION: &str = "azure-asyncoperation";

/// Header carrying the per-request correlation id.
const HEADER_CLIENT_REQUEST_ID: &str = "x-ms-client-request-id";

/// Wait applied when a 429 carries no usable `Retry-After`.
const DEFAULT_THROTTLE_SECS: u64 = 60;

/// Default interval between operation polls.
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Default bound on a long-running operation.
const DEFAULT_LRO_TIMEOUT_SECS: u64 = 1800;

/// ARM REST client.
#[derive(Debug, Clone)]
pub struct ArmClient {
    /// HTTP client.
    client: Client,
    /// Management endpoint without trailing slash.
    endpoint: String,
    /// Bearer token.
    token: String,
    /// Delay between polls when ARM gives no `Retry-After`.
    poll_interval: Duration,
    /// Bound on a single long-running operation.
    lro_timeout: Duration,
}

/// How completion of a long-running operation is observed.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PollTarget {
    /// Status document with a `status` field.
    AsyncOperation(String),
    /// URL answering 202 until done.
    Location(String),
}

impl ArmClient {
    /// Creates a new ARM client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(endpoint: &str, token: &str, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ArmApiError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token: token.to_string(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            lro_timeout: Duration::from_secs(DEFAULT_LRO_TIMEOUT_SECS),
        })
    }

    /// Sets the polling interval and the long-running operation bound.
    #[must_use]
    pub fn with_polling(mut self, poll_interval: Duration, lro_timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.lro_timeout = lro_timeout;
        self
    }

    /// Returns the management endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.endpoint)
    }

    /// Sends one request and maps error statuses.
    async fn send(
        &self,
        method: Method,
        url: &str,
        api_version: Option<&str>,
        body: Option<&Value>,
        resource: &str,
    ) -> Result<Response> {
        let request_id = Uuid::new_v4().to_string();
        trace!("{method} {url} (request id {request_id})");

        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(&self.token)
            .header(HEADER_CLIENT_REQUEST_ID, &request_id);

        if let Some(version) = api_version {
            request = request.query(&[("api-version", version)]);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ArmApiError::network(format!("Request failed: {e}")))?;

        check_status(response, resource).await
    }

    /// Sends a PUT or PATCH and returns the resource once provisioning ends.
    async fn write(
        &self,
        method: Method,
        id: &ResourceId,
        api_version: &str,
        body: &Value,
    ) -> Result<Value> {
        debug!("{method} {id}");
        let response = self
            .send(method.clone(), &self.url(id.as_str()), Some(api_version), Some(body), id.as_str())
            .await?;

        if let Some(target) = poll_target(&response) {
            info!("Waiting for {method} on {id} to complete");
            let initial = retry_after(response.headers());
            self.wait(&target, initial, id).await?;
            return self.get(id, api_version).await;
        }

        let text = response
            .text()
            .await
            .map_err(|e| ArmApiError::invalid_response(format!("Failed to read response: {e}")))?;
        if text.trim().is_empty() {
            return self.get(id, api_version).await;
        }
        parse_json(&text)
    }

    /// Polls a long-running operation until it ends or times out.
    async fn wait(&self, target: &PollTarget, initial: Option<Duration>, id: &ResourceId) -> Result<()> {
        let started = Instant::now();
        let mut delay = initial.unwrap_or(self.poll_interval);

        loop {
            if started.elapsed() + delay > self.lro_timeout {
                return Err(ArmStateError::Arm(ArmApiError::Timeout {
                    resource_id: id.to_string(),
                    waited_secs: started.elapsed().as_secs(),
                }));
            }
            tokio::time::sleep(delay).await;

            match target {
                PollTarget::AsyncOperation(url) => {
                    let response = self.send(Method::GET, url, None, None, id.as_str()).await?;
                    let next = retry_after(response.headers());
                    let body: OperationStatusBody = response.json().await.map_err(|e| {
                        ArmApiError::invalid_response(format!("Failed to parse operation status: {e}"))
                    })?;

                    if body.status.is_terminal() {
                        return match body.status {
                            OperationStatus::Succeeded => Ok(()),
                            status => Err(ArmStateError::Arm(ArmApiError::OperationFailed {
                                status: status.to_string(),
                                message: body.error.map(|e| e.message).unwrap_or_default(),
                            })),
                        };
                    }
                    debug!("Operation on {id} is {}", body.status);
                    delay = next.unwrap_or(self.poll_interval);
                }
                PollTarget::Location(url) => {
                    let response = self.send(Method::GET, url, None, None, id.as_str()).await?;
                    if response.status() != StatusCode::ACCEPTED {
                        return Ok(());
                    }
                    debug!("Operation on {id} still accepted");
                    delay = retry_after(response.headers()).unwrap_or(self.poll_interval);
                }
            }
        }
    }

    async fn read_page(&self, url: &str, api_version: Option<&str>) -> Result<Page> {
        let response = self.send(Method::GET, url, api_version, None, url).await?;
        response
            .json()
            .await
            .map_err(|e| ArmStateError::Arm(ArmApiError::invalid_response(format!("Failed to parse list response: {e}"))))
    }
}

#[async_trait]
impl ResourceProvider for ArmClient {
    async fn get(&self, id: &ResourceId, api_version: &str) -> Result<Value> {
        debug!("GET {id}");
        let response = self
            .send(Method::GET, &self.url(id.as_str()), Some(api_version), None, id.as_str())
            .await?;
        response
            .json()
            .await
            .map_err(|e| ArmStateError::Arm(ArmApiError::invalid_response(format!("Failed to parse resource: {e}"))))
    }

    async fn create_or_update(&self, id: &ResourceId, api_version: &str, body: &Value) -> Result<Value> {
        self.write(Method::PUT, id, api_version, body).await
    }

    async fn update(&self, id: &ResourceId, api_version: &str, body: &Value) -> Result<Value> {
        self.write(Method::PATCH, id, api_version, body).await
    }

    async fn delete(&self, id: &ResourceId, api_version: &str) -> Result<()> {
        debug!("DELETE {id}");
        let response = self
            .send(Method::DELETE, &self.url(id.as_str()), Some(api_version), None, id.as_str())
            .await?;

        if response.status() == StatusCode::NO_CONTENT {
            debug!("{id} did not exist");
            return Ok(());
        }

        if let Some(target) = poll_target(&response) {
            info!("Waiting for deletion of {id}");
            let initial = retry_after(response.headers());
            self.wait(&target, initial, id).await?;
        }
        Ok(())
    }

    async fn list(&self, scope: &ResourceId, api_version: &str) -> Result<Page> {
        debug!("LIST {scope}");
        self.read_page(&self.url(scope.as_str()), Some(api_version)).await
    }

    async fn list_next(&self, next_link: &str) -> Result<Page> {
        debug!("LIST {next_link}");
        self.read_page(next_link, None).await
    }
}

/// Maps non-success statuses to errors.
async fn check_status(response: Response, resource: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status.as_u16() {
        404 => Err(ArmStateError::Arm(ArmApiError::NotFound {
            resource_id: resource.to_string(),
        })),
        429 => {
            let retry_after_secs = retry_after(response.headers())
                .map_or(DEFAULT_THROTTLE_SECS, |d| d.as_secs());
            Err(ArmStateError::Arm(ArmApiError::Throttled { retry_after_secs }))
        }
        401 | 403 => {
            let body = error_body(response).await;
            Err(ArmStateError::Arm(ArmApiError::AuthenticationFailed {
                message: format!("{} {}", body.code, body.message).trim().to_string(),
            }))
        }
        code => {
            let body = error_body(response).await;
            Err(ArmStateError::Arm(ArmApiError::request_failed(code, body.code, body.message)))
        }
    }
}

/// Reads an ARM error envelope, falling back to the raw body.
async fn error_body(response: Response) -> ErrorBody {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();

    serde_json::from_str::<ErrorEnvelope>(&text).map_or_else(
        |_| ErrorBody {
            code: status.canonical_reason().unwrap_or_default().to_string(),
            message: text,
        },
        |envelope| envelope.error,
    )
}

fn parse_json(text: &str) -> Result<Value> {
    serde_json::from_str(text).map_err(|e| {
        ArmStateError::Arm(ArmApiError::invalid_response(format!("Failed to parse resource: {e}")))
    })
}

fn poll_target(response: &Response) -> Option<PollTarget> {
    let header = |name: &str| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    };

    if let Some(url) = header(HEADER_ASYNC_OPERATION) {
        return Some(PollTarget::AsyncOperation(url));
    }
    if response.status() == StatusCode::ACCEPTED {
        return header(reqwest::header::LOCATION.as_str()).map(PollTarget::Location);
    }
    None
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ID: &str = "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.SignalRService/signalR/sig1";
    const API: &str = "2023-02-01";

    fn client(server: &MockServer) -> ArmClient {
        ArmClient::new(&server.uri(), "tok", Duration::from_secs(5))
            .unwrap()
            .with_polling(Duration::from_millis(10), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_get_sends_auth_and_api_version() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(ID))
            .and(query_param("api-version", API))
            .and(header("authorization", "Bearer tok"))
            .and(header_exists(HEADER_CLIENT_REQUEST_ID))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": ID, "sku": { "capacity": 1 } })))
            .mount(&server)
            .await;

        let resource = client(&server).get(&ResourceId::new(ID), API).await.unwrap();
        assert_eq!(resource["sku"]["capacity"], json!(1));
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": { "code": "ResourceNotFound", "message": "gone" }
            })))
            .mount(&server)
            .await;

        let err = client(&server).get(&ResourceId::new(ID), API).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_error_envelope_is_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "code": "InvalidSku", "message": "Sku Basic is not valid" }
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .create_or_update(&ResourceId::new(ID), API, &json!({}))
            .await
            .unwrap_err();
        match err {
            ArmStateError::Arm(ArmApiError::RequestFailed { status, code, message }) => {
                assert_eq!(status, 400);
                assert_eq!(code, "InvalidSku");
                assert_eq!(message, "Sku Basic is not valid");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_throttled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "17"))
            .mount(&server)
            .await;

        let err = client(&server).get(&ResourceId::new(ID), API).await.unwrap_err();
        assert!(matches!(
            err,
            ArmStateError::Arm(ArmApiError::Throttled { retry_after_secs: 17 })
        ));
    }

    #[tokio::test]
    async fn test_put_waits_for_async_operation_then_reads() {
        let server = MockServer::start().await;
        let operation = format!("{}/operations/op1", server.uri());

        Mock::given(method("PUT"))
            .and(path(ID))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("azure-asyncoperation", operation.as_str())
                    .set_body_json(json!({ "properties": { "provisioningState": "Creating" } })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/op1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "InProgress" })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/op1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "Succeeded" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(ID))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "properties": { "provisioningState": "Succeeded" }
            })))
            .mount(&server)
            .await;

        let resource = client(&server)
            .create_or_update(&ResourceId::new(ID), API, &json!({ "location": "westeurope" }))
            .await
            .unwrap();
        assert_eq!(resource["properties"]["provisioningState"], json!("Succeeded"));
    }

    #[tokio::test]
    async fn test_failed_operation() {
        let server = MockServer::start().await;
        let operation = format!("{}/operations/op2", server.uri());

        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(202).insert_header("azure-asyncoperation", operation.as_str()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/op2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "Failed",
                "error": { "code": "Conflict", "message": "Another operation is in progress" }
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .update(&ResourceId::new(ID), API, &json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Another operation is in progress"));
    }

    #[tokio::test]
    async fn test_delete_follows_location() {
        let server = MockServer::start().await;
        let location = format!("{}/locations/op3", server.uri());

        Mock::given(method("DELETE"))
            .and(path(ID))
            .respond_with(ResponseTemplate::new(202).insert_header("location", location.as_str()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/locations/op3"))
            .respond_with(ResponseTemplate::new(202))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/locations/op3"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).delete(&ResourceId::new(ID), API).await.unwrap();
    }

    #[tokio::test]
    async fn test_operation_timeout() {
        let server = MockServer::start().await;
        let location = format!("{}/locations/slow", server.uri());

        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(202).insert_header("location", location.as_str()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/locations/slow"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let client = ArmClient::new(&server.uri(), "tok", Duration::from_secs(5))
            .unwrap()
            .with_polling(Duration::from_millis(10), Duration::from_millis(50));
        let err = client.delete(&ResourceId::new(ID), API).await.unwrap_err();
        assert!(matches!(err, ArmStateError::Arm(ArmApiError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_list_and_next_link() {
        let server = MockServer::start().await;
        let scope = "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.SignalRService/signalR";
        let next = format!("{}/page2?api-version={API}&$skiptoken=abc", server.uri());

        Mock::given(method("GET"))
            .and(path(scope))
            .and(query_param("api-version", API))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{ "name": "a" }],
                "nextLink": next
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/page2"))
            .and(query_param("$skiptoken", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [{ "name": "b" }] })))
            .mount(&server)
            .await;

        let client = client(&server);
        let first = client.list(&ResourceId::new(scope), API).await.unwrap();
        assert_eq!(first.items.len(), 1);
        let link = first.next_link.unwrap();
        assert_eq!(link, next);

        let second = client.list_next(&link).await.unwrap();
        assert_eq!(second.items[0]["name"], json!("b"));
        assert!(second.next_link.is_none());
    }
}
