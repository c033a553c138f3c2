//! The collaborator contract and its HTTP implementation.
//!
//! The orchestrator never talks to the network directly. Everything it needs
//! from the platform goes through [`Transport`], which keeps the wire format,
//! session handling, and object decoding out of the control logic.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleetq_core::{
    ExportId, ObjectId, ObjectKind, ObjectRef, ParseJob, ParseResult, ResultInfo, ResultSet,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TransportError};
use crate::types::{ExportRequest, FetchRequest};
use crate::TransportConfig;

/// Header carrying the session token on every request.
pub const SESSION_HEADER: &str = "session";

/// Operations the orchestrator consumes from the platform.
///
/// This trait abstracts the session layer, allowing for mock
/// implementations in tests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Persist a request object and return its assigned identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server rejects the object.
    async fn submit(&self, kind: ObjectKind, body: &serde_json::Value) -> Result<ObjectId>;

    /// Retrieve objects by identity or filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    async fn fetch_objects(&self, request: &FetchRequest) -> Result<Vec<serde_json::Value>>;

    /// Fetch the current progress snapshot for a question or saved question.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    async fn fetch_result_info(&self, object: &ObjectRef) -> Result<ResultInfo>;

    /// Fetch answer rows. `row_counts_only` asks for aggregate counts.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    async fn fetch_result_data(&self, object: &ObjectRef, row_counts_only: bool)
        -> Result<ResultSet>;

    /// Start a bulk export job.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server refuses the export.
    async fn start_bulk_export(&self, request: &ExportRequest) -> Result<ExportId>;

    /// Read the status text of a bulk export job.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    async fn bulk_export_status(&self, export_id: &ExportId) -> Result<String>;

    /// Download the payload of a completed bulk export job.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    async fn bulk_export_payload(&self, export_id: &ExportId) -> Result<Vec<u8>>;

    /// Decode a structured export payload into a result set.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Decode` if the payload is not a result set.
    fn decode_result_set(&self, payload: &[u8]) -> Result<ResultSet>;

    /// Read the server's reported version string.
    ///
    /// # Errors
    ///
    /// Returns an error if the version cannot be retrieved.
    async fn server_version(&self) -> Result<String>;

    /// Delete an object.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the object does not exist.
    async fn delete(&self, object: &ObjectRef) -> Result<()>;

    /// Run the server-side question parser.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    async fn parse_question(&self, job: &ParseJob) -> Result<Vec<ParseResult>>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn submit(&self, kind: ObjectKind, body: &serde_json::Value) -> Result<ObjectId> {
        (**self).submit(kind, body).await
    }

    async fn fetch_objects(&self, request: &FetchRequest) -> Result<Vec<serde_json::Value>> {
        (**self).fetch_objects(request).await
    }

    async fn fetch_result_info(&self, object: &ObjectRef) -> Result<ResultInfo> {
        (**self).fetch_result_info(object).await
    }

    async fn fetch_result_data(
        &self,
        object: &ObjectRef,
        row_counts_only: bool,
    ) -> Result<ResultSet> {
        (**self).fetch_result_data(object, row_counts_only).await
    }

    async fn start_bulk_export(&self, request: &ExportRequest) -> Result<ExportId> {
        (**self).start_bulk_export(request).await
    }

    async fn bulk_export_status(&self, export_id: &ExportId) -> Result<String> {
        (**self).bulk_export_status(export_id).await
    }

    async fn bulk_export_payload(&self, export_id: &ExportId) -> Result<Vec<u8>> {
        (**self).bulk_export_payload(export_id).await
    }

    fn decode_result_set(&self, payload: &[u8]) -> Result<ResultSet> {
        (**self).decode_result_set(payload)
    }

    async fn server_version(&self) -> Result<String> {
        (**self).server_version().await
    }

    async fn delete(&self, object: &ObjectRef) -> Result<()> {
        (**self).delete(object).await
    }

    async fn parse_question(&self, job: &ParseJob) -> Result<Vec<ParseResult>> {
        (**self).parse_question(job).await
    }
}

/// HTTP transport for the platform's REST API.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: TransportConfig,
}

/// Response body of a submit request.
#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: ObjectId,
}

/// Response body of a retrieval request.
#[derive(Debug, Deserialize)]
struct ObjectsResponse {
    #[serde(default)]
    objects: Vec<serde_json::Value>,
}

/// Request body for result info and result data.
#[derive(Debug, Serialize)]
struct ResultRequest<'a> {
    object: &'a ObjectRef,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    row_counts_only: bool,
}

/// Request body for starting an export.
#[derive(Debug, Serialize)]
struct ExportStartBody<'a> {
    object: &'a ObjectRef,
    export_format: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    leading: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trailing: Option<&'a str>,
}

/// Response body of an export start request.
#[derive(Debug, Deserialize)]
struct ExportStartResponse {
    export_id: ExportId,
}

/// Response body of the server info endpoint.
#[derive(Debug, Deserialize)]
struct InfoResponse {
    version: String,
}

/// Response body of the parser endpoint.
#[derive(Debug, Deserialize)]
struct ParseResponse {
    #[serde(default)]
    results: Vec<ParseResult>,
}

/// Error response from the server.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

impl HttpTransport {
    /// Create a new HTTP transport.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created.
    #[must_use]
    pub fn new(config: TransportConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, config }
    }

    /// Create a new transport with a custom reqwest client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, config: TransportConfig) -> Self {
        Self { client, config }
    }

    /// Get the base URL of the platform.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, self.config.url(path));
        match &self.config.session {
            Some(session) => builder.header(SESSION_HEADER, session),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let message = response
            .json::<ErrorResponse>()
            .await
            .map(|e| e.error)
            .unwrap_or_else(|_| format!("server returned status {status}"));

        tracing::debug!(status = %status, error = %message, "Request rejected");

        if status == reqwest::StatusCode::NOT_FOUND {
            Err(TransportError::NotFound(message))
        } else {
            Err(TransportError::Status {
                status: status.as_u16(),
                message,
            })
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: reqwest::RequestBuilder) -> Result<T> {
        self.send(builder)
            .await?
            .json::<T>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn submit(&self, kind: ObjectKind, body: &serde_json::Value) -> Result<ObjectId> {
        let path = format!("/api/v1/objects/{}", kind.collection_name());
        let resp: SubmitResponse = self
            .send_json(self.request(reqwest::Method::POST, &path).json(body))
            .await?;
        tracing::debug!(kind = %kind, id = %resp.id, "Submitted object");
        Ok(resp.id)
    }

    async fn fetch_objects(&self, request: &FetchRequest) -> Result<Vec<serde_json::Value>> {
        let path = format!("/api/v1/objects/{}/query", request.kind.collection_name());
        let resp: ObjectsResponse = self
            .send_json(self.request(reqwest::Method::POST, &path).json(request))
            .await?;
        Ok(resp.objects)
    }

    async fn fetch_result_info(&self, object: &ObjectRef) -> Result<ResultInfo> {
        let body = ResultRequest {
            object,
            row_counts_only: false,
        };
        self.send_json(
            self.request(reqwest::Method::POST, "/api/v1/result_info")
                .json(&body),
        )
        .await
    }

    async fn fetch_result_data(
        &self,
        object: &ObjectRef,
        row_counts_only: bool,
    ) -> Result<ResultSet> {
        let body = ResultRequest {
            object,
            row_counts_only,
        };
        self.send_json(
            self.request(reqwest::Method::POST, "/api/v1/result_data")
                .json(&body),
        )
        .await
    }

    async fn start_bulk_export(&self, request: &ExportRequest) -> Result<ExportId> {
        let body = ExportStartBody {
            object: &request.question,
            export_format: request.format.code(),
            leading: request.leading_text.as_deref(),
            trailing: request.trailing_text.as_deref(),
        };
        let resp: ExportStartResponse = self
            .send_json(self.request(reqwest::Method::POST, "/api/v1/export").json(&body))
            .await?;
        Ok(resp.export_id)
    }

    async fn bulk_export_status(&self, export_id: &ExportId) -> Result<String> {
        let path = format!("/export/{export_id}.status");
        let text = self
            .send(self.request(reqwest::Method::GET, &path))
            .await?
            .text()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        Ok(text.trim().to_string())
    }

    async fn bulk_export_payload(&self, export_id: &ExportId) -> Result<Vec<u8>> {
        let path = format!("/export/{export_id}.gz");
        let bytes = self
            .send(self.request(reqwest::Method::GET, &path))
            .await?
            .bytes()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn decode_result_set(&self, payload: &[u8]) -> Result<ResultSet> {
        serde_json::from_slice(payload).map_err(|e| TransportError::Decode(e.to_string()))
    }

    async fn server_version(&self) -> Result<String> {
        let info: InfoResponse = self
            .send_json(self.request(reqwest::Method::GET, "/info.json"))
            .await?;
        Ok(info.version)
    }

    async fn delete(&self, object: &ObjectRef) -> Result<()> {
        let id = object
            .id
            .ok_or_else(|| TransportError::Internal(format!("cannot delete {object}: no id")))?;
        let path = format!("/api/v1/objects/{}/{id}", object.kind.collection_name());
        self.send(self.request(reqwest::Method::DELETE, &path))
            .await?;
        tracing::debug!(object = %object, "Deleted object");
        Ok(())
    }

    async fn parse_question(&self, job: &ParseJob) -> Result<Vec<ParseResult>> {
        let resp: ParseResponse = self
            .send_json(self.request(reqwest::Method::POST, "/api/v1/parse").json(job))
            .await?;
        Ok(resp.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FetchTarget;
    use fleetq_core::ExportFormat;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport_for(server: &MockServer) -> HttpTransport {
        HttpTransport::new(TransportConfig {
            base_url: server.uri(),
            session: Some("sess-1".to_string()),
            ..TransportConfig::default()
        })
    }

    fn question_ref(id: u64) -> ObjectRef {
        ObjectRef::by_id(ObjectKind::Question, ObjectId::new(id))
    }

    #[test]
    fn http_transport_creation() {
        let transport = HttpTransport::new(TransportConfig {
            base_url: "https://fleet.example".to_string(),
            ..TransportConfig::default()
        });
        assert_eq!(transport.base_url(), "https://fleet.example");
    }

    #[tokio::test]
    async fn submit_sends_session_and_returns_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/objects/questions"))
            .and(header(SESSION_HEADER, "sess-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 812})))
            .expect(1)
            .mount(&server)
            .await;

        let id = transport_for(&server)
            .submit(ObjectKind::Question, &json!({"selects": []}))
            .await
            .unwrap();
        assert_eq!(id, ObjectId::new(812));
    }

    #[tokio::test]
    async fn fetch_objects_posts_filters() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/objects/sensors/query"))
            .and(body_partial_json(json!({
                "target": "list",
                "filters": [{"field": "name", "value": "Computer Name"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "objects": [{"id": 1, "name": "Computer Name"}]
            })))
            .mount(&server)
            .await;

        let request = FetchRequest::list(ObjectKind::Sensor).with_filters(vec![
            crate::types::CacheFilter {
                field: "name".to_string(),
                value: "Computer Name".to_string(),
            },
        ]);
        let objects = transport_for(&server).fetch_objects(&request).await.unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0]["name"], "Computer Name");
    }

    #[tokio::test]
    async fn lookup_target_is_sent_inline() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/objects/groups/query"))
            .and(body_partial_json(json!({"target": "lookup", "ids": [5]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"objects": []})))
            .expect(1)
            .mount(&server)
            .await;

        let request = FetchRequest {
            kind: ObjectKind::Group,
            target: FetchTarget::Lookup {
                ids: vec![ObjectId::new(5)],
            },
            filters: Vec::new(),
            include_hidden: false,
        };
        let objects = transport_for(&server).fetch_objects(&request).await.unwrap();
        assert!(objects.is_empty());
    }

    #[tokio::test]
    async fn not_found_maps_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/result_info"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"error": "no such question"})),
            )
            .mount(&server)
            .await;

        let err = transport_for(&server)
            .fetch_result_info(&question_ref(9))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NotFound(ref m) if m == "no such question"));
    }

    #[tokio::test]
    async fn server_error_is_retriable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/result_data"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = transport_for(&server)
            .fetch_result_data(&question_ref(9), false)
            .await
            .unwrap_err();
        assert_eq!(err.http_status_code(), Some(503));
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn result_info_decodes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/result_info"))
            .and(body_partial_json(json!({"object": {"kind": "question", "id": 9}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "question_id": 9,
                "estimated_total": 10,
                "row_count": 7
            })))
            .mount(&server)
            .await;

        let info = transport_for(&server)
            .fetch_result_info(&question_ref(9))
            .await
            .unwrap();
        assert_eq!(info.estimated_total, 10);
        assert_eq!(info.row_count, 7);
    }

    #[tokio::test]
    async fn export_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/export"))
            .and(body_partial_json(json!({"export_format": 2, "leading": "BEGIN"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"export_id": "exp-42"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/export/exp-42.status"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Completed.\n"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/export/exp-42.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"CEF:0|row".to_vec()))
            .mount(&server)
            .await;

        let transport = transport_for(&server);
        let export_id = transport
            .start_bulk_export(&ExportRequest {
                question: question_ref(9),
                format: ExportFormat::Cef,
                leading_text: Some("BEGIN".to_string()),
                trailing_text: None,
            })
            .await
            .unwrap();
        assert_eq!(export_id.as_str(), "exp-42");
        assert_eq!(
            transport.bulk_export_status(&export_id).await.unwrap(),
            "Completed."
        );
        assert_eq!(
            transport.bulk_export_payload(&export_id).await.unwrap(),
            b"CEF:0|row".to_vec()
        );
    }

    #[tokio::test]
    async fn server_version_reads_info() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/info.json"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"version": "6.5.314.4301"})),
            )
            .mount(&server)
            .await;

        assert_eq!(
            transport_for(&server).server_version().await.unwrap(),
            "6.5.314.4301"
        );
    }

    #[tokio::test]
    async fn delete_requires_id() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/objects/groups/14"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let transport = transport_for(&server);
        transport
            .delete(&ObjectRef::by_id(ObjectKind::Group, ObjectId::new(14)))
            .await
            .unwrap();

        let unnamed = ObjectRef {
            kind: ObjectKind::Group,
            id: None,
            name: Some("All".to_string()),
        };
        assert!(transport.delete(&unnamed).await.is_err());
    }

    #[tokio::test]
    async fn parse_question_returns_candidates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/parse"))
            .and(body_partial_json(json!({"parser_version": 2})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"score": 90, "question_text": "Get Computer Name from all machines"},
                    {"score": 40, "question_text": "Get Computer Names from all machines"}
                ]
            })))
            .mount(&server)
            .await;

        let results = transport_for(&server)
            .parse_question(&ParseJob::new("computer name"))
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].score, 90);
    }

    #[test]
    fn decode_result_set_rejects_garbage() {
        let transport = HttpTransport::new(TransportConfig::default());
        assert!(matches!(
            transport.decode_result_set(b"<not json>"),
            Err(TransportError::Decode(_))
        ));
        let set = transport
            .decode_result_set(br#"{"columns":[{"name":"Computer Name"}],"rows":[]}"#)
            .unwrap();
        assert_eq!(set.column_names(), vec!["Computer Name"]);
    }
}
