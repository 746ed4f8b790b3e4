//! HTTP client for the dataset-curation service.
//!
//! [`CurationApi`] is the seam the core stores depend on; [`ApiClient`] is the
//! `reqwest` implementation talking JSON to the service.

mod response;

use async_trait::async_trait;
use curator_shared::{
    AnalysisResult, CleaningResult, ClientConfig, CuratorError, Dataset, DatasetId,
    DeleteDatasetResponse, GenerationRequest, GenerationResult, QaPage, Result,
};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

/// User-Agent string for service requests.
const USER_AGENT: &str = concat!("Curator/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// CurationApi
// ---------------------------------------------------------------------------

/// Operations the curation service exposes to the client core.
#[async_trait]
pub trait CurationApi: Send + Sync {
    /// `GET /dataset`
    async fn list_datasets(&self) -> Result<Vec<Dataset>>;

    /// `POST /dataset/generate` (or the legacy route).
    async fn generate_dataset(&self, request: &GenerationRequest) -> Result<GenerationResult>;

    /// `DELETE /dataset/{id}`
    async fn delete_dataset(&self, id: &DatasetId) -> Result<DeleteDatasetResponse>;

    /// `GET /dataset/{id}/analyze-similarities`
    async fn analyze_similarities(
        &self,
        id: &DatasetId,
        threshold: Option<f64>,
    ) -> Result<AnalysisResult>;

    /// `POST /dataset/{id}/clean-similarities`
    async fn clean_similarities(
        &self,
        id: &DatasetId,
        threshold: Option<f64>,
    ) -> Result<CleaningResult>;

    /// `GET /q_a/{id}?limit=&offset=`
    async fn list_qa(&self, id: &DatasetId, limit: u64, offset: u64) -> Result<QaPage>;

    /// `POST /langfuse/export`. The response is opaque to the client.
    async fn export_to_langfuse(
        &self,
        dataset_name: &str,
        langfuse_dataset_name: Option<&str>,
    ) -> Result<serde_json::Value>;
}

// ---------------------------------------------------------------------------
// ApiClient
// ---------------------------------------------------------------------------

/// `reqwest`-backed [`CurationApi`] implementation.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    legacy_generate_route: bool,
}

impl ApiClient {
    /// Build a client for the service described by `config`.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            CuratorError::config(format!("invalid base URL '{}': {e}", config.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(CuratorError::config(format!(
                "base URL cannot carry paths: {base_url}"
            )));
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()
            .map_err(|e| CuratorError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            legacy_generate_route: config.legacy_generate_route,
        })
    }

    /// The service base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Join percent-encoded path segments onto the base URL.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!(%method, %url, "curation request");
        self.client.request(method, url)
    }

    /// Send a request and return the raw body of a 2xx response.
    async fn send(&self, request: RequestBuilder, endpoint: &str) -> Result<Vec<u8>> {
        let resp = request
            .send()
            .await
            .map_err(|e| CuratorError::Network(format!("{endpoint}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = response::error_message(status, &body);
            debug!(endpoint, status = status.as_u16(), %message, "service returned an error");
            return Err(CuratorError::server(status.as_u16(), message));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| CuratorError::Network(format!("{endpoint}: failed to read body: {e}")))?;
        Ok(body.to_vec())
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        endpoint: &str,
    ) -> Result<T> {
        let body = self.send(request, endpoint).await?;
        response::decode(endpoint, &body)
    }
}

#[async_trait]
impl CurationApi for ApiClient {
    #[instrument(skip_all)]
    async fn list_datasets(&self) -> Result<Vec<Dataset>> {
        let url = self.endpoint(&["dataset"]);
        let body = self.send(self.request(Method::GET, url), "/dataset").await?;
        response::decode_dataset_list("/dataset", &body)
    }

    #[instrument(skip_all, fields(dataset_name = %request.dataset_name))]
    async fn generate_dataset(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        if self.legacy_generate_route {
            let url = self.endpoint(&["generate", "dataset", "url"]);
            let builder = self.request(Method::POST, url).query(&[
                ("url", request.url.as_str()),
                ("dataset_name", request.dataset_name.as_str()),
            ]);
            return self.send_json(builder, "/generate/dataset/url").await;
        }

        let url = self.endpoint(&["dataset", "generate"]);
        let builder = self.request(Method::POST, url).json(request);
        self.send_json(builder, "/dataset/generate").await
    }

    #[instrument(skip_all, fields(dataset_id = %id))]
    async fn delete_dataset(&self, id: &DatasetId) -> Result<DeleteDatasetResponse> {
        let url = self.endpoint(&["dataset", id.as_str()]);
        self.send_json(self.request(Method::DELETE, url), "/dataset/{id}")
            .await
    }

    #[instrument(skip_all, fields(dataset_id = %id, ?threshold))]
    async fn analyze_similarities(
        &self,
        id: &DatasetId,
        threshold: Option<f64>,
    ) -> Result<AnalysisResult> {
        let url = self.endpoint(&["dataset", id.as_str(), "analyze-similarities"]);
        let mut builder = self.request(Method::GET, url);
        if let Some(t) = threshold {
            builder = builder.query(&[("threshold", t)]);
        }
        self.send_json(builder, "/dataset/{id}/analyze-similarities")
            .await
    }

    #[instrument(skip_all, fields(dataset_id = %id, ?threshold))]
    async fn clean_similarities(
        &self,
        id: &DatasetId,
        threshold: Option<f64>,
    ) -> Result<CleaningResult> {
        let url = self.endpoint(&["dataset", id.as_str(), "clean-similarities"]);
        let mut builder = self.request(Method::POST, url);
        if let Some(t) = threshold {
            builder = builder.query(&[("threshold", t)]);
        }
        self.send_json(builder, "/dataset/{id}/clean-similarities")
            .await
    }

    #[instrument(skip_all, fields(dataset_id = %id, limit = limit, offset = offset))]
    async fn list_qa(&self, id: &DatasetId, limit: u64, offset: u64) -> Result<QaPage> {
        let url = self.endpoint(&["q_a", id.as_str()]);
        let builder = self
            .request(Method::GET, url)
            .query(&[("limit", limit), ("offset", offset)]);
        self.send_json(builder, "/q_a/{id}").await
    }

    #[instrument(skip_all, fields(dataset_name = %dataset_name))]
    async fn export_to_langfuse(
        &self,
        dataset_name: &str,
        langfuse_dataset_name: Option<&str>,
    ) -> Result<serde_json::Value> {
        let url = self.endpoint(&["langfuse", "export"]);
        let mut params = vec![("dataset_name", dataset_name)];
        if let Some(name) = langfuse_dataset_name.filter(|n| !n.is_empty()) {
            params.push(("langfuse_dataset_name", name));
        }
        let builder = self.request(Method::POST, url).query(&params);
        let body = self.send(builder, "/langfuse/export").await?;
        response::decode_opaque("/langfuse/export", &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ApiClient {
        ApiClient::new(&ClientConfig::for_base_url(server.uri())).unwrap()
    }

    #[test]
    fn endpoint_keeps_base_path_and_encodes_segments() {
        let client =
            ApiClient::new(&ClientConfig::for_base_url("https://curation.example.com/api/"))
                .unwrap();
        let url = client.endpoint(&["q_a", "a b/c"]);
        assert_eq!(url.as_str(), "https://curation.example.com/api/q_a/a%20b%2Fc");

        let client =
            ApiClient::new(&ClientConfig::for_base_url("http://localhost:8000")).unwrap();
        assert_eq!(
            client.endpoint(&["dataset"]).as_str(),
            "http://localhost:8000/dataset"
        );
    }

    #[test]
    fn rejects_invalid_base_url() {
        let err = ApiClient::new(&ClientConfig::for_base_url("not a url")).unwrap_err();
        assert!(matches!(err, CuratorError::Config { .. }));

        let err = ApiClient::new(&ClientConfig::for_base_url("mailto:ops@example.com")).unwrap_err();
        assert!(err.to_string().contains("cannot carry paths"));
    }

    #[tokio::test]
    async fn list_datasets_normalizes_single_object() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/dataset"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "abc", "name": "ds1"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let datasets = client_for(&server).list_datasets().await.unwrap();
        assert_eq!(datasets.len(), 1);
        assert_eq!(datasets[0].id.as_str(), "abc");
    }

    #[tokio::test]
    async fn generate_posts_json_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/dataset/generate"))
            .and(body_partial_json(json!({
                "url": "https://ex.com",
                "dataset_name": "ds1",
                "similarity_threshold": 0.9
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "abc",
                "dataset_name": "ds1",
                "qa_pairs": [],
                "total_questions": 42,
                "processing_time": 3.2
            })))
            .expect(1)
            .mount(&server)
            .await;

        let request = GenerationRequest {
            url: "https://ex.com".into(),
            dataset_name: "ds1".into(),
            target_language: None,
            model_qa: None,
            model_cleaning: None,
            similarity_threshold: Some(0.9),
        };
        let result = client_for(&server).generate_dataset(&request).await.unwrap();
        assert_eq!(result.dataset_id.as_str(), "abc");
        assert_eq!(result.total_questions, 42);
    }

    #[tokio::test]
    async fn legacy_generate_route_uses_query_params() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/generate/dataset/url"))
            .and(query_param("url", "https://ex.com"))
            .and(query_param("dataset_name", "ds1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "abc",
                "dataset_name": "ds1",
                "total_questions": 7
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = ClientConfig::for_base_url(server.uri());
        config.legacy_generate_route = true;
        let client = ApiClient::new(&config).unwrap();

        let request = GenerationRequest {
            url: "https://ex.com".into(),
            dataset_name: "ds1".into(),
            target_language: None,
            model_qa: None,
            model_cleaning: None,
            similarity_threshold: None,
        };
        let result = client.generate_dataset(&request).await.unwrap();
        assert_eq!(result.total_questions, 7);
    }

    #[tokio::test]
    async fn list_qa_sends_limit_and_offset() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/q_a/abc"))
            .and(query_param("limit", "10"))
            .and(query_param("offset", "20"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "dataset_name": "ds1",
                "dataset_id": "abc",
                "total_count": 25,
                "returned_count": 5,
                "offset": 20,
                "limit": 10,
                "qa_data": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let page = client_for(&server)
            .list_qa(&DatasetId::from("abc"), 10, 20)
            .await
            .unwrap();
        assert_eq!(page.offset, 20);
        assert_eq!(page.returned_count, 5);
    }

    #[tokio::test]
    async fn analyze_passes_threshold_only_when_set() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/dataset/abc/analyze-similarities"))
            .and(query_param("threshold", "0.85"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "dataset_id": "abc",
                "dataset_name": "ds1",
                "threshold": 0.85,
                "total_records": 42,
                "similar_pairs_found": 3,
                "similarities": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = client_for(&server)
            .analyze_similarities(&DatasetId::from("abc"), Some(0.85))
            .await
            .unwrap();
        assert_eq!(result.similar_pairs_found, 3);
    }

    #[tokio::test]
    async fn server_error_carries_detail() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/dataset/missing"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"detail": "Dataset not found"})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)
            .delete_dataset(&DatasetId::from("missing"))
            .await
            .unwrap_err();
        match err {
            CuratorError::Server { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "Dataset not found");
            }
            other => panic!("expected Server error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_error_without_body_falls_back_to_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/dataset/abc/clean-similarities"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .clean_similarities(&DatasetId::from("abc"), None)
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "HTTP 503");
    }

    #[tokio::test]
    async fn unreachable_service_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = ApiClient::new(&ClientConfig::for_base_url(format!("http://{addr}"))).unwrap();

        let err = client.list_datasets().await.unwrap_err();
        assert!(matches!(err, CuratorError::Network(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn export_sends_names_as_query() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/langfuse/export"))
            .and(query_param("dataset_name", "ds1"))
            .and(query_param("langfuse_dataset_name", "ds1-eval"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"exported": 39})))
            .expect(1)
            .mount(&server)
            .await;

        let value = client_for(&server)
            .export_to_langfuse("ds1", Some("ds1-eval"))
            .await
            .unwrap();
        assert_eq!(value["exported"], 39);
    }
}
