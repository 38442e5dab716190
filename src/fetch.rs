//! HTTP client abstraction for making requests to the backend services

use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE},
    Client, Method, RequestBuilder,
};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use url::Url;

/// Failure of a single HTTP exchange
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// The server answered with a non-success status
    #[error("Request failed with status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Helper for building and executing HTTP requests
pub struct FetchBuilder<'a> {
    client: &'a Client,
    url: String,
    method: Method,
    headers: HeaderMap,
    query_params: Vec<(String, String)>,
    body: Option<Vec<u8>>,
}

impl<'a> FetchBuilder<'a> {
    /// Create a new FetchBuilder
    pub fn new(client: &'a Client, url: &str, method: Method) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Self {
            client,
            url: url.to_string(),
            method,
            headers,
            query_params: Vec::new(),
            body: None,
        }
    }

    /// Add a header to the request
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Add a query parameter, keeping insertion order
    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query_params.push((key.to_string(), value.to_string()));
        self
    }

    /// Add a query parameter only when a value is present
    pub fn query_opt(self, key: &str, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }

    /// Add a JSON body to the request
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, FetchError> {
        let json = serde_json::to_vec(body)?;
        self.body = Some(json);
        Ok(self)
    }

    /// Send raw bytes with the given content type
    pub fn bytes(mut self, body: Vec<u8>, content_type: &str) -> Self {
        self.body = Some(body);
        self.header("Content-Type", content_type)
    }

    fn build(&self) -> Result<RequestBuilder, FetchError> {
        let mut url = Url::parse(&self.url)?;

        if !self.query_params.is_empty() {
            let mut query_pairs = url.query_pairs_mut();
            for (key, value) in &self.query_params {
                query_pairs.append_pair(key, value);
            }
        }

        let mut req = self.client.request(self.method.clone(), url.as_str());
        req = req.headers(self.headers.clone());

        if let Some(body) = &self.body {
            req = req.body(body.clone());
        }

        Ok(req)
    }

    async fn send_checked(&self) -> Result<reqwest::Response, FetchError> {
        let req = self.build()?;
        log::trace!("{} {}", self.method, self.url);
        let response = req.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status { status, body });
        }

        Ok(response)
    }

    /// Execute the request and parse the response as JSON
    pub async fn execute<T: DeserializeOwned>(&self) -> Result<T, FetchError> {
        let response = self.send_checked().await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Execute the request and discard the response body
    pub async fn execute_empty(&self) -> Result<(), FetchError> {
        self.send_checked().await?;
        Ok(())
    }
}

/// Helper for creating HTTP requests
pub struct Fetch;

impl Fetch {
    /// Create a GET request
    pub fn get<'a>(client: &'a Client, url: &str) -> FetchBuilder<'a> {
        FetchBuilder::new(client, url, Method::GET)
    }

    /// Create a POST request
    pub fn post<'a>(client: &'a Client, url: &str) -> FetchBuilder<'a> {
        FetchBuilder::new(client, url, Method::POST)
    }

    /// Create a PUT request
    pub fn put<'a>(client: &'a Client, url: &str) -> FetchBuilder<'a> {
        FetchBuilder::new(client, url, Method::PUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_execute_parses_json() {
        tokio_test::block_on(async {
            let mock_server = MockServer::start().await;

            Mock::given(method("GET"))
                .and(path("/thing.json"))
                .and(query_param("auth", "token"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"a": 1})))
                .mount(&mock_server)
                .await;

            let client = Client::new();
            let url = format!("{}/thing.json", mock_server.uri());
            let value: serde_json::Value = Fetch::get(&client, &url)
                .query("auth", "token")
                .execute()
                .await
                .unwrap();

            assert_eq!(value["a"], 1);
        });
    }

    #[test]
    fn test_non_success_status_keeps_body() {
        tokio_test::block_on(async {
            let mock_server = MockServer::start().await;

            Mock::given(method("PUT"))
                .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
                .mount(&mock_server)
                .await;

            let client = Client::new();
            let err = Fetch::put(&client, &mock_server.uri())
                .execute_empty()
                .await
                .unwrap_err();

            match err {
                FetchError::Status { status, body } => {
                    assert_eq!(status, 403);
                    assert_eq!(body, "denied");
                }
                other => panic!("unexpected error: {other:?}"),
            }
        });
    }
}
