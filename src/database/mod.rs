//! Keyed tree store (realtime database) access

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::auth::SessionHandle;
use crate::error::StoreError;
use crate::fetch::{Fetch, FetchBuilder};

/// Hierarchical JSON store addressed by slash-separated paths
#[async_trait]
pub trait TreeStore: Send + Sync {
    /// Replace the value at `path`
    async fn write(&self, path: &str, value: &Value) -> Result<(), StoreError>;

    /// Read the value at `path`; `None` if nothing is stored there
    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// Add `value` as a new child of `path` and return the generated key
    async fn append(&self, path: &str, value: &Value) -> Result<String, StoreError>;

    /// Children of `path` whose `order_by` field equals `value`
    async fn query_eq(
        &self,
        path: &str,
        order_by: &str,
        value: &Value,
    ) -> Result<Vec<(String, Value)>, StoreError>;
}

/// Split an object snapshot into `(key, child)` pairs
pub fn children(snapshot: Option<Value>) -> Vec<(String, Value)> {
    match snapshot {
        Some(Value::Object(map)) => map.into_iter().collect(),
        _ => Vec::new(),
    }
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    name: String,
}

/// REST client for the realtime database
pub struct RealtimeDbClient {
    url: String,
    client: Client,
    session: SessionHandle,
}

impl RealtimeDbClient {
    /// Create a new client for the database at `database_url`
    pub fn new(database_url: &str, client: Client, session: SessionHandle) -> Self {
        Self {
            url: database_url.trim_end_matches('/').to_string(),
            client,
            session,
        }
    }

    fn get_url(&self, path: &str) -> String {
        format!("{}/{}.json", self.url, path.trim_matches('/'))
    }

    async fn with_auth<'a>(&self, fetch: FetchBuilder<'a>) -> FetchBuilder<'a> {
        let token = self.session.fresh_id_token().await;
        fetch.query_opt("auth", token.as_deref())
    }
}

#[async_trait]
impl TreeStore for RealtimeDbClient {
    async fn write(&self, path: &str, value: &Value) -> Result<(), StoreError> {
        debug!("Writing {}", path);
        let url = self.get_url(path);
        self.with_auth(Fetch::put(&self.client, &url)).await
            .json(value)?
            .execute_empty()
            .await?;
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError> {
        debug!("Reading {}", path);
        let url = self.get_url(path);
        let value = self
            .with_auth(Fetch::get(&self.client, &url)).await
            .execute::<Value>()
            .await?;

        Ok(match value {
            Value::Null => None,
            other => Some(other),
        })
    }

    async fn append(&self, path: &str, value: &Value) -> Result<String, StoreError> {
        debug!("Appending to {}", path);
        let url = self.get_url(path);
        let response = self
            .with_auth(Fetch::post(&self.client, &url)).await
            .json(value)?
            .execute::<PushResponse>()
            .await?;
        Ok(response.name)
    }

    async fn query_eq(
        &self,
        path: &str,
        order_by: &str,
        value: &Value,
    ) -> Result<Vec<(String, Value)>, StoreError> {
        debug!("Querying {} where {} == {}", path, order_by, value);
        let url = self.get_url(path);
        let order_by = Value::String(order_by.to_string()).to_string();
        let equal_to = value.to_string();

        let snapshot = self
            .with_auth(Fetch::get(&self.client, &url)).await
            .query("orderBy", &order_by)
            .query("equalTo", &equal_to)
            .execute::<Value>()
            .await?;

        Ok(children(Some(snapshot)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Session, User};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn signed_in_handle() -> SessionHandle {
        let handle = SessionHandle::new();
        handle.set(Session::new("tok".into(), "r".into(), 3600, User::new("u1")));
        handle
    }

    #[test]
    fn test_append_returns_generated_key() {
        tokio_test::block_on(async {
            let mock_server = MockServer::start().await;

            Mock::given(method("POST"))
                .and(path("/user_scripts/u1.json"))
                .and(query_param("auth", "tok"))
                .and(body_json(json!({"name": "demo"})))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "-Nabc"})))
                .mount(&mock_server)
                .await;

            let db = RealtimeDbClient::new(&format!("{}/", mock_server.uri()), Client::new(), signed_in_handle());
            let key = db.append("user_scripts/u1", &json!({"name": "demo"})).await.unwrap();
            assert_eq!(key, "-Nabc");
        });
    }

    #[test]
    fn test_read_null_is_absent() {
        tokio_test::block_on(async {
            let mock_server = MockServer::start().await;

            Mock::given(method("GET"))
                .and(path("/user_scripts/u1.json"))
                .respond_with(ResponseTemplate::new(200).set_body_string("null"))
                .mount(&mock_server)
                .await;

            let db = RealtimeDbClient::new(&mock_server.uri(), Client::new(), SessionHandle::new());
            assert_eq!(db.read("user_scripts/u1").await.unwrap(), None);
        });
    }

    #[test]
    fn test_query_encodes_json_parameters() {
        tokio_test::block_on(async {
            let mock_server = MockServer::start().await;

            Mock::given(method("GET"))
                .and(path("/users.json"))
                .and(query_param("orderBy", "\"username\""))
                .and(query_param("equalTo", "\"alice\""))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "u1": {"uid": "u1", "username": "alice"}
                })))
                .mount(&mock_server)
                .await;

            let db = RealtimeDbClient::new(&mock_server.uri(), Client::new(), SessionHandle::new());
            let matches = db.query_eq("users", "username", &json!("alice")).await.unwrap();
            assert_eq!(matches.len(), 1);
            assert_eq!(matches[0].0, "u1");
        });
    }

    #[test]
    fn test_write_failure_is_api_error() {
        tokio_test::block_on(async {
            let mock_server = MockServer::start().await;

            Mock::given(method("PUT"))
                .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "Permission denied"})))
                .mount(&mock_server)
                .await;

            let db = RealtimeDbClient::new(&mock_server.uri(), Client::new(), SessionHandle::new());
            let err = db.write("users/u1", &json!({})).await.unwrap_err();
            assert!(matches!(err, StoreError::ApiError { status: 401, .. }));
        });
    }
}
