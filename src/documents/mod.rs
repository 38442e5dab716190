//! Document store access

pub mod value;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::SessionHandle;
use crate::error::StoreError;
use crate::fetch::{Fetch, FetchBuilder};

/// A stored document and its generated id
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Value,
}

/// Collection-of-documents store
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert `document` (a JSON object) and return the generated id
    async fn insert(&self, collection: &str, document: &Value) -> Result<String, StoreError>;

    /// Documents of `collection` whose `field` equals `value`
    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, StoreError>;
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    name: String,
    #[serde(default)]
    fields: Value,
}

impl RawDocument {
    fn into_document(self) -> Result<Document, StoreError> {
        let id = self
            .name
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Ok(Document {
            id,
            fields: value::decode_fields(&self.fields)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct QueryRow {
    document: Option<RawDocument>,
}

/// REST client for the document store
pub struct FirestoreClient {
    base_url: String,
    client: Client,
    session: SessionHandle,
}

impl FirestoreClient {
    /// Create a new client for `project_id` under `endpoint`
    pub fn new(endpoint: &str, project_id: &str, client: Client, session: SessionHandle) -> Self {
        Self {
            base_url: format!(
                "{}/projects/{}/databases/(default)/documents",
                endpoint.trim_end_matches('/'),
                project_id
            ),
            client,
            session,
        }
    }

    async fn with_auth<'a>(&self, fetch: FetchBuilder<'a>) -> FetchBuilder<'a> {
        match self.session.fresh_id_token().await {
            Some(token) => fetch.header("Authorization", &format!("Bearer {}", token)),
            None => fetch,
        }
    }
}

#[async_trait]
impl DocumentStore for FirestoreClient {
    async fn insert(&self, collection: &str, document: &Value) -> Result<String, StoreError> {
        let map = document
            .as_object()
            .ok_or_else(|| StoreError::new("document must be a JSON object"))?;
        let url = format!("{}/{}", self.base_url, collection);
        debug!("Inserting into {}", collection);

        let body = json!({ "fields": value::encode_fields(map) });
        let created = self
            .with_auth(Fetch::post(&self.client, &url)).await
            .json(&body)?
            .execute::<RawDocument>()
            .await?;

        Ok(created.into_document()?.id)
    }

    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, StoreError> {
        let url = format!("{}:runQuery", self.base_url);
        debug!("Querying {} where {} == {}", collection, field, value);

        let body = json!({
            "structuredQuery": {
                "from": [{ "collectionId": collection }],
                "where": {
                    "fieldFilter": {
                        "field": { "fieldPath": field },
                        "op": "EQUAL",
                        "value": value::encode(value),
                    }
                }
            }
        });

        let rows = self
            .with_auth(Fetch::post(&self.client, &url)).await
            .json(&body)?
            .execute::<Vec<QueryRow>>()
            .await?;

        rows.into_iter()
            .filter_map(|row| row.document)
            .map(RawDocument::into_document)
            .collect()
    }
}
