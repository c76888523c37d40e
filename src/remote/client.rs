use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::RemoteStore;
use crate::config::RemoteConfig;
use crate::errors::{RemoteError, RemoteResult};
use crate::models::Collection;
use crate::utils::human_format::preview;
use crate::utils::url::UrlUtils;

const REST_PATH: &str = "rest/v1/";
/// Error bodies are cut to this many characters in error messages
const MAX_ERROR_BODY: usize = 300;

/// reqwest client for a PostgREST-style API
///
/// The API key goes out as both `apikey` and `Authorization: Bearer`.
#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl RestClient {
    pub fn new(config: &RemoteConfig) -> RemoteResult<Self> {
        let mut base_url = Url::parse(&UrlUtils::sanitize(&config.base_url))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
        })
    }

    /// `{base}/rest/v1/{collection}`
    pub fn endpoint(&self, collection: Collection) -> RemoteResult<Url> {
        Ok(self
            .base_url
            .join(REST_PATH)?
            .join(&collection.to_string())?)
    }

    fn row_endpoint(&self, collection: Collection, id: &str) -> RemoteResult<Url> {
        let mut url = self.endpoint(collection)?;
        url.query_pairs_mut().append_pair("id", &format!("eq.{id}"));
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!(
            "{method} {}",
            UrlUtils::obfuscate_credentials(url.as_str())
        );
        let builder = self.client.request(method, url);
        match &self.api_key {
            Some(key) => builder.header("apikey", key).bearer_auth(key),
            None => builder,
        }
    }

    async fn check(response: Response, collection: Collection) -> RemoteResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::Status {
            status: status.as_u16(),
            collection: collection.to_string(),
            message: status_message(status, &body),
        })
    }

    /// First row of a `return=representation` response
    async fn single_row(response: Response, collection: Collection) -> RemoteResult<Value> {
        let rows: Vec<Value> = response.json().await?;
        rows.into_iter().next().ok_or_else(|| RemoteError::Decode {
            collection: collection.to_string(),
            message: "expected the written row in the response".to_string(),
        })
    }
}

#[async_trait]
impl RemoteStore for RestClient {
    async fn fetch_all(&self, collection: Collection) -> RemoteResult<Vec<Value>> {
        let mut url = self.endpoint(collection)?;
        url.query_pairs_mut().append_pair("select", "*");

        let response = self.request(Method::GET, url).send().await?;
        let rows: Vec<Value> = Self::check(response, collection).await?.json().await?;
        debug!("Fetched {} rows from {collection}", rows.len());
        Ok(rows)
    }

    async fn insert(&self, collection: Collection, row: Value) -> RemoteResult<Value> {
        let url = self.endpoint(collection)?;
        let response = self
            .request(Method::POST, url)
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await?;
        Self::single_row(Self::check(response, collection).await?, collection).await
    }

    async fn update(&self, collection: Collection, id: &str, patch: Value) -> RemoteResult<Value> {
        let url = self.row_endpoint(collection, id)?;
        let response = self
            .request(Method::PATCH, url)
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await?;
        Self::single_row(Self::check(response, collection).await?, collection).await
    }

    async fn delete(&self, collection: Collection, id: &str) -> RemoteResult<()> {
        let url = self.row_endpoint(collection, id)?;
        let response = self.request(Method::DELETE, url).send().await?;
        Self::check(response, collection).await?;
        debug!("Deleted {id} from {collection}");
        Ok(())
    }
}

/// Error body cut for messages, or the reason phrase when the body is empty
fn status_message(status: StatusCode, body: &str) -> String {
    match body.trim() {
        "" => status.canonical_reason().unwrap_or("Unknown").to_string(),
        body => preview(body, MAX_ERROR_BODY),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> RestClient {
        RestClient::new(&RemoteConfig {
            base_url: base_url.to_string(),
            api_key: Some("anon-key".to_string()),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_status_message_truncates_body() {
        assert_eq!(
            status_message(StatusCode::SERVICE_UNAVAILABLE, "  "),
            "Service Unavailable"
        );
        assert_eq!(
            status_message(StatusCode::BAD_REQUEST, r#"{"message":"bad column"}"#),
            r#"{"message":"bad column"}"#
        );

        let long = "x".repeat(1_000);
        let message = status_message(StatusCode::BAD_REQUEST, &long);
        assert!(message.starts_with(&"x".repeat(MAX_ERROR_BODY)));
        assert!(message.ends_with("(1000 bytes)"));
    }

    #[test]
    fn test_endpoint_layout() {
        let client = client("https://abc.supabase.co");
        assert_eq!(
            client.endpoint(Collection::GalleryImages).unwrap().as_str(),
            "https://abc.supabase.co/rest/v1/gallery_images"
        );
        assert_eq!(
            client.row_endpoint(Collection::Products, "p1").unwrap().as_str(),
            "https://abc.supabase.co/rest/v1/products?id=eq.p1"
        );
    }

    #[test]
    fn test_base_url_with_path_prefix() {
        let client = client("http://localhost:8080/proxy/");
        assert_eq!(
            client.endpoint(Collection::Categories).unwrap().as_str(),
            "http://localhost:8080/proxy/rest/v1/categories"
        );
    }

    #[test]
    fn test_empty_api_key_is_dropped() {
        let client = RestClient::new(&RemoteConfig {
            api_key: Some(String::new()),
            ..Default::default()
        })
        .unwrap();
        assert!(client.api_key.is_none());
    }
}
