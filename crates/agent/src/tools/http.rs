use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE, ORIGIN, REFERER, USER_AGENT};
use reqwest::{Client, Response};
use serde_json::Value;

use crate::tools::ToolError;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const CLIENT_DETAILS: &str = r#"{"urlPath":"/israel/search-results","clientIP":"127.0.0.1"}"#;

/// JSON client bound to one backend base URL.
#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout_secs: u64, headers: HeaderMap) -> Result<Self, ToolError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|error| ToolError::Configuration(error.to_string()))?;

        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get_json(&self, path: &str) -> Result<Value, ToolError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|error| ToolError::Network(error.to_string()))?;
        read_json(response).await
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value, ToolError> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|error| ToolError::Network(error.to_string()))?;
        read_json(response).await
    }
}

async fn read_json(response: Response) -> Result<Value, ToolError> {
    let status = response.status();
    let body = response.text().await.map_err(|error| ToolError::Network(error.to_string()))?;

    if !status.is_success() {
        return Err(ToolError::Http { status: status.as_u16(), body });
    }

    serde_json::from_str(&body)
        .map_err(|error| ToolError::Network(format!("could not decode response body: {error}")))
}

/// Headers the rental backend expects from its own web front end.
pub fn browser_headers(site_base_url: &str) -> Result<HeaderMap, ToolError> {
    let origin = site_base_url.trim_end_matches('/');
    let header = |value: &str| {
        HeaderValue::from_str(value)
            .map_err(|error| ToolError::Configuration(format!("invalid header value: {error}")))
    };

    let mut headers = json_headers();
    headers.insert(ORIGIN, header(origin)?);
    headers.insert(REFERER, header(&format!("{origin}/"))?);
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(HeaderName::from_static("clientdetails"), HeaderValue::from_static(CLIENT_DETAILS));
    headers.insert(
        HeaderName::from_static("x-requested-with"),
        HeaderValue::from_static("XMLHttpRequest"),
    );
    Ok(headers)
}

pub fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers
}
