// src/api/browserless.rs
//! Live rendering through a Browserless-compatible `/content` endpoint.

use super::connection_pool::{client_for, PoolConfig};
use super::{success_text, PageRenderer, RenderedPage};
use crate::constants::RENDER_SETTLE_DELAY;
use crate::error::{Result, Service};
use crate::types::ValidatedUrl;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// Header carrying the post-redirect URL of the rendered page.
const RESPONSE_URL_HEADER: &str = "x-response-url";
/// Header carrying the HTTP status the page itself was served with.
const RESPONSE_CODE_HEADER: &str = "x-response-code";

pub struct BrowserlessRenderer {
    http: Arc<Client>,
    base_url: String,
    token: Option<String>,
    timeout: Duration,
}

impl BrowserlessRenderer {
    pub fn new(base_url: &str, token: Option<&str>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: client_for("browserless", &PoolConfig::with_request_timeout(timeout))?,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
            timeout,
        })
    }

    fn request_body(&self, url: &ValidatedUrl) -> serde_json::Value {
        serde_json::json!({
            "url": url.as_str(),
            "gotoOptions": {
                "waitUntil": "networkidle2",
                "timeout": self.timeout.as_millis() as u64,
            },
            "waitForTimeout": RENDER_SETTLE_DELAY.as_millis() as u64,
        })
    }
}

#[async_trait::async_trait]
impl PageRenderer for BrowserlessRenderer {
    async fn render(&self, url: &ValidatedUrl) -> Result<RenderedPage> {
        let endpoint = format!("{}/content", self.base_url);
        log::debug!("Render request: {}", url);

        let mut request = self.http.post(&endpoint).json(&self.request_body(url));
        if let Some(token) = &self.token {
            request = request.query(&[("token", token.as_str())]);
        }
        let response = request.send().await?;

        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let final_url = header(RESPONSE_URL_HEADER);
        let status = header(RESPONSE_CODE_HEADER).and_then(|code| code.parse::<u16>().ok());

        let html = success_text(Service::Renderer, response).await?;
        Ok(RenderedPage {
            final_url,
            status,
            html,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn url() -> ValidatedUrl {
        ValidatedUrl::parse("https://acme.com/widget").unwrap()
    }

    #[tokio::test]
    async fn renders_with_token_and_redirect_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/content"))
            .and(query_param("token", "secret"))
            .and(body_partial_json(serde_json::json!({
                "url": "https://acme.com/widget",
                "gotoOptions": {"waitUntil": "networkidle2"}
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-response-url", "https://www.acme.com/widget/")
                    .insert_header("x-response-code", "200")
                    .set_body_string("<html><body>Widget</body></html>"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let renderer =
            BrowserlessRenderer::new(&server.uri(), Some("secret"), Duration::from_secs(5))
                .unwrap();
        let page = renderer.render(&url()).await.unwrap();

        assert_eq!(
            page.final_url.as_deref(),
            Some("https://www.acme.com/widget/")
        );
        assert_eq!(page.status, Some(200));
        assert_eq!(page.html, "<html><body>Widget</body></html>");
    }

    #[tokio::test]
    async fn renderer_outage_is_a_service_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("queue full"))
            .mount(&server)
            .await;

        let renderer =
            BrowserlessRenderer::new(&server.uri(), None, Duration::from_secs(5)).unwrap();
        let err = renderer.render(&url()).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
