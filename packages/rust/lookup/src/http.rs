//! HTTP lookup provider.
//!
//! Substitutes the serial number into the configured support-page URL, fetches
//! it, and returns the text of the first element matching the configured
//! selector.

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use assetenrich_shared::{EnrichError, LookupConfig, Result};

use crate::LookupProvider;

/// User-Agent string for lookup requests.
const USER_AGENT: &str = concat!("assetenrich/", env!("CARGO_PKG_VERSION"));

/// Scrapes warranty dates from a vendor support page.
pub struct HttpLookupProvider {
    config: LookupConfig,
    client: Client,
    selector: Selector,
}

impl HttpLookupProvider {
    /// Create a provider from the `[lookup]` config section.
    pub fn new(config: LookupConfig) -> Result<Self> {
        let selector = Selector::parse(&config.selector).map_err(|e| {
            EnrichError::config(format!("invalid lookup selector {:?}: {e:?}", config.selector))
        })?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| EnrichError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            selector,
        })
    }

    async fn fetch_page(&self, key: &str, url: &Url) -> Result<String> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| EnrichError::lookup(key, format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnrichError::lookup(key, format!("{url}: HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| EnrichError::lookup(key, format!("{url}: body read failed: {e}")))
    }
}

#[async_trait]
impl LookupProvider for HttpLookupProvider {
    #[instrument(skip(self), fields(provider = "http"))]
    async fn fetch(&self, lookup_key: &str) -> Result<String> {
        let url = self.config.url_for(lookup_key)?;
        debug!(%url, "fetching warranty page");

        let body = self.fetch_page(lookup_key, &url).await?;
        extract_text(&body, &self.selector).ok_or_else(|| {
            EnrichError::lookup(
                lookup_key,
                format!("element {:?} not found on {url}", self.config.selector),
            )
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Text of the first non-empty element matching `selector`, whitespace collapsed.
fn extract_text(body: &str, selector: &Selector) -> Option<String> {
    let doc = Html::parse_document(body);
    doc.select(selector)
        .map(|el| el.text().collect::<Vec<_>>().join(" "))
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .find(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const WARRANTY_PAGE: &str = r#"<html><body>
        <div id="ps-inlineWarranty">
            <div class="flex-wrap d-flex">
                <div><p>
                    Expires
                    01 Jan 2026
                </p></div>
            </div>
        </div>
    </body></html>"#;

    fn config_for(server: &wiremock::MockServer) -> LookupConfig {
        LookupConfig {
            url_template: format!("{}/warranty?tag={{key}}", server.uri()),
            ..LookupConfig::default()
        }
    }

    #[test]
    fn extract_text_collapses_whitespace() {
        let selector = Selector::parse("#ps-inlineWarranty p").unwrap();
        assert_eq!(
            extract_text(WARRANTY_PAGE, &selector).as_deref(),
            Some("Expires 01 Jan 2026")
        );
    }

    #[test]
    fn extract_text_skips_empty_matches() {
        let html = "<div><p class=\"d\">  </p><p class=\"d\">Expires 02 Feb 2027</p></div>";
        let selector = Selector::parse("p.d").unwrap();
        assert_eq!(
            extract_text(html, &selector).as_deref(),
            Some("Expires 02 Feb 2027")
        );
    }

    #[test]
    fn invalid_selector_is_config_error() {
        let config = LookupConfig {
            selector: "p[".into(),
            ..LookupConfig::default()
        };
        let err = HttpLookupProvider::new(config).err().expect("should fail");
        assert!(matches!(err, EnrichError::Config { .. }));
    }

    #[tokio::test]
    async fn fetches_warranty_text() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/warranty"))
            .and(wiremock::matchers::query_param("tag", "SN1"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(WARRANTY_PAGE))
            .mount(&server)
            .await;

        let provider = HttpLookupProvider::new(config_for(&server)).unwrap();
        let text = provider.fetch("SN1").await.unwrap();
        assert_eq!(text, "Expires 01 Jan 2026");
    }

    #[tokio::test]
    async fn http_error_is_lookup_failure() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::path("/warranty"))
            .respond_with(wiremock::ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let provider = HttpLookupProvider::new(config_for(&server)).unwrap();
        let err = provider.fetch("SN2").await.unwrap_err();
        assert!(matches!(err, EnrichError::Lookup { ref key, .. } if key == "SN2"));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn missing_element_is_lookup_failure() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::path("/warranty"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_string("<html><body><p>No warranty found</p></body></html>"),
            )
            .mount(&server)
            .await;

        let provider = HttpLookupProvider::new(config_for(&server)).unwrap();
        let err = provider.fetch("SN3").await.unwrap_err();
        assert!(err.is_record_failure());
        assert!(err.to_string().contains("not found"));
    }
}
