//! Blog and contact endpoints of the same service.
//!
//! Plain JSON request/response calls with no session state. They share the
//! base URL, timeouts and error mapping of the conversion client.

use crate::config::ClientConfig;
use crate::error::ConvertError;
use reqwest::{Request, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// A published blog article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlogPost {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub excerpt: String,
    pub content: String,
    pub category: String,
    #[serde(default = "default_author")]
    pub author: String,
    #[serde(default)]
    pub image_url: Option<String>,
    /// RFC 3339 timestamp as sent by the service.
    pub published_at: String,
    pub updated_at: String,
}

fn default_author() -> String {
    "ConvertDocs Team".to_string()
}

/// Body of a contact-form submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRequest {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}

/// Stored contact message, as echoed back by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactMessage {
    pub id: String,
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub created_at: String,
}

/// Client for the blog and contact endpoints.
#[derive(Debug, Clone)]
pub struct SiteClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl SiteClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ConvertError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ConvertError::InvalidConfig(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    /// `GET /blog`, optionally filtered by category.
    pub async fn list_posts(&self, category: Option<&str>) -> Result<Vec<BlogPost>, ConvertError> {
        self.fetch(self.list_posts_request(category)?).await
    }

    /// `GET /blog/{slug}`. An unknown slug surfaces the service's 404 detail.
    pub async fn post(&self, slug: &str) -> Result<BlogPost, ConvertError> {
        self.fetch(self.post_request(slug)?).await
    }

    /// `POST /contact`.
    pub async fn send_contact(&self, request: &ContactRequest) -> Result<ContactMessage, ConvertError> {
        self.fetch(self.contact_request(request)?).await
    }

    fn list_posts_request(&self, category: Option<&str>) -> Result<Request, ConvertError> {
        let mut req = self.http.get(self.config.endpoint_url("/blog"));
        if let Some(c) = category {
            req = req.query(&[("category", c)]);
        }
        req.build().map_err(invalid_request)
    }

    fn post_request(&self, slug: &str) -> Result<Request, ConvertError> {
        let mut url = Url::parse(&self.config.endpoint_url("/blog"))
            .map_err(|e| ConvertError::InvalidConfig(format!("base URL: {e}")))?;
        // Pushed as one segment so `/`, `?` and `#` in a slug are escaped.
        url.path_segments_mut()
            .map_err(|_| ConvertError::InvalidConfig("base URL cannot take a path".into()))?
            .push(slug);
        self.http.get(url).build().map_err(invalid_request)
    }

    fn contact_request(&self, request: &ContactRequest) -> Result<Request, ConvertError> {
        self.http
            .post(self.config.endpoint_url("/contact"))
            .json(request)
            .build()
            .map_err(invalid_request)
    }

    async fn fetch<T: DeserializeOwned>(&self, req: Request) -> Result<T, ConvertError> {
        debug!("site request: {} {}", req.method(), req.url());
        let resp = self.http.execute(req).await.map_err(|e| ConvertError::Network {
            reason: e.to_string(),
        })?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(|e| ConvertError::Network {
            reason: format!("failed to read response body: {e}"),
        })?;
        debug!("site response: HTTP {} ({} bytes)", status, body.len());
        decode(status, &body)
    }
}

fn invalid_request(e: reqwest::Error) -> ConvertError {
    ConvertError::Internal(format!("could not build request: {e}"))
}

#[derive(Deserialize)]
struct Detail {
    detail: String,
}

/// Map a status and body onto a typed value or an error.
fn decode<T: DeserializeOwned>(status: u16, body: &[u8]) -> Result<T, ConvertError> {
    if !(200..300).contains(&status) {
        return Err(match serde_json::from_slice::<Detail>(body) {
            Ok(d) => ConvertError::Service { message: d.detail },
            Err(_) => ConvertError::Network {
                reason: format!("HTTP {status}: malformed error body"),
            },
        });
    }
    serde_json::from_slice(body).map_err(|e| ConvertError::Network {
        reason: format!("malformed response: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;

    const POST: &str = r#"{
        "id": "1", "title": "Compress PDFs", "slug": "compress-pdfs",
        "excerpt": "Smaller files", "content": "Body", "category": "PDF Tips",
        "published_at": "2024-01-01T00:00:00Z", "updated_at": "2024-01-02T00:00:00Z",
        "views": 12
    }"#;

    #[test]
    fn post_fills_defaults_and_ignores_extras() {
        let p: BlogPost = decode(200, POST.as_bytes()).unwrap();
        assert_eq!(p.slug, "compress-pdfs");
        assert_eq!(p.author, "ConvertDocs Team");
        assert!(p.image_url.is_none());
    }

    #[test]
    fn not_found_detail_is_service_error() {
        let err = decode::<BlogPost>(404, br#"{"detail":"Blog post not found"}"#).unwrap_err();
        assert_eq!(err.to_string(), "Blog post not found");
    }

    #[test]
    fn garbage_is_network_error() {
        let err = decode::<Vec<BlogPost>>(200, b"<html>").unwrap_err();
        assert!(matches!(err, ConvertError::Network { .. }));
        let err = decode::<Vec<BlogPost>>(500, b"oops").unwrap_err();
        assert!(matches!(err, ConvertError::Network { .. }));
    }

    #[test]
    fn contact_request_serializes_flat() {
        let req = ContactRequest {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            subject: "Hi".into(),
            message: "Hello".into(),
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["email"], "ada@example.com");
        assert_eq!(v.as_object().unwrap().len(), 4);
    }

    #[test]
    fn client_builds_from_default_config() {
        assert!(SiteClient::new(&ClientConfig::default()).is_ok());
    }

    fn client() -> SiteClient {
        let config = ClientConfig::builder()
            .base_url("http://docs.test/api/")
            .build()
            .unwrap();
        SiteClient::new(&config).unwrap()
    }

    #[test]
    fn list_request_adds_category_query() {
        let c = client();
        let req = c.list_posts_request(None).unwrap();
        assert_eq!(req.method(), Method::GET);
        assert_eq!(req.url().as_str(), "http://docs.test/api/blog");

        let req = c.list_posts_request(Some("PDF Tips")).unwrap();
        assert_eq!(req.url().path(), "/api/blog");
        let pairs: Vec<(String, String)> = req.url().query_pairs().into_owned().collect();
        assert_eq!(pairs, vec![("category".to_string(), "PDF Tips".to_string())]);
    }

    #[test]
    fn post_request_escapes_slug() {
        let c = client();
        let req = c.post_request("compress-pdfs").unwrap();
        assert_eq!(req.method(), Method::GET);
        assert_eq!(req.url().as_str(), "http://docs.test/api/blog/compress-pdfs");

        let req = c.post_request("a/b?c").unwrap();
        assert_eq!(req.url().path(), "/api/blog/a%2Fb%3Fc");
        assert!(req.url().query().is_none());
    }

    #[test]
    fn contact_request_posts_json() {
        let body = ContactRequest {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            subject: "Hi".into(),
            message: "Hello".into(),
        };
        let req = client().contact_request(&body).unwrap();
        assert_eq!(req.method(), Method::POST);
        assert_eq!(req.url().as_str(), "http://docs.test/api/contact");
        assert_eq!(
            req.headers().get(reqwest::header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let sent = req.body().and_then(|b| b.as_bytes()).unwrap();
        let back: ContactRequest = serde_json::from_slice(sent).unwrap();
        assert_eq!(back, body);
    }
}
