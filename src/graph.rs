//! Remote publishing service client.
//!
//! The far end exposes one upload edge per media kind
//! (`{base}/{version}/{page_external_id}/photos|videos`) taking a multipart
//! form, and a lightweight page-info endpoint used as a credential check.
//! Everything network-facing lives behind [`PublishService`] so the
//! scheduler, executor and tests never depend on the wire.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::MediaKind;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

const GRAPH_API_BASE: &str = "https://graph.facebook.com/";

/// One upload call: binary payload plus metadata, fully resolved by the
/// executor before any network work happens.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub page_external_id: String,
    pub access_token: String,
    pub kind: MediaKind,
    /// Title and description joined; lands in the kind-specific text field.
    pub caption: String,
    pub file_name: String,
    pub content_type: String,
    pub file: Vec<u8>,
    /// Epoch seconds. When set, the remote service holds the post until then
    /// (`published=false` is sent alongside). When absent the upload
    /// publishes immediately.
    pub scheduled_publish_time: Option<i64>,
}

#[async_trait]
pub trait PublishService: Send + Sync {
    /// Upload a post; returns the remote post id.
    async fn publish(&self, req: PublishRequest) -> Result<String>;

    /// Credential check pass-through: fetch the page's display name.
    async fn page_name(&self, page_external_id: &str, access_token: &str) -> Result<String>;
}

#[derive(Clone)]
pub struct GraphClient {
    http: Client,
    base_url: Url,
    version: String,
    image_timeout: Duration,
    video_timeout: Duration,
}

impl fmt::Debug for GraphClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphClient")
            .field("base_url", &self.base_url)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// The remote contract names the text field differently per kind.
pub fn caption_field(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Image => "caption",
        MediaKind::Video => "description",
    }
}

fn edge_segment(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Image => "photos",
        MediaKind::Video => "videos",
    }
}

impl GraphClient {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let base_url = Url::parse(&cfg.graph.api_base)
            .map_err(|e| Error::validation(format!("invalid graph.api_base: {e}")))?;
        Ok(Self::with_base_url(
            base_url,
            cfg.graph.version.clone(),
            Duration::from_secs(cfg.graph.image_timeout_seconds),
            Duration::from_secs(cfg.graph.video_timeout_seconds),
        ))
    }

    pub fn with_base_url(
        base_url: Url,
        version: String,
        image_timeout: Duration,
        video_timeout: Duration,
    ) -> Self {
        let http = Client::builder()
            .user_agent("pagepost/0.1")
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            version,
            image_timeout,
            video_timeout,
        }
    }

    fn edge_url(&self, page_external_id: &str, kind: MediaKind) -> Result<Url> {
        self.base_url
            .join(&format!(
                "{}/{}/{}",
                self.version,
                page_external_id,
                edge_segment(kind)
            ))
            .map_err(|e| Error::validation(format!("invalid Graph URL: {e}")))
    }

    fn page_url(&self, page_external_id: &str) -> Result<Url> {
        self.base_url
            .join(&format!("{}/{}", self.version, page_external_id))
            .map_err(|e| Error::validation(format!("invalid Graph URL: {e}")))
    }

    fn timeout_for(&self, kind: MediaKind) -> Duration {
        match kind {
            MediaKind::Image => self.image_timeout,
            MediaKind::Video => self.video_timeout,
        }
    }
}

#[async_trait]
impl PublishService for GraphClient {
    async fn publish(&self, req: PublishRequest) -> Result<String> {
        let url = self.edge_url(&req.page_external_id, req.kind)?;
        let timeout = self.timeout_for(req.kind);

        let part = reqwest::multipart::Part::bytes(req.file)
            .file_name(req.file_name)
            .mime_str(&req.content_type)
            .map_err(|e| Error::validation(format!("bad content type: {e}")))?;
        let mut form = reqwest::multipart::Form::new()
            .text(caption_field(req.kind), req.caption)
            .text("access_token", req.access_token)
            .part("source", part);
        if let Some(ts) = req.scheduled_publish_time {
            form = form
                .text("scheduled_publish_time", ts.to_string())
                .text("published", "false");
        }

        info!(%url, kind = req.kind.as_str(), "uploading post");
        let res = self
            .http
            .post(url)
            .timeout(timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::remote(format!("upload transport error: {e}")))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| Error::remote(format!("failed to read upload response: {e}")))?;
        match parse_upload_response(&body) {
            Ok(id) => Ok(id),
            Err(err) => {
                warn!(%status, %err, "upload rejected");
                Err(err)
            }
        }
    }

    async fn page_name(&self, page_external_id: &str, access_token: &str) -> Result<String> {
        let url = self.page_url(page_external_id)?;
        let res = self
            .http
            .get(url)
            .query(&[("fields", "name"), ("access_token", access_token)])
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| Error::remote(format!("credential check transport error: {e}")))?;

        let body = res
            .text()
            .await
            .map_err(|e| Error::remote(format!("failed to read page info: {e}")))?;
        let info: PageInfoResponse = serde_json::from_str(&body)
            .map_err(|e| Error::remote(format!("invalid page info JSON: {e}")))?;
        match info {
            PageInfoResponse {
                name: Some(name), ..
            } => Ok(name),
            PageInfoResponse {
                error: Some(env), ..
            } => Err(Error::remote(env.message)),
            _ => Err(Error::remote("page info response missing name")),
        }
    }
}

/// Responses carry either an `id` or an `error.message` envelope.
fn parse_upload_response(body: &str) -> Result<String> {
    let parsed: UploadResponse = serde_json::from_str(body)
        .map_err(|e| Error::remote(format!("invalid upload response JSON: {e}")))?;
    match parsed {
        UploadResponse { id: Some(id), .. } => Ok(id),
        UploadResponse {
            error: Some(env), ..
        } => Err(Error::remote(env.message)),
        _ => Err(Error::remote("upload response missing id")),
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: Option<String>,
    error: Option<ErrorEnvelope>,
}

#[derive(Debug, Deserialize)]
struct PageInfoResponse {
    name: Option<String>,
    error: Option<ErrorEnvelope>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    message: String,
}
