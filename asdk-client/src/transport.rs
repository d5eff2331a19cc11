//! Avatar service HTTP client
//!
//! Every request carries `Authorization: Bearer <token>` and `X-User-Agent`.
//! Non-success responses are turned into `AsdkError::Api` with the best
//! message the body offers.

use crate::error::{extract_error_message, AsdkError, AsdkResult, GENERIC_ERROR_MESSAGE};
use crate::jobs::{AvatarJob, ExportJob, JobFetcher, RemoteJob};
use crate::params::{ExportParameterSpec, ParameterSpec};
use crate::pipeline::PipelineSelection;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

const USER_AGENT_HEADER: &str = "X-User-Agent";
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Photo plus settings for a new avatar computation
#[derive(Debug, Clone)]
pub struct NewAvatar {
    pub name: String,
    pub photo: Bytes,
    /// File name sent with the photo part
    pub photo_name: String,
    pub selection: PipelineSelection,
    /// Computation `parameters` object
    pub parameters: Value,
    /// `[visual, full]` export configurations
    pub export_parameters: Value,
}

/// Avatar service API client
pub struct AvatarSdkClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
    user_agent: String,
}

impl AvatarSdkClient {
    pub fn new(base_url: &str, token: impl Into<String>) -> AsdkResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| AsdkError::Transport(e.to_string()))?;

        Self::with_http(http, base_url, token)
    }

    /// Client sharing an existing connection pool
    pub fn with_http(
        http: reqwest::Client,
        base_url: &str,
        token: impl Into<String>,
    ) -> AsdkResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AsdkError::Validation(format!("Invalid API URL {}: {}", base_url, e)))?;

        Ok(Self {
            http,
            base_url,
            token: token.into(),
            user_agent: asdk_common::config::get_user_agent(),
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> AsdkResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| AsdkError::Validation(format!("Invalid URL {}: {}", path, e)))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.token)
            .header(USER_AGENT_HEADER, &self.user_agent)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> AsdkResult<T> {
        debug!(url = %url, "GET");
        let response = self.request(Method::GET, url).send().await?;
        json_response(response).await
    }

    /// Computation parameters the pipeline accepts
    pub async fn get_available_parameters(
        &self,
        selection: &PipelineSelection,
    ) -> AsdkResult<ParameterSpec> {
        let mut url = self.url(&format!("/parameters/available/{}/", selection.pipeline))?;
        url.query_pairs_mut()
            .append_pair("pipeline_subtype", &selection.subtype);
        self.get_json(url).await
    }

    /// Export parameters the pipeline accepts
    pub async fn get_available_export_parameters(
        &self,
        selection: &PipelineSelection,
    ) -> AsdkResult<ExportParameterSpec> {
        let mut url = self.url(&format!(
            "/export_parameters/available/{}/",
            selection.pipeline
        ))?;
        url.query_pairs_mut()
            .append_pair("pipeline_subtype", &selection.subtype);
        self.get_json(url).await
    }

    /// Submit a photo for computation
    pub async fn create_avatar(&self, avatar: &NewAvatar) -> AsdkResult<AvatarJob> {
        let photo = reqwest::multipart::Part::bytes(avatar.photo.to_vec())
            .file_name(avatar.photo_name.clone());

        let form = reqwest::multipart::Form::new()
            .text("name", avatar.name.clone())
            .part("photo", photo)
            .text("pipeline", avatar.selection.pipeline.clone())
            .text("pipeline_subtype", avatar.selection.subtype.clone())
            .text("parameters", avatar.parameters.to_string())
            .text("export_parameters", avatar.export_parameters.to_string());

        let url = self.url("/avatars/")?;
        info!(
            pipeline = %avatar.selection,
            photo_bytes = avatar.photo.len(),
            "Creating avatar"
        );

        let response = self.request(Method::POST, url).multipart(form).send().await?;
        let job: AvatarJob = json_response(response).await?;

        info!(url = %job.url, status = %job.status, "Avatar created");
        Ok(job)
    }

    /// Fresh snapshot of any job from its self URL
    pub async fn get_job<J: RemoteJob>(&self, job: &J) -> AsdkResult<J> {
        self.get_json(parse_url(job.url())?).await
    }

    pub async fn get_avatar(&self, avatar: &AvatarJob) -> AsdkResult<AvatarJob> {
        self.get_job(avatar).await
    }

    /// Exports of a computed avatar
    pub async fn get_exports(&self, avatar: &AvatarJob) -> AsdkResult<Vec<ExportJob>> {
        let exports_url = avatar
            .exports
            .as_deref()
            .ok_or_else(|| AsdkError::Parse("Avatar has no exports URL".to_string()))?;
        self.get_json(parse_url(exports_url)?).await
    }

    /// Start a download; fails on a non-success status
    pub async fn open_file(&self, url: &str) -> AsdkResult<Response> {
        let url = parse_url(url)?;
        debug!(url = %url, "Opening export file");

        let response = self.request(Method::GET, url).send().await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(response)
    }

    /// Whole body of an export file, without progress reporting
    pub async fn fetch_export_file(&self, url: &str) -> AsdkResult<Bytes> {
        let response = self.open_file(url).await?;
        let body = response.bytes().await?;
        debug!(url = %url, bytes = body.len(), "Export file fetched");
        Ok(body)
    }
}

#[async_trait]
impl<J: RemoteJob> JobFetcher<J> for AvatarSdkClient {
    async fn fetch_snapshot(&self, job: &J) -> AsdkResult<J> {
        self.get_job(job).await
    }
}

fn parse_url(url: &str) -> AsdkResult<Url> {
    Url::parse(url).map_err(|e| AsdkError::Parse(format!("Invalid URL {}: {}", url, e)))
}

async fn json_response<T: DeserializeOwned>(response: Response) -> AsdkResult<T> {
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }

    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

/// Build the error for a non-success response
///
/// A JSON body yields its `detail` or `statusText`; otherwise the HTTP reason
/// phrase is used.
async fn api_error(response: Response) -> AsdkError {
    let status = response.status();
    let reason = status
        .canonical_reason()
        .unwrap_or(GENERIC_ERROR_MESSAGE)
        .to_string();

    let message = match response.bytes().await {
        Ok(body) => match serde_json::from_slice::<Value>(&body) {
            Ok(json) => extract_error_message(&json, &reason),
            Err(_) => reason,
        },
        Err(_) => reason,
    };

    warn!(status = status.as_u16(), message = %message, "Request failed");
    AsdkError::Api {
        status: status.as_u16(),
        message,
    }
}
