//! HTTP client for the detection API.
//!
//! The bearer token lives in a [`Session`] value that callers pass to every
//! authenticated call; the client itself holds no credentials.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use tracing::debug;

use crate::auth::dto::{LoginRequest, LoginResponse, PublicUser, RegisterRequest};
use crate::detections::dto::{CreatedDetectionResponse, DetectionFilter, DetectionPage, PageRequest};
use crate::detections::repo_types::Detection;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: StatusCode, message: String },

    #[error("Invalid timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
}

/// Authenticated identity returned by login.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user: PublicUser,
}

/// JSON ingestion payload.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitDetection {
    pub plate_number: String,
    /// Base64 image, with or without a data-URL prefix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    /// `base_url` is the server root, e.g. `http://localhost:8080`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    fn filter_query(
        filter: &DetectionFilter,
        page: Option<PageRequest>,
    ) -> Result<Vec<(&'static str, String)>, ClientError> {
        let mut q = Vec::new();
        if let Some(p) = &filter.plate_number {
            q.push(("plateNumber", p.clone()));
        }
        if let Some(s) = filter.start {
            q.push(("startDate", s.format(&Rfc3339)?));
        }
        if let Some(e) = filter.end {
            q.push(("endDate", e.format(&Rfc3339)?));
        }
        if let Some(p) = page {
            q.push(("page", p.page.to_string()));
            q.push(("limit", p.limit.to_string()));
        }
        Ok(q)
    }

    fn login_request(&self, username: &str, password: &str) -> RequestBuilder {
        self.http.post(self.url("/auth/login")).json(&LoginRequest {
            username: Some(username.to_string()),
            password: Some(password.to_string()),
        })
    }

    fn register_request(&self, session: &Session, username: &str, password: &str) -> RequestBuilder {
        self.http
            .post(self.url("/auth/register"))
            .bearer_auth(&session.token)
            .json(&RegisterRequest {
                username: Some(username.to_string()),
                password: Some(password.to_string()),
            })
    }

    fn submit_request(&self, session: &Session, body: &SubmitDetection) -> RequestBuilder {
        self.http
            .post(self.url("/detections"))
            .bearer_auth(&session.token)
            .json(body)
    }

    fn list_request(
        &self,
        session: &Session,
        filter: &DetectionFilter,
        page: PageRequest,
    ) -> Result<RequestBuilder, ClientError> {
        Ok(self
            .http
            .get(self.url("/detections"))
            .bearer_auth(&session.token)
            .query(&Self::filter_query(filter, Some(page))?))
    }

    fn export_request(
        &self,
        session: &Session,
        filter: &DetectionFilter,
    ) -> Result<RequestBuilder, ClientError> {
        Ok(self
            .http
            .get(self.url("/detections/export"))
            .bearer_auth(&session.token)
            .query(&Self::filter_query(filter, None)?))
    }

    async fn send(req: RequestBuilder) -> Result<reqwest::Response, ClientError> {
        let res = req.send().await?;
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }
        let message = res
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|b| b.message)
            .unwrap_or_else(|| "Request failed".to_string());
        debug!(%status, %message, "api call failed");
        Err(ClientError::Api { status, message })
    }

    async fn send_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, ClientError> {
        Ok(Self::send(req).await?.json::<T>().await?)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Session, ClientError> {
        let res: LoginResponse = Self::send_json(self.login_request(username, password)).await?;
        Ok(Session {
            token: res.token,
            user: res.user,
        })
    }

    pub async fn register(
        &self,
        session: &Session,
        username: &str,
        password: &str,
    ) -> Result<PublicUser, ClientError> {
        Self::send_json(self.register_request(session, username, password)).await
    }

    pub async fn submit_detection(
        &self,
        session: &Session,
        body: &SubmitDetection,
    ) -> Result<Detection, ClientError> {
        let res: CreatedDetectionResponse =
            Self::send_json(self.submit_request(session, body)).await?;
        Ok(res.detection)
    }

    pub async fn list_detections(
        &self,
        session: &Session,
        filter: &DetectionFilter,
        page: PageRequest,
    ) -> Result<DetectionPage, ClientError> {
        Self::send_json(self.list_request(session, filter, page)?).await
    }

    pub async fn export_csv(
        &self,
        session: &Session,
        filter: &DetectionFilter,
    ) -> Result<String, ClientError> {
        Ok(Self::send(self.export_request(session, filter)?).await?.text().await?)
    }
}
