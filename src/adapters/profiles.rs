//! HTTP profile service and avatar probe.

use async_trait::async_trait;
use log::debug;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

use super::discord::retry_after_header;
use crate::core::{AvatarProbe, ProfileData, ProfileFetchError, ProfileFetcher};

/// Profile service response. Accepts `name` as well as `display_name`.
#[derive(Debug, Deserialize)]
struct ProfileRecord {
    #[serde(alias = "name")]
    display_name: String,
    #[serde(default, alias = "avatar")]
    avatar_url: Option<String>,
}

/// `GET {base}/{subject}` returning a JSON profile
pub struct HttpProfileFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProfileFetcher {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("PersonaRelay/1.0")
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn profile_url(&self, subject_id: &str) -> String {
        let encoded: String = subject_id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            .collect();
        format!("{}/{}", self.base_url, encoded)
    }
}

#[async_trait]
impl ProfileFetcher for HttpProfileFetcher {
    async fn fetch_profile(&self, subject_id: &str) -> Result<ProfileData, ProfileFetchError> {
        let url = self.profile_url(subject_id);
        debug!("Fetching profile {subject_id} from {url}");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProfileFetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_status_error(status, retry_after_header(response.headers())));
        }

        let record: ProfileRecord = response
            .json()
            .await
            .map_err(|e| ProfileFetchError::Transport(format!("invalid profile body: {e}")))?;

        Ok(ProfileData {
            display_name: record.display_name,
            avatar_url: record.avatar_url.filter(|u| !u.trim().is_empty()),
        })
    }
}

fn fetch_status_error(status: StatusCode, retry_after: Option<Duration>) -> ProfileFetchError {
    match status {
        StatusCode::NOT_FOUND => ProfileFetchError::NotFound,
        StatusCode::TOO_MANY_REQUESTS => ProfileFetchError::RateLimited { retry_after },
        other => ProfileFetchError::Server(other.as_u16()),
    }
}

/// Treats a URL as a usable avatar when it answers with an image content type.
pub struct ReqwestAvatarProbe {
    client: reqwest::Client,
}

impl ReqwestAvatarProbe {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent("PersonaRelay/1.0")
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

#[async_trait]
impl AvatarProbe for ReqwestAvatarProbe {
    async fn probe(&self, url: &str) -> bool {
        let mut response = match self.client.head(url).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!("Avatar HEAD failed for {url}: {e}");
                return false;
            }
        };

        // Some CDNs refuse HEAD
        if response.status() == StatusCode::METHOD_NOT_ALLOWED {
            response = match self.client.get(url).send().await {
                Ok(r) => r,
                Err(e) => {
                    debug!("Avatar GET failed for {url}: {e}");
                    return false;
                }
            };
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        is_image_response(response.status(), content_type)
    }
}

fn is_image_response(status: StatusCode, content_type: &str) -> bool {
    status.is_success() && content_type.trim().to_ascii_lowercase().starts_with("image/")
}
