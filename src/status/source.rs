use std::time::Duration;

use async_trait::async_trait;

use super::{PollError, StatusMap};

/// Where status documents come from
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch(&self) -> Result<StatusMap, PollError>;
}

/// Fetches a flat JSON object of `thing -> status` strings over HTTP
#[derive(Debug, Clone)]
pub struct HttpStatusSource {
    client: reqwest::Client,
    location: String,
}

impl HttpStatusSource {
    pub fn new(location: impl Into<String>, timeout: Duration) -> Result<Self, PollError> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            location: location.into(),
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }
}

#[async_trait]
impl StatusSource for HttpStatusSource {
    async fn fetch(&self) -> Result<StatusMap, PollError> {
        let response = self.client.get(&self.location).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PollError::Status(status));
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
