//! Device control-plane client
//!
//! The HTTP API is only used to pair with the device, enumerate its panels and open an
//! external-control session. Colors themselves go through the [crate::transport].

use std::{net::SocketAddr, time::Duration};

use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_derive::{Deserialize, Serialize};
use thiserror::Error;

mod layout;
pub use layout::*;

/// Timeout of every control-plane request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const API_PREFIX: &str = "/api/beta";

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("not authorized by the device")]
    NotAuthorized,
    #[error("unexpected status from the device: {0}")]
    BadStatus(StatusCode),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid panel layout: {0}")]
    InvalidLayout(#[from] LayoutError),
    #[error("invalid stream control address '{0}'")]
    InvalidAddress(String),
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct LayoutData {
    layout_data: String,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
struct PanelLayout {
    layout: LayoutData,
}

/// Hardware description of the device
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HardwareInfo {
    pub name: String,
    pub serial_no: String,
    pub manufacturer: String,
    pub firmware_version: String,
    pub model: String,
    #[serde(skip_serializing)]
    panel_layout: PanelLayout,
    #[serde(skip_deserializing)]
    pub panels: Vec<Panel>,
}

#[derive(Debug, Deserialize)]
struct AuthorizeResponse {
    auth_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExternalControlResponse {
    stream_control_ip_addr: String,
    stream_control_port: u16,
}

#[derive(Debug, Clone)]
pub struct DeviceClient {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl DeviceClient {
    /// Create a client for the device at `url`, authenticated with `token`
    ///
    /// The token may be empty when only calling [DeviceClient::authorize].
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Result<Self, DeviceError> {
        let url: String = url.into();

        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()?,
            url: url.trim_end_matches('/').to_owned(),
            token: token.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}{}", self.url, API_PREFIX, path)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, DeviceError> {
        let response = request.send().await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            StatusCode::FORBIDDEN => Err(DeviceError::NotAuthorized),
            other => Err(DeviceError::BadStatus(other)),
        }
    }

    /// Request a new auth token. The device must be in pairing mode.
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn authorize(&mut self) -> Result<String, DeviceError> {
        let response: AuthorizeResponse = self
            .request(self.client.post(self.endpoint("/new")))
            .await?;

        info!("authorized with device");
        self.token = response.auth_token;
        Ok(self.token.clone())
    }

    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn info(&self) -> Result<HardwareInfo, DeviceError> {
        let mut info: HardwareInfo = self
            .request(
                self.client
                    .get(self.endpoint(&format!("/{}", self.token))),
            )
            .await?;

        info.panels = parse_layout(&info.panel_layout.layout.layout_data)?;
        debug!(name = %info.name, panels = %info.panels.len(), "got hardware info");

        Ok(info)
    }

    /// Switch the device to external control and return where to stream colors to
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn start_external_control(&self) -> Result<SocketAddr, DeviceError> {
        let body = serde_json::json!({
            "write": {
                "command": "display",
                "version": "1.0",
                "animType": "extControl",
            }
        });

        let response: ExternalControlResponse = self
            .request(
                self.client
                    .put(self.endpoint(&format!("/{}/effects", self.token)))
                    .json(&body),
            )
            .await?;

        let host = response.stream_control_ip_addr;
        let port = response.stream_control_port;
        let address = format!("{}:{}", host, port);

        let resolved = tokio::net::lookup_host((host.as_str(), port))
            .await
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or(DeviceError::InvalidAddress(address))?;

        info!(address = %resolved, "external control started");
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use wiremock::{
        matchers::{body_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    async fn client(server: &MockServer) -> DeviceClient {
        DeviceClient::new(format!("{}/", server.uri()), "secret").unwrap()
    }

    #[tokio::test]
    async fn authorize() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/beta/new"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"auth_token": "t0k3n"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut client = DeviceClient::new(server.uri(), "").unwrap();
        assert_eq!(client.authorize().await.unwrap(), "t0k3n");
    }

    #[tokio::test]
    async fn authorize_outside_pairing_mode() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/beta/new"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let mut client = DeviceClient::new(server.uri(), "").unwrap();
        assert!(matches!(
            client.authorize().await,
            Err(DeviceError::NotAuthorized)
        ));
    }

    #[tokio::test]
    async fn hardware_info() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/beta/secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "Aurora 1a2b",
                "serialNo": "S123",
                "manufacturer": "Nanoleaf",
                "firmwareVersion": "1.5.0",
                "model": "NL22",
                "state": { "on": { "value": true } },
                "panelLayout": {
                    "layout": { "layoutData": "2 150 7 100 -86 60 12 0 0 180" },
                    "globalOrientation": { "value": 0, "max": 360, "min": 0 }
                }
            })))
            .mount(&server)
            .await;

        let info = client(&server).await.info().await.unwrap();
        assert_eq!(info.name, "Aurora 1a2b");
        assert_eq!(info.serial_no, "S123");
        assert_eq!(info.firmware_version, "1.5.0");
        assert_eq!(
            info.panels.iter().map(|p| p.id).collect::<Vec<_>>(),
            vec![7, 12]
        );
    }

    #[tokio::test]
    async fn hardware_info_with_bad_layout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/beta/secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "Aurora",
                "panelLayout": { "layout": { "layoutData": "3 150 1 0 0 0" } }
            })))
            .mount(&server)
            .await;

        assert!(matches!(
            client(&server).await.info().await,
            Err(DeviceError::InvalidLayout(_))
        ));
    }

    #[tokio::test]
    async fn start_external_control() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/beta/secret/effects"))
            .and(body_json(serde_json::json!({
                "write": {"command": "display", "version": "1.0", "animType": "extControl"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "streamControlIpAddr": "127.0.0.1",
                "streamControlPort": 60221,
                "streamControlProtocol": "udp"
            })))
            .mount(&server)
            .await;

        let addr = client(&server).await.start_external_control().await.unwrap();
        assert_eq!(addr, "127.0.0.1:60221".parse::<SocketAddr>().unwrap());
    }

    #[tokio::test]
    async fn bad_status() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        match client(&server).await.start_external_control().await {
            Err(DeviceError::BadStatus(status)) => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR)
            }
            other => panic!("unexpected result {:?}", other),
        }
    }
}
