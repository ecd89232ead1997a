//! REST client for the NetBox DCIM API.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, header};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{Category, DeviceRecord, Inventory, NamedRef, Page, WritableDevice};
use crate::config::Config;
use crate::error::{Error, Result};

const DEVICES_PATH: &str = "/api/dcim/devices/";

/// Longest response body excerpt carried into an error.
const MAX_ERROR_BODY: usize = 256;

/// Client for interacting with NetBox.
#[derive(Clone)]
pub struct NetboxClient {
    base_url: String,
    token: String,
    http: Client,
}

impl NetboxClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            base_url: config.netbox_url.trim_end_matches('/').to_string(),
            token: config.netbox_token.clone(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        req.header(header::AUTHORIZATION, format!("Token {}", self.token))
            .header(header::ACCEPT, "application/json")
    }

    /// Verify the endpoint is reachable and accepts the token.
    pub async fn check_auth(&self) -> Result<()> {
        let response = self
            .authorized(self.http.get(self.url("/api/dcim/sites/")))
            .query(&[("limit", "1")])
            .send()
            .await?;
        debug!("Auth check against {}: {}", self.base_url, response.status());

        match response.status() {
            status @ (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => Err(
                Error::RemoteUnavailable(format!("{}: authentication failed", status)),
            ),
            _ => check(response).await.map(|_| ()),
        }
    }

    async fn list<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<Page<T>> {
        let response = self
            .authorized(self.http.get(self.url(path)))
            .query(query)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }
}

/// Map non-success responses to `RemoteUnavailable`, keeping a body excerpt.
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut body = response.text().await.unwrap_or_default();
    body.truncate(MAX_ERROR_BODY);
    Err(Error::RemoteUnavailable(format!("{}: {}", status, body)))
}

fn refs_endpoint(category: Category) -> (&'static str, &'static str) {
    match category {
        Category::Site => ("/api/dcim/sites/", "name"),
        Category::Role => ("/api/dcim/device-roles/", "name"),
        Category::Type => ("/api/dcim/device-types/", "model"),
    }
}

#[async_trait]
impl Inventory for NetboxClient {
    async fn list_devices(&self, name: Option<&str>) -> Result<Page<DeviceRecord>> {
        debug!("Listing devices (name={:?})", name);
        match name {
            Some(name) => self.list(DEVICES_PATH, &[("name", name)]).await,
            None => self.list(DEVICES_PATH, &[]).await,
        }
    }

    async fn create_device(&self, fields: &WritableDevice) -> Result<DeviceRecord> {
        debug!("Creating device {}", fields.name);
        let response = self
            .authorized(self.http.post(self.url(DEVICES_PATH)))
            .json(fields)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn update_device(&self, id: i64, fields: &WritableDevice) -> Result<DeviceRecord> {
        debug!("Updating device {} ({})", fields.name, id);
        let response = self
            .authorized(self.http.patch(self.url(&format!("{}{}/", DEVICES_PATH, id))))
            .json(fields)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn delete_device(&self, id: i64) -> Result<()> {
        debug!("Deleting device {}", id);
        let response = self
            .authorized(self.http.delete(self.url(&format!("{}{}/", DEVICES_PATH, id))))
            .send()
            .await?;
        // Already gone
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check(response).await.map(|_| ())
    }

    async fn list_refs(&self, category: Category, name: &str) -> Result<Page<NamedRef>> {
        let (path, field) = refs_endpoint(category);
        debug!("Looking up {} {:?}", category, name);
        self.list(path, &[(field, name)]).await
    }
}
