//! [`StorageGateway`] backed by the Box Content API v2.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{multipart, Client, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{Item, ItemKind, StorageGateway};
use crate::config::MeshConfig;
use crate::error::{ConfigError, ProviderError};

const PAGE_LIMIT: usize = 1000;

pub struct BoxGateway {
    client: Client,
    token: String,
    api_base: String,
    upload_base: String,
}

#[derive(Deserialize)]
struct ItemPage {
    total_count: usize,
    entries: Vec<Item>,
}

#[derive(Deserialize)]
struct UploadResponse {
    entries: Vec<Item>,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => ProviderError {
                status: Some(status.as_u16()),
                code: None,
                message: err.to_string(),
            },
            None => ProviderError::transport(err.to_string()),
        }
    }
}

impl BoxGateway {
    pub fn new(config: &MeshConfig) -> Result<Self, ConfigError> {
        if config.access_token.trim().is_empty() {
            return Err(ConfigError::MissingAccessToken);
        }
        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;
        Ok(Self {
            client,
            token: config.access_token.clone(),
            api_base: config.api_base.clone(),
            upload_base: config.upload_base.clone(),
        })
    }

    fn collection(kind: ItemKind) -> &'static str {
        match kind {
            ItemKind::File => "files",
            ItemKind::Folder => "folders",
            ItemKind::Other => "web_links",
        }
    }

    async fn check(resp: Response) -> Result<Response, ProviderError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let parsed: Option<ErrorBody> = serde_json::from_str(&body).ok();
        let (code, message) = match parsed {
            Some(err) => (err.code, err.message.unwrap_or(body)),
            None => (None, body),
        };
        Err(ProviderError {
            status: Some(status.as_u16()),
            code,
            message,
        })
    }

    fn first_entry(resp: UploadResponse) -> Result<Item, ProviderError> {
        resp.entries
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::transport("upload response listed no entries"))
    }
}

#[async_trait]
impl StorageGateway for BoxGateway {
    async fn list_items(&self, folder_id: &str) -> Result<Vec<Item>, ProviderError> {
        let url = format!("{}/folders/{}/items", self.api_base, folder_id);
        let mut items = Vec::new();
        loop {
            let offset = items.len().to_string();
            let limit = PAGE_LIMIT.to_string();
            let resp = self
                .client
                .get(&url)
                .bearer_auth(&self.token)
                .query(&[
                    ("fields", "id,type,name"),
                    ("limit", limit.as_str()),
                    ("offset", offset.as_str()),
                ])
                .send()
                .await?;
            let page: ItemPage = Self::check(resp).await?.json().await?;
            let fetched = page.entries.len();
            items.extend(page.entries);
            if fetched == 0 || items.len() >= page.total_count {
                break;
            }
        }
        debug!(folder_id, count = items.len(), "listed folder");
        Ok(items)
    }

    async fn read_file_content(&self, file_id: &str) -> Result<Bytes, ProviderError> {
        let url = format!("{}/files/{}/content", self.api_base, file_id);
        let resp = self.client.get(url).bearer_auth(&self.token).send().await?;
        Ok(Self::check(resp).await?.bytes().await?)
    }

    async fn upload_file(
        &self,
        folder_id: &str,
        name: &str,
        content: Bytes,
    ) -> Result<Item, ProviderError> {
        let attributes = json!({ "name": name, "parent": { "id": folder_id } });
        let form = multipart::Form::new()
            .text("attributes", attributes.to_string())
            .part(
                "file",
                multipart::Part::bytes(content.to_vec()).file_name(name.to_string()),
            );
        let url = format!("{}/files/content", self.upload_base);
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await?;
        let uploaded: UploadResponse = Self::check(resp).await?.json().await?;
        Self::first_entry(uploaded)
    }

    async fn update_file(&self, file_id: &str, content: Bytes) -> Result<Item, ProviderError> {
        let form = multipart::Form::new().part(
            "file",
            multipart::Part::bytes(content.to_vec()).file_name("content"),
        );
        let url = format!("{}/files/{}/content", self.upload_base, file_id);
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await?;
        let uploaded: UploadResponse = Self::check(resp).await?.json().await?;
        Self::first_entry(uploaded)
    }

    async fn delete_item(&self, kind: ItemKind, item_id: &str) -> Result<(), ProviderError> {
        let url = format!("{}/{}/{}", self.api_base, Self::collection(kind), item_id);
        let mut req = self.client.delete(url).bearer_auth(&self.token);
        if kind == ItemKind::Folder {
            req = req.query(&[("recursive", "true")]);
        }
        Self::check(req.send().await?).await?;
        Ok(())
    }

    async fn copy_item(
        &self,
        kind: ItemKind,
        item_id: &str,
        destination_folder_id: &str,
    ) -> Result<Item, ProviderError> {
        let url = format!("{}/{}/{}/copy", self.api_base, Self::collection(kind), item_id);
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(&json!({ "parent": { "id": destination_folder_id } }))
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    async fn create_subfolder(&self, folder_id: &str, name: &str) -> Result<Item, ProviderError> {
        let url = format!("{}/folders", self.api_base);
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(&json!({ "name": name, "parent": { "id": folder_id } }))
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }
}
