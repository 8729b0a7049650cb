use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use crate::relay::platform::AttachmentFetcher;

/// Discord's upload limit for bots without boosted guilds.
const MAX_DISCORD_FILE_SIZE: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct MediaInfo {
    pub data: Vec<u8>,
    pub content_type: String,
    pub size: usize,
}

#[derive(Default)]
pub struct MediaHandler {
    client: Client,
}

impl MediaHandler {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    pub async fn download_from_url(&self, url: &str) -> Result<MediaInfo> {
        debug!("downloading media from {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| anyhow!("failed to download from {}: {}", url, e))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "failed to download from {}: status {}",
                url,
                response.status()
            ));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        let data = response
            .bytes()
            .await
            .map_err(|e| anyhow!("failed to read response body: {}", e))?
            .to_vec();

        let size = data.len();
        debug!("downloaded {} bytes from {}", size, url);

        Ok(MediaInfo {
            data,
            content_type,
            size,
        })
    }

    pub fn check_discord_file_size(size: usize) -> Result<()> {
        if size > MAX_DISCORD_FILE_SIZE {
            warn!(
                "file too large for Discord: {} bytes (max {})",
                size, MAX_DISCORD_FILE_SIZE
            );
            Err(anyhow!(
                "file too large for Discord: {} bytes (max {})",
                size,
                MAX_DISCORD_FILE_SIZE
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl AttachmentFetcher for MediaHandler {
    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let media = self.download_from_url(url).await?;
        Self::check_discord_file_size(media.size)?;
        debug!("re-uploading {} attachment from {}", media.content_type, url);
        Ok(media.data)
    }
}
