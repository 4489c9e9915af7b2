//! Telegram history source abstraction
//!
//! The collector only needs three calls from a Telegram client: resolve a
//! channel, fetch one page of history, and download a photo. Keeping them
//! behind [`TelegramSource`] lets the paging and download-cap logic run
//! against an in-memory source in tests.

use async_trait::async_trait;
use std::path::Path;

use super::sanitize::RawValue;
use crate::error::Result;
use crate::lake::channel_dir_name;

/// A resolved channel entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: i64,
    pub access_hash: i64,
    pub username: Option<String>,
    pub title: String,
}

impl ChannelInfo {
    /// Name of the channel's directories in the data lake
    pub fn dir_name(&self) -> String {
        channel_dir_name(self.username.as_deref(), &self.title)
    }
}

/// Everything needed to fetch a photo's bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoRef {
    pub id: i64,
    pub access_hash: i64,
    pub file_reference: Vec<u8>,
    pub dc_id: i32,
    /// Size variant to download, e.g. "y" for the largest JPEG
    pub thumb_size: String,
}

/// One message of channel history
#[derive(Debug, Clone, PartialEq)]
pub struct TelegramMessage {
    pub id: i32,
    /// Present only for photo-bearing messages
    pub photo: Option<PhotoRef>,
    /// The full message object, before sanitization
    pub raw: RawValue,
}

#[async_trait]
pub trait TelegramSource: Send + Sync {
    /// Resolve a channel link, `@username` or bare username.
    async fn resolve_channel(&self, identifier: &str) -> Result<ChannelInfo>;

    /// Fetch up to `limit` messages older than `offset_id`, newest first.
    ///
    /// An `offset_id` of 0 starts from the most recent message.
    async fn get_history(
        &self,
        channel: &ChannelInfo,
        offset_id: i32,
        limit: u32,
    ) -> Result<Vec<TelegramMessage>>;

    /// Write the photo to `dest`.
    async fn download_photo(&self, photo: &PhotoRef, dest: &Path) -> Result<()>;
}

/// Extract the username from `https://t.me/name`, `t.me/name` or `@name`.
pub fn username_from_identifier(identifier: &str) -> &str {
    let trimmed = identifier.trim().trim_end_matches('/');
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let name = without_scheme
        .strip_prefix("t.me/")
        .or_else(|| without_scheme.strip_prefix("telegram.me/"))
        .unwrap_or(without_scheme);
    let name = name.strip_prefix("s/").unwrap_or(name);
    name.trim_start_matches('@')
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_username_from_identifier() {
        assert_eq!(username_from_identifier("https://t.me/lobelia4cosmetics"), "lobelia4cosmetics");
        assert_eq!(username_from_identifier("t.me/tikvahpharma/"), "tikvahpharma");
        assert_eq!(username_from_identifier("https://t.me/s/chemed123"), "chemed123");
        assert_eq!(username_from_identifier("@CheMed123"), "CheMed123");
        assert_eq!(username_from_identifier("plainname"), "plainname");
    }

    #[test]
    fn test_dir_name_prefers_username() {
        let channel = ChannelInfo {
            id: 1,
            access_hash: 2,
            username: None,
            title: "Lobelia Pharmacy".to_string(),
        };
        assert_eq!(channel.dir_name(), "Lobelia_Pharmacy");
    }
}
