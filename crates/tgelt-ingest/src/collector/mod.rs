// Telegram collector
//
// Scrapes channel history into the data lake:
// - Page through history with a decreasing offset id
// - Download up to `max_images` photos per channel
// - Sanitize each message and write one JSON file per channel and day
//
// A failing channel is logged and skipped; the remaining channels still run.

pub mod sanitize;
pub mod source;

#[cfg(feature = "telegram")]
pub mod mtproto;

pub use sanitize::{sanitize, RawValue};
pub use source::{username_from_identifier, ChannelInfo, PhotoRef, TelegramMessage, TelegramSource};

#[cfg(feature = "telegram")]
pub use mtproto::MtprotoSource;

use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tgelt_common::{env, PipelineError};
use tracing::{error, info, warn};

use crate::error::{IngestError, Result};
use crate::lake::DataLake;

/// Messages requested per history page (the API maximum).
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Photos downloaded per channel and run.
pub const DEFAULT_MAX_IMAGES: usize = 200;

/// Session file used to persist the MTProto login.
pub const DEFAULT_SESSION_FILE: &str = "telegram_scraper_session.session";

/// Channels scraped when `TELEGRAM_CHANNELS` is not set.
pub const DEFAULT_CHANNELS: &[&str] = &["https://t.me/lobelia4cosmetics", "https://t.me/tikvahpharma"];

/// Collector configuration
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub api_id: i32,
    pub api_hash: String,
    pub phone: Option<String>,
    pub session_file: PathBuf,
    pub channels: Vec<String>,
    pub options: ScrapeOptions,
}

impl TelegramConfig {
    /// Load from `TELEGRAM_*` variables.
    ///
    /// Missing API credentials are an error, like every other stage's
    /// configuration failures.
    pub fn from_env() -> Result<Self> {
        let config = Self {
            api_id: env::parse_required("TELEGRAM_API_ID")?,
            api_hash: env::required("TELEGRAM_API_HASH")?,
            phone: env::var("TELEGRAM_PHONE_NUMBER"),
            session_file: PathBuf::from(env::string_or("TELEGRAM_SESSION_FILE", DEFAULT_SESSION_FILE)),
            channels: env::list_or("TELEGRAM_CHANNELS", DEFAULT_CHANNELS),
            options: ScrapeOptions {
                page_size: env::parse_or("TELEGRAM_PAGE_SIZE", DEFAULT_PAGE_SIZE)?,
                max_images: env::parse_or("TELEGRAM_MAX_IMAGES", DEFAULT_MAX_IMAGES)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_id <= 0 {
            return Err(PipelineError::Config("TELEGRAM_API_ID must be a positive integer".to_string()).into());
        }
        if self.channels.is_empty() {
            return Err(PipelineError::Config("TELEGRAM_CHANNELS lists no channels".to_string()).into());
        }
        self.options.validate()
    }
}

/// Per-channel scrape limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrapeOptions {
    pub page_size: u32,
    pub max_images: usize,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_images: DEFAULT_MAX_IMAGES,
        }
    }
}

impl ScrapeOptions {
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 || self.page_size > DEFAULT_PAGE_SIZE {
            return Err(PipelineError::Config(format!(
                "TELEGRAM_PAGE_SIZE must be between 1 and {DEFAULT_PAGE_SIZE}, got {}",
                self.page_size
            ))
            .into());
        }
        Ok(())
    }
}

/// Result of scraping one channel
#[derive(Debug, Clone, Default)]
pub struct ChannelScrape {
    pub messages: Vec<Value>,
    pub images_downloaded: usize,
    pub pages_fetched: usize,
}

/// Scrape the full history of one channel.
///
/// Pages are requested with `offset_id` set to the last id of the previous
/// page until a page comes back empty or short. Photos go to
/// `image_dir/<message_id>.jpg`; records of downloaded photos get a
/// `downloaded_image_path` of `relative_prefix/<message_id>.jpg`.
pub async fn scrape_channel<S>(
    source: &S,
    channel: &ChannelInfo,
    options: &ScrapeOptions,
    image_dir: &Path,
    relative_prefix: &Path,
) -> Result<ChannelScrape>
where
    S: TelegramSource + ?Sized,
{
    info!(channel = %channel.title, "Scraping channel");
    tokio::fs::create_dir_all(image_dir).await?;

    let mut scrape = ChannelScrape::default();
    let mut offset_id = 0;

    loop {
        let page = source.get_history(channel, offset_id, options.page_size).await?;
        scrape.pages_fetched += 1;

        let Some(last_id) = page.last().map(|m| m.id) else {
            break;
        };
        let page_len = page.len();

        for message in page {
            let downloaded = if message.photo.is_some() && scrape.images_downloaded < options.max_images {
                download_image(source, &message, image_dir, relative_prefix).await
            } else {
                None
            };
            if downloaded.is_some() {
                scrape.images_downloaded += 1;
            }

            let mut record = sanitize(message.raw);
            if let (Some(path), Value::Object(map)) = (downloaded, &mut record) {
                map.insert(
                    "downloaded_image_path".to_string(),
                    Value::String(path.to_string_lossy().into_owned()),
                );
            }
            scrape.messages.push(record);
        }

        offset_id = last_id;

        if page_len < options.page_size as usize {
            break;
        }
    }

    info!(
        channel = %channel.title,
        messages = scrape.messages.len(),
        images = scrape.images_downloaded,
        pages = scrape.pages_fetched,
        "Total images downloaded: {}",
        scrape.images_downloaded
    );

    Ok(scrape)
}

async fn download_image<S>(
    source: &S,
    message: &TelegramMessage,
    image_dir: &Path,
    relative_prefix: &Path,
) -> Option<PathBuf>
where
    S: TelegramSource + ?Sized,
{
    let photo = message.photo.as_ref()?;
    let filename = format!("{}.jpg", message.id);
    let full_path = image_dir.join(&filename);

    match source.download_photo(photo, &full_path).await {
        Ok(()) => {
            info!(path = %full_path.display(), "Downloaded image");
            Some(relative_prefix.join(filename))
        },
        Err(e) => {
            warn!(message_id = message.id, error = %e, "Error downloading image");
            None
        },
    }
}

/// Outcome of one collector run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectSummary {
    pub channels_scraped: usize,
    pub channels_failed: usize,
    pub messages_written: usize,
    pub images_downloaded: usize,
}

/// Scrape every channel into the data lake partition for `date`.
///
/// Channel failures (resolution, network, disk) are logged and counted; they
/// never abort the run.
pub async fn collect<S>(
    source: &S,
    channels: &[String],
    lake: &DataLake,
    date: &str,
    options: &ScrapeOptions,
) -> CollectSummary
where
    S: TelegramSource + ?Sized,
{
    let mut summary = CollectSummary::default();

    for identifier in channels {
        match collect_channel(source, identifier, lake, date, options).await {
            Ok((messages, images)) => {
                summary.channels_scraped += 1;
                summary.messages_written += messages;
                summary.images_downloaded += images;
            },
            Err(e) => {
                error!(channel = %identifier, error = %e, "Error scraping channel");
                summary.channels_failed += 1;
            },
        }
    }

    summary
}

async fn collect_channel<S>(
    source: &S,
    identifier: &str,
    lake: &DataLake,
    date: &str,
    options: &ScrapeOptions,
) -> Result<(usize, usize)>
where
    S: TelegramSource + ?Sized,
{
    let channel = source.resolve_channel(identifier).await?;
    let name = channel.dir_name();

    let output_dir = lake.messages_dir(date, &name);
    tokio::fs::create_dir_all(&output_dir).await?;

    let scrape = scrape_channel(
        source,
        &channel,
        options,
        &lake.images_dir(date, &name),
        &lake.relative_image_prefix(date, &name),
    )
    .await?;

    let output_file = lake.messages_file(date, &name);
    write_messages_file(&output_file, &scrape.messages).await?;

    info!(
        channel = %name,
        file = %output_file.display(),
        "Saved {} messages",
        scrape.messages.len()
    );

    Ok((scrape.messages.len(), scrape.images_downloaded))
}

/// Write records as a pretty-printed JSON array with four-space indentation.
pub async fn write_messages_file(path: &Path, messages: &[Value]) -> Result<()> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    messages.serialize(&mut serializer)?;

    tokio::fs::write(path, buffer)
        .await
        .map_err(IngestError::from)
}

/// Partition date for today's scrape, in local time
pub fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}
