//! Filesystem data lake layout
//!
//! ```text
//! <root>/telegram_messages/<date>/<channel>/<channel>_<date>.json
//! <root>/telegram_images/<date>/<channel>/<message_id>.jpg
//! ```
//!
//! The collector is the only writer; the loader reads the message tree and
//! the enricher reads the image tree.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Default root of the raw zone, relative to the working directory
pub const DEFAULT_LAKE_ROOT: &str = "data/raw";

pub const MESSAGES_DIR: &str = "telegram_messages";
pub const IMAGES_DIR: &str = "telegram_images";

/// Paths inside the data lake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLake {
    root: PathBuf,
}

impl DataLake {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_env() -> Self {
        Self::new(tgelt_common::env::string_or("DATA_LAKE_ROOT", DEFAULT_LAKE_ROOT))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn messages_root(&self) -> PathBuf {
        self.root.join(MESSAGES_DIR)
    }

    pub fn images_root(&self) -> PathBuf {
        self.root.join(IMAGES_DIR)
    }

    pub fn messages_dir(&self, date: &str, channel: &str) -> PathBuf {
        self.messages_root().join(date).join(channel)
    }

    pub fn messages_file(&self, date: &str, channel: &str) -> PathBuf {
        self.messages_dir(date, channel)
            .join(format!("{channel}_{date}.json"))
    }

    pub fn images_dir(&self, date: &str, channel: &str) -> PathBuf {
        self.images_root().join(date).join(channel)
    }

    /// Image directory as seen from the date directory of the message tree.
    ///
    /// Records store `downloaded_image_path` relative to
    /// `telegram_messages/<date>`, which is two levels below the lake root.
    pub fn relative_image_prefix(&self, date: &str, channel: &str) -> PathBuf {
        Path::new("..")
            .join("..")
            .join(IMAGES_DIR)
            .join(date)
            .join(channel)
    }
}

/// Directory name for a channel: its public username, or its title with
/// spaces replaced by underscores.
pub fn channel_dir_name(username: Option<&str>, title: &str) -> String {
    match username.filter(|u| !u.is_empty()) {
        Some(username) => username.to_string(),
        None => title.replace(' ', "_"),
    }
}

/// Every file under `root` whose extension matches (case-insensitive),
/// sorted by path. A missing root yields no files.
pub fn find_files(root: &Path, extension: &str) -> Vec<PathBuf> {
    if !root.exists() {
        tracing::warn!(root = %root.display(), "Data lake directory does not exist");
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable lake entry");
                None
            },
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
        })
        .collect();

    files.sort();
    files
}
