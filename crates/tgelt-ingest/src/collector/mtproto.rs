//! MTProto history source built on `grammers`
//!
//! Logs in as a user account (bots cannot read channel history), persisting
//! the session to disk so only the first run asks for a login code.

use async_trait::async_trait;
use grammers_client::types::Chat;
use grammers_client::{Client, Config, InitParams, SignInError};
use grammers_session::Session;
use grammers_tl_types as tl;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::sanitize::RawValue;
use super::source::{username_from_identifier, ChannelInfo, PhotoRef, TelegramMessage, TelegramSource};
use super::TelegramConfig;
use crate::error::{IngestError, Result};

/// Bytes requested per `upload.getFile` call; must divide 1 MiB.
const DOWNLOAD_CHUNK: i32 = 512 * 1024;

pub struct MtprotoSource {
    client: Client,
    session_file: PathBuf,
}

impl MtprotoSource {
    /// Connect and make sure the session is authorized.
    ///
    /// An unauthorized session triggers an interactive login on the terminal
    /// (phone number unless configured, login code, and the two-factor
    /// password when the account has one).
    pub async fn connect(config: &TelegramConfig) -> Result<Self> {
        let session = Session::load_file_or_create(&config.session_file)?;
        let client = Client::connect(Config {
            session,
            api_id: config.api_id,
            api_hash: config.api_hash.clone(),
            params: InitParams::default(),
        })
        .await
        .map_err(IngestError::telegram)?;

        info!("Connected to Telegram");

        let source = Self {
            client,
            session_file: config.session_file.clone(),
        };
        source.authorize(config.phone.as_deref()).await?;
        Ok(source)
    }

    async fn authorize(&self, phone: Option<&str>) -> Result<()> {
        if self.client.is_authorized().await.map_err(IngestError::telegram)? {
            return Ok(());
        }

        let phone = match phone {
            Some(phone) => phone.to_string(),
            None => prompt("Phone number (international format): ")?,
        };
        let token = self
            .client
            .request_login_code(&phone)
            .await
            .map_err(IngestError::telegram)?;
        let code = prompt("Login code: ")?;

        match self.client.sign_in(&token, &code).await {
            Ok(_) => {},
            Err(SignInError::PasswordRequired(password_token)) => {
                let password = prompt("Two-factor password: ")?;
                self.client
                    .check_password(password_token, password)
                    .await
                    .map_err(IngestError::telegram)?;
            },
            Err(e) => return Err(IngestError::telegram(e)),
        }

        self.save_session()?;
        info!("Signed in to Telegram");
        Ok(())
    }

    pub fn save_session(&self) -> Result<()> {
        self.client.session().save_to_file(&self.session_file)?;
        Ok(())
    }
}

fn prompt(message: &str) -> Result<String> {
    let mut stderr = std::io::stderr();
    stderr.write_all(message.as_bytes())?;
    stderr.flush()?;

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn input_peer(channel: &ChannelInfo) -> tl::enums::InputPeer {
    tl::enums::InputPeer::Channel(tl::types::InputPeerChannel {
        channel_id: channel.id,
        access_hash: channel.access_hash,
    })
}

#[async_trait]
impl TelegramSource for MtprotoSource {
    async fn resolve_channel(&self, identifier: &str) -> Result<ChannelInfo> {
        let username = username_from_identifier(identifier);
        let chat = self
            .client
            .resolve_username(username)
            .await
            .map_err(IngestError::telegram)?
            .ok_or_else(|| IngestError::Telegram(format!("No channel has \"{username}\" as username")))?;

        if !matches!(chat, Chat::Channel(_)) {
            return Err(IngestError::Telegram(format!("\"{username}\" is not a channel")));
        }

        let packed = chat.pack();
        Ok(ChannelInfo {
            id: packed.id,
            access_hash: packed.access_hash.unwrap_or(0),
            username: chat.username().map(str::to_string),
            title: chat.name().to_string(),
        })
    }

    async fn get_history(
        &self,
        channel: &ChannelInfo,
        offset_id: i32,
        limit: u32,
    ) -> Result<Vec<TelegramMessage>> {
        let request = tl::functions::messages::GetHistory {
            peer: input_peer(channel),
            offset_id,
            offset_date: 0,
            add_offset: 0,
            limit: i32::try_from(limit).unwrap_or(i32::MAX),
            max_id: 0,
            min_id: 0,
            hash: 0,
        };

        let messages = match self.client.invoke(&request).await.map_err(IngestError::telegram)? {
            tl::enums::messages::Messages::Messages(m) => m.messages,
            tl::enums::messages::Messages::Slice(m) => m.messages,
            tl::enums::messages::Messages::ChannelMessages(m) => m.messages,
            tl::enums::messages::Messages::NotModified(_) => Vec::new(),
        };

        debug!(offset_id, count = messages.len(), "Fetched history page");
        Ok(messages.iter().map(convert_message).collect())
    }

    async fn download_photo(&self, photo: &PhotoRef, dest: &Path) -> Result<()> {
        let result = self.download_chunks(photo, dest).await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(dest).await;
        }
        result
    }
}

impl MtprotoSource {
    async fn download_chunks(&self, photo: &PhotoRef, dest: &Path) -> Result<()> {
        let location = tl::enums::InputFileLocation::InputPhotoFileLocation(tl::types::InputPhotoFileLocation {
            id: photo.id,
            access_hash: photo.access_hash,
            file_reference: photo.file_reference.clone(),
            thumb_size: photo.thumb_size.clone(),
        });

        let mut file = tokio::fs::File::create(dest).await?;
        let mut offset: i64 = 0;

        loop {
            let request = tl::functions::upload::GetFile {
                precise: false,
                cdn_supported: false,
                location: location.clone(),
                offset,
                limit: DOWNLOAD_CHUNK,
            };

            let bytes = match self
                .client
                .invoke_in_dc(&request, photo.dc_id)
                .await
                .map_err(IngestError::telegram)?
            {
                tl::enums::upload::File::File(f) => f.bytes,
                tl::enums::upload::File::CdnRedirect(_) => {
                    return Err(IngestError::Telegram("photo is served from a CDN".to_string()));
                },
            };

            file.write_all(&bytes).await?;
            if bytes.len() < DOWNLOAD_CHUNK as usize {
                break;
            }
            offset += bytes.len() as i64;
        }

        file.flush().await?;
        Ok(())
    }
}

// ============================================================================
// TL object -> RawValue
// ============================================================================

fn convert_message(message: &tl::enums::Message) -> TelegramMessage {
    match message {
        tl::enums::Message::Message(m) => {
            let (media, photo) = match &m.media {
                Some(media) => convert_media(media),
                None => (RawValue::Null, None),
            };

            TelegramMessage {
                id: m.id,
                photo,
                raw: RawValue::object(
                    "Message",
                    [
                        ("id", RawValue::from(m.id)),
                        ("peer_id", peer_value(&m.peer_id)),
                        ("from_id", m.from_id.as_ref().map(peer_value).unwrap_or(RawValue::Null)),
                        ("date", RawValue::timestamp(m.date.into())),
                        ("message", RawValue::from(m.message.clone())),
                        ("out", RawValue::from(m.out)),
                        ("mentioned", RawValue::from(m.mentioned)),
                        ("post", RawValue::from(m.post)),
                        ("pinned", RawValue::from(m.pinned)),
                        ("media", media),
                        ("views", RawValue::from(m.views)),
                        ("forwards", RawValue::from(m.forwards)),
                        ("edit_date", m.edit_date.map(|d| RawValue::timestamp(d.into())).unwrap_or(RawValue::Null)),
                        ("post_author", RawValue::from(m.post_author.clone())),
                        ("grouped_id", RawValue::from(m.grouped_id)),
                    ],
                ),
            }
        },
        tl::enums::Message::Service(m) => TelegramMessage {
            id: m.id,
            photo: None,
            raw: RawValue::object(
                "MessageService",
                [
                    ("id", RawValue::from(m.id)),
                    ("peer_id", peer_value(&m.peer_id)),
                    ("date", RawValue::timestamp(m.date.into())),
                    ("out", RawValue::from(m.out)),
                    ("post", RawValue::from(m.post)),
                ],
            ),
        },
        tl::enums::Message::Empty(m) => TelegramMessage {
            id: m.id,
            photo: None,
            raw: RawValue::object(
                "MessageEmpty",
                [
                    ("id", RawValue::from(m.id)),
                    ("peer_id", m.peer_id.as_ref().map(peer_value).unwrap_or(RawValue::Null)),
                ],
            ),
        },
    }
}

fn peer_value(peer: &tl::enums::Peer) -> RawValue {
    match peer {
        tl::enums::Peer::User(p) => RawValue::object("PeerUser", [("user_id", RawValue::from(p.user_id))]),
        tl::enums::Peer::Chat(p) => RawValue::object("PeerChat", [("chat_id", RawValue::from(p.chat_id))]),
        tl::enums::Peer::Channel(p) => {
            RawValue::object("PeerChannel", [("channel_id", RawValue::from(p.channel_id))])
        },
    }
}

fn convert_media(media: &tl::enums::MessageMedia) -> (RawValue, Option<PhotoRef>) {
    match media {
        tl::enums::MessageMedia::Photo(m) => match &m.photo {
            Some(tl::enums::Photo::Photo(p)) => {
                let raw = RawValue::object(
                    "MessageMediaPhoto",
                    [
                        ("spoiler", RawValue::from(m.spoiler)),
                        ("ttl_seconds", RawValue::from(m.ttl_seconds)),
                        (
                            "photo",
                            RawValue::object(
                                "Photo",
                                [
                                    ("id", RawValue::from(p.id)),
                                    ("access_hash", RawValue::from(p.access_hash)),
                                    ("file_reference", RawValue::bytes(p.file_reference.clone())),
                                    ("date", RawValue::timestamp(p.date.into())),
                                    ("dc_id", RawValue::from(p.dc_id)),
                                ],
                            ),
                        ),
                    ],
                );
                let photo = PhotoRef {
                    id: p.id,
                    access_hash: p.access_hash,
                    file_reference: p.file_reference.clone(),
                    dc_id: p.dc_id,
                    thumb_size: largest_size(&p.sizes),
                };
                (raw, Some(photo))
            },
            _ => (RawValue::object("MessageMediaPhoto", [("photo", RawValue::Null)]), None),
        },
        tl::enums::MessageMedia::Document(_) => (RawValue::object("MessageMediaDocument", Vec::<(String, RawValue)>::new()), None),
        tl::enums::MessageMedia::WebPage(_) => (RawValue::object("MessageMediaWebPage", Vec::<(String, RawValue)>::new()), None),
        _ => (RawValue::object("MessageMediaUnsupported", Vec::<(String, RawValue)>::new()), None),
    }
}

/// Type letter of the largest stored JPEG size.
fn largest_size(sizes: &[tl::enums::PhotoSize]) -> String {
    sizes
        .iter()
        .filter_map(|size| match size {
            tl::enums::PhotoSize::Size(s) => Some((s.w * s.h, s.r#type.clone())),
            tl::enums::PhotoSize::Progressive(s) => Some((s.w * s.h, s.r#type.clone())),
            _ => None,
        })
        .max_by_key(|(area, _)| *area)
        .map(|(_, kind)| kind)
        .unwrap_or_else(|| "x".to_string())
}
