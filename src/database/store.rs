use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serenity::all::{ChannelId, GuildId, UserId};
use tracing::{info, warn};

use super::{
    DB_FILE, StoreError, establish_connection,
    models::{NewUpload, ReactionBinding, ReactionChannel, Upload, reaction_channel::ALL_OFF},
};
use crate::{dispatcher::ChannelGate, resolver::BindingStore};

pub const NAME_MAX_LEN: usize = 64;
const ALLOWED_EXT: &[&str] = &["mp3", "wav"];

/// Keeps `[A-Za-z0-9_-]`, replaces everything else with `_`, caps the length.
pub fn sanitize_name(name: &str) -> String {
    let s: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(NAME_MAX_LEN)
        .collect();
    if s.is_empty() { "unnamed".to_string() } else { s }
}

fn with_conn<T>(
    conn: &Mutex<SqliteConnection>,
    f: impl FnOnce(&mut SqliteConnection) -> QueryResult<T>,
) -> Result<T, StoreError> {
    let mut guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
    Ok(f(&mut guard)?)
}

fn open_db(store_dir: &Path) -> Result<Mutex<SqliteConnection>, StoreError> {
    fs::create_dir_all(store_dir)?;
    Ok(Mutex::new(establish_connection(&store_dir.join(DB_FILE))?))
}

/// Per-guild switch for the ambient "react to messages" feature.
pub struct ReactionChannels {
    conn: Mutex<SqliteConnection>,
}

impl ReactionChannels {
    pub fn open(store_dir: &Path) -> Result<Self, StoreError> {
        Ok(Self {
            conn: open_db(store_dir)?,
        })
    }

    pub fn channel_enabled(&self, guild: GuildId, channel: ChannelId) -> Result<bool, StoreError> {
        with_conn(&self.conn, |c| {
            ReactionChannel::is_enabled(c, &guild.to_string(), &channel.to_string())
        })
    }

    pub fn set_all_off(&self, guild: GuildId) -> Result<(), StoreError> {
        with_conn(&self.conn, |c| ReactionChannel::set_all_off(c, &guild.to_string()))?;
        info!(%guild, "ambient reactions off in every channel");
        Ok(())
    }

    pub fn set_all_on(&self, guild: GuildId) -> Result<(), StoreError> {
        with_conn(&self.conn, |c| ReactionChannel::set_all_on(c, &guild.to_string()))?;
        info!(%guild, "ambient reactions on in every channel");
        Ok(())
    }

    pub fn set_channel_on(&self, guild: GuildId, channel: ChannelId) -> Result<(), StoreError> {
        with_conn(&self.conn, |c| {
            ReactionChannel::set_channel_on(c, &guild.to_string(), &channel.to_string())
        })?;
        info!(%guild, %channel, "ambient reactions on for channel");
        Ok(())
    }

    /// `None` when every channel is on, an empty list when every channel is off.
    pub fn enabled_channels(&self, guild: GuildId) -> Result<Option<Vec<ChannelId>>, StoreError> {
        let rows = with_conn(&self.conn, |c| {
            ReactionChannel::for_guild(c, &guild.to_string())
        })?;
        if rows.is_empty() {
            return Ok(None);
        }
        let mut ids: Vec<ChannelId> = rows
            .iter()
            .filter(|r| r.channel_id != ALL_OFF)
            .filter_map(|r| r.channel_id.parse::<u64>().ok())
            .filter(|id| *id != 0)
            .map(ChannelId::new)
            .collect();
        ids.sort();
        Ok(Some(ids))
    }
}

impl ChannelGate for ReactionChannels {
    fn is_enabled(&self, guild: GuildId, channel: ChannelId) -> bool {
        self.channel_enabled(guild, channel).unwrap_or_else(|e| {
            warn!(%guild, %channel, "channel setting lookup failed, assuming on: {e}");
            true
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadInfo {
    pub name: String,
    pub uploaded_by: Option<UserId>,
    pub uploaded_at: Option<NaiveDateTime>,
}

/// User-uploaded clips on disk plus their trigger bindings.
pub struct Uploads {
    conn: Mutex<SqliteConnection>,
    upload_dir: PathBuf,
}

impl Uploads {
    pub fn open(store_dir: &Path) -> Result<Self, StoreError> {
        let upload_dir = store_dir.join("uploads");
        fs::create_dir_all(&upload_dir)?;
        Ok(Self {
            conn: open_db(store_dir)?,
            upload_dir,
        })
    }

    /// Writes the file and registers it; returns the sanitized name actually used.
    pub fn save_upload(
        &self,
        guild: GuildId,
        name: &str,
        content: &[u8],
        ext: &str,
        uploaded_by: Option<UserId>,
    ) -> Result<String, StoreError> {
        let ext = ext.to_ascii_lowercase();
        if !ALLOWED_EXT.contains(&ext.as_str()) {
            return Err(StoreError::BadExtension(ext));
        }
        let safe_name = sanitize_name(name);
        let dir = self.upload_dir.join(guild.to_string());
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{safe_name}.{ext}"));

        // Replacing an upload with a different extension must not orphan the old file.
        if let Some(previous) = self.stored_path(guild, &safe_name)?
            && previous != path
        {
            let _ = fs::remove_file(&previous);
        }
        fs::write(&path, content)?;

        let guild_id = guild.to_string();
        let file_path = path.to_string_lossy();
        let uploader = uploaded_by.map(|u| u.to_string());
        with_conn(&self.conn, |c| {
            Upload::upsert(
                c,
                &NewUpload {
                    guild_id: &guild_id,
                    name: &safe_name,
                    file_path: &file_path,
                    uploaded_by: uploader.as_deref(),
                    uploaded_at: Some(Utc::now().naive_utc()),
                },
            )
        })?;
        info!(%guild, name = %safe_name, path = %path.display(), by = ?uploaded_by, "upload saved");
        Ok(safe_name)
    }

    pub fn list_uploads(&self, guild: GuildId) -> Result<Vec<UploadInfo>, StoreError> {
        let rows = with_conn(&self.conn, |c| Upload::list_for_guild(c, &guild.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|u| UploadInfo {
                name: u.name,
                uploaded_by: u
                    .uploaded_by
                    .and_then(|s| s.parse::<u64>().ok())
                    .filter(|id| *id != 0)
                    .map(UserId::new),
                uploaded_at: u.uploaded_at,
            })
            .collect())
    }

    pub fn set_reaction_binding(
        &self,
        guild: GuildId,
        reaction_key: &str,
        upload_name: &str,
    ) -> Result<(), StoreError> {
        let guild_id = guild.to_string();
        let bound = with_conn(&self.conn, |c| {
            if Upload::find(c, &guild_id, upload_name)?.is_none() {
                return Ok(false);
            }
            ReactionBinding::set(
                c,
                &ReactionBinding {
                    guild_id: guild_id.clone(),
                    reaction_key: reaction_key.to_string(),
                    upload_name: upload_name.to_string(),
                },
            )?;
            Ok(true)
        })?;
        if !bound {
            return Err(StoreError::UnknownUpload(upload_name.to_string()));
        }
        info!(%guild, reaction_key, upload_name, "reaction bound");
        Ok(())
    }

    /// `(reaction_key, upload_name)` pairs, sorted by key.
    pub fn list_reaction_bindings(&self, guild: GuildId) -> Result<Vec<(String, String)>, StoreError> {
        let rows = with_conn(&self.conn, |c| {
            ReactionBinding::list_for_guild(c, &guild.to_string())
        })?;
        Ok(rows
            .into_iter()
            .map(|b| (b.reaction_key, b.upload_name))
            .collect())
    }

    pub fn reaction_keys_for_upload(
        &self,
        guild: GuildId,
        upload_name: &str,
    ) -> Result<Vec<String>, StoreError> {
        with_conn(&self.conn, |c| {
            ReactionBinding::keys_for_upload(c, &guild.to_string(), upload_name)
        })
    }

    /// Removes the bindings, the row, and the file. Unknown names are an error.
    pub fn delete_upload(&self, guild: GuildId, name: &str) -> Result<(), StoreError> {
        let path = self
            .stored_path(guild, name)?
            .ok_or_else(|| StoreError::UnknownUpload(name.to_string()))?;
        let guild_id = guild.to_string();
        with_conn(&self.conn, |c| {
            c.transaction(|c| {
                ReactionBinding::delete_for_upload(c, &guild_id, name)?;
                Upload::delete(c, &guild_id, name)?;
                Ok(())
            })
        })?;
        if let Err(e) = fs::remove_file(&path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %path.display(), "could not remove upload file: {e}");
        }
        info!(%guild, name, "upload deleted");
        Ok(())
    }

    fn stored_path(&self, guild: GuildId, name: &str) -> Result<Option<PathBuf>, StoreError> {
        let row = with_conn(&self.conn, |c| Upload::find(c, &guild.to_string(), name))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let p = PathBuf::from(row.file_path);
        if p.is_absolute() {
            Ok(Some(p))
        } else {
            Ok(Some(std::env::current_dir()?.join(p)))
        }
    }
}

impl BindingStore for Uploads {
    fn reaction_binding(&self, guild: GuildId, key: &str) -> Result<Option<String>, StoreError> {
        with_conn(&self.conn, |c| {
            ReactionBinding::find_upload(c, &guild.to_string(), key)
        })
    }

    fn upload_path(&self, guild: GuildId, name: &str) -> Result<Option<PathBuf>, StoreError> {
        self.stored_path(guild, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUILD: GuildId = GuildId::new(747509186228650015);
    const GENERAL: ChannelId = ChannelId::new(11);
    const MEMES: ChannelId = ChannelId::new(22);

    #[test]
    fn sanitize_matches_upload_rules() {
        assert_eq!(sanitize_name("hello world!"), "hello_world_");
        assert_eq!(sanitize_name("ok-name_1"), "ok-name_1");
        assert_eq!(sanitize_name(""), "unnamed");
        assert_eq!(sanitize_name("ねこ"), "__");
        assert_eq!(sanitize_name(&"x".repeat(100)).len(), NAME_MAX_LEN);
    }

    #[test]
    fn channel_gate_modes() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReactionChannels::open(dir.path()).unwrap();

        // No record: every channel is on.
        assert!(store.is_enabled(GUILD, GENERAL));
        assert_eq!(store.enabled_channels(GUILD).unwrap(), None);

        store.set_all_off(GUILD).unwrap();
        assert!(!store.is_enabled(GUILD, GENERAL));
        assert_eq!(store.enabled_channels(GUILD).unwrap(), Some(vec![]));

        store.set_channel_on(GUILD, MEMES).unwrap();
        assert!(store.is_enabled(GUILD, MEMES));
        assert!(!store.is_enabled(GUILD, GENERAL));
        store.set_channel_on(GUILD, GENERAL).unwrap();
        assert_eq!(
            store.enabled_channels(GUILD).unwrap(),
            Some(vec![GENERAL, MEMES])
        );

        store.set_all_on(GUILD).unwrap();
        assert!(store.is_enabled(GUILD, GENERAL));
        assert!(store.is_enabled(GuildId::new(5), GENERAL));
    }

    #[test]
    fn uploads_roundtrip_through_bindings() {
        let dir = tempfile::tempdir().unwrap();
        let store = Uploads::open(dir.path()).unwrap();
        let who = UserId::new(42);

        let name = store
            .save_upload(GUILD, "my clip", b"ID3", "MP3", Some(who))
            .unwrap();
        assert_eq!(name, "my_clip");
        let path = store.upload_path(GUILD, &name).unwrap().unwrap();
        assert!(path.ends_with(format!("uploads/{GUILD}/my_clip.mp3")));
        assert_eq!(fs::read(&path).unwrap(), b"ID3");

        let listed = store.list_uploads(GUILD).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].uploaded_by, Some(who));
        assert!(listed[0].uploaded_at.is_some());

        store.set_reaction_binding(GUILD, "beer_mug", &name).unwrap();
        store.set_reaction_binding(GUILD, "cheers", &name).unwrap();
        assert_eq!(
            store.reaction_binding(GUILD, "beer_mug").unwrap(),
            Some(name.clone())
        );
        assert_eq!(
            store.reaction_keys_for_upload(GUILD, &name).unwrap(),
            vec!["beer_mug", "cheers"]
        );
        assert_eq!(store.list_reaction_bindings(GUILD).unwrap().len(), 2);

        store.delete_upload(GUILD, &name).unwrap();
        assert!(!path.exists());
        assert_eq!(store.reaction_binding(GUILD, "beer_mug").unwrap(), None);
        assert!(matches!(
            store.delete_upload(GUILD, &name),
            Err(StoreError::UnknownUpload(_))
        ));
    }

    #[test]
    fn rejects_bad_extension_and_unknown_binding_target() {
        let dir = tempfile::tempdir().unwrap();
        let store = Uploads::open(dir.path()).unwrap();
        assert!(matches!(
            store.save_upload(GUILD, "x", b"", "ogg", None),
            Err(StoreError::BadExtension(e)) if e == "ogg"
        ));
        assert!(matches!(
            store.set_reaction_binding(GUILD, "beer_mug", "nope"),
            Err(StoreError::UnknownUpload(_))
        ));
    }

    #[test]
    fn reupload_with_new_extension_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = Uploads::open(dir.path()).unwrap();
        store.save_upload(GUILD, "bell", b"a", "mp3", None).unwrap();
        let old = store.upload_path(GUILD, "bell").unwrap().unwrap();
        store.save_upload(GUILD, "bell", b"b", "wav", None).unwrap();
        let new = store.upload_path(GUILD, "bell").unwrap().unwrap();
        assert!(!old.exists());
        assert!(new.to_string_lossy().ends_with("bell.wav"));
        assert_eq!(store.list_uploads(GUILD).unwrap().len(), 1);
    }
}
