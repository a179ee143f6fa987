use std::path::Path;

use diesel::{connection::SimpleConnection, prelude::*};
use thiserror::Error;

pub mod models;
pub mod schema;
mod store;

pub use store::{ReactionChannels, Uploads};

pub const DB_FILE: &str = "hotspring.db";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database: {0}")]
    Db(#[from] diesel::result::Error),
    #[error("opening database: {0}")]
    Connection(#[from] diesel::ConnectionError),
    #[error("upload file: {0}")]
    Io(#[from] std::io::Error),
    #[error("extension must be mp3 or wav, got `{0}`")]
    BadExtension(String),
    #[error("`{0}` is not a registered upload")]
    UnknownUpload(String),
    #[error("database handle poisoned")]
    Poisoned,
}

pub fn establish_connection(path: &Path) -> Result<SqliteConnection, StoreError> {
    let mut conn = SqliteConnection::establish(&path.to_string_lossy())?;
    init_schema(&mut conn)?;
    Ok(conn)
}

/// Creates the tables when missing; safe to run on every start.
fn init_schema(conn: &mut SqliteConnection) -> Result<(), StoreError> {
    conn.batch_execute(
        r#"
        PRAGMA busy_timeout = 5000;
        CREATE TABLE IF NOT EXISTS reaction_channel (
            guild_id TEXT NOT NULL,
            channel_id TEXT NOT NULL,
            PRIMARY KEY (guild_id, channel_id)
        );
        CREATE TABLE IF NOT EXISTS uploads (
            guild_id TEXT NOT NULL,
            name TEXT NOT NULL,
            file_path TEXT NOT NULL,
            uploaded_by TEXT,
            uploaded_at TIMESTAMP,
            PRIMARY KEY (guild_id, name)
        );
        CREATE TABLE IF NOT EXISTS reaction_upload (
            guild_id TEXT NOT NULL,
            reaction_key TEXT NOT NULL,
            upload_name TEXT NOT NULL,
            PRIMARY KEY (guild_id, reaction_key),
            FOREIGN KEY (guild_id, upload_name) REFERENCES uploads (guild_id, name)
        );
        "#,
    )?;
    Ok(())
}
