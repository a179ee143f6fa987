//! Per-guild playback queues driving an external voice sink.
//!
//! Each guild has at most one play chain: `enqueue` starts it (after a short delay)
//! when the guild is idle, and every completion callback advances it until the
//! queue is drained. A playback error drops the whole queue.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    future::Future,
    path::PathBuf,
    pin::Pin,
    sync::{Arc, Mutex},
    time::Duration,
};

use serenity::{
    all::{ChannelId, GuildId},
    async_trait,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{clip::ClipRef, metrics::METRICS};

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct PlaybackError(pub String);

/// Called exactly once when a clip stops, with the error if it did not end cleanly.
pub type OnFinished = Box<dyn FnOnce(Option<PlaybackError>) + Send + 'static>;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to join voice channel {channel} after {attempts} attempt(s): {reason}")]
    Connect {
        channel: ChannelId,
        attempts: u32,
        reason: String,
    },
    #[error("not connected to voice in guild {0}")]
    NotConnected(GuildId),
    #[error("voice driver: {0}")]
    Driver(String),
}

/// The real-time voice transport, one handle per guild.
#[async_trait]
pub trait VoiceSink: Send + Sync {
    async fn connect(&self, guild: GuildId, channel: ChannelId) -> Result<(), SinkError>;
    async fn disconnect(&self, guild: GuildId) -> Result<(), SinkError>;
    async fn is_connected(&self, guild: GuildId) -> bool;
    async fn is_playing(&self, guild: GuildId) -> bool;
    async fn play(
        &self,
        guild: GuildId,
        clip: PathBuf,
        on_finished: OnFinished,
    ) -> Result<(), SinkError>;
}

#[derive(Debug, Default)]
struct GuildQueue {
    clips: VecDeque<ClipRef>,
    /// Set while a play chain owns this queue; only the chain clears it.
    chain_active: bool,
}

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

pub struct PlaybackManager {
    sink: Arc<dyn VoiceSink>,
    sound_root: PathBuf,
    settle_delay: Duration,
    start_delay: Duration,
    queues: Mutex<HashMap<GuildId, GuildQueue>>,
    /// Guilds counted in the connected-guilds gauge.
    connected: Mutex<HashSet<GuildId>>,
}

impl PlaybackManager {
    pub fn new(
        sink: Arc<dyn VoiceSink>,
        sound_root: PathBuf,
        settle_delay: Duration,
        start_delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            sink,
            sound_root,
            settle_delay,
            start_delay,
            queues: Mutex::new(HashMap::new()),
            connected: Mutex::new(HashSet::new()),
        })
    }

    /// Joins `channel` unless the guild already has a connection, then waits for
    /// the media path to settle before returning.
    pub async fn connect(&self, guild: GuildId, channel: ChannelId) -> Result<(), SinkError> {
        if self.sink.is_connected(guild).await {
            return Ok(());
        }
        self.sink.connect(guild, channel).await?;
        if let Ok(mut queues) = self.queues.lock() {
            queues.entry(guild).or_default();
        }
        self.track_connection(guild, true);
        info!(%guild, %channel, "voice connected");
        tokio::time::sleep(self.settle_delay).await;
        Ok(())
    }

    /// Drops the queue and tears down the voice connection.
    pub async fn leave(&self, guild: GuildId) -> Result<(), SinkError> {
        self.clear(guild);
        if self.sink.is_connected(guild).await {
            self.sink.disconnect(guild).await?;
            info!(%guild, "voice disconnected");
        }
        self.track_connection(guild, false);
        Ok(())
    }

    /// The connection went away without [`PlaybackManager::leave`], e.g. a moderator
    /// kicked the bot. Drops the queue and forgets the connection.
    pub fn on_disconnected(&self, guild: GuildId) {
        self.clear(guild);
        self.track_connection(guild, false);
    }

    fn track_connection(&self, guild: GuildId, up: bool) {
        let Ok(mut connected) = self.connected.lock() else {
            return;
        };
        match up {
            true if connected.insert(guild) => METRICS.inc_connections(),
            false if connected.remove(&guild) => METRICS.dec_connections(),
            _ => {}
        }
    }

    #[cfg(test)]
    fn connection_count(&self) -> usize {
        self.connected.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn clear(&self, guild: GuildId) {
        let removed = self
            .queues
            .lock()
            .ok()
            .and_then(|mut queues| queues.remove(&guild));
        if let Some(q) = removed {
            METRICS.dec_queue(q.clips.len());
            debug!(%guild, dropped = q.clips.len(), "queue cleared");
        }
    }

    pub fn queue_len(&self, guild: GuildId) -> Option<usize> {
        self.queues
            .lock()
            .ok()
            .and_then(|queues| queues.get(&guild).map(|q| q.clips.len()))
    }

    pub async fn enqueue(self: &Arc<Self>, guild: GuildId, clip: ClipRef) {
        self.enqueue_sequence(guild, vec![clip]).await;
    }

    /// Appends `clips` in order. Starts a play chain only when the guild is idle.
    pub async fn enqueue_sequence(self: &Arc<Self>, guild: GuildId, clips: Vec<ClipRef>) {
        if clips.is_empty() {
            return;
        }
        let playing = self.sink.is_playing(guild).await;
        let added = clips.len();
        let start = match self.queues.lock() {
            Ok(mut queues) => {
                let q = queues.entry(guild).or_default();
                q.clips.extend(clips);
                if q.chain_active || playing {
                    false
                } else {
                    q.chain_active = true;
                    true
                }
            }
            Err(_) => false,
        };
        METRICS.inc_queue(added);
        debug!(%guild, added, start, "enqueued");

        if start {
            let manager = Arc::clone(self);
            let delay = self.start_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                manager.advance(guild).await;
            });
        }
    }

    /// Pops and plays the next clip whose file exists; missing files are skipped.
    async fn advance(self: Arc<Self>, guild: GuildId) {
        loop {
            let next = match self.queues.lock() {
                Ok(mut queues) => match queues.get_mut(&guild) {
                    Some(q) => {
                        let next = q.clips.pop_front();
                        q.chain_active = next.is_some();
                        next
                    }
                    None => None,
                },
                Err(_) => None,
            };
            let Some(clip) = next else {
                debug!(%guild, "queue idle");
                return;
            };
            METRICS.dec_queue(1);

            let path = clip.resolve(&self.sound_root);
            if !path.is_file() {
                warn!(%guild, %clip, path = %path.display(), "clip file missing, skipping");
                METRICS.inc_skipped();
                continue;
            }

            let manager = Arc::clone(&self);
            let runtime = tokio::runtime::Handle::current();
            let on_finished: OnFinished = Box::new(move |outcome| {
                runtime.spawn(manager.on_finished(guild, outcome));
            });
            match self.sink.play(guild, path, on_finished).await {
                Ok(()) => {
                    METRICS.inc_played();
                    info!(%guild, %clip, "playing");
                }
                Err(e) => {
                    error!(%guild, %clip, "could not start playback: {e}");
                    METRICS.inc_playback_error();
                    self.clear(guild);
                }
            }
            return;
        }
    }

    fn on_finished(self: Arc<Self>, guild: GuildId, outcome: Option<PlaybackError>) -> BoxFuture {
        Box::pin(async move {
            if let Some(err) = outcome {
                error!(%guild, "playback failed, dropping queue: {err}");
                METRICS.inc_playback_error();
                self.clear(guild);
                return;
            }
            if self.sink.is_connected(guild).await {
                self.advance(guild).await;
            } else if let Ok(mut queues) = self.queues.lock()
                && let Some(q) = queues.get_mut(&guild)
            {
                q.chain_active = false;
            }
        })
    }
}
