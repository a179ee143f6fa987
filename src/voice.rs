//! Songbird-backed voice sink.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use serenity::{
    all::{ChannelId, GuildId},
    async_trait,
};
use songbird::{
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
    driver::Bitrate,
    input::Input,
    tracks::{ControlError, PlayMode, TrackHandle},
};
use tracing::{debug, info, warn};

use crate::playback::{OnFinished, PlaybackError, SinkError, VoiceSink};

const MAX_BACKOFF_MS: u64 = 5_000;

pub struct SongbirdSink {
    manager: Arc<Songbird>,
    connect_attempts: u32,
    bitrate: i32,
    volume: f32,
    tracks: Mutex<HashMap<GuildId, TrackHandle>>,
}

impl SongbirdSink {
    pub fn new(manager: Arc<Songbird>, connect_attempts: u32, bitrate: i32, volume: f32) -> Self {
        Self {
            manager,
            connect_attempts: connect_attempts.max(1),
            bitrate,
            volume,
            tracks: Mutex::new(HashMap::new()),
        }
    }

    fn current_track(&self, guild: GuildId) -> Option<TrackHandle> {
        self.tracks.lock().ok()?.get(&guild).cloned()
    }
}

#[async_trait]
impl VoiceSink for SongbirdSink {
    async fn connect(&self, guild: GuildId, channel: ChannelId) -> Result<(), SinkError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            debug!(%guild, %channel, attempt = attempts, of = self.connect_attempts, "joining voice");
            match self.manager.join(guild, channel).await {
                Ok(call_lock) => {
                    call_lock
                        .lock()
                        .await
                        .set_bitrate(Bitrate::BitsPerSecond(self.bitrate));
                    info!(%guild, %channel, attempts, "joined voice channel");
                    return Ok(());
                }
                Err(e) if attempts >= self.connect_attempts => {
                    return Err(SinkError::Connect {
                        channel,
                        attempts,
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    let delay = backoff(attempts);
                    warn!(%guild, %channel, attempt = attempts, "voice join failed: {e}; retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn disconnect(&self, guild: GuildId) -> Result<(), SinkError> {
        if let Some(track) = self.tracks.lock().ok().and_then(|mut t| t.remove(&guild)) {
            let _ = track.stop();
        }
        self.manager
            .remove(guild)
            .await
            .map_err(|e| SinkError::Driver(e.to_string()))
    }

    async fn is_connected(&self, guild: GuildId) -> bool {
        match self.manager.get(guild) {
            Some(call_lock) => call_lock.lock().await.current_channel().is_some(),
            None => false,
        }
    }

    async fn is_playing(&self, guild: GuildId) -> bool {
        let Some(track) = self.current_track(guild) else {
            return false;
        };
        match track.get_info().await {
            Ok(state) => matches!(state.playing, PlayMode::Play | PlayMode::Pause),
            Err(_) => false,
        }
    }

    async fn play(
        &self,
        guild: GuildId,
        clip: PathBuf,
        on_finished: OnFinished,
    ) -> Result<(), SinkError> {
        let call_lock = self.manager.get(guild).ok_or(SinkError::NotConnected(guild))?;
        let source: Input = songbird::input::File::new(clip).into();
        let track = call_lock.lock().await.play_input(source);

        let notifier = TrackFinished::new(guild, on_finished);
        if let Err(e) = arm_track(&track, self.volume, &notifier) {
            if matches!(e, ControlError::Finished) {
                // Ended before the handlers were attached.
                let error = match track.get_info().await {
                    Ok(state) => failure(&state.playing),
                    Err(_) => None,
                };
                notifier.fire(error);
            } else {
                let _ = track.stop();
                return Err(SinkError::Driver(e.to_string()));
            }
        }

        if let Ok(mut tracks) = self.tracks.lock() {
            tracks.insert(guild, track);
        }
        Ok(())
    }
}

/// Exponential from one second, capped.
fn backoff(attempt: u32) -> Duration {
    let exp = 2_u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_millis(MAX_BACKOFF_MS.min(1000_u64.saturating_mul(exp)))
}

fn failure(mode: &PlayMode) -> Option<PlaybackError> {
    match mode {
        PlayMode::Errored(e) => Some(PlaybackError(format!("{e:?}"))),
        _ => None,
    }
}

fn arm_track(track: &TrackHandle, volume: f32, notifier: &TrackFinished) -> Result<(), ControlError> {
    track.set_volume(volume)?;
    track.add_event(Event::Track(TrackEvent::End), notifier.clone())?;
    track.add_event(Event::Track(TrackEvent::Error), notifier.clone())?;
    Ok(())
}

/// Delivers a track's completion to the playback queue, once, whichever event comes first.
#[derive(Clone)]
struct TrackFinished {
    guild: GuildId,
    callback: Arc<Mutex<Option<OnFinished>>>,
}

impl TrackFinished {
    fn new(guild: GuildId, callback: OnFinished) -> Self {
        Self {
            guild,
            callback: Arc::new(Mutex::new(Some(callback))),
        }
    }

    fn fire(&self, error: Option<PlaybackError>) {
        let callback = self.callback.lock().ok().and_then(|mut slot| slot.take());
        if let Some(callback) = callback {
            debug!(guild = %self.guild, failed = error.is_some(), "track finished");
            callback(error);
        }
    }
}

#[async_trait]
impl VoiceEventHandler for TrackFinished {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let error = match ctx {
            EventContext::Track(tracks) => tracks.iter().find_map(|(state, _)| failure(&state.playing)),
            _ => None,
        };
        self.fire(error);
        Some(Event::Cancel)
    }
}
