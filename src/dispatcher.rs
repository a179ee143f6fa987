//! Routes gateway events into the resolver and the playback queues.

use std::sync::{Arc, Mutex, MutexGuard};

use serenity::{
    all::{ChannelId, GuildId, MessageId, ReactionType, UserId},
    async_trait,
};
use tracing::{debug, info, warn};

use crate::{
    message_cache::MessageCache,
    playback::PlaybackManager,
    resolver::{Dice, ResolveError, Resolution, Resolver, TriggerSource},
    trigger::{Trigger, scan_message, unicode_for_key},
};

const AMBIENT_CELEBRATION_PERCENT: u64 = 10;

/// Whether ambient reactions are allowed in a channel.
pub trait ChannelGate: Send + Sync {
    fn is_enabled(&self, guild: GuildId, channel: ChannelId) -> bool;
}

/// Upstream lookups the dispatcher needs from the chat service.
#[async_trait]
pub trait GuildDirectory: Send + Sync {
    async fn fetch_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> anyhow::Result<MessageSnapshot>;

    fn voice_channel_of(&self, guild: GuildId, user: UserId) -> Option<ChannelId>;
}

/// The part of a fetched message the dispatcher cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageSnapshot {
    pub author: UserId,
}

#[derive(Debug, Clone)]
pub struct ReactionEvent {
    pub guild: GuildId,
    pub channel: ChannelId,
    pub message: MessageId,
    pub user: Option<UserId>,
    pub emoji: ReactionType,
}

#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub guild: GuildId,
    pub channel: ChannelId,
    pub author_is_bot: bool,
    pub content: String,
}

/// A reaction the bot should add to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmbientReaction {
    Unicode(String),
    /// Guild emoji by name; `fallback` is used when the guild has no such emoji.
    Custom {
        name: String,
        fallback: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionOutcome {
    NoTrigger,
    Unplayable,
    MessageUnavailable,
    NoVoiceChannel,
    ConnectFailed,
    Queued(usize),
}

pub struct Dispatcher {
    resolver: Resolver,
    playback: Arc<PlaybackManager>,
    messages: MessageCache<MessageSnapshot>,
    gate: Arc<dyn ChannelGate>,
    dice: Mutex<Box<dyn Dice>>,
}

impl Dispatcher {
    pub fn new(
        resolver: Resolver,
        playback: Arc<PlaybackManager>,
        messages: MessageCache<MessageSnapshot>,
        gate: Arc<dyn ChannelGate>,
        dice: Box<dyn Dice>,
    ) -> Self {
        Self {
            resolver,
            playback,
            messages,
            gate,
            dice: Mutex::new(dice),
        }
    }

    pub fn playback(&self) -> &Arc<PlaybackManager> {
        &self.playback
    }

    fn dice(&self) -> MutexGuard<'_, Box<dyn Dice>> {
        self.dice.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn resolve(&self, trigger: &Trigger, guild: GuildId) -> Result<Option<Resolution>, ResolveError> {
        let mut dice = self.dice();
        self.resolver.resolve(trigger, guild, dice.as_mut())
    }

    /// Reaction add and remove are handled identically: both play.
    ///
    /// The clip is picked before anything upstream is touched, so reactions that
    /// map to nothing never cost a message fetch or a voice join.
    pub async fn on_reaction(
        &self,
        event: &ReactionEvent,
        directory: &dyn GuildDirectory,
    ) -> ReactionOutcome {
        let guild = event.guild;
        let Some(trigger) = Trigger::from_reaction(&event.emoji) else {
            return ReactionOutcome::NoTrigger;
        };
        let key = trigger.key();

        let resolution = match self.resolve(&trigger, guild) {
            Ok(Some(resolution)) => resolution,
            Ok(None) => {
                debug!(%guild, key, "no clip for reaction");
                return ReactionOutcome::NoTrigger;
            }
            Err(e) => {
                warn!(%guild, key, "reaction not playable: {e}");
                return ReactionOutcome::Unplayable;
            }
        };

        let (channel, message) = (event.channel, event.message);
        let Some(snapshot) = self
            .messages
            .get_or_fetch(channel, message, || directory.fetch_message(channel, message))
            .await
        else {
            return ReactionOutcome::MessageUnavailable;
        };

        let voice = event
            .user
            .and_then(|user| directory.voice_channel_of(guild, user))
            .or_else(|| directory.voice_channel_of(guild, snapshot.author));
        let Some(voice) = voice else {
            debug!(%guild, key, "neither reactor nor author is in voice");
            return ReactionOutcome::NoVoiceChannel;
        };

        if let Err(e) = self.playback.connect(guild, voice).await {
            warn!(%guild, key, "reaction dropped: {e}");
            return ReactionOutcome::ConnectFailed;
        }

        let queued = match resolution {
            Resolution::Single(clip) => {
                self.playback.enqueue(guild, clip).await;
                1
            }
            Resolution::Sequence(clips) => {
                let n = clips.len();
                self.playback.enqueue_sequence(guild, clips).await;
                n
            }
        };
        info!(%guild, key, queued, "reaction queued");
        ReactionOutcome::Queued(queued)
    }

    /// Reactions to add to a freshly posted message. Never touches playback.
    pub fn on_message(&self, event: &MessageEvent) -> Vec<AmbientReaction> {
        if event.author_is_bot || !self.gate.is_enabled(event.guild, event.channel) {
            return Vec::new();
        }

        let mut reactions = Vec::new();
        for trigger in scan_message(&event.content) {
            let key = trigger.key();
            let source = match self.resolver.classify(&key, event.guild, trigger.is_text()) {
                Ok(Some(source)) => source,
                Ok(None) => continue,
                Err(e) => {
                    warn!(guild = %event.guild, key, "binding lookup failed: {e}");
                    continue;
                }
            };
            let reaction = match (source, trigger) {
                (TriggerSource::Celebration, _) => self.celebration_reaction(),
                (_, Trigger::Unicode(raw)) => AmbientReaction::Unicode(raw),
                (_, Trigger::Custom(name)) => AmbientReaction::Custom {
                    name,
                    fallback: None,
                },
                (_, Trigger::Text(token)) => match unicode_for_key(&token) {
                    Some(emoji) => AmbientReaction::Unicode(emoji.to_string()),
                    None => AmbientReaction::Custom {
                        name: token,
                        fallback: None,
                    },
                },
            };
            if !reactions.contains(&reaction) {
                reactions.push(reaction);
            }
        }

        if self.dice().roll(100) <= AMBIENT_CELEBRATION_PERCENT {
            let reaction = self.celebration_reaction();
            if !reactions.contains(&reaction) {
                reactions.push(reaction);
            }
        }
        if !reactions.is_empty() {
            debug!(guild = %event.guild, channel = %event.channel, count = reactions.len(), "ambient reactions");
        }
        reactions
    }

    fn celebration_reaction(&self) -> AmbientReaction {
        let cfg = self.resolver.celebration();
        AmbientReaction::Custom {
            name: cfg.custom_emoji.clone(),
            fallback: Some(cfg.unicode_emoji.clone()),
        }
    }
}
