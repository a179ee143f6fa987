//! Serenity glue: gateway payloads in, dispatcher calls out.

use serenity::{
    all::{
        ChannelId, Context as SerenityContext, GuildId, Message, MessageId, Reaction,
        ReactionType, UserId,
    },
    async_trait,
};
use tracing::{debug, warn};

use crate::dispatcher::{
    AmbientReaction, Dispatcher, GuildDirectory, MessageEvent, MessageSnapshot, ReactionEvent,
    ReactionOutcome,
};

/// Message and voice-state lookups through the gateway cache and REST.
pub struct SerenityDirectory<'a> {
    ctx: &'a SerenityContext,
}

impl<'a> SerenityDirectory<'a> {
    pub fn new(ctx: &'a SerenityContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl GuildDirectory for SerenityDirectory<'_> {
    async fn fetch_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> anyhow::Result<MessageSnapshot> {
        let msg = channel.message(self.ctx, message).await?;
        Ok(MessageSnapshot {
            author: msg.author.id,
        })
    }

    fn voice_channel_of(&self, guild: GuildId, user: UserId) -> Option<ChannelId> {
        let guild = self.ctx.cache.guild(guild)?;
        guild.voice_states.get(&user).and_then(|vs| vs.channel_id)
    }
}

pub async fn handle_reaction(ctx: &SerenityContext, dispatcher: &Dispatcher, reaction: &Reaction) {
    let Some(guild) = reaction.guild_id else {
        return;
    };
    // Our own ambient reactions must not play anything.
    if reaction.user_id == Some(ctx.cache.current_user().id) {
        return;
    }
    let event = ReactionEvent {
        guild,
        channel: reaction.channel_id,
        message: reaction.message_id,
        user: reaction.user_id,
        emoji: reaction.emoji.clone(),
    };
    let outcome = dispatcher
        .on_reaction(&event, &SerenityDirectory::new(ctx))
        .await;
    if outcome != ReactionOutcome::NoTrigger {
        debug!(%guild, message = %reaction.message_id, ?outcome, "reaction handled");
    }
}

pub async fn handle_message(ctx: &SerenityContext, dispatcher: &Dispatcher, msg: &Message) {
    let Some(guild) = msg.guild_id else {
        return;
    };
    let event = MessageEvent {
        guild,
        channel: msg.channel_id,
        author_is_bot: msg.author.bot,
        content: msg.content.clone(),
    };
    for reaction in dispatcher.on_message(&event) {
        let Some(emoji) = reaction_type(ctx, guild, &reaction) else {
            debug!(%guild, ?reaction, "guild has no such emoji");
            continue;
        };
        if let Err(e) = msg.channel_id.create_reaction(&ctx.http, msg.id, emoji).await {
            warn!(%guild, channel = %msg.channel_id, "could not add reaction: {e}");
        }
    }
}

/// Guild emoji are matched by name, ignoring ASCII case.
fn reaction_type(
    ctx: &SerenityContext,
    guild: GuildId,
    reaction: &AmbientReaction,
) -> Option<ReactionType> {
    match reaction {
        AmbientReaction::Unicode(s) => Some(ReactionType::Unicode(s.clone())),
        AmbientReaction::Custom { name, fallback } => {
            let custom = ctx.cache.guild(guild).and_then(|g| {
                g.emojis
                    .values()
                    .find(|e| e.name.eq_ignore_ascii_case(name))
                    .cloned()
            });
            custom
                .map(ReactionType::from)
                .or_else(|| fallback.clone().map(ReactionType::Unicode))
        }
    }
}
