use anyhow::{Result, anyhow};
use serenity::all::{
    ChannelId, CommandDataOptionValue, CommandInteraction, Context as SerenityContext,
    CreateCommand, CreateInteractionResponse, CreateInteractionResponseMessage,
    EditInteractionResponse, GuildId,
};
use tracing::{error, warn};

use crate::state::AppState;

pub mod bind;
pub mod delete_upload;
pub mod join;
pub mod leave;
pub mod reaction_channels;
pub mod upload;
pub mod uploads;

pub fn definitions() -> Vec<CreateCommand> {
    vec![
        join::definition(),
        leave::definition(),
        reaction_channels::definition(),
        upload::definition(),
        uploads::definition(),
        bind::definition(),
        delete_upload::definition(),
    ]
}

pub async fn dispatch(ctx: &SerenityContext, cmd: &CommandInteraction, state: &AppState) {
    let name = cmd.data.name.as_str();
    let result = match name {
        "join" => join::handle(ctx, cmd, state).await,
        "leave" => leave::handle(ctx, cmd, state).await,
        "reaction_channels" => reaction_channels::handle(ctx, cmd, state).await,
        "upload" => upload::handle(ctx, cmd, state).await,
        "uploads" => uploads::handle(ctx, cmd, state).await,
        "bind" => bind::handle(ctx, cmd, state).await,
        "delete_upload" => delete_upload::handle(ctx, cmd, state).await,
        _ => return,
    };
    if let Err(why) = result {
        error!("/{name} failed: {why:?}");
        reply(ctx, cmd, format!("Something went wrong: {why}")).await;
    }
}

async fn defer(ctx: &SerenityContext, cmd: &CommandInteraction) {
    cmd.create_response(
        &ctx.http,
        CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
    )
    .await
    .ok();
}

async fn reply(ctx: &SerenityContext, cmd: &CommandInteraction, content: impl Into<String>) {
    if let Err(e) = cmd
        .edit_response(&ctx.http, EditInteractionResponse::new().content(content))
        .await
    {
        warn!("/{} reply failed: {e:?}", cmd.data.name);
    }
}

fn guild_of(cmd: &CommandInteraction) -> Result<GuildId> {
    cmd.guild_id.ok_or_else(|| anyhow!("not in a guild"))
}

fn string_option<'a>(cmd: &'a CommandInteraction, name: &str) -> Result<&'a str> {
    cmd.data
        .options
        .iter()
        .find(|o| o.name == name)
        .and_then(|o| match &o.value {
            CommandDataOptionValue::String(s) => Some(s.as_str()),
            _ => None,
        })
        .ok_or_else(|| anyhow!("missing {name}"))
}

fn caller_voice_channel(ctx: &SerenityContext, cmd: &CommandInteraction) -> Result<ChannelId> {
    let guild_id = guild_of(cmd)?;
    let guild = ctx
        .cache
        .guild(guild_id)
        .ok_or_else(|| anyhow!("guild not in cache"))?;
    guild
        .voice_states
        .get(&cmd.user.id)
        .and_then(|vs| vs.channel_id)
        .ok_or_else(|| anyhow!("you must be in a voice channel"))
}
