use anyhow::Result;
use serenity::all::{CommandInteraction, Context as SerenityContext, CreateCommand};

use super::{caller_voice_channel, defer, guild_of, reply};
use crate::state::AppState;

pub fn definition() -> CreateCommand {
    CreateCommand::new("join").description("Join your voice channel")
}

pub async fn handle(ctx: &SerenityContext, cmd: &CommandInteraction, state: &AppState) -> Result<()> {
    defer(ctx, cmd).await;

    let guild_id = guild_of(cmd)?;
    let channel_id = caller_voice_channel(ctx, cmd)?;

    match state.playback().connect(guild_id, channel_id).await {
        Ok(()) => reply(ctx, cmd, format!("Joined <#{channel_id}>.")).await,
        Err(e) => reply(ctx, cmd, format!("Could not join: {e}")).await,
    }
    Ok(())
}
