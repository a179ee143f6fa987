use anyhow::Result;
use serenity::all::{CommandInteraction, Context as SerenityContext, CreateCommand};

use super::{defer, guild_of, reply};
use crate::state::AppState;

pub fn definition() -> CreateCommand {
    CreateCommand::new("leave").description("Clear the clip queue and leave voice")
}

pub async fn handle(ctx: &SerenityContext, cmd: &CommandInteraction, state: &AppState) -> Result<()> {
    defer(ctx, cmd).await;

    let guild_id = guild_of(cmd)?;
    state.playback().leave(guild_id).await?;
    reply(ctx, cmd, "Cleared the queue and disconnected.").await;
    Ok(())
}
