use anyhow::Result;
use serenity::all::{
    CommandInteraction, CommandOptionType, Context as SerenityContext, CreateCommand,
    CreateCommandOption,
};

use super::{defer, guild_of, reply, string_option};
use crate::{database::StoreError, state::AppState};

pub fn definition() -> CreateCommand {
    CreateCommand::new("delete_upload")
        .description("Delete an uploaded clip and its bindings")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "name", "Upload name")
                .required(true),
        )
}

pub async fn handle(ctx: &SerenityContext, cmd: &CommandInteraction, state: &AppState) -> Result<()> {
    defer(ctx, cmd).await;

    let guild_id = guild_of(cmd)?;
    let name = string_option(cmd, "name")?;
    match state.uploads.delete_upload(guild_id, name) {
        Ok(()) => reply(ctx, cmd, format!("Deleted `{name}`.")).await,
        Err(StoreError::UnknownUpload(_)) => {
            reply(ctx, cmd, format!("No upload named `{name}`.")).await
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
