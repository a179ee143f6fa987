use anyhow::Result;
use serenity::all::{
    CommandInteraction, CommandOptionType, Context as SerenityContext, CreateCommand,
    CreateCommandOption,
};

use super::{defer, guild_of, reply, string_option};
use crate::{database::StoreError, state::AppState, trigger::key_from_input};

pub fn definition() -> CreateCommand {
    CreateCommand::new("bind")
        .description("Play an uploaded clip for an emoji or word")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "reaction",
                "Emoji, server emoji, or word",
            )
            .required(true),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "upload", "Upload name")
                .required(true),
        )
}

pub async fn handle(ctx: &SerenityContext, cmd: &CommandInteraction, state: &AppState) -> Result<()> {
    defer(ctx, cmd).await;

    let guild_id = guild_of(cmd)?;
    let emoji_names: Vec<String> = ctx
        .cache
        .guild(guild_id)
        .map(|g| g.emojis.values().map(|e| e.name.clone()).collect())
        .unwrap_or_default();
    let key = key_from_input(
        string_option(cmd, "reaction")?,
        emoji_names.iter().map(String::as_str),
    );
    let upload = string_option(cmd, "upload")?;

    match state.uploads.set_reaction_binding(guild_id, &key, upload) {
        Ok(()) => reply(ctx, cmd, format!("`{key}` now plays `{upload}`.")).await,
        Err(StoreError::UnknownUpload(_)) => {
            reply(ctx, cmd, format!("No upload named `{upload}`. See /uploads.")).await
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
