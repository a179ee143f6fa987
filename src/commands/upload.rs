use std::path::Path;

use anyhow::{Result, anyhow};
use serenity::all::{
    CommandDataOptionValue, CommandInteraction, CommandOptionType, Context as SerenityContext,
    CreateCommand, CreateCommandOption,
};
use tracing::info;

use super::{defer, guild_of, reply, string_option};
use crate::{database::StoreError, state::AppState};

pub fn definition() -> CreateCommand {
    CreateCommand::new("upload")
        .description("Upload an mp3 or wav clip for this server")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "name", "Name for the clip")
                .required(true),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::Attachment, "file", "mp3 or wav file")
                .required(true),
        )
}

pub async fn handle(ctx: &SerenityContext, cmd: &CommandInteraction, state: &AppState) -> Result<()> {
    defer(ctx, cmd).await;

    let guild_id = guild_of(cmd)?;
    let name = string_option(cmd, "name")?;
    let attachment = cmd
        .data
        .options
        .iter()
        .find(|o| o.name == "file")
        .and_then(|o| match o.value {
            CommandDataOptionValue::Attachment(id) => cmd.data.resolved.attachments.get(&id),
            _ => None,
        })
        .ok_or_else(|| anyhow!("missing file"))?;

    let ext = Path::new(&attachment.filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    let content = attachment.download().await?;

    match state
        .uploads
        .save_upload(guild_id, name, &content, ext, Some(cmd.user.id))
    {
        Ok(saved) => {
            info!(guild = %guild_id, name = %saved, bytes = content.len(), "clip uploaded");
            reply(ctx, cmd, format!("Saved `{saved}`. Bind it with /bind.")).await;
        }
        Err(StoreError::BadExtension(_)) => {
            reply(ctx, cmd, "Only mp3 and wav files are accepted.").await;
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
