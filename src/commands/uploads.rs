use anyhow::Result;
use serenity::all::{CommandInteraction, Context as SerenityContext, CreateCommand};

use super::{defer, guild_of, reply};
use crate::state::AppState;

pub fn definition() -> CreateCommand {
    CreateCommand::new("uploads").description("List this server's uploaded clips")
}

pub async fn handle(ctx: &SerenityContext, cmd: &CommandInteraction, state: &AppState) -> Result<()> {
    defer(ctx, cmd).await;

    let guild_id = guild_of(cmd)?;
    let uploads = state.uploads.list_uploads(guild_id)?;
    if uploads.is_empty() {
        reply(ctx, cmd, "No uploads yet.").await;
        return Ok(());
    }

    let mut lines = Vec::with_capacity(uploads.len());
    for upload in uploads {
        let keys = state
            .uploads
            .reaction_keys_for_upload(guild_id, &upload.name)?;
        let mut line = format!("• `{}`", upload.name);
        if !keys.is_empty() {
            line.push_str(&format!(" ← {}", keys.join(", ")));
        }
        if let Some(by) = upload.uploaded_by {
            line.push_str(&format!(" (by <@{by}>)"));
        }
        lines.push(line);
    }
    reply(ctx, cmd, fit_message(&lines, MESSAGE_LIMIT)).await;
    Ok(())
}

/// Discord rejects message content longer than this many characters.
const MESSAGE_LIMIT: usize = 2000;

/// Joins whole lines while they fit in `limit`, leaving room to note how many were cut.
fn fit_message(lines: &[String], limit: usize) -> String {
    let more = |n: usize| format!("…and {n} more");
    let mut out = String::new();
    let mut len = 0;
    for (i, line) in lines.iter().enumerate() {
        let sep = usize::from(i > 0);
        let after = lines.len() - i - 1;
        let tail = if after > 0 { 1 + more(after).chars().count() } else { 0 };
        let line_len = line.chars().count();
        if len + sep + line_len + tail > limit {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&more(lines.len() - i));
            return out;
        }
        if i > 0 {
            out.push('\n');
        }
        out.push_str(line);
        len += sep + line_len;
    }
    out
}
