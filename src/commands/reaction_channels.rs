use anyhow::{Result, bail};
use serenity::all::{
    CommandInteraction, CommandOptionType, Context as SerenityContext, CreateCommand,
    CreateCommandOption,
};

use super::{defer, guild_of, reply, string_option};
use crate::state::AppState;

pub fn definition() -> CreateCommand {
    let mode = CreateCommandOption::new(
        CommandOptionType::String,
        "mode",
        "Where the bot may react to messages",
    )
    .required(true)
    .add_string_choice("on everywhere", "all_on")
    .add_string_choice("off everywhere", "all_off")
    .add_string_choice("on in this channel", "here")
    .add_string_choice("show current setting", "status");
    CreateCommand::new("reaction_channels")
        .description("Choose the channels where the bot adds emoji reactions")
        .add_option(mode)
}

pub async fn handle(ctx: &SerenityContext, cmd: &CommandInteraction, state: &AppState) -> Result<()> {
    defer(ctx, cmd).await;

    let guild_id = guild_of(cmd)?;
    let channels = &state.channels;
    let message = match string_option(cmd, "mode")? {
        "all_on" => {
            channels.set_all_on(guild_id)?;
            "Reactions are now on in every channel.".to_string()
        }
        "all_off" => {
            channels.set_all_off(guild_id)?;
            "Reactions are now off in every channel.".to_string()
        }
        "here" => {
            channels.set_channel_on(guild_id, cmd.channel_id)?;
            format!("Reactions are now on in <#{}>.", cmd.channel_id)
        }
        "status" => match channels.enabled_channels(guild_id)? {
            None => "Reactions are on in every channel.".to_string(),
            Some(list) if list.is_empty() => "Reactions are off in every channel.".to_string(),
            Some(list) => {
                let names: Vec<String> = list.iter().map(|c| format!("<#{c}>")).collect();
                format!("Reactions are on in: {}", names.join(", "))
            }
        },
        other => bail!("unknown mode `{other}`"),
    };
    reply(ctx, cmd, message).await;
    Ok(())
}
