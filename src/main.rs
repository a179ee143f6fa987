use std::sync::Arc;

use anyhow::{Context as _, Result};
use serenity::{
    all::{
        Command as AppCommand, Context as SerenityContext, GatewayIntents, Interaction, Message,
        Permissions, Reaction, Ready, VoiceState,
    },
    async_trait,
};
use songbird::{Config as VoiceConfig, Songbird, driver::MixMode, serenity::SerenityInit};
use tracing::{error, info};

mod clip;
mod commands;
mod config;
mod database;
mod dispatcher;
mod env;
mod events;
mod message_cache;
mod metrics;
mod playback;
mod resolver;
mod state;
mod trigger;
mod voice;
mod web;

use crate::{
    config::{ClipConfig, Settings},
    database::{ReactionChannels, Uploads},
    dispatcher::Dispatcher,
    message_cache::MessageCache,
    metrics::METRICS,
    playback::PlaybackManager,
    resolver::{Resolver, RngDice},
    state::AppState,
    voice::SongbirdSink,
};

struct Handler {
    state: AppState,
}

#[async_trait]
impl serenity::prelude::EventHandler for Handler {
    async fn ready(&self, ctx: SerenityContext, ready: Ready) {
        info!("Logged in as {}", ready.user.name);

        let perms = Permissions::CONNECT
            | Permissions::SPEAK
            | Permissions::ADD_REACTIONS
            | Permissions::READ_MESSAGE_HISTORY;
        if let Ok(app) = ctx.http.get_current_application_info().await {
            info!(
                "Invite this bot: https://discord.com/api/oauth2/authorize?client_id={}&permissions={}&scope=bot%20applications.commands",
                app.id,
                perms.bits()
            );
        }

        for def in commands::definitions() {
            if let Err(e) = AppCommand::create_global_command(&ctx.http, def).await {
                error!("failed to register global command: {e:?}");
            }
        }
        METRICS.set_ready(true);
    }

    async fn interaction_create(&self, ctx: SerenityContext, interaction: Interaction) {
        if let Interaction::Command(cmd) = interaction {
            commands::dispatch(&ctx, &cmd, &self.state).await;
        }
    }

    async fn reaction_add(&self, ctx: SerenityContext, add_reaction: Reaction) {
        events::handle_reaction(&ctx, &self.state.dispatcher, &add_reaction).await;
    }

    async fn reaction_remove(&self, ctx: SerenityContext, removed_reaction: Reaction) {
        events::handle_reaction(&ctx, &self.state.dispatcher, &removed_reaction).await;
    }

    async fn message(&self, ctx: SerenityContext, new_message: Message) {
        events::handle_message(&ctx, &self.state.dispatcher, &new_message).await;
    }

    async fn voice_state_update(&self, ctx: SerenityContext, _old: Option<VoiceState>, new: VoiceState) {
        if new.channel_id.is_some() || new.user_id != ctx.cache.current_user().id {
            return;
        }
        if let Some(guild) = new.guild_id {
            info!(%guild, "bot left voice, dropping queue");
            self.state.playback().on_disconnected(guild);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let token = env::read_discord_token()?;
    let settings = Settings::from_env();

    let clips = ClipConfig::load(&settings.config_path)
        .with_context(|| format!("loading clip config {}", settings.config_path.display()))?;
    let sound_root = clips.resolved_sound_root(settings.sound_root.clone());
    info!(
        sound_root = %sound_root.display(),
        unicode = clips.unicode.len(),
        custom = clips.custom.len(),
        "clip tables loaded"
    );

    let channels = Arc::new(ReactionChannels::open(&settings.store_dir)?);
    let uploads = Arc::new(Uploads::open(&settings.store_dir)?);

    // One track at a time, so softclip buys nothing.
    let voice_cfg = VoiceConfig::default()
        .preallocated_tracks(2)
        .use_softclip(false)
        .mix_mode(if settings.mono {
            MixMode::Mono
        } else {
            MixMode::Stereo
        });
    let songbird = Songbird::serenity_from_config(voice_cfg);

    let sink = Arc::new(SongbirdSink::new(
        songbird.clone(),
        settings.connect_attempts,
        settings.bitrate,
        settings.volume,
    ));
    let playback = PlaybackManager::new(
        sink,
        sound_root,
        settings.settle_delay,
        settings.start_delay,
    );
    let dispatcher = Dispatcher::new(
        Resolver::new(Arc::new(clips), uploads.clone()),
        playback,
        MessageCache::new(settings.cache_ttl, settings.cache_capacity),
        channels.clone(),
        Box::new(RngDice::from_entropy()),
    );
    let state = AppState {
        dispatcher: Arc::new(dispatcher),
        channels,
        uploads,
    };

    web::spawn_http(&settings.http_bind)
        .with_context(|| format!("binding probe server on {}", settings.http_bind))?;
    info!("Probe server on {}", settings.http_bind);
    info!(
        "Tunables: HOTSPRING_SETTLE_MS, HOTSPRING_START_DELAY_MS, HOTSPRING_CONNECT_ATTEMPTS, HOTSPRING_BITRATE, HOTSPRING_VOLUME, HOTSPRING_MIX_MODE=mono|stereo, MESSAGE_CACHE_TTL_SECS, MESSAGE_CACHE_CAPACITY"
    );

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MESSAGE_REACTIONS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_EMOJIS_AND_STICKERS;

    let mut client = serenity::Client::builder(token, intents)
        .event_handler(Handler { state })
        .register_songbird_with(songbird)
        .await?;

    if let Err(why) = client.start_autosharded().await {
        error!("Client error: {why:?}");
    }
    METRICS.set_ready(false);
    Ok(())
}
