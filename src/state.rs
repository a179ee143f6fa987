use std::sync::Arc;

use crate::{
    database::{ReactionChannels, Uploads},
    dispatcher::Dispatcher,
    playback::PlaybackManager,
};

/// Shared handles for event and command handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub channels: Arc<ReactionChannels>,
    pub uploads: Arc<Uploads>,
}

impl AppState {
    pub fn playback(&self) -> &Arc<PlaybackManager> {
        self.dispatcher.playback()
    }
}
