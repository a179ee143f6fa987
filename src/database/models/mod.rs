pub mod reaction_binding;
pub mod reaction_channel;
pub mod upload;

// Re-export all models for convenience
pub use reaction_binding::ReactionBinding;
pub use reaction_channel::ReactionChannel;
pub use upload::{NewUpload, Upload};
