//! Deployment: artifact stores and the pusher stage.

pub mod pusher;
pub mod store;

pub use pusher::ModelPusher;
pub use store::{ArtifactStore, HttpArtifactStore, LocalArtifactStore, open_artifact_store};
