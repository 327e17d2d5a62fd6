//! flow-adapters: the two playback engines and the live-replay worker
//! contract.

pub mod client_playback;
pub mod replay;
pub mod server_playback;
pub mod upstream;

pub use client_playback::ClientPlaybackState;
pub use replay::{replay_request, ReplayOutcome};
pub use server_playback::ServerPlaybackState;
pub use upstream::{Upstream, UpstreamError};
