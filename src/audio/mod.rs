/// WAV clip playback on the default output device
pub mod clips;
/// Playback device contract and the logging device
pub mod device;
/// Sequenced playback with holds
pub mod player;

pub use clips::ClipDevice;
pub use device::{LogDevice, PlaybackDevice, PlaybackError};
pub use player::{Player, SpeakReport};
