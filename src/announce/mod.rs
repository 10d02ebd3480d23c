/// Validated rupee amounts
pub mod amount;
/// Place-value rendering of amounts into clip sequences
pub mod announcer;
/// Clip identifiers and their card layout
pub mod clip;

pub use amount::{Amount, AnnounceError};
pub use announcer::{Announcer, Pacing, PlaceValueGroup, PlaybackCommand};
pub use clip::{Clip, NamedClip};
