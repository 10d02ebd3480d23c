use thiserror::Error;
use tracing::info;

use crate::announce::Clip;

/// Errors a playback device can report
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    /// Device is not initialized or has gone away
    #[error("playback device unavailable: {0}")]
    DeviceUnavailable(String),

    /// No asset exists for the requested clip
    #[error("no asset for clip {clip} (track {track})")]
    ClipNotFound {
        /// Clip that was requested
        clip: Clip,
        /// Track index looked up
        track: u16,
    },
}

impl PlaybackError {
    /// Builds a `ClipNotFound` for `clip`
    pub fn clip_not_found(clip: Clip) -> Self {
        Self::ClipNotFound {
            clip,
            track: clip.track(),
        }
    }
}

/// Output that starts a clip and returns without waiting for it to finish
///
/// There is no completion signal; callers hold for a fixed time after each
/// clip.
#[cfg_attr(test, mockall::automock)]
pub trait PlaybackDevice: Send {
    /// Whether the device can accept clips right now
    fn is_ready(&self) -> bool;

    /// Starts playing `clip`
    ///
    /// # Errors
    /// Returns [`PlaybackError`] if the device is gone or the clip has no asset
    fn play(&mut self, clip: Clip) -> Result<(), PlaybackError>;
}

/// Dry-run device that only logs each clip
#[derive(Debug, Default)]
pub struct LogDevice {
    played: usize,
}

impl LogDevice {
    /// Creates a logging device
    pub const fn new() -> Self {
        Self { played: 0 }
    }

    /// Number of clips logged so far
    pub const fn played(&self) -> usize {
        self.played
    }
}

impl PlaybackDevice for LogDevice {
    fn is_ready(&self) -> bool {
        true
    }

    fn play(&mut self, clip: Clip) -> Result<(), PlaybackError> {
        self.played += 1;
        info!(clip = %clip, track = clip.track(), "play clip");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::announce::NamedClip;

    #[test]
    fn test_log_device_counts_clips() {
        let mut device = LogDevice::new();
        assert!(device.is_ready());

        device.play(Clip::Number(3)).unwrap();
        device.play(Clip::Named(NamedClip::Rupees)).unwrap();

        assert_eq!(device.played(), 2);
    }

    #[test]
    fn test_clip_not_found_carries_track() {
        let err = PlaybackError::clip_not_found(Clip::Named(NamedClip::Lakh));
        assert_eq!(
            err,
            PlaybackError::ClipNotFound {
                clip: Clip::Named(NamedClip::Lakh),
                track: 203
            }
        );
        assert_eq!(err.to_string(), "no asset for clip lakh (track 203)");
    }
}
