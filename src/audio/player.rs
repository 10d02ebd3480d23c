use tracing::{debug, info, warn};

use super::device::{PlaybackDevice, PlaybackError};
use crate::announce::{Amount, Announcer, PlaybackCommand};

/// Result of one announcement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpeakReport {
    /// Clips the device accepted
    pub played: usize,
    /// Clips skipped because the device rejected them
    pub skipped: usize,
}

/// Plays rendered announcements on a device it owns exclusively
///
/// `speak` takes `&mut self`, so only one announcement can run at a time.
pub struct Player<D> {
    announcer: Announcer,
    device: D,
}

impl<D: PlaybackDevice> Player<D> {
    /// Creates a player around `device`
    pub const fn new(announcer: Announcer, device: D) -> Self {
        Self { announcer, device }
    }

    /// Underlying device
    pub const fn device(&self) -> &D {
        &self.device
    }

    /// Renders and plays `amount`
    ///
    /// Clips the device rejects mid-sequence are skipped; the rest of the
    /// sequence still plays.
    ///
    /// # Errors
    /// Returns [`PlaybackError::DeviceUnavailable`] if the device is not ready
    /// before the first clip; nothing is played in that case
    pub async fn speak(&mut self, amount: Amount) -> Result<SpeakReport, PlaybackError> {
        let commands = self.announcer.announce(amount);
        self.play_sequence(&commands).await
    }

    /// Plays an already rendered command sequence in order
    ///
    /// # Errors
    /// Returns [`PlaybackError::DeviceUnavailable`] if the device is not ready
    pub async fn play_sequence(
        &mut self,
        commands: &[PlaybackCommand],
    ) -> Result<SpeakReport, PlaybackError> {
        if !self.device.is_ready() {
            return Err(PlaybackError::DeviceUnavailable(
                "device not ready".to_owned(),
            ));
        }

        let start = std::time::Instant::now();
        let mut report = SpeakReport::default();

        for command in commands {
            match self.device.play(command.clip) {
                Ok(()) => {
                    report.played += 1;
                    debug!(clip = %command.clip, hold_ms = command.hold.as_millis(), "clip started");
                }
                Err(e) => {
                    report.skipped += 1;
                    warn!(clip = %command.clip, error = %e, "clip skipped");
                }
            }

            if !command.hold.is_zero() {
                tokio::time::sleep(command.hold).await;
            }
        }

        info!(
            played = report.played,
            skipped = report.skipped,
            elapsed_ms = start.elapsed().as_millis(),
            "announcement finished"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::announce::{Clip, NamedClip, Pacing};
    use crate::audio::device::MockPlaybackDevice;
    use mockall::{predicate::eq, Sequence};
    use std::time::Duration;

    fn amount(major: i64, minor: i64) -> Amount {
        Amount::new(major, minor).unwrap()
    }

    #[tokio::test]
    async fn test_plays_clips_in_order() {
        let mut device = MockPlaybackDevice::new();
        let mut seq = Sequence::new();
        device.expect_is_ready().return_const(true);
        for clip in [
            Clip::Number(40),
            Clip::Number(7),
            Clip::Named(NamedClip::Rupees),
        ] {
            device
                .expect_play()
                .with(eq(clip))
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(()));
        }

        let mut player = Player::new(Announcer::new(Pacing::immediate()), device);
        let report = player.speak(amount(47, 0)).await.unwrap();

        assert_eq!(
            report,
            SpeakReport {
                played: 3,
                skipped: 0
            }
        );
    }

    #[tokio::test]
    async fn test_device_not_ready_plays_nothing() {
        let mut device = MockPlaybackDevice::new();
        device.expect_is_ready().return_const(false);
        device.expect_play().never();

        let mut player = Player::new(Announcer::new(Pacing::immediate()), device);
        let result = player.speak(amount(15, 0)).await;

        assert!(matches!(result, Err(PlaybackError::DeviceUnavailable(_))));
    }

    #[tokio::test]
    async fn test_missing_clip_is_skipped() {
        let mut device = MockPlaybackDevice::new();
        device.expect_is_ready().return_const(true);
        device
            .expect_play()
            .with(eq(Clip::Named(NamedClip::Thousand)))
            .times(1)
            .returning(|clip| Err(PlaybackError::clip_not_found(clip)));
        device
            .expect_play()
            .withf(|clip| *clip != Clip::Named(NamedClip::Thousand))
            .times(3)
            .returning(|_| Ok(()));

        let mut player = Player::new(Announcer::new(Pacing::immediate()), device);
        let report = player.speak(amount(1050, 0)).await.unwrap();

        assert_eq!(report.played, 3);
        assert_eq!(report.skipped, 1);
    }

    #[tokio::test]
    async fn test_device_error_mid_sequence_continues() {
        let mut device = MockPlaybackDevice::new();
        device.expect_is_ready().return_const(true);
        let mut calls = 0;
        device.expect_play().times(4).returning(move |_| {
            calls += 1;
            if calls == 2 {
                Err(PlaybackError::DeviceUnavailable("busy".to_owned()))
            } else {
                Ok(())
            }
        });

        let mut player = Player::new(Announcer::new(Pacing::immediate()), device);
        let report = player.speak(amount(0, 25)).await.unwrap();

        assert_eq!(report.played, 3);
        assert_eq!(report.skipped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_holds_between_clips() {
        let mut device = MockPlaybackDevice::new();
        device.expect_is_ready().return_const(true);
        device.expect_play().returning(|_| Ok(()));

        let mut player = Player::new(Announcer::default(), device);
        let start = tokio::time::Instant::now();
        player.speak(amount(15, 0)).await.unwrap();

        // 15 (800 + 1000 gap) then rupees (1000)
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(2800));
        assert!(elapsed < Duration::from_millis(2900));
    }
}
