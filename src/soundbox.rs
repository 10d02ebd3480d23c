use tracing::{debug, info, warn};

use crate::announce::Amount;
use crate::audio::{PlaybackDevice, PlaybackError, Player, SpeakReport};
use crate::chain::TxEvent;
use crate::ledger::{DedupStore, LedgerError};

/// Why a transaction event was not announced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Transaction was removed by a reorg
    Removed,
    /// Paid to some other address
    OtherRecipient,
    /// Same hash as the last processed transaction
    Duplicate,
    /// Value could not be converted into an announceable amount
    Unconvertible,
}

/// What happened to a transaction event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Not announced
    Ignored(IgnoreReason),
    /// Announced
    Announced {
        /// Converted amount
        amount: Amount,
        /// Playback summary
        report: SpeakReport,
    },
}

/// Errors surfaced to the control loop
#[derive(Debug, thiserror::Error)]
pub enum SoundboxError {
    /// Ledger could not record the transaction; nothing was announced
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Playback device was not ready
    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

/// Turns transaction events into announcements
///
/// Owns the player (and through it the device) and the ledger, so events
/// are handled strictly one at a time.
pub struct Soundbox<D, S> {
    merchant: String,
    player: Player<D>,
    ledger: S,
}

impl<D: PlaybackDevice, S: DedupStore> Soundbox<D, S> {
    /// Creates a soundbox for payments to `merchant`
    pub fn new(merchant: impl Into<String>, player: Player<D>, ledger: S) -> Self {
        Self {
            merchant: merchant.into(),
            player,
            ledger,
        }
    }

    /// Ledger in use
    pub const fn ledger(&self) -> &S {
        &self.ledger
    }

    /// Player in use
    pub const fn player(&self) -> &Player<D> {
        &self.player
    }

    /// Filters, records and announces one event at `rate` rupees per ether
    ///
    /// The ledger is written before playback starts, so a crash mid
    /// announcement never replays the same transaction.
    ///
    /// # Errors
    /// Returns [`SoundboxError::Ledger`] if the hash cannot be recorded and
    /// [`SoundboxError::Playback`] if the device is not ready
    pub async fn handle(&mut self, event: &TxEvent, rate: f64) -> Result<Outcome, SoundboxError> {
        if let Some(reason) = self.screen(event) {
            debug!(hash = %event.hash, reason = ?reason, "transaction ignored");
            return Ok(Outcome::Ignored(reason));
        }

        let amount = match Amount::from_wei(event.value_wei, rate) {
            Ok(amount) => amount,
            Err(e) => {
                warn!(hash = %event.hash, wei = %event.value_wei, rate = %rate, error = %e, "cannot announce value");
                return Ok(Outcome::Ignored(IgnoreReason::Unconvertible));
            }
        };

        info!(
            hash = %event.hash,
            wei = %event.value_wei,
            rate = %rate,
            amount = %amount,
            "new confirmed transaction"
        );

        self.ledger.record(&event.hash, amount)?;
        let report = self.player.speak(amount).await?;

        Ok(Outcome::Announced { amount, report })
    }

    /// Checks whether an event should be ignored
    pub fn screen(&self, event: &TxEvent) -> Option<IgnoreReason> {
        if event.removed {
            return Some(IgnoreReason::Removed);
        }
        if !event.is_to(&self.merchant) {
            return Some(IgnoreReason::OtherRecipient);
        }
        if self
            .ledger
            .last()
            .is_some_and(|last| last.hash == event.hash)
        {
            return Some(IgnoreReason::Duplicate);
        }
        None
    }

    /// Announces the last recorded amount again
    ///
    /// Returns `None` when nothing has been recorded yet.
    ///
    /// # Errors
    /// Returns [`PlaybackError::DeviceUnavailable`] if the device is not ready
    pub async fn replay_last(&mut self) -> Result<Option<SpeakReport>, PlaybackError> {
        let Some(last) = self.ledger.last() else {
            info!("nothing to replay");
            return Ok(None);
        };

        info!(hash = %last.hash, amount = %last.amount, "replaying last transaction");
        self.player.speak(last.amount).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::announce::{Announcer, Pacing};
    use crate::audio::device::MockPlaybackDevice;
    use crate::audio::LogDevice;
    use crate::ledger::{MemoryLedger, MockDedupStore};

    const MERCHANT: &str = "0x7263B2E0D541206724a20f397296Bf43d86005F8";
    const ONE_ETHER: u128 = 1_000_000_000_000_000_000;

    fn event(hash: &str, to: &str, value_wei: u128) -> TxEvent {
        TxEvent {
            hash: hash.to_owned(),
            to: Some(to.to_owned()),
            value_wei,
            removed: false,
        }
    }

    fn soundbox() -> Soundbox<LogDevice, MemoryLedger> {
        let player = Player::new(Announcer::new(Pacing::immediate()), LogDevice::new());
        Soundbox::new(MERCHANT, player, MemoryLedger::new())
    }

    #[tokio::test]
    async fn test_announces_and_records() {
        let mut soundbox = soundbox();
        let tx = event("0x1", &MERCHANT.to_lowercase(), ONE_ETHER / 100);

        let outcome = soundbox.handle(&tx, 80_000.0).await.unwrap();

        // 0.01 ETH at 80000 = 800 rupees: 8 hundred rupees
        assert_eq!(
            outcome,
            Outcome::Announced {
                amount: Amount::new(800, 0).unwrap(),
                report: SpeakReport {
                    played: 3,
                    skipped: 0
                }
            }
        );
        assert_eq!(soundbox.ledger().last().unwrap().hash, "0x1");
        assert_eq!(soundbox.player().device().played(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_hash_announced_once() {
        let mut soundbox = soundbox();
        let tx = event("0x1", MERCHANT, ONE_ETHER);

        soundbox.handle(&tx, 100.0).await.unwrap();
        let played = soundbox.player().device().played();
        let second = soundbox.handle(&tx, 100.0).await.unwrap();

        assert_eq!(second, Outcome::Ignored(IgnoreReason::Duplicate));
        assert_eq!(soundbox.player().device().played(), played);
    }

    #[tokio::test]
    async fn test_ignores_other_recipients_and_removed() {
        let mut soundbox = soundbox();

        let other = event("0x1", "0x0000000000000000000000000000000000000001", ONE_ETHER);
        assert_eq!(
            soundbox.handle(&other, 100.0).await.unwrap(),
            Outcome::Ignored(IgnoreReason::OtherRecipient)
        );

        let mut removed = event("0x2", MERCHANT, ONE_ETHER);
        removed.removed = true;
        assert_eq!(
            soundbox.handle(&removed, 100.0).await.unwrap(),
            Outcome::Ignored(IgnoreReason::Removed)
        );

        assert_eq!(soundbox.ledger().last(), None);
    }

    #[tokio::test]
    async fn test_out_of_range_value_is_not_recorded() {
        let mut soundbox = soundbox();
        let whale = event("0x1", MERCHANT, ONE_ETHER * 1_000_000);

        let outcome = soundbox.handle(&whale, 80_000.0).await.unwrap();

        assert_eq!(outcome, Outcome::Ignored(IgnoreReason::Unconvertible));
        assert_eq!(soundbox.ledger().last(), None);
        assert_eq!(soundbox.player().device().played(), 0);
    }

    #[tokio::test]
    async fn test_ledger_failure_skips_playback() {
        let mut ledger = MockDedupStore::new();
        ledger.expect_last().return_const(None);
        ledger.expect_record().returning(|_, _| {
            Err(LedgerError::Io {
                path: "ledger.toml".to_owned(),
                source: std::io::Error::other("disk full"),
            })
        });
        let mut device = MockPlaybackDevice::new();
        device.expect_is_ready().never();
        device.expect_play().never();

        let player = Player::new(Announcer::new(Pacing::immediate()), device);
        let mut soundbox = Soundbox::new(MERCHANT, player, ledger);

        let result = soundbox.handle(&event("0x1", MERCHANT, ONE_ETHER), 1.0).await;
        assert!(matches!(result, Err(SoundboxError::Ledger(_))));
    }

    #[tokio::test]
    async fn test_unready_device_is_surfaced() {
        let mut device = MockPlaybackDevice::new();
        device.expect_is_ready().return_const(false);
        device.expect_play().never();

        let player = Player::new(Announcer::new(Pacing::immediate()), device);
        let mut soundbox = Soundbox::new(MERCHANT, player, MemoryLedger::new());

        let result = soundbox.handle(&event("0x1", MERCHANT, ONE_ETHER), 1.0).await;
        assert!(matches!(
            result,
            Err(SoundboxError::Playback(PlaybackError::DeviceUnavailable(_)))
        ));
    }

    #[tokio::test]
    async fn test_replay_last() {
        let mut soundbox = soundbox();
        assert_eq!(soundbox.replay_last().await.unwrap(), None);

        soundbox
            .handle(&event("0x1", MERCHANT, ONE_ETHER), 47.0)
            .await
            .unwrap();
        let report = soundbox.replay_last().await.unwrap().unwrap();

        // 47 rupees: 40 7 rupees
        assert_eq!(report.played, 3);
        assert_eq!(soundbox.player().device().played(), 6);
    }
}
