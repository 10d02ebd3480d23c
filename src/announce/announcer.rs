use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::amount::{Amount, AnnounceError};
use super::clip::{Clip, NamedClip};

/// Named magnitudes of the Indian numbering system, above units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceValueGroup {
    /// 10^7
    Crore,
    /// 10^5
    Lakh,
    /// 10^3
    Thousand,
    /// 10^2
    Hundred,
}

impl PlaceValueGroup {
    /// Groups in the order they are consumed, most significant first
    pub const DESCENDING: [Self; 4] = [Self::Crore, Self::Lakh, Self::Thousand, Self::Hundred];

    /// Value of one unit of this group
    pub const fn divisor(self) -> u64 {
        match self {
            Self::Crore => 10_000_000,
            Self::Lakh => 100_000,
            Self::Thousand => 1_000,
            Self::Hundred => 100,
        }
    }

    /// Clip spoken after the group's count
    pub const fn clip(self) -> NamedClip {
        match self {
            Self::Crore => NamedClip::Crore,
            Self::Lakh => NamedClip::Lakh,
            Self::Thousand => NamedClip::Thousand,
            Self::Hundred => NamedClip::Hundred,
        }
    }
}

/// One clip to play, followed by a hold before the next one may start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackCommand {
    /// Clip to submit to the device
    pub clip: Clip,
    /// Wait after submitting the clip
    pub hold: Duration,
}

/// Hold durations applied after each clip
///
/// Devices give no completion signal, so each clip is followed by a fixed
/// wait. `overrides` lets a single clip carry its own length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pacing {
    /// Hold after a number clip
    pub number_hold: Duration,
    /// Hold after a word clip
    pub named_hold: Duration,
    /// Extra hold after the last clip of the units or paise section
    pub section_gap: Duration,
    /// Per-clip replacement for `number_hold` / `named_hold`
    pub overrides: HashMap<Clip, Duration>,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            number_hold: Duration::from_millis(800),
            named_hold: Duration::from_millis(1000),
            section_gap: Duration::from_millis(1000),
            overrides: HashMap::new(),
        }
    }
}

impl Pacing {
    /// Pacing with no holds at all, for tests and dry runs
    pub fn immediate() -> Self {
        Self {
            number_hold: Duration::ZERO,
            named_hold: Duration::ZERO,
            section_gap: Duration::ZERO,
            overrides: HashMap::new(),
        }
    }

    fn hold_for(&self, clip: Clip) -> Duration {
        if let Some(hold) = self.overrides.get(&clip) {
            return *hold;
        }
        match clip {
            Clip::Number(_) => self.number_hold,
            Clip::Named(_) => self.named_hold,
        }
    }
}

/// Renders amounts into ordered clip sequences
///
/// Stateless apart from its pacing table; the same amount always yields the
/// same commands.
#[derive(Debug, Clone, Default)]
pub struct Announcer {
    pacing: Pacing,
}

impl Announcer {
    /// Creates an announcer with the given pacing
    pub const fn new(pacing: Pacing) -> Self {
        Self { pacing }
    }

    /// Renders a validated amount
    pub fn announce(&self, amount: Amount) -> Vec<PlaybackCommand> {
        let mut commands = Vec::new();
        let mut major = amount.major();

        for group in PlaceValueGroup::DESCENDING {
            let divisor = group.divisor();
            if major >= divisor {
                self.number_sound(major / divisor, &mut commands);
                self.push(Clip::Named(group.clip()), &mut commands);
                major %= divisor;
            }
        }

        if major > 0 {
            self.number_sound(major, &mut commands);
            self.end_section(&mut commands);
        }

        if amount.minor() > 0 {
            self.push(Clip::Named(NamedClip::Point), &mut commands);
            self.number_sound(u64::from(amount.minor()), &mut commands);
            self.end_section(&mut commands);
        }

        self.push(Clip::Named(NamedClip::Rupees), &mut commands);

        debug!(
            amount = %amount,
            clips = commands.len(),
            "amount rendered"
        );

        commands
    }

    /// Validates raw parts and renders them
    ///
    /// # Errors
    /// Returns [`AnnounceError::InvalidAmount`] if the parts are out of range;
    /// nothing is rendered in that case
    pub fn announce_parts(
        &self,
        major: i64,
        minor: i64,
    ) -> Result<Vec<PlaybackCommand>, AnnounceError> {
        let amount = Amount::new(major, minor)?;
        Ok(self.announce(amount))
    }

    /// Speaks 0-99: 0-20 are single clips, the rest are tens then ones
    fn number_sound(&self, n: u64, commands: &mut Vec<PlaybackCommand>) {
        // Callers strip every magnitude of 100 and above first
        debug_assert!(n < 100, "number_sound called with {n}");
        let n = u8::try_from(n.min(99)).unwrap_or(99);

        if n <= 20 {
            self.push(Clip::Number(n), commands);
            return;
        }

        self.push(Clip::Number(n / 10 * 10), commands);
        if n % 10 != 0 {
            self.push(Clip::Number(n % 10), commands);
        }
    }

    fn push(&self, clip: Clip, commands: &mut Vec<PlaybackCommand>) {
        commands.push(PlaybackCommand {
            clip,
            hold: self.pacing.hold_for(clip),
        });
    }

    fn end_section(&self, commands: &mut [PlaybackCommand]) {
        if let Some(last) = commands.last_mut() {
            last.hold += self.pacing.section_gap;
        }
    }
}
