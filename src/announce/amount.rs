use std::fmt;
use thiserror::Error;

/// Largest announceable major value (exclusive): 99 crore and change
pub const MAJOR_LIMIT: u64 = 1_000_000_000;

const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;

/// Errors raised while building or rendering an amount
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnnounceError {
    /// Amount is negative, has paise outside 0-99, or exceeds the crore range
    #[error("invalid amount: major={major}, minor={minor}")]
    InvalidAmount {
        /// Major unit as supplied
        major: i128,
        /// Minor unit as supplied
        minor: i128,
    },
}

/// Non-negative rupee amount split into rupees and paise
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount {
    major: u64,
    minor: u8,
}

impl Amount {
    /// Zero rupees
    pub const ZERO: Self = Self { major: 0, minor: 0 };

    /// Creates an amount from rupees and paise
    ///
    /// # Errors
    /// Returns [`AnnounceError::InvalidAmount`] if either part is negative,
    /// `minor > 99`, or `major >= 10^9`
    pub fn new(major: i64, minor: i64) -> Result<Self, AnnounceError> {
        let invalid = || AnnounceError::InvalidAmount {
            major: i128::from(major),
            minor: i128::from(minor),
        };

        let major_u = u64::try_from(major).map_err(|_| invalid())?;
        let minor_u = u8::try_from(minor).map_err(|_| invalid())?;
        if minor_u > 99 || major_u >= MAJOR_LIMIT {
            return Err(invalid());
        }

        Ok(Self {
            major: major_u,
            minor: minor_u,
        })
    }

    /// Creates an amount from a total count of paise
    ///
    /// # Errors
    /// Returns [`AnnounceError::InvalidAmount`] if the rupee part is `>= 10^9`
    pub fn from_paise(paise: u128) -> Result<Self, AnnounceError> {
        let major = paise / 100;
        // Always < 100, so the cast cannot truncate
        #[allow(clippy::cast_possible_truncation)]
        let minor = (paise % 100) as u8;

        match u64::try_from(major) {
            Ok(major) if major < MAJOR_LIMIT => Ok(Self { major, minor }),
            _ => Err(AnnounceError::InvalidAmount {
                major: i128::try_from(major).unwrap_or(i128::MAX),
                minor: i128::from(minor),
            }),
        }
    }

    /// Converts a wei value into rupees at `rate` rupees per ether
    ///
    /// The rate is rounded to whole paise and the product truncated, so
    /// fractions of a paisa are dropped rather than rounded up.
    ///
    /// # Errors
    /// Returns [`AnnounceError::InvalidAmount`] for a negative or non-finite
    /// rate, or when the converted amount is out of range
    pub fn from_wei(wei: u128, rate: f64) -> Result<Self, AnnounceError> {
        if !rate.is_finite() || rate < 0.0 {
            return Err(AnnounceError::InvalidAmount {
                major: -1,
                minor: 0,
            });
        }

        // rate is finite, non-negative and far below u128::MAX for any real price
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let rate_paise = (rate * 100.0).round() as u128;

        let total_paise = wei
            .checked_mul(rate_paise)
            .map(|scaled| scaled / WEI_PER_ETHER)
            .ok_or(AnnounceError::InvalidAmount {
                major: i128::MAX,
                minor: 0,
            })?;

        Self::from_paise(total_paise)
    }

    /// Rupee part
    pub const fn major(&self) -> u64 {
        self.major
    }

    /// Paise part, always 0-99
    pub const fn minor(&self) -> u8 {
        self.minor
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.major, self.minor)
    }
}
