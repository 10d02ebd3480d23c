use std::fmt;

/// Word clips that are not numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NamedClip {
    /// "point", separating rupees from paise
    Point,
    /// "hundred"
    Hundred,
    /// "thousand"
    Thousand,
    /// "lakh" (10^5)
    Lakh,
    /// "crore" (10^7)
    Crore,
    /// "rupees", closing every announcement
    Rupees,
}

impl NamedClip {
    /// Track index on the clip card
    pub const fn track(self) -> u16 {
        match self {
            Self::Point => 200,
            Self::Hundred => 201,
            Self::Thousand => 202,
            Self::Lakh => 203,
            Self::Crore => 204,
            Self::Rupees => 205,
        }
    }

    /// Spoken tag
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Point => "point",
            Self::Hundred => "hundred",
            Self::Thousand => "thousand",
            Self::Lakh => "lakh",
            Self::Crore => "crore",
            Self::Rupees => "rupees",
        }
    }
}

/// A single playable audio clip
///
/// `Number` holds 0-20 or a multiple of ten up to 90; the announcer never
/// builds any other value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Clip {
    /// Spoken number
    Number(u8),
    /// Spoken word
    Named(NamedClip),
}

impl Clip {
    /// Track index on the clip card (numbers are stored under their own value)
    pub fn track(self) -> u16 {
        match self {
            Self::Number(n) => u16::from(n),
            Self::Named(named) => named.track(),
        }
    }

    /// Clip stored under `track`, if it is part of the standard set
    pub fn from_track(track: u16) -> Option<Self> {
        let named = match track {
            200 => NamedClip::Point,
            201 => NamedClip::Hundred,
            202 => NamedClip::Thousand,
            203 => NamedClip::Lakh,
            204 => NamedClip::Crore,
            205 => NamedClip::Rupees,
            _ => {
                let clip = Self::Number(u8::try_from(track).ok()?);
                return clip.is_standard().then_some(clip);
            }
        };
        Some(Self::Named(named))
    }

    /// File name of the clip inside the clips directory
    pub fn file_name(self) -> String {
        format!("{:04}.wav", self.track())
    }

    /// Checks whether a clip for this value exists in the standard set
    pub const fn is_standard(self) -> bool {
        match self {
            Self::Number(n) => n <= 20 || (n < 100 && n % 10 == 0),
            Self::Named(_) => true,
        }
    }
}

impl fmt::Display for Clip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Named(named) => f.write_str(named.tag()),
        }
    }
}
