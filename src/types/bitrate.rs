use std::{fmt::Display, str::FromStr};

use serde::Deserialize;

/// Audio bitrate selector, e.g. `192K`.
///
/// The textual form is what both external tools accept for their quality
/// and bitrate arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Bitrate(u16);

impl Default for Bitrate {
    fn default() -> Self {
        Self(192)
    }
}

impl FromStr for Bitrate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(num_prefix) = s.to_lowercase().strip_suffix('k') {
            num_prefix
                .parse()
                .map(Self)
                .map_err(|err| format!("Invalid bitrate '{s}': {err}"))
        } else {
            Err(format!("Bitrate '{s}' does not end with 'K'"))
        }
    }
}

impl TryFrom<String> for Bitrate {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl Display for Bitrate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}K", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_text() {
        let bitrate: Bitrate = "192K".parse().unwrap();
        assert_eq!(bitrate.to_string(), "192K");
        assert_eq!("128k".parse::<Bitrate>().unwrap().to_string(), "128K");
        assert!("192".parse::<Bitrate>().is_err());
        assert!("lots".parse::<Bitrate>().is_err());
    }
}
