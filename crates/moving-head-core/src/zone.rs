use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Calibration zone of a rig.
///
/// `Top` and `Bottom` hold captured rings, the two sides are derived from
/// them, and `Temp` is a scratch slot for one-off fits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    Top,
    #[serde(alias = "btm")]
    Bottom,
    #[serde(rename = "side_1", alias = "side1")]
    Side1,
    #[serde(rename = "side_2", alias = "side2")]
    Side2,
    Temp,
}

impl Zone {
    pub const ALL: [Zone; 5] = [Zone::Top, Zone::Bottom, Zone::Side1, Zone::Side2, Zone::Temp];
    pub const COUNT: usize = 5;

    /// Dense index into per-zone arrays.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Zone::Top => 0,
            Zone::Bottom => 1,
            Zone::Side1 => 2,
            Zone::Side2 => 3,
            Zone::Temp => 4,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Zone::Top => "top",
            Zone::Bottom => "bottom",
            Zone::Side1 => "side_1",
            Zone::Side2 => "side_2",
            Zone::Temp => "temp",
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown zone `{0}` (expected top, bottom, side_1, side_2 or temp)")]
pub struct ZoneParseError(pub String);

impl FromStr for Zone {
    type Err = ZoneParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "top" => Ok(Zone::Top),
            "bottom" | "btm" => Ok(Zone::Bottom),
            "side_1" | "side1" => Ok(Zone::Side1),
            "side_2" | "side2" => Ok(Zone::Side2),
            "temp" => Ok(Zone::Temp),
            _ => Err(ZoneParseError(s.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_legacy_aliases() {
        assert_eq!("top".parse::<Zone>(), Ok(Zone::Top));
        assert_eq!("btm".parse::<Zone>(), Ok(Zone::Bottom));
        assert_eq!("Side_2".parse::<Zone>(), Ok(Zone::Side2));
        assert_eq!(
            "middle".parse::<Zone>(),
            Err(ZoneParseError("middle".to_owned()))
        );
    }

    #[test]
    fn indices_are_dense() {
        for (i, zone) in Zone::ALL.iter().enumerate() {
            assert_eq!(zone.index(), i);
            assert_eq!(zone.as_str().parse::<Zone>(), Ok(*zone));
        }
    }

    #[test]
    fn serde_uses_snake_case_names() {
        let json = serde_json::to_string(&Zone::Side1).expect("serialize");
        assert_eq!(json, "\"side_1\"");
        let z: Zone = serde_json::from_str("\"btm\"").expect("alias");
        assert_eq!(z, Zone::Bottom);
    }
}
