use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Scheduling priority of a process, expressed as the coarse levels the
/// presentation layer offers rather than raw nice values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityLevel {
    Idle,
    BelowNormal,
    Normal,
    AboveNormal,
    High,
    Realtime,
}

impl PriorityLevel {
    /// Representative nice value for this level.
    pub fn to_nice(self) -> i32 {
        match self {
            PriorityLevel::Idle => 19,
            PriorityLevel::BelowNormal => 10,
            PriorityLevel::Normal => 0,
            PriorityLevel::AboveNormal => -7,
            PriorityLevel::High => -13,
            PriorityLevel::Realtime => -20,
        }
    }

    /// Buckets an observed nice value back into a level. The buckets are
    /// chosen so that `from_nice(to_nice(l)) == l` for every level.
    pub fn from_nice(nice: i32) -> Self {
        match nice {
            n if n >= 15 => PriorityLevel::Idle,
            n if n >= 5 => PriorityLevel::BelowNormal,
            n if n >= -2 => PriorityLevel::Normal,
            n if n >= -9 => PriorityLevel::AboveNormal,
            n if n >= -16 => PriorityLevel::High,
            _ => PriorityLevel::Realtime,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PriorityLevel::Idle => "Idle",
            PriorityLevel::BelowNormal => "Below Normal",
            PriorityLevel::Normal => "Normal",
            PriorityLevel::AboveNormal => "Above Normal",
            PriorityLevel::High => "High",
            PriorityLevel::Realtime => "Realtime",
        }
    }
}

impl Default for PriorityLevel {
    fn default() -> Self {
        PriorityLevel::Normal
    }
}

impl fmt::Display for PriorityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PriorityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_', ' '], "").as_str() {
            "idle" | "low" => Ok(PriorityLevel::Idle),
            "belownormal" => Ok(PriorityLevel::BelowNormal),
            "normal" => Ok(PriorityLevel::Normal),
            "abovenormal" => Ok(PriorityLevel::AboveNormal),
            "high" => Ok(PriorityLevel::High),
            "realtime" => Ok(PriorityLevel::Realtime),
            other => Err(format!("unknown priority level: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(PriorityLevel::Idle)]
    #[case(PriorityLevel::BelowNormal)]
    #[case(PriorityLevel::Normal)]
    #[case(PriorityLevel::AboveNormal)]
    #[case(PriorityLevel::High)]
    #[case(PriorityLevel::Realtime)]
    fn nice_round_trip(#[case] level: PriorityLevel) {
        assert_eq!(PriorityLevel::from_nice(level.to_nice()), level);
    }

    #[rstest]
    #[case("idle", PriorityLevel::Idle)]
    #[case("below-normal", PriorityLevel::BelowNormal)]
    #[case("Below Normal", PriorityLevel::BelowNormal)]
    #[case("NORMAL", PriorityLevel::Normal)]
    #[case("above_normal", PriorityLevel::AboveNormal)]
    #[case("high", PriorityLevel::High)]
    #[case("realtime", PriorityLevel::Realtime)]
    fn parses_user_input(#[case] input: &str, #[case] expected: PriorityLevel) {
        assert_eq!(input.parse::<PriorityLevel>().unwrap(), expected);
    }

    #[test]
    fn rejects_unknown_level() {
        assert!("turbo".parse::<PriorityLevel>().is_err());
    }

    #[test]
    fn every_observed_nice_maps_to_some_level() {
        for nice in -20..=19 {
            let _ = PriorityLevel::from_nice(nice);
        }
    }
}
