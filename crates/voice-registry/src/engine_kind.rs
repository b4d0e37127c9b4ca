use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The three TTS engines this gateway can dispatch to (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Piper,
    Kokoro,
    Zonos,
}

impl EngineKind {
    pub const ALL: [EngineKind; 3] = [EngineKind::Piper, EngineKind::Kokoro, EngineKind::Zonos];

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Piper => "piper",
            EngineKind::Kokoro => "kokoro",
            EngineKind::Zonos => "zonos",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "piper" => Ok(EngineKind::Piper),
            "kokoro" => Ok(EngineKind::Kokoro),
            "zonos" => Ok(EngineKind::Zonos),
            other => Err(format!("unknown engine kind: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_str() {
        for kind in EngineKind::ALL {
            let s = kind.as_str();
            assert_eq!(EngineKind::from_str(s).unwrap(), kind);
        }
    }

    #[test]
    fn from_str_is_case_insensitive() {
        assert_eq!(EngineKind::from_str("PIPER").unwrap(), EngineKind::Piper);
    }

    #[test]
    fn from_str_rejects_unknown() {
        assert!(EngineKind::from_str("festival").is_err());
    }
}
