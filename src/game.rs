// SynthNet Voice Game Identity
// Copyright (c) 2026 Xing_The_Creator | SynthNet

use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::VoiceApiError;

pub const DEFAULT_GAME: &str = "Fallout4";
pub const DEFAULT_NPC: &str = "MamaMurphy";

const MAX_NPC_NAME_LEN: usize = 64;

/// Games the service knows how to voice. `None` is the "no game selected" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GameName {
    Fallout4,
    GreenHell,
    None,
}

impl GameName {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameName::Fallout4 => "Fallout4",
            GameName::GreenHell => "GreenHell",
            GameName::None => "None",
        }
    }
}

impl fmt::Display for GameName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameName {
    type Err = VoiceApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fallout4" => Ok(GameName::Fallout4),
            "greenhell" => Ok(GameName::GreenHell),
            "none" => Ok(GameName::None),
            other => Err(VoiceApiError::InvalidArgument(format!(
                "unknown game '{}'",
                other
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for GameName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Returns false iff the game is empty, the NPC is empty, or the game is the `None` sentinel.
pub fn validate(game: &str, npc: &str) -> bool {
    if game.trim().is_empty() || npc.trim().is_empty() {
        return false;
    }
    !matches!(game.parse::<GameName>(), Ok(GameName::None))
}

/// Check an NPC name before it is ever used as a path component.
///
/// `_` is rejected because it separates fields in archived wave file names.
pub fn validate_npc_name(name: &str) -> Result<(), VoiceApiError> {
    if name.is_empty() {
        return Err(VoiceApiError::InvalidArgument(
            "NPC name cannot be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_NPC_NAME_LEN {
        return Err(VoiceApiError::InvalidArgument(format!(
            "NPC name longer than {} characters",
            MAX_NPC_NAME_LEN
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '-' || c == '\'')
    {
        return Err(VoiceApiError::InvalidArgument(format!(
            "NPC name '{}' contains invalid characters. Only letters, digits, space, hyphen and apostrophe are allowed.",
            name
        )));
    }
    Ok(())
}

/// A validated (game, npc) pair. Safe to turn into file-system paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameIdentity {
    pub game_name: GameName,
    pub npc_name: String,
}

impl GameIdentity {
    pub fn new(game: &str, npc: &str) -> Result<Self, VoiceApiError> {
        if !validate(game, npc) {
            return Err(VoiceApiError::InvalidArgument(format!(
                "gameName '{}' / npcName '{}' rejected",
                game, npc
            )));
        }
        let game_name = game.parse::<GameName>()?;
        let npc_name = npc.trim().to_string();
        validate_npc_name(&npc_name)?;
        Ok(Self {
            game_name,
            npc_name,
        })
    }

    /// Key used for per-(game, npc) sessions and directory locks.
    pub fn key(&self) -> String {
        format!("{}/{}", self.game_name, self.npc_name)
    }
}

impl fmt::Display for GameIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.npc_name, self.game_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rules() {
        assert!(validate("Fallout4", "MamaMurphy"));
        assert!(validate("greenhell", "Jake"));
        // Unknown games still pass validate; they fail at parse time
        assert!(validate("Skyrim", "Lydia"));

        assert!(!validate("", "MamaMurphy"));
        assert!(!validate("Fallout4", ""));
        assert!(!validate("   ", "MamaMurphy"));
        assert!(!validate("None", "MamaMurphy"));
        assert!(!validate("none", "MamaMurphy"));
    }

    #[test]
    fn test_game_parse_is_case_insensitive() {
        assert_eq!("FALLOUT4".parse::<GameName>().unwrap(), GameName::Fallout4);
        assert_eq!("GreenHell".parse::<GameName>().unwrap(), GameName::GreenHell);
        assert!("Skyrim".parse::<GameName>().is_err());
    }

    #[test]
    fn test_identity_rejects_path_traversal() {
        assert!(GameIdentity::new("Fallout4", "../../etc/passwd").is_err());
        assert!(GameIdentity::new("Fallout4", "Mama/Murphy").is_err());
        assert!(GameIdentity::new("Fallout4", "Mama_Murphy").is_err());
        assert!(GameIdentity::new("Fallout4", "..").is_err());
    }

    #[test]
    fn test_identity_accepts_plain_names() {
        let id = GameIdentity::new("fallout4", "  Piper Wright ").unwrap();
        assert_eq!(id.game_name, GameName::Fallout4);
        assert_eq!(id.npc_name, "Piper Wright");
        assert_eq!(id.key(), "Fallout4/Piper Wright");
        assert!(GameIdentity::new("Fallout4", "Nick-Valentine").is_ok());
    }

    #[test]
    fn test_identity_rejects_unknown_game() {
        let err = GameIdentity::new("Skyrim", "Lydia").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_game_name_deserializes_case_insensitively() {
        let game: GameName = serde_json::from_str(r#""greenhell""#).unwrap();
        assert_eq!(game, GameName::GreenHell);
        assert!(serde_json::from_str::<GameName>(r#""Skyrim""#).is_err());
        assert_eq!(serde_json::to_string(&GameName::Fallout4).unwrap(), r#""Fallout4""#);
    }
}
