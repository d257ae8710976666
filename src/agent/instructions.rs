// SynthNet Instruction Store
// Copyright (c) 2026 Xing_The_Creator | SynthNet
//
// Static priming text per (game, npc):
//   <root>/<Game>/<Npc>/system.txt
//   <root>/<Game>/<Npc>/user.txt

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{VoiceApiError, VoiceResult};
use crate::game::GameIdentity;

pub const SYSTEM_FILE: &str = "system.txt";
pub const USER_FILE: &str = "user.txt";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instruction {
    pub from_system: String,
    pub from_user: String,
}

/// Pure read-through lookup; nothing is cached.
#[derive(Debug, Clone)]
pub struct InstructionStore {
    root: PathBuf,
}

impl InstructionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn npc_dir(&self, identity: &GameIdentity) -> PathBuf {
        self.root
            .join(identity.game_name.as_str())
            .join(&identity.npc_name)
    }

    pub async fn get_system_instructions(&self, identity: &GameIdentity) -> VoiceResult<String> {
        self.read(identity, SYSTEM_FILE).await
    }

    pub async fn get_user_instructions(&self, identity: &GameIdentity) -> VoiceResult<String> {
        self.read(identity, USER_FILE).await
    }

    pub async fn get_instruction(&self, identity: &GameIdentity) -> VoiceResult<Instruction> {
        Ok(Instruction {
            from_system: self.get_system_instructions(identity).await?,
            from_user: self.get_user_instructions(identity).await?,
        })
    }

    async fn read(&self, identity: &GameIdentity, file: &str) -> VoiceResult<String> {
        let path = self.npc_dir(identity).join(file);
        debug!("[NPC] Reading instructions {:?}", path);
        let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
            VoiceApiError::from_io(e, format!("{} instructions for {}", file, identity))
        })?;
        Ok(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn seed(root: &Path, game: &str, npc: &str, system: &str, user: &str) {
        let dir = root.join(game).join(npc);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(SYSTEM_FILE), system).unwrap();
        std::fs::write(dir.join(USER_FILE), user).unwrap();
    }

    #[tokio::test]
    async fn test_instruction_combines_both_files() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), "Fallout4", "MamaMurphy", "You are Mama Murphy.\n", "Speak in riddles.");
        let store = InstructionStore::new(dir.path());
        let id = GameIdentity::new("Fallout4", "MamaMurphy").unwrap();

        let instruction = store.get_instruction(&id).await.unwrap();
        assert_eq!(instruction.from_system, store.get_system_instructions(&id).await.unwrap());
        assert_eq!(instruction.from_user, store.get_user_instructions(&id).await.unwrap());
        assert_eq!(instruction.from_system, "You are Mama Murphy.");
    }

    #[tokio::test]
    async fn test_missing_npc_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = InstructionStore::new(dir.path());
        let id = GameIdentity::new("GreenHell", "Jake").unwrap();
        let err = store.get_instruction(&id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_instruction_json_shape() {
        let i = Instruction {
            from_system: "s".into(),
            from_user: "u".into(),
        };
        let json = serde_json::to_value(&i).unwrap();
        assert_eq!(json["fromSystem"], "s");
        assert_eq!(json["fromUser"], "u");
    }
}
