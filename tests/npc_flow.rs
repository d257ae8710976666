mod common;

use std::sync::Arc;

use synthnet_voice::agent::core::PromptOptions;
use synthnet_voice::agent::npc::NpcStage;
use synthnet_voice::game::GameIdentity;
use synthnet_voice::VoiceApiError;

use common::Harness;

fn ask(question: &str, gpt: bool) -> PromptOptions {
    PromptOptions {
        question: question.to_string(),
        scribe: false,
        gpt,
    }
}

#[tokio::test]
async fn test_stage_walk_through_core() {
    let h = Harness::new(None);
    let core = &h.state.core;
    let piper = GameIdentity::new("Fallout4", "Piper").unwrap();

    assert_eq!(core.session_stage("s1").await, NpcStage::Unvalidated);

    let err = core.prompt("s1", piper.clone(), ask("Hi", true)).await.unwrap_err();
    assert!(matches!(err, VoiceApiError::InvalidState(_)));
    assert_eq!(core.session_stage("s1").await, NpcStage::Validated);

    let instruction = core.init_npc("s1", piper.clone()).await.unwrap();
    let system = core.services().instructions.get_system_instructions(&piper).await.unwrap();
    let user = core.services().instructions.get_user_instructions(&piper).await.unwrap();
    assert_eq!(instruction.from_system, system);
    assert_eq!(instruction.from_user, user);
    assert_eq!(core.session_stage("s1").await, NpcStage::Initialized);

    let reply = core.prompt("s1", piper.clone(), ask("Hi", true)).await.unwrap();
    assert_eq!(reply.text, "Welcome to Diamond City.");
    assert_eq!(core.session_stage("s1").await, NpcStage::Trained);

    // Training is not repeated: 5 turns, then +1 reply +1 question
    core.prompt("s1", piper, ask("Again", true)).await.unwrap();
    assert_eq!(
        h.chat.last_turns.load(std::sync::atomic::Ordering::SeqCst),
        7
    );
}

#[tokio::test]
async fn test_concurrent_npcs_do_not_share_context() {
    let h = Harness::new(None);
    let core = h.state.core.clone();

    let piper = GameIdentity::new("Fallout4", "Piper").unwrap();
    let mama = GameIdentity::new("Fallout4", "MamaMurphy").unwrap();
    core.init_npc(&piper.key(), piper.clone()).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..6 {
        let core = core.clone();
        let (id, gpt) = if i % 2 == 0 {
            (piper.clone(), true)
        } else {
            (mama.clone(), false)
        };
        handles.push(tokio::spawn(async move {
            core.prompt(&id.key(), id.clone(), ask("Status?", gpt)).await
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let script = handle.await.unwrap().unwrap();
        if i % 2 == 0 {
            assert_eq!(script.npc_name.as_deref(), Some("Piper"));
            assert_eq!(script.text, "Welcome to Diamond City.");
        } else {
            assert_eq!(script.npc_name.as_deref(), Some("MamaMurphy"));
            assert_eq!(script.text, "Your prepared question for MamaMurphy: Status?");
        }
    }

    assert_eq!(core.session_stage(&piper.key()).await, NpcStage::Trained);
    assert_eq!(core.session_stage(&mama.key()).await, NpcStage::Validated);
    assert_eq!(h.chat.calls(), 3);

    // Every render got its own file
    let files = std::fs::read_dir(h.settings.audio_dir.join("Fallout4").join("Piper"))
        .unwrap()
        .filter(|e| {
            e.as_ref()
                .map(|e| e.path().extension().map(|x| x == "wav").unwrap_or(false))
                .unwrap_or(false)
        })
        .count();
    assert_eq!(files, 3);
}

#[tokio::test]
async fn test_close_session_resets() {
    let h = Harness::new(None);
    let core = Arc::clone(&h.state.core);
    let piper = GameIdentity::new("Fallout4", "Piper").unwrap();

    core.init_npc("s", piper).await.unwrap();
    assert_eq!(core.session_stage("s").await, NpcStage::Initialized);
    assert!(core.close_session("s"));
    assert!(!core.close_session("s"));
    assert_eq!(core.session_stage("s").await, NpcStage::Unvalidated);
}

#[tokio::test]
async fn test_empty_question_reply() {
    let h = Harness::new(None);
    let piper = GameIdentity::new("Fallout4", "Piper").unwrap();
    let script = h.state.core.prompt("s", piper, ask("", true)).await.unwrap();
    assert_eq!(
        script.text,
        "You have not prepared any question for Piper. Set npcName, gameName and type in your question."
    );
    assert_eq!(h.chat.calls(), 0);
}
