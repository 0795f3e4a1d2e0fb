//! Integration tests for the SQLite storage layer.
//!
//! Checkpoints, ideas, arguments and maturity snapshots against an
//! in-memory database.

use socratic_engine::llm::ChatMessage;
use socratic_engine::model::{CognitiveModel, Proposition};
use socratic_engine::state::{NextStep, Stage, TurnState};
use socratic_engine::storage::{Argument, Idea, SqliteStorage, Storage};

/// Create an in-memory storage instance for testing
async fn create_test_storage() -> SqliteStorage {
    SqliteStorage::new_in_memory()
        .await
        .expect("Failed to create in-memory storage")
}

fn sample_state(session_id: &str, user_input: &str) -> TurnState {
    let mut state = TurnState::for_message(session_id, user_input);
    state.messages.push(ChatMessage::assistant("resposta"));
    state.next_step = Some(NextStep::Explore);
    state.cognitive_model.claim = user_input.to_string();
    state
}

mod checkpoint_tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_load_checkpoint() {
        let storage = create_test_storage().await;

        let state = sample_state("sess-1", "LLMs aumentam produtividade");
        storage.save_checkpoint("thread-1", &state).await.unwrap();

        let loaded = storage.load_checkpoint("thread-1").await.unwrap().unwrap();
        assert_eq!(loaded.session_id, "sess-1");
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.messages[0].content, "LLMs aumentam produtividade");
        assert_eq!(loaded.next_step, Some(NextStep::Explore));
        assert_eq!(loaded.cognitive_model.claim, "LLMs aumentam produtividade");
    }

    #[tokio::test]
    async fn test_load_unknown_thread_returns_none() {
        let storage = create_test_storage().await;
        let loaded = storage.load_checkpoint("nunca-existiu").await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_save_checkpoint_upserts() {
        let storage = create_test_storage().await;

        let state = sample_state("sess-1", "primeira");
        storage.save_checkpoint("thread-1", &state).await.unwrap();

        let mut newer = sample_state("sess-1", "segunda");
        newer.turn_count = 2;
        newer.current_stage = Stage::Validating;
        storage.save_checkpoint("thread-1", &newer).await.unwrap();

        let loaded = storage.load_checkpoint("thread-1").await.unwrap().unwrap();
        assert_eq!(loaded.turn_count, 2);
        assert_eq!(loaded.current_stage, Stage::Validating);
        assert_eq!(loaded.user_input, "segunda");
    }

    #[tokio::test]
    async fn test_threads_are_isolated() {
        let storage = create_test_storage().await;

        storage
            .save_checkpoint("thread-a", &sample_state("sess-a", "mensagem de A"))
            .await
            .unwrap();
        storage
            .save_checkpoint("thread-b", &sample_state("sess-b", "mensagem de B"))
            .await
            .unwrap();

        let a = storage.load_checkpoint("thread-a").await.unwrap().unwrap();
        let b = storage.load_checkpoint("thread-b").await.unwrap().unwrap();
        assert_eq!(a.user_input, "mensagem de A");
        assert_eq!(b.user_input, "mensagem de B");
    }
}

mod idea_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_get_idea() {
        let storage = create_test_storage().await;

        let idea = Idea::new("LLMs e produtividade").with_description("observação inicial");
        storage.create_idea(&idea).await.unwrap();

        let retrieved = storage.get_idea(&idea.id).await.unwrap().unwrap();
        assert_eq!(retrieved.title, "LLMs e produtividade");
        assert_eq!(retrieved.description.as_deref(), Some("observação inicial"));
        assert!(retrieved.thread_id.is_none());
    }

    #[tokio::test]
    async fn test_get_nonexistent_idea() {
        let storage = create_test_storage().await;
        assert!(storage.get_idea("nao-existe").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_idea_binds_thread() {
        let storage = create_test_storage().await;

        let mut idea = Idea::new("ideia");
        storage.create_idea(&idea).await.unwrap();

        idea.thread_id = Some("thread-42".to_string());
        storage.update_idea(&idea).await.unwrap();

        let retrieved = storage.get_idea(&idea.id).await.unwrap().unwrap();
        assert_eq!(retrieved.thread_id.as_deref(), Some("thread-42"));
    }

    #[tokio::test]
    async fn test_update_unknown_idea_fails() {
        let storage = create_test_storage().await;

        let idea = Idea::new("fantasma");
        let result = storage.update_idea(&idea).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_list_ideas_most_recent_first() {
        let storage = create_test_storage().await;

        let mut older = Idea::new("antiga");
        older.updated_at = older.updated_at - chrono::Duration::hours(1);
        storage.create_idea(&older).await.unwrap();

        let newer = Idea::new("recente");
        storage.create_idea(&newer).await.unwrap();

        let ideas = storage.list_ideas().await.unwrap();
        assert_eq!(ideas.len(), 2);
        assert_eq!(ideas[0].title, "recente");
        assert_eq!(ideas[1].title, "antiga");
    }
}

mod argument_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_list_arguments_in_order() {
        let storage = create_test_storage().await;

        let idea = Idea::new("ideia");
        storage.create_idea(&idea).await.unwrap();

        let mut first = Argument::new(&idea.id, "devs relatam ganho");
        first.created_at = first.created_at - chrono::Duration::minutes(5);
        storage.create_argument(&first).await.unwrap();

        let second = Argument::new(&idea.id, "estudos mostram 30%").with_solidity(0.7);
        storage.create_argument(&second).await.unwrap();

        let arguments = storage.get_arguments_by_idea(&idea.id).await.unwrap();
        assert_eq!(arguments.len(), 2);
        assert_eq!(arguments[0].text, "devs relatam ganho");
        assert!(arguments[0].solidity.is_none());
        assert_eq!(arguments[1].solidity, Some(0.7));
    }

    #[tokio::test]
    async fn test_arguments_scoped_to_idea() {
        let storage = create_test_storage().await;

        let idea_a = Idea::new("A");
        let idea_b = Idea::new("B");
        storage.create_idea(&idea_a).await.unwrap();
        storage.create_idea(&idea_b).await.unwrap();

        storage
            .create_argument(&Argument::new(&idea_a.id, "argumento de A"))
            .await
            .unwrap();

        assert_eq!(storage.get_arguments_by_idea(&idea_a.id).await.unwrap().len(), 1);
        assert!(storage.get_arguments_by_idea(&idea_b.id).await.unwrap().is_empty());
    }
}

mod snapshot_tests {
    use super::*;

    fn mature_model() -> CognitiveModel {
        CognitiveModel {
            claim: "LLMs aumentam produtividade".to_string(),
            propositions: vec![
                Proposition::new("estudos controlados mostram ganho").with_solidity(0.9),
                Proposition::new("métricas definidas").with_solidity(0.8),
            ],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_mature_model_creates_snapshot() {
        let storage = create_test_storage().await;

        let idea = Idea::new("ideia");
        storage.create_idea(&idea).await.unwrap();

        let snapshot_id = storage
            .create_snapshot_if_mature(&idea.id, &mature_model(), 0.8)
            .await
            .unwrap();
        assert!(snapshot_id.is_some());

        let snapshots = storage.get_snapshots_by_idea(&idea.id).await.unwrap();
        assert_eq!(snapshots.len(), 1);
        assert!((snapshots[0].maturity - 0.85).abs() < 1e-9);
        assert_eq!(
            snapshots[0].cognitive_model["claim"],
            "LLMs aumentam produtividade"
        );
    }

    #[tokio::test]
    async fn test_immature_model_is_not_snapshotted() {
        let storage = create_test_storage().await;

        let idea = Idea::new("ideia");
        storage.create_idea(&idea).await.unwrap();

        let model = CognitiveModel {
            propositions: vec![Proposition::new("palpite").with_solidity(0.3)],
            ..Default::default()
        };
        let snapshot_id = storage
            .create_snapshot_if_mature(&idea.id, &model, 0.8)
            .await
            .unwrap();

        assert!(snapshot_id.is_none());
        assert!(storage.get_snapshots_by_idea(&idea.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unevaluated_model_is_not_snapshotted() {
        let storage = create_test_storage().await;

        let idea = Idea::new("ideia");
        storage.create_idea(&idea).await.unwrap();

        let model = CognitiveModel {
            propositions: vec![Proposition::new("sem grau")],
            ..Default::default()
        };
        let snapshot_id = storage
            .create_snapshot_if_mature(&idea.id, &model, 0.8)
            .await
            .unwrap();
        assert!(snapshot_id.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_for_unknown_idea_fails() {
        let storage = create_test_storage().await;

        let result = storage
            .create_snapshot_if_mature("idea-fantasma", &mature_model(), 0.8)
            .await;
        assert!(result.is_err());
    }
}
