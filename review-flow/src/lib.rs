pub mod conversation;
pub mod error;
pub mod executor;
pub mod models;
pub mod review;
pub mod script;
pub mod seed;
pub mod sources;
pub mod storage;

// Re-export commonly used types
pub use conversation::{
    Answers, Choice, ConversationEngine, ConversationSession, ConversationStep,
    DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_FINISHED_SESSIONS, SessionStatus, Speaker, TranscriptEntry,
    TurnHandle,
};
pub use error::{FlowError, Result};
pub use executor::{MessageRequest, ScriptedExecutor, StepExecutor};
pub use models::{
    ChangelogEntry, Document, DocumentStatus, Patient, PatientRecord, QueueFilter, RawDocument,
    RecordType,
};
pub use review::{ApprovalOutcome, IngestOutcome, ReviewQueue, ReviewTally};
pub use script::{ConversationScript, FinalDocument, architecture_assistant};
pub use sources::{DocumentAnalyzer, DocumentSource};
pub use storage::{
    FileKeyValueStore, InMemoryKeyValueStore, KeyValueRecordStore, KeyValueStore, RecordStore,
};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_blood_test_approval_scenario() {
        let store = Arc::new(KeyValueRecordStore::in_memory());
        store
            .save_patients(&[Patient {
                id: "P1".to_string(),
                name: "Max Mustermann".to_string(),
                birthdate: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
                address: String::new(),
                insurance: String::new(),
                history: String::new(),
                records: Vec::new(),
                changelog: Vec::new(),
            }])
            .await
            .unwrap();
        let documents: Vec<Document> = serde_json::from_value(serde_json::json!([{
            "id": "1",
            "patientId": "P1",
            "status": "pending",
            "type": "Lab",
            "title": "Blood Test.pdf",
            "summary": "",
            "fullText": "",
            "date": "2025-07-15"
        }]))
        .unwrap();
        store.save_documents(&documents).await.unwrap();

        let mut queue = ReviewQueue::load(store.clone()).await.unwrap();
        queue.approve("1").await.unwrap();

        assert!(queue.active_queue().is_empty());
        let patient = queue.patient("P1").unwrap();
        assert_eq!(patient.records.len(), 1);
        assert_eq!(patient.records[0].title, "Blood Test");
        assert_eq!(patient.records[0].status, DocumentStatus::Approved);

        // what was persisted matches what is in memory
        let persisted = store.load_patients().await.unwrap();
        assert_eq!(persisted[0], *patient);
    }

    #[tokio::test]
    async fn test_guided_conversation_end_to_end() {
        let engine = ConversationEngine::new(
            architecture_assistant(),
            Arc::new(ScriptedExecutor::instant()),
        );
        let session = engine.create().await;

        for choice in [Choice::Yes, Choice::No, Choice::No, Choice::Yes, Choice::No] {
            let turn = engine.answer(&session.id, choice).await.unwrap();
            assert!(turn.finished().await);
        }

        let session = engine.snapshot(&session.id).await.unwrap();
        assert!(session.is_completed());
        assert!(!session.awaiting_answer());

        // the WAF step only has a "yes" follow-up, so "no" adds none
        let steps = engine.script().steps();
        let waf_prompt = &steps[2].prompt;
        let after_waf: Vec<&TranscriptEntry> = session
            .transcript
            .iter()
            .skip_while(|e| &e.text != waf_prompt)
            .take(3)
            .collect();
        assert_eq!(after_waf[1].speaker, Speaker::User);
        assert_eq!(after_waf[2].text, steps[3].prompt);

        let last = session.transcript.last().unwrap();
        assert_eq!(last.speaker, Speaker::Ai);
        assert_eq!(last.text, executor::ANALYZING_MESSAGE);

        let document = session.final_document.unwrap();
        assert!(document.components.contains(&"Single-AZ deployment".to_string()));
    }
}
