use chrono::NaiveDate;
use review_flow::{
    Choice, ConversationScript, ConversationSession, FinalDocument, SessionStatus,
    TranscriptEntry,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
pub struct QueueQuery {
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PatientQuery {
    pub search: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecordsQuery {
    #[serde(rename = "type")]
    pub record_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeUploadRequest {
    pub patient_id: String,
    pub file_name: String,
    /// File content, standard base64
    pub content_base64: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RejectRequest {
    pub feedback: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub choice: Choice,
    /// Block until the assistant has finished replying
    #[serde(default)]
    pub wait: bool,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub document_id: String,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub status: SessionStatus,
    pub step_index: usize,
    pub total_steps: usize,
    pub awaiting_answer: bool,
    /// Labels of the two answer buttons while awaiting an answer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices: Option<[String; 2]>,
    pub transcript: Vec<TranscriptEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_document: Option<FinalDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SessionResponse {
    pub fn new(session: ConversationSession, script: &ConversationScript) -> Self {
        let awaiting_answer = session.awaiting_answer();
        let choices = if awaiting_answer {
            script.steps().get(session.step_index).map(|step| {
                [
                    step.label(Choice::Yes).to_string(),
                    step.label(Choice::No).to_string(),
                ]
            })
        } else {
            None
        };

        Self {
            session_id: session.id,
            status: session.status,
            step_index: session.step_index,
            total_steps: script.steps().len(),
            awaiting_answer,
            choices,
            transcript: session.transcript,
            final_document: session.final_document,
            error: session.error,
        }
    }
}

/// Row of the patient overview
#[derive(Debug, Serialize)]
pub struct PatientSummary {
    pub id: String,
    pub name: String,
    pub birthdate: NaiveDate,
    pub approved_records: usize,
}
