//! ReviewQueue – the document approval state machine.
//!
//! Every upload starts out `pending` and moves exactly once, either to `approved` or to
//! `not-approved`. Both are terminal. Approving a document files an independent snapshot
//! of it into the owning patient's records and changelog.
//!
//! The queue owns the two persisted collections (`patients` and `uploads`) and writes them
//! back through its [`RecordStore`] after every mutation. Mutations are prepared on copies
//! and only committed in memory once the store accepted them, so a failed save leaves the
//! queue exactly as it was:
//!
//! ```rust,ignore
//! let store = Arc::new(KeyValueRecordStore::in_memory());
//! let mut queue = ReviewQueue::load(store).await?;
//! queue.approve("1").await?;
//! assert!(queue.active_queue().is_empty());
//! ```

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{
    error::{FlowError, Result},
    models::{ChangelogEntry, Document, DocumentStatus, Patient, QueueFilter, RawDocument},
    storage::RecordStore,
};

/// Source of "today" for changelog entries and undated uploads
pub type Today = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

const UPLOAD_ACTION: &str = "Upload";

/// Decisions taken during this process lifetime. Display only, never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReviewTally {
    pub approved: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalOutcome {
    pub document_id: String,
    pub patient_id: String,
    /// false when no patient matched the document's `patient_id`
    pub record_appended: bool,
}

/// How an incoming raw document was merged into the queue
#[derive(Debug)]
pub enum IngestOutcome {
    /// New id, queued as pending
    Inserted(String),
    /// Known pending document, summary and text refreshed
    Refreshed(String),
    /// Known pending document that the incoming record carried a decision for
    Decided { id: String, status: DocumentStatus },
    /// Known document already decided; the incoming record was dropped
    Discarded(FlowError),
}

impl IngestOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            IngestOutcome::Inserted(_) => "inserted",
            IngestOutcome::Refreshed(_) => "refreshed",
            IngestOutcome::Decided { .. } => "decided",
            IngestOutcome::Discarded(_) => "discarded",
        }
    }
}

pub struct ReviewQueue {
    store: Arc<dyn RecordStore>,
    documents: Vec<Document>,
    patients: Vec<Patient>,
    tally: ReviewTally,
    today: Today,
}

impl ReviewQueue {
    /// Load both collections from the store
    pub async fn load(store: Arc<dyn RecordStore>) -> Result<Self> {
        let patients = store.load_patients().await?;
        let documents = dedup_by_id(store.load_documents().await?);

        info!(
            "Loaded {} patients and {} uploads ({} pending)",
            patients.len(),
            documents.len(),
            documents
                .iter()
                .filter(|d| d.status == DocumentStatus::Pending)
                .count()
        );

        Ok(Self {
            store,
            documents,
            patients,
            tally: ReviewTally::default(),
            today: Arc::new(|| chrono::Local::now().date_naive()),
        })
    }

    /// Replace the clock used for changelog dates
    pub fn with_today<F>(mut self, today: F) -> Self
    where
        F: Fn() -> NaiveDate + Send + Sync + 'static,
    {
        self.today = Arc::new(today);
        self
    }

    /// Documents matching `filter`, in upload order
    pub fn list_queue(&self, filter: QueueFilter) -> Vec<&Document> {
        self.documents
            .iter()
            .filter(|d| filter.matches(d.status))
            .collect()
    }

    /// Documents still waiting for a decision
    pub fn active_queue(&self) -> Vec<&Document> {
        self.list_queue(QueueFilter::Pending)
    }

    pub fn document(&self, id: &str) -> Result<&Document> {
        self.documents
            .iter()
            .find(|d| d.id == id)
            .ok_or_else(|| FlowError::document_not_found(id))
    }

    pub fn patients(&self) -> &[Patient] {
        &self.patients
    }

    pub fn patient(&self, id: &str) -> Result<&Patient> {
        self.patients
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| FlowError::patient_not_found(id))
    }

    pub fn search_patients(&self, query: &str) -> Vec<&Patient> {
        self.patients.iter().filter(|p| p.matches(query)).collect()
    }

    pub fn tally(&self) -> ReviewTally {
        self.tally
    }

    /// pending -> approved, filing a snapshot into the owning patient's records
    pub async fn approve(&mut self, document_id: &str) -> Result<ApprovalOutcome> {
        let index = self.pending_index(document_id, DocumentStatus::Approved)?;
        let today = (self.today)();

        let mut documents = self.documents.clone();
        let mut patients = self.patients.clone();
        let record_appended = apply_approval(&mut documents[index], &mut patients, today);
        let patient_id = documents[index].patient_id.clone();

        self.commit(documents, Some(patients)).await?;
        self.tally.approved += 1;

        info!(
            document_id = %document_id,
            patient_id = %patient_id,
            record_appended,
            "Document approved"
        );

        Ok(ApprovalOutcome {
            document_id: document_id.to_string(),
            patient_id,
            record_appended,
        })
    }

    /// pending -> not-approved. The reviewer's feedback is kept on the document.
    pub async fn reject(&mut self, document_id: &str, feedback: Option<String>) -> Result<()> {
        let index = self.pending_index(document_id, DocumentStatus::NotApproved)?;

        let mut documents = self.documents.clone();
        apply_rejection(&mut documents[index], feedback);

        self.commit(documents, None).await?;
        self.tally.rejected += 1;

        info!(document_id = %document_id, "Document rejected");
        Ok(())
    }

    /// Merge one incoming document into the queue.
    ///
    /// A decided document is never reopened or overwritten. For a pending one, an
    /// incoming terminal status is applied through the regular transition.
    pub async fn ingest(&mut self, raw: RawDocument) -> Result<IngestOutcome> {
        let incoming_status = raw.status;
        let incoming = Document::from_raw(raw, (self.today)())?;

        let Some(index) = self.documents.iter().position(|d| d.id == incoming.id) else {
            let id = incoming.id.clone();
            let mut documents = self.documents.clone();
            documents.push(incoming);
            self.commit(documents, None).await?;

            info!(document_id = %id, "Document queued for review");
            return Ok(IngestOutcome::Inserted(id));
        };

        let existing = &self.documents[index];
        if existing.status.is_terminal() {
            let conflict = FlowError::IngestConflict {
                id: existing.id.clone(),
                existing: existing.status,
            };
            warn!("Discarding incoming document: {}", conflict);
            return Ok(IngestOutcome::Discarded(conflict));
        }

        let mut documents = self.documents.clone();
        let document = &mut documents[index];
        document.title = incoming.title;
        document.summary = incoming.summary;
        document.full_text = incoming.full_text;

        let id = document.id.clone();
        match incoming_status {
            Some(DocumentStatus::Approved) => {
                let mut patients = self.patients.clone();
                let today = (self.today)();
                apply_approval(document, &mut patients, today);
                self.commit(documents, Some(patients)).await?;

                info!(document_id = %id, "Incoming record approved pending document");
                Ok(IngestOutcome::Decided {
                    id,
                    status: DocumentStatus::Approved,
                })
            }
            Some(DocumentStatus::NotApproved) => {
                apply_rejection(document, None);
                self.commit(documents, None).await?;

                info!(document_id = %id, "Incoming record rejected pending document");
                Ok(IngestOutcome::Decided {
                    id,
                    status: DocumentStatus::NotApproved,
                })
            }
            Some(DocumentStatus::Pending) | None => {
                self.commit(documents, None).await?;
                Ok(IngestOutcome::Refreshed(id))
            }
        }
    }

    /// Merge a batch, e.g. from a remote source. Items are applied one by one;
    /// a failing item does not stop the rest.
    pub async fn ingest_all(&mut self, raws: Vec<RawDocument>) -> Vec<Result<IngestOutcome>> {
        let mut outcomes = Vec::with_capacity(raws.len());
        for raw in raws {
            let id = raw.id.clone();
            let outcome = self.ingest(raw).await;
            if let Err(e) = &outcome {
                warn!(document_id = %id, error = %e, "Failed to ingest document");
            }
            outcomes.push(outcome);
        }
        outcomes
    }

    fn pending_index(&self, document_id: &str, to: DocumentStatus) -> Result<usize> {
        let index = self
            .documents
            .iter()
            .position(|d| d.id == document_id)
            .ok_or_else(|| FlowError::document_not_found(document_id))?;

        let from = self.documents[index].status;
        if from.is_terminal() {
            return Err(FlowError::InvalidTransition {
                id: document_id.to_string(),
                from,
                to,
            });
        }
        Ok(index)
    }

    async fn commit(&mut self, documents: Vec<Document>, patients: Option<Vec<Patient>>) -> Result<()> {
        self.store.save_documents(&documents).await?;
        if let Some(patients) = &patients {
            if let Err(e) = self.store.save_patients(patients).await {
                warn!("Saving patients failed after uploads were saved: {}", e);
                // Best effort: put the previous uploads back so both collections agree
                if let Err(restore) = self.store.save_documents(&self.documents).await {
                    error!("Restoring uploads after failed patient save failed: {}", restore);
                }
                return Err(e);
            }
        }

        self.documents = documents;
        if let Some(patients) = patients {
            self.patients = patients;
        }
        Ok(())
    }
}

fn apply_approval(document: &mut Document, patients: &mut [Patient], today: NaiveDate) -> bool {
    document.status = DocumentStatus::Approved;

    let Some(patient) = patients.iter_mut().find(|p| p.id == document.patient_id) else {
        warn!(
            document_id = %document.id,
            patient_id = %document.patient_id,
            "No patient for approved document, record not filed"
        );
        return false;
    };

    patient.records.push(document.snapshot());
    patient.changelog.push(ChangelogEntry {
        date: today,
        action: UPLOAD_ACTION.to_string(),
        record_type: document.record_type,
        status: DocumentStatus::Approved,
    });
    true
}

fn apply_rejection(document: &mut Document, feedback: Option<String>) {
    document.status = DocumentStatus::NotApproved;
    document.review_feedback = feedback
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty());
}

fn dedup_by_id(documents: Vec<Document>) -> Vec<Document> {
    let mut seen = HashSet::new();
    documents
        .into_iter()
        .filter(|d| {
            let fresh = seen.insert(d.id.clone());
            if !fresh {
                warn!(document_id = %d.id, "Dropping stored upload with duplicate id");
            }
            fresh
        })
        .collect()
}
