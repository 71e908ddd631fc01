use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{FlowError, Result};

/// Review status of an uploaded document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentStatus {
    Pending,
    Approved,
    NotApproved,
}

impl DocumentStatus {
    /// `approved` and `not-approved` never transition again
    pub fn is_terminal(self) -> bool {
        !matches!(self, DocumentStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Approved => "approved",
            DocumentStatus::NotApproved => "not-approved",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed set of record categories a patient file is organised by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    Lab,
    Imaging,
    #[serde(rename = "Doctor Letters")]
    DoctorLetters,
    Medication,
    Diagnoses,
    Vaccinations,
}

impl RecordType {
    pub const ALL: [RecordType; 6] = [
        RecordType::Lab,
        RecordType::Imaging,
        RecordType::DoctorLetters,
        RecordType::Medication,
        RecordType::Diagnoses,
        RecordType::Vaccinations,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::Lab => "Lab",
            RecordType::Imaging => "Imaging",
            RecordType::DoctorLetters => "Doctor Letters",
            RecordType::Medication => "Medication",
            RecordType::Diagnoses => "Diagnoses",
            RecordType::Vaccinations => "Vaccinations",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        RecordType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| FlowError::UnknownRecordType(s.to_string()))
    }
}

/// Filter accepted by [`crate::ReviewQueue::list_queue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueFilter {
    Pending,
    Approved,
    NotApproved,
    #[default]
    All,
}

impl QueueFilter {
    pub fn matches(self, status: DocumentStatus) -> bool {
        match self {
            QueueFilter::All => true,
            QueueFilter::Pending => status == DocumentStatus::Pending,
            QueueFilter::Approved => status == DocumentStatus::Approved,
            QueueFilter::NotApproved => status == DocumentStatus::NotApproved,
        }
    }
}

impl FromStr for QueueFilter {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(QueueFilter::Pending),
            "approved" => Ok(QueueFilter::Approved),
            "not-approved" | "not_approved" | "rejected" => Ok(QueueFilter::NotApproved),
            "all" | "" => Ok(QueueFilter::All),
            other => Err(FlowError::InvalidInput(format!(
                "unknown queue filter '{}'",
                other
            ))),
        }
    }
}

/// An uploaded document waiting for, or carrying, a review decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub patient_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthdate: Option<NaiveDate>,
    pub title: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub summary: String,
    pub full_text: String,
    pub date: NaiveDate,
    pub status: DocumentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_feedback: Option<String>,
}

impl Document {
    /// Build a pending document from an incoming raw record. Documents
    /// without a date are stamped with `today`.
    pub fn from_raw(raw: RawDocument, today: NaiveDate) -> Result<Self> {
        let record_type = raw.record_type.parse::<RecordType>()?;
        Ok(Self {
            id: raw.id,
            patient_id: raw.patient_id,
            patient_name: raw.patient_name,
            birthdate: raw.birthdate,
            title: raw.title,
            record_type,
            summary: raw.summary,
            full_text: raw.full_text,
            date: raw.date.unwrap_or(today),
            status: DocumentStatus::Pending,
            review_feedback: None,
        })
    }

    /// Copy of this document as it is filed into the patient's records
    pub fn snapshot(&self) -> PatientRecord {
        PatientRecord {
            record_type: self.record_type,
            title: strip_extension(&self.title).to_string(),
            date: self.date,
            summary: self.summary.clone(),
            full_text: self.full_text.clone(),
            status: DocumentStatus::Approved,
        }
    }
}

/// Document as produced by an upload analyzer or a remote source, before
/// its record type has been validated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDocument {
    pub id: String,
    pub patient_id: String,
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub birthdate: Option<NaiveDate>,
    pub title: String,
    #[serde(rename = "type")]
    pub record_type: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub full_text: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub status: Option<DocumentStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: String,
    pub name: String,
    pub birthdate: NaiveDate,
    pub address: String,
    pub insurance: String,
    pub history: String,
    #[serde(default)]
    pub records: Vec<PatientRecord>,
    #[serde(default)]
    pub changelog: Vec<ChangelogEntry>,
}

impl Patient {
    /// Approved records of one category, in filing order
    pub fn approved_records(&self, record_type: RecordType) -> Vec<&PatientRecord> {
        self.records
            .iter()
            .filter(|r| r.record_type == record_type && r.status == DocumentStatus::Approved)
            .collect()
    }

    /// Dashboard search: case-insensitive name match or birthdate substring
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim();
        if query.is_empty() {
            return true;
        }
        self.name.to_lowercase().contains(&query.to_lowercase())
            || self.birthdate.to_string().contains(query)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRecord {
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub title: String,
    pub date: NaiveDate,
    pub summary: String,
    pub full_text: String,
    pub status: DocumentStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangelogEntry {
    pub date: NaiveDate,
    pub action: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub status: DocumentStatus,
}

/// "Blood Test.pdf" -> "Blood Test". Titles without an alphanumeric
/// suffix after the last dot are returned unchanged.
pub fn strip_extension(title: &str) -> &str {
    match title.rsplit_once('.') {
        Some((stem, ext))
            if !stem.trim().is_empty()
                && !ext.is_empty()
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            stem
        }
        _ => title,
    }
}
