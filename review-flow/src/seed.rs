//! Demo data written into an empty store on first load.

use chrono::NaiveDate;

use crate::models::{Document, DocumentStatus, Patient, RecordType};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}

pub fn patients() -> Vec<Patient> {
    vec![
        Patient {
            id: "PATIENT1".to_string(),
            name: "Max Mustermann".to_string(),
            birthdate: date(1990, 1, 1),
            address: "Musterstraße 1, 12345 Musterstadt".to_string(),
            insurance: "AOK".to_string(),
            history: "No pre-existing conditions.".to_string(),
            records: Vec::new(),
            changelog: Vec::new(),
        },
        Patient {
            id: "PATIENT2".to_string(),
            name: "Erika Musterfrau".to_string(),
            birthdate: date(1985, 5, 12),
            address: "Beispielweg 7, 54321 Beispielstadt".to_string(),
            insurance: "TK".to_string(),
            history: "Seasonal allergies.".to_string(),
            records: Vec::new(),
            changelog: Vec::new(),
        },
    ]
}

pub fn uploads() -> Vec<Document> {
    vec![
        Document {
            id: "1".to_string(),
            patient_id: "PATIENT1".to_string(),
            patient_name: Some("Max Mustermann".to_string()),
            birthdate: Some(date(1990, 1, 1)),
            title: "Blood Test.pdf".to_string(),
            record_type: RecordType::Lab,
            summary: "Leukocytes elevated, hemoglobin normal.".to_string(),
            full_text: "Leukocytes: 12,000/µl, Hemoglobin: 14 g/dl, ...".to_string(),
            date: date(2025, 7, 15),
            status: DocumentStatus::Pending,
            review_feedback: None,
        },
        Document {
            id: "2".to_string(),
            patient_id: "PATIENT2".to_string(),
            patient_name: Some("Erika Musterfrau".to_string()),
            birthdate: Some(date(1985, 5, 12)),
            title: "X-ray.jpg".to_string(),
            record_type: RecordType::Imaging,
            summary: "No abnormalities in the thorax.".to_string(),
            full_text: "Chest X-ray: Lungs unremarkable, heart size normal, ...".to_string(),
            date: date(2025, 7, 10),
            status: DocumentStatus::Pending,
            review_feedback: None,
        },
    ]
}
