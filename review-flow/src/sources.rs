use async_trait::async_trait;

use crate::{error::Result, models::RawDocument};

/// External system documents can be imported from in bulk
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<RawDocument>>;
}

/// Turns an uploaded file into a structured document ready for review
#[async_trait]
pub trait DocumentAnalyzer: Send + Sync {
    async fn analyze(&self, patient_id: &str, file_name: &str, bytes: &[u8]) -> Result<RawDocument>;
}
