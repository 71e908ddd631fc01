use async_trait::async_trait;
use review_flow::{DocumentAnalyzer, DocumentSource, FlowError, RawDocument, Result};
use tracing::info;
use uuid::Uuid;

const MAX_EXTRACTED_CHARS: usize = 2000;

/// Stand-in for the document analysis service: derives the record type from the file
/// extension and uses the file's text (if it has any) as the full text.
pub struct StubAnalyzer;

impl StubAnalyzer {
    fn guess_record_type(file_name: &str) -> &'static str {
        let extension = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "jpg" | "jpeg" | "png" | "dcm" | "tif" | "tiff" => "Imaging",
            "csv" | "hl7" => "Lab",
            _ => "Doctor Letters",
        }
    }

    fn extract_text(bytes: &[u8]) -> String {
        match std::str::from_utf8(bytes) {
            Ok(text) => text.chars().take(MAX_EXTRACTED_CHARS).collect(),
            Err(_) => "Binary file, no text extracted.".to_string(),
        }
    }
}

#[async_trait]
impl DocumentAnalyzer for StubAnalyzer {
    async fn analyze(&self, patient_id: &str, file_name: &str, bytes: &[u8]) -> Result<RawDocument> {
        info!(
            "Analyzing upload {} ({} bytes) for patient {}",
            file_name,
            bytes.len(),
            patient_id
        );

        Ok(RawDocument {
            id: Uuid::new_v4().to_string(),
            patient_id: patient_id.to_string(),
            patient_name: None,
            birthdate: None,
            title: file_name.to_string(),
            record_type: Self::guess_record_type(file_name).to_string(),
            summary: format!(
                "Automatically generated summary of {} ({} bytes), pending review.",
                file_name,
                bytes.len()
            ),
            full_text: Self::extract_text(bytes),
            date: None,
            status: None,
        })
    }
}

/// Remote document source answering a GET with a JSON array of raw documents
pub struct HttpDocumentSource {
    client: reqwest::Client,
    url: String,
}

impl HttpDocumentSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl DocumentSource for HttpDocumentSource {
    async fn fetch(&self) -> Result<Vec<RawDocument>> {
        info!("Fetching documents from {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FlowError::SourceError(format!("request to {} failed: {}", self.url, e)))?;

        let documents: Vec<RawDocument> = response
            .json()
            .await
            .map_err(|e| FlowError::SourceError(format!("invalid document list: {}", e)))?;

        info!("Fetched {} documents from remote source", documents.len());
        Ok(documents)
    }
}
