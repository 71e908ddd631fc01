pub mod adapters;
pub mod config;
pub mod models;
pub mod service;
pub mod workflow;

pub use config::{LogFormat, ServiceConfig};
pub use service::{AppState, build_router, create_app};
pub use workflow::{build_assistant, create_document_source, create_record_store, load_review_queue};
