use anyhow::Context as _;
use review_flow::{
    ConversationEngine, ConversationScript, DocumentSource, FileKeyValueStore,
    InMemoryKeyValueStore, KeyValueRecordStore, KeyValueStore, RecordStore, ReviewQueue,
    ScriptedExecutor, architecture_assistant,
};
use std::sync::Arc;
use tracing::info;

use crate::adapters::HttpDocumentSource;
use crate::config::ServiceConfig;

pub fn create_record_store(config: &ServiceConfig) -> Arc<dyn RecordStore> {
    let store: Arc<dyn KeyValueStore> = match &config.data_dir {
        Some(dir) => {
            info!("Using file-backed record store in {}", dir.display());
            Arc::new(FileKeyValueStore::new(dir))
        }
        None => {
            info!("Using in-memory record store (set DATA_DIR to persist)");
            Arc::new(InMemoryKeyValueStore::new())
        }
    };
    Arc::new(KeyValueRecordStore::new(store))
}

pub async fn load_review_queue(config: &ServiceConfig) -> anyhow::Result<ReviewQueue> {
    let store = create_record_store(config);
    ReviewQueue::load(store)
        .await
        .context("Failed to load patients and uploads")
}

pub async fn build_assistant(config: &ServiceConfig) -> anyhow::Result<ConversationEngine> {
    let script = match &config.script_path {
        Some(path) => ConversationScript::from_yaml_file(path)
            .await
            .with_context(|| format!("Failed to load assistant script {}", path.display()))?,
        None => architecture_assistant(),
    };

    info!(
        "Assistant script '{}' with {} steps, {:?} per reply",
        script.name(),
        script.steps().len(),
        config.step_delay
    );

    let executor = Arc::new(ScriptedExecutor::new(config.step_delay));
    Ok(ConversationEngine::new(script, executor)
        .with_retention(config.max_finished_sessions, config.session_idle_timeout))
}

pub fn create_document_source(config: &ServiceConfig) -> Option<Arc<dyn DocumentSource>> {
    config
        .remote_source_url
        .as_ref()
        .map(|url| Arc::new(HttpDocumentSource::new(url.clone())) as Arc<dyn DocumentSource>)
}
