use axum::{
    Router,
    extract::{Path, Query, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::{Next, from_fn},
    response::Json,
    routing::{get, post},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use review_flow::{
    ApprovalOutcome, ConversationEngine, Document, DocumentAnalyzer, DocumentSource,
    DocumentStatus, FlowError, IngestOutcome, Patient, PatientRecord, QueueFilter, RawDocument,
    RecordType, ReviewQueue, ReviewTally,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info};
use uuid::Uuid;

use crate::{
    adapters::StubAnalyzer,
    config::ServiceConfig,
    models::{
        AnalyzeUploadRequest, AnswerRequest, IngestResponse, PatientQuery, PatientSummary,
        QueueQuery, RecordsQuery, RejectRequest, SessionResponse,
    },
    workflow::{build_assistant, create_document_source, load_review_queue},
};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

const CORRELATION_HEADER: &str = "x-correlation-id";

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn not_found_error(message: &str, id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": message,
            "id": id
        })),
    )
}

fn conflict_error(message: &str) -> ApiError {
    (StatusCode::CONFLICT, Json(json!({ "error": message })))
}

fn internal_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

fn flow_error(e: FlowError) -> ApiError {
    match &e {
        FlowError::NotFound { kind, id } => not_found_error(&format!("{} not found", kind), id),
        FlowError::InvalidState(_)
        | FlowError::InvalidTransition { .. }
        | FlowError::IngestConflict { .. } => conflict_error(&e.to_string()),
        FlowError::UnknownRecordType(_) | FlowError::InvalidInput(_) => {
            bad_request_error(&e.to_string())
        }
        FlowError::SourceError(details) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({
                "error": "Remote document source failed",
                "details": details
            })),
        ),
        _ => {
            error!("Request failed: {}", e);
            internal_error("Internal error", &e.to_string())
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub review: Arc<Mutex<ReviewQueue>>,
    pub assistant: Arc<ConversationEngine>,
    pub analyzer: Arc<dyn DocumentAnalyzer>,
    pub source: Option<Arc<dyn DocumentSource>>,
}

impl AppState {
    pub fn new(review: ReviewQueue, assistant: ConversationEngine) -> Self {
        Self {
            review: Arc::new(Mutex::new(review)),
            assistant: Arc::new(assistant),
            analyzer: Arc::new(StubAnalyzer),
            source: None,
        }
    }

    pub fn with_source(mut self, source: Option<Arc<dyn DocumentSource>>) -> Self {
        self.source = source;
        self
    }
}

pub async fn create_app(config: &ServiceConfig) -> anyhow::Result<Router> {
    let app_state = create_app_state(config).await?;
    Ok(build_router(app_state))
}

async fn create_app_state(config: &ServiceConfig) -> anyhow::Result<AppState> {
    let review = load_review_queue(config).await?;
    let assistant = build_assistant(config).await?;

    Ok(AppState::new(review, assistant).with_source(create_document_source(config)))
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/patients", get(list_patients))
        .route("/patients/{patient_id}", get(get_patient))
        .route("/patients/{patient_id}/records", get(get_patient_records))
        .route("/uploads", get(list_uploads).post(ingest_upload))
        .route("/uploads/analyze", post(analyze_upload))
        .route("/uploads/import", post(import_uploads))
        .route("/uploads/{document_id}", get(get_upload))
        .route("/uploads/{document_id}/approve", post(approve_upload))
        .route("/uploads/{document_id}/reject", post(reject_upload))
        .route("/review/tally", get(review_tally))
        .route("/assistant/sessions", post(start_session))
        .route(
            "/assistant/sessions/{session_id}",
            get(get_session).delete(delete_session),
        )
        .route("/assistant/sessions/{session_id}/answer", post(answer_session))
        .route("/assistant/sessions/{session_id}/restart", post(restart_session))
        .layer(from_fn(correlation_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Tag every request with a correlation id and run it inside a span carrying it
async fn correlation_id_middleware(
    mut request: Request<axum::body::Body>,
    next: Next,
) -> axum::response::Response {
    let correlation_id = Uuid::new_v4().to_string();
    let header = HeaderValue::from_str(&correlation_id).ok();

    if let Some(value) = &header {
        request.headers_mut().insert(CORRELATION_HEADER, value.clone());
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    let mut response = next.run(request).instrument(span).await;

    if let Some(value) = header {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Medical Document Review Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Document review queue with patient records and a guided architecture assistant",
        "endpoints": {
            "GET /patients?search=": "List or search patients",
            "GET /patients/{id}": "Patient details",
            "GET /patients/{id}/records?type=": "Approved records of a patient",
            "GET /uploads?status=": "List uploads (pending, approved, not-approved, all)",
            "POST /uploads": "Queue a document for review",
            "POST /uploads/analyze": "Analyze an uploaded file and queue it",
            "POST /uploads/import": "Import documents from the remote source",
            "GET /uploads/{id}": "One uploaded document",
            "POST /uploads/{id}/approve": "Approve a pending document",
            "POST /uploads/{id}/reject": "Reject a pending document",
            "GET /review/tally": "Decisions taken since startup",
            "POST /assistant/sessions": "Start a guided assistant session",
            "GET /assistant/sessions/{id}": "Session transcript and status",
            "POST /assistant/sessions/{id}/answer": "Answer the current question",
            "POST /assistant/sessions/{id}/restart": "Start the session over",
            "DELETE /assistant/sessions/{id}": "Drop a session",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn list_patients(
    State(state): State<AppState>,
    Query(query): Query<PatientQuery>,
) -> ApiResult<Vec<PatientSummary>> {
    let review = state.review.lock().await;
    let patients = review
        .search_patients(query.search.as_deref().unwrap_or_default())
        .into_iter()
        .map(|p| PatientSummary {
            id: p.id.clone(),
            name: p.name.clone(),
            birthdate: p.birthdate,
            approved_records: p
                .records
                .iter()
                .filter(|r| r.status == DocumentStatus::Approved)
                .count(),
        })
        .collect();
    Ok(Json(patients))
}

async fn get_patient(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
) -> ApiResult<Patient> {
    let review = state.review.lock().await;
    let patient = review.patient(&patient_id).map_err(flow_error)?;
    Ok(Json(patient.clone()))
}

async fn get_patient_records(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
    Query(query): Query<RecordsQuery>,
) -> ApiResult<Vec<PatientRecord>> {
    let record_type = query
        .record_type
        .as_deref()
        .map(str::parse::<RecordType>)
        .transpose()
        .map_err(flow_error)?;

    let review = state.review.lock().await;
    let patient = review.patient(&patient_id).map_err(flow_error)?;
    let records = match record_type {
        Some(record_type) => patient.approved_records(record_type).into_iter().cloned().collect(),
        None => patient
            .records
            .iter()
            .filter(|r| r.status == DocumentStatus::Approved)
            .cloned()
            .collect(),
    };
    Ok(Json(records))
}

async fn list_uploads(
    State(state): State<AppState>,
    Query(query): Query<QueueQuery>,
) -> ApiResult<Vec<Document>> {
    let filter = match query.status.as_deref() {
        Some(status) => status.parse::<QueueFilter>().map_err(flow_error)?,
        None => QueueFilter::All,
    };

    let review = state.review.lock().await;
    Ok(Json(review.list_queue(filter).into_iter().cloned().collect()))
}

async fn get_upload(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
) -> ApiResult<Document> {
    let review = state.review.lock().await;
    let document = review.document(&document_id).map_err(flow_error)?;
    Ok(Json(document.clone()))
}

fn ingest_response(document_id: String, outcome: IngestOutcome) -> IngestResponse {
    let detail = match &outcome {
        IngestOutcome::Discarded(conflict) => Some(conflict.to_string()),
        IngestOutcome::Decided { status, .. } => Some(format!("document is now {}", status)),
        IngestOutcome::Inserted(_) | IngestOutcome::Refreshed(_) => None,
    };
    IngestResponse {
        document_id,
        outcome: outcome.label().to_string(),
        detail,
    }
}

async fn ingest_upload(
    State(state): State<AppState>,
    Json(raw): Json<RawDocument>,
) -> ApiResult<IngestResponse> {
    validate_raw_document(&raw)?;
    info!("Ingesting document {} for patient {}", raw.id, raw.patient_id);

    let document_id = raw.id.clone();
    let outcome = state
        .review
        .lock()
        .await
        .ingest(raw)
        .await
        .map_err(flow_error)?;

    Ok(Json(ingest_response(document_id, outcome)))
}

fn validate_raw_document(raw: &RawDocument) -> Result<(), ApiError> {
    if raw.id.trim().is_empty() {
        return Err(bad_request_error("Document id is required"));
    }
    if raw.patient_id.trim().is_empty() {
        return Err(bad_request_error("Patient id is required"));
    }
    if raw.title.trim().is_empty() {
        return Err(bad_request_error("Document title is required"));
    }
    Ok(())
}

async fn analyze_upload(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeUploadRequest>,
) -> ApiResult<IngestResponse> {
    if request.file_name.trim().is_empty() {
        return Err(bad_request_error("File name is required"));
    }
    let bytes = STANDARD
        .decode(request.content_base64.as_bytes())
        .map_err(|_| bad_request_error("File content must be base64"))?;
    if bytes.is_empty() {
        return Err(bad_request_error("Uploaded file is empty"));
    }

    let patient = {
        let review = state.review.lock().await;
        review.patient(&request.patient_id).map_err(flow_error)?.clone()
    };

    let mut raw = state
        .analyzer
        .analyze(&patient.id, &request.file_name, &bytes)
        .await
        .map_err(flow_error)?;
    raw.patient_name = Some(patient.name);
    raw.birthdate = Some(patient.birthdate);

    let document_id = raw.id.clone();
    let outcome = state
        .review
        .lock()
        .await
        .ingest(raw)
        .await
        .map_err(flow_error)?;

    info!("Upload {} analyzed and queued as {}", request.file_name, document_id);
    Ok(Json(ingest_response(document_id, outcome)))
}

async fn import_uploads(State(state): State<AppState>) -> ApiResult<Vec<IngestResponse>> {
    let source = state
        .source
        .clone()
        .ok_or_else(|| bad_request_error("No remote document source configured"))?;

    let raws = source.fetch().await.map_err(flow_error)?;
    let ids: Vec<String> = raws.iter().map(|raw| raw.id.clone()).collect();

    let outcomes = state.review.lock().await.ingest_all(raws).await;
    let responses = ids
        .into_iter()
        .zip(outcomes)
        .map(|(document_id, outcome)| match outcome {
            Ok(outcome) => ingest_response(document_id, outcome),
            Err(e) => IngestResponse {
                document_id,
                outcome: "failed".to_string(),
                detail: Some(e.to_string()),
            },
        })
        .collect();

    Ok(Json(responses))
}

async fn approve_upload(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
) -> ApiResult<ApprovalOutcome> {
    info!("Approving document {}", document_id);

    let outcome = state
        .review
        .lock()
        .await
        .approve(&document_id)
        .await
        .map_err(flow_error)?;
    Ok(Json(outcome))
}

async fn reject_upload(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    body: Option<Json<RejectRequest>>,
) -> ApiResult<Value> {
    info!("Rejecting document {}", document_id);
    let feedback = body.and_then(|Json(request)| request.feedback);

    state
        .review
        .lock()
        .await
        .reject(&document_id, feedback)
        .await
        .map_err(flow_error)?;

    Ok(Json(json!({
        "document_id": document_id,
        "status": "not-approved"
    })))
}

async fn review_tally(State(state): State<AppState>) -> ApiResult<ReviewTally> {
    Ok(Json(state.review.lock().await.tally()))
}

async fn start_session(State(state): State<AppState>) -> ApiResult<SessionResponse> {
    let session = state.assistant.create().await;
    info!("Assistant session {} created", session.id);
    Ok(Json(SessionResponse::new(session, state.assistant.script())))
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<SessionResponse> {
    let session = state
        .assistant
        .snapshot(&session_id)
        .await
        .map_err(flow_error)?;
    Ok(Json(SessionResponse::new(session, state.assistant.script())))
}

async fn answer_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<AnswerRequest>,
) -> ApiResult<SessionResponse> {
    let turn = state
        .assistant
        .answer(&session_id, request.choice)
        .await
        .map_err(flow_error)?;

    if request.wait && !turn.finished().await {
        info!("Turn of session {} did not finish", session_id);
    }

    get_session(State(state), Path(session_id)).await
}

async fn restart_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<SessionResponse> {
    state
        .assistant
        .snapshot(&session_id)
        .await
        .map_err(flow_error)?;

    let session = state.assistant.start(&session_id).await;
    Ok(Json(SessionResponse::new(session, state.assistant.script())))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.assistant.remove(&session_id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found_error("Session not found", &session_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use review_flow::{
        KeyValueRecordStore, RecordStore, ScriptedExecutor, architecture_assistant,
    };
    use tower::ServiceExt;

    async fn test_state() -> AppState {
        let store: Arc<dyn RecordStore> = Arc::new(KeyValueRecordStore::in_memory());
        let review = ReviewQueue::load(store).await.unwrap();
        let assistant = ConversationEngine::new(
            architecture_assistant(),
            Arc::new(ScriptedExecutor::instant()),
        );
        AppState::new(review, assistant)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_root_describes_endpoints() {
        let app = build_router(test_state().await);
        let (status, body) = send(&app, "GET", "/", None).await;
        assert_eq!(status, StatusCode::OK);

        let endpoints = body["endpoints"].as_object().unwrap();
        assert_eq!(endpoints.len(), 17);
        assert!(endpoints.contains_key("GET /uploads/{id}"));
        assert!(endpoints.contains_key("DELETE /assistant/sessions/{id}"));
    }

    #[tokio::test]
    async fn test_health_and_correlation_header() {
        let app = build_router(test_state().await);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(CORRELATION_HEADER));
    }

    #[tokio::test]
    async fn test_approve_flow() {
        let app = build_router(test_state().await);

        let (status, pending) = send(&app, "GET", "/uploads?status=pending", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pending.as_array().unwrap().len(), 2);

        let (status, outcome) = send(&app, "POST", "/uploads/1/approve", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["record_appended"], true);

        let (status, _) = send(&app, "POST", "/uploads/1/approve", None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, pending) = send(&app, "GET", "/uploads?status=pending", None).await;
        assert_eq!(pending.as_array().unwrap().len(), 1);

        let (status, records) =
            send(&app, "GET", "/patients/PATIENT1/records?type=Lab", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(records[0]["title"], "Blood Test");

        let (_, tally) = send(&app, "GET", "/review/tally", None).await;
        assert_eq!(tally["approved"], 1);
        assert_eq!(tally["rejected"], 0);
    }

    #[tokio::test]
    async fn test_reject_stores_feedback() {
        let app = build_router(test_state().await);

        let (status, _) = send(
            &app,
            "POST",
            "/uploads/2/reject",
            Some(json!({ "feedback": "Image is blurry" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, document) = send(&app, "GET", "/uploads/2", None).await;
        assert_eq!(document["status"], "not-approved");
        assert_eq!(document["reviewFeedback"], "Image is blurry");

        let (_, rejected) = send(&app, "GET", "/uploads?status=not-approved", None).await;
        assert_eq!(rejected.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reject_without_body() {
        let app = build_router(test_state().await);

        let (status, body) = send(&app, "POST", "/uploads/2/reject", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "not-approved");

        let (_, document) = send(&app, "GET", "/uploads/2", None).await;
        assert_eq!(document["status"], "not-approved");
        assert!(document.get("reviewFeedback").is_none());

        let (_, tally) = send(&app, "GET", "/review/tally", None).await;
        assert_eq!(tally["rejected"], 1);
    }

    #[tokio::test]
    async fn test_unknown_ids_and_bad_input() {
        let app = build_router(test_state().await);

        let (status, body) = send(&app, "POST", "/uploads/404/approve", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["id"], "404");

        let (status, _) = send(&app, "GET", "/patients/NOPE", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&app, "GET", "/uploads?status=archived", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("archived"));

        let (status, _) = send(
            &app,
            "POST",
            "/uploads",
            Some(json!({
                "id": "9",
                "patientId": "PATIENT1",
                "title": "Teeth.png",
                "type": "Dental"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "POST", "/uploads/import", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_ingest_and_analyze() {
        let app = build_router(test_state().await);

        let (status, body) = send(
            &app,
            "POST",
            "/uploads",
            Some(json!({
                "id": "3",
                "patientId": "PATIENT1",
                "title": "Vaccination card.pdf",
                "type": "Vaccinations",
                "summary": "MMR booster"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "inserted");

        let (status, body) = send(
            &app,
            "POST",
            "/uploads/analyze",
            Some(json!({
                "patient_id": "PATIENT2",
                "file_name": "letter.txt",
                "content_base64": STANDARD.encode("Referral to cardiology")
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let id = body["document_id"].as_str().unwrap().to_string();

        let (_, document) = send(&app, "GET", &format!("/uploads/{}", id), None).await;
        assert_eq!(document["status"], "pending");
        assert_eq!(document["patientName"], "Erika Musterfrau");
        assert_eq!(document["fullText"], "Referral to cardiology");

        let (status, _) = send(
            &app,
            "POST",
            "/uploads/analyze",
            Some(json!({
                "patient_id": "PATIENT1",
                "file_name": "letter.txt",
                "content_base64": "%%%"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    struct FixedSource;

    #[async_trait]
    impl DocumentSource for FixedSource {
        async fn fetch(&self) -> review_flow::Result<Vec<RawDocument>> {
            Ok(serde_json::from_value(json!([
                { "id": "1", "patientId": "PATIENT1", "title": "Blood Test.pdf", "type": "Lab", "status": "approved" },
                { "id": "5", "patientId": "PATIENT2", "title": "Allergy list", "type": "Diagnoses" },
                { "id": "6", "patientId": "PATIENT2", "title": "Crown", "type": "Dental" }
            ]))
            .unwrap())
        }
    }

    #[tokio::test]
    async fn test_import_from_remote_source() {
        let state = test_state()
            .await
            .with_source(Some(Arc::new(FixedSource) as Arc<dyn DocumentSource>));
        let app = build_router(state);

        let (status, body) = send(&app, "POST", "/uploads/import", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["outcome"], "decided");
        assert_eq!(body[1]["outcome"], "inserted");
        assert_eq!(body[2]["outcome"], "failed");

        let (_, patient) = send(&app, "GET", "/patients/PATIENT1", None).await;
        assert_eq!(patient["records"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_patient_overview_counts_only_approved_records() {
        let store = KeyValueRecordStore::in_memory();
        let patients: Vec<Patient> = serde_json::from_value(json!([{
            "id": "P1",
            "name": "Max Mustermann",
            "birthdate": "1990-01-01",
            "address": "",
            "insurance": "AOK",
            "history": "",
            "records": [
                { "type": "Lab", "title": "Lipids", "date": "2025-01-10", "summary": "", "fullText": "", "status": "approved" },
                { "type": "Imaging", "title": "MRI", "date": "2025-02-01", "summary": "", "fullText": "", "status": "pending" }
            ]
        }]))
        .unwrap();
        store.save_patients(&patients).await.unwrap();

        let review = ReviewQueue::load(Arc::new(store)).await.unwrap();
        let assistant = ConversationEngine::new(
            architecture_assistant(),
            Arc::new(ScriptedExecutor::instant()),
        );
        let app = build_router(AppState::new(review, assistant));

        let (_, overview) = send(&app, "GET", "/patients", None).await;
        assert_eq!(overview[0]["approved_records"], 1);

        let (_, records) = send(&app, "GET", "/patients/P1/records", None).await;
        assert_eq!(records.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_patient_search() {
        let app = build_router(test_state().await);

        let (_, all) = send(&app, "GET", "/patients", None).await;
        assert_eq!(all.as_array().unwrap().len(), 2);

        let (_, found) = send(&app, "GET", "/patients?search=erika", None).await;
        assert_eq!(found.as_array().unwrap().len(), 1);
        assert_eq!(found[0]["id"], "PATIENT2");
    }

    #[tokio::test]
    async fn test_assistant_session_flow() {
        let app = build_router(test_state().await);

        let (status, session) = send(&app, "POST", "/assistant/sessions", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(session["awaiting_answer"], true);
        assert_eq!(session["total_steps"], 5);
        assert_eq!(session["transcript"].as_array().unwrap().len(), 1);
        let id = session["session_id"].as_str().unwrap().to_string();
        let answer_uri = format!("/assistant/sessions/{}/answer", id);

        let mut last = Value::Null;
        for choice in ["yes", "yes", "yes", "no", "yes"] {
            let (status, body) = send(
                &app,
                "POST",
                &answer_uri,
                Some(json!({ "choice": choice, "wait": true })),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            last = body;
        }

        assert_eq!(last["status"], "completed");
        assert_eq!(last["awaiting_answer"], false);
        assert_eq!(last["final_document"]["title"], "AWS Solution Architecture");
        assert!(last.get("choices").is_none());

        let (status, _) = send(&app, "POST", &answer_uri, Some(json!({ "choice": "yes" }))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, restarted) = send(
            &app,
            "POST",
            &format!("/assistant/sessions/{}/restart", id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(restarted["step_index"], 0);
        assert_eq!(restarted["choices"][1], "No");

        let (status, _) = send(&app, "DELETE", &format!("/assistant/sessions/{}", id), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "GET", &format!("/assistant/sessions/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
