//! Provider wire tests
//!
//! HTTP clients exercised against a local mock server. Tests cover:
//! - Chat completion streaming and authentication
//! - Presentation envelopes, token issuance and stream error answers
//! - Recognition submit/poll, legacy endpoint fallback and failures
//! - Word documents read directly or rendered to PDF before recognition
//! - Per-call bounds on request/response calls, not on event streams
//! - Configuration checks that fail before any request is sent

use std::io::{Cursor, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use genconductor::backend::{
    ChatBackend, ChatCompletionClient, ChatRequest, DirectPptxRequest, Doc2xClient,
    Doc2xRecognizer, DocmeeClient, DocumentRecognizer, OutlineRequest, PptInfo, PptxRequest,
    PresentationBackend,
};
use genconductor::streaming::{ChatDeltaDecoder, PresentationDecoder, ResultSlot};
use genconductor::{
    AsyncTaskPoller, AsyncTaskProvider, ErrorKind, GenerationError, ManualClock, MapConfig,
    MemoryFileStore, PollPolicy, ResultMode, SourceDocument, StreamingConsumer, TaskHandle,
    TokenBroker,
};

const SSE: &str = "text/event-stream";

fn chat_client(server: &MockServer, key: &str) -> ChatCompletionClient {
    let config = MapConfig::new()
        .with("chat.url", format!("{}/chat/completions", server.uri()))
        .with("chat.key", key);
    ChatCompletionClient::new(Arc::new(config)).unwrap()
}

fn docmee_client(server: &MockServer) -> DocmeeClient {
    let config = MapConfig::new()
        .with("docmee.url", server.uri())
        .with("docmee.key", "secret-key");
    DocmeeClient::new(Arc::new(config)).unwrap()
}

fn doc2x_recognizer(server: &MockServer) -> Doc2xRecognizer {
    let config = MapConfig::new()
        .with("doc2x.url", server.uri())
        .with("doc2x.key", "doc2x-key");
    Doc2xRecognizer::new(
        Doc2xClient::new(Arc::new(config)).unwrap(),
        AsyncTaskPoller::new(Arc::new(ManualClock::new())),
        PollPolicy {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(5),
        },
    )
}

/// `.docx` package whose main document holds one paragraph per entry
fn docx(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{p}</w:t></w:r></w:p>"))
        .collect();
    let xml = format!(
        "<w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
         <w:body>{body}</w:body></w:document>"
    );
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    writer.start_file("word/document.xml", options).unwrap();
    writer.write_all(xml.as_bytes()).unwrap();
    writer.finish().unwrap().into_inner()
}

fn status(value: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "code": "success",
        "data": { "status": value, "detail": "" }
    }))
}

// =============================================================================
// Chat Completion
// =============================================================================

#[tokio::test]
async fn test_chat_stream_is_authenticated_and_decoded() {
    let server = MockServer::start().await;
    let body = "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n\
                data: {\"choices\":[{\"delta\":{\"content\":\"# Rust\"}}]}\n\n\
                : keep-alive\n\n\
                data: {\"choices\":[{\"delta\":{\"content\":\"\\n## Traits\"}}]}\n\n\
                data: [DONE]\n\n";
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer chat-key"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, SSE))
        .expect(1)
        .mount(&server)
        .await;

    let client = chat_client(&server, "chat-key");
    let frames = client
        .stream_chat(&ChatRequest::new("Rust", "deepseek-chat"))
        .await
        .unwrap();
    let outcome = StreamingConsumer::default()
        .consume(frames, ChatDeltaDecoder)
        .finish()
        .await;

    assert!(outcome.is_success());
    assert_eq!(outcome.content, "# Rust\n## Traits");
    assert_eq!(outcome.deltas, 2);
}

#[tokio::test]
async fn test_chat_blank_key_fails_before_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = chat_client(&server, "   ");
    let err = client
        .stream_chat(&ChatRequest::new("Rust", "deepseek-chat"))
        .await
        .err()
        .unwrap();

    assert_eq!(
        err,
        GenerationError::Configuration {
            key: "chat.key".to_string()
        }
    );
}

#[tokio::test]
async fn test_chat_http_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = chat_client(&server, "wrong")
        .stream_chat(&ChatRequest::new("Rust", "deepseek-chat"))
        .await
        .err()
        .unwrap();

    assert_eq!(
        err,
        GenerationError::HttpStatus {
            operation: "chat".to_string(),
            status: 401
        }
    );
    assert_eq!(err.kind(), ErrorKind::Transport);
}

// =============================================================================
// Presentation
// =============================================================================

#[tokio::test]
async fn test_token_issuance_is_single_flight_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/user/createApiToken"))
        .and(header("token", "secret-key"))
        .and(body_json(json!({ "uid": "u1" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(50))
                .set_body_json(json!({ "code": 0, "data": { "token": "short-lived" } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let broker = TokenBroker::new(
        Arc::new(docmee_client(&server)),
        Arc::new(ManualClock::new()),
        Duration::from_secs(3000),
    );
    let tokens = futures::future::join_all((0..5).map(|_| broker.get_token("u1", None))).await;

    for token in tokens {
        assert_eq!(token.unwrap(), "short-lived");
    }
}

#[tokio::test]
async fn test_token_issuance_rejection_is_typed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/user/createApiToken"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "code": 1001, "message": "invalid api key" })),
        )
        .mount(&server)
        .await;

    let broker = TokenBroker::new(
        Arc::new(docmee_client(&server)),
        Arc::new(ManualClock::new()),
        Duration::from_secs(3000),
    );
    let err = broker.get_token("u1", Some(10)).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TokenIssuance);
    assert!(err.to_string().contains("invalid api key"));
    assert_eq!(broker.cached_len(), 0);
}

#[tokio::test]
async fn test_nonzero_envelope_code_is_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/ppt/randomTemplates"))
        .and(header("token", "tk"))
        .and(body_json(json!({ "size": 4, "filters": { "type": 1 } })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "code": 88, "message": "token expired" })),
        )
        .mount(&server)
        .await;

    let err = docmee_client(&server)
        .random_templates("tk", 4, 1)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        GenerationError::Provider {
            operation: "randomTemplates".to_string(),
            message: "token expired".to_string()
        }
    );
}

#[tokio::test]
async fn test_templates_and_render_wire_shapes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/ppt/randomTemplates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": [
                { "id": "tpl-a", "type": 1, "coverUrl": "https://c/a.png" },
                { "id": "tpl-b", "type": 1 }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/ppt/generatePptx"))
        .and(body_json(json!({
            "templateId": "tpl-b",
            "outlineContentMarkdown": "# Deck",
            "pptxProperty": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": { "pptInfo": { "id": "ppt-9", "subject": "Deck", "templateId": "tpl-b" } }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/ppt/downloadPptx"))
        .and(body_json(json!({ "id": "ppt-9" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": { "id": "ppt-9", "fileUrl": "https://cdn/ppt-9.pptx" }
        })))
        .mount(&server)
        .await;

    let client = docmee_client(&server);
    let templates = client.random_templates("tk", 2, 1).await.unwrap();
    assert_eq!(templates.len(), 2);
    assert_eq!(templates[0].cover_url.as_deref(), Some("https://c/a.png"));
    assert_eq!(templates[1].category, Some(1));

    let ppt = client
        .generate_pptx(
            "tk",
            &PptxRequest {
                template_id: "tpl-b".to_string(),
                outline_content_markdown: "# Deck".to_string(),
                pptx_property: false,
            },
        )
        .await
        .unwrap();
    assert_eq!(ppt.id, "ppt-9");
    assert_eq!(ppt.template_id.as_deref(), Some("tpl-b"));

    let url = client.download_pptx("tk", "ppt-9").await.unwrap();
    assert_eq!(url, "https://cdn/ppt-9.pptx");
}

#[tokio::test]
async fn test_parse_file_data_returns_data_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/ppt/parseFileData"))
        .and(header("token", "tk"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "code": 0, "data": { "dataUrl": "docmee://parsed/1" } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let data_url = docmee_client(&server)
        .parse_file_data("tk", &SourceDocument::Url("https://host/notes.pdf".into()))
        .await
        .unwrap();
    assert_eq!(data_url, "docmee://parsed/1");
}

#[tokio::test]
async fn test_outline_stream_decodes_frames() {
    let server = MockServer::start().await;
    let body = "data: {\"status\":3,\"text\":\"# Rust\\n\"}\n\n\
                data: {\"status\":3,\"text\":\"## Ownership\\n\"}\n\n\
                data: {\"status\":4,\"text\":\"\"}\n\n";
    Mock::given(method("POST"))
        .and(path("/api/ppt/generateOutline"))
        .and(body_json(json!({ "subject": "Rust" })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, SSE))
        .mount(&server)
        .await;

    let frames = docmee_client(&server)
        .generate_outline(
            "tk",
            &OutlineRequest {
                subject: "Rust".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let outcome = StreamingConsumer::default()
        .consume(frames, PresentationDecoder::new("generateOutline"))
        .finish()
        .await;

    assert_eq!(outcome.into_result().unwrap(), "# Rust\n## Ownership\n");
}

#[tokio::test]
async fn test_outline_json_answer_is_error_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/ppt/generateOutline"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "code": -1, "message": "subject too long" })),
        )
        .mount(&server)
        .await;

    let err = docmee_client(&server)
        .generate_outline("tk", &OutlineRequest::default())
        .await
        .err()
        .unwrap();

    assert_eq!(err.kind(), ErrorKind::Provider);
    assert!(err.to_string().contains("subject too long"));
}

fn direct_request() -> DirectPptxRequest {
    DirectPptxRequest {
        template_id: Some("tpl-d".to_string()),
        subject: "Rust".to_string(),
        data_url: Some("docmee://parsed/1".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_direct_generation_sync_wire_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/ppt/directGeneratePptx"))
        .and(header("token", "tk"))
        .and(body_json(json!({
            "stream": false,
            "templateId": "tpl-d",
            "subject": "Rust",
            "dataUrl": "docmee://parsed/1",
            "pptxProperty": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": { "pptInfo": { "id": "ppt-d", "subject": "Rust", "templateId": "tpl-d" } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ppt = docmee_client(&server)
        .direct_generate_pptx("tk", &direct_request())
        .await
        .unwrap();

    assert_eq!(ppt.id, "ppt-d");
    assert_eq!(ppt.template_id.as_deref(), Some("tpl-d"));
}

#[tokio::test]
async fn test_direct_generation_sync_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/ppt/directGeneratePptx"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "code": 1001, "message": "template not found" })),
        )
        .mount(&server)
        .await;

    let err = docmee_client(&server)
        .direct_generate_pptx("tk", &direct_request())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        GenerationError::Provider {
            operation: "directGeneratePptx".to_string(),
            message: "template not found".to_string()
        }
    );
}

#[tokio::test]
async fn test_direct_generation_stream_carries_result() {
    let server = MockServer::start().await;
    let body = "data: {\"status\":1,\"text\":\"Outlining\\n\"}\n\n\
                data: {\"status\":3,\"text\":\"Rendering\\n\"}\n\n\
                data: {\"status\":4,\"text\":\"\",\"result\":{\"id\":\"ppt-s\",\"subject\":\"Rust\"}}\n\n";
    Mock::given(method("POST"))
        .and(path("/api/ppt/directGeneratePptx"))
        .and(body_json(json!({
            "stream": true,
            "templateId": "tpl-d",
            "subject": "Rust",
            "dataUrl": "docmee://parsed/1",
            "pptxProperty": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, SSE))
        .mount(&server)
        .await;

    let frames = docmee_client(&server)
        .direct_generate_pptx_stream("tk", &direct_request())
        .await
        .unwrap();
    let slot = ResultSlot::default();
    let outcome = StreamingConsumer::default()
        .consume(
            frames,
            PresentationDecoder::new("directGeneratePptx").with_result_slot(Arc::clone(&slot)),
        )
        .finish()
        .await;

    assert_eq!(outcome.into_result().unwrap(), "Outlining\nRendering\n");
    let ppt: PptInfo = serde_json::from_value(slot.lock().take().unwrap()).unwrap();
    assert_eq!(ppt.id, "ppt-s");
    assert_eq!(ppt.subject.as_deref(), Some("Rust"));
}

#[tokio::test]
async fn test_direct_generation_stream_error_frame() {
    let server = MockServer::start().await;
    let body = "data: {\"status\":1,\"text\":\"Outlining\"}\n\n\
                data: {\"status\":-1,\"error\":\"insufficient balance\"}\n\n";
    Mock::given(method("POST"))
        .and(path("/api/ppt/directGeneratePptx"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, SSE))
        .mount(&server)
        .await;

    let frames = docmee_client(&server)
        .direct_generate_pptx_stream("tk", &direct_request())
        .await
        .unwrap();
    let outcome = StreamingConsumer::default()
        .consume(frames, PresentationDecoder::new("directGeneratePptx"))
        .finish()
        .await;

    let (err, partial) = outcome.into_result().unwrap_err();
    assert_eq!(
        err,
        GenerationError::provider("directGeneratePptx", "insufficient balance")
    );
    assert_eq!(partial, "Outlining");
}

#[tokio::test]
async fn test_direct_generation_stream_json_answer_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/ppt/directGeneratePptx"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "code": 401, "message": "token invalid" })),
        )
        .mount(&server)
        .await;

    let err = docmee_client(&server)
        .direct_generate_pptx_stream("tk", &direct_request())
        .await
        .err()
        .unwrap();

    assert_eq!(err.kind(), ErrorKind::Provider);
    assert!(err.to_string().contains("token invalid"));
}

#[tokio::test]
async fn test_undecodable_body_is_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/ppt/downloadPptx"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "<html>gateway busy, trace=7f3a9c internal-host=10.0.0.12</html>",
            "text/html",
        ))
        .mount(&server)
        .await;

    let err = docmee_client(&server)
        .download_pptx("tk", "ppt-1")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Provider);
    let message = err.to_string();
    assert!(message.contains("undecodable response"), "{message}");
    for leaked in ["<html>", "gateway busy", "7f3a9c", "10.0.0.12"] {
        assert!(!message.contains(leaked), "body leaked into {message:?}");
    }
}

#[tokio::test]
async fn test_undecodable_poll_body_is_not_echoed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/async/pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "code": "success", "data": { "uuid": "task-g" } })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/async/status"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ERR quota-node-3 \x00\x01"))
        .mount(&server)
        .await;

    let err = doc2x_recognizer(&server)
        .recognize(
            &SourceDocument::Url("https://cdn.example.com/a.pdf".into()),
            ResultMode::Markdown,
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Provider);
    assert!(!err.to_string().contains("quota-node-3"));
}

// =============================================================================
// Request Bounds
// =============================================================================

#[tokio::test]
async fn test_slow_request_response_call_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/ppt/randomTemplates"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "code": 0, "data": [] }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let err = docmee_client(&server)
        .with_request_timeout(Duration::from_millis(100))
        .random_templates("tk", 4, 1)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Transport);
}

#[tokio::test]
async fn test_slow_poll_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/async/status"))
        .respond_with(status("processing").set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let config = MapConfig::new()
        .with("doc2x.url", server.uri())
        .with("doc2x.key", "doc2x-key");
    let client = Doc2xClient::new(Arc::new(config))
        .unwrap()
        .with_request_timeout(Duration::from_millis(100));
    let handle = TaskHandle {
        id: "task-slow".to_string(),
        submitted_at: Instant::now(),
    };
    let err = client.poll(&handle).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Transport);
}

#[tokio::test]
async fn test_event_stream_is_not_bounded_by_request_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/ppt/generateOutline"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("data: {\"status\":3,\"text\":\"# Slow\"}\n\n", SSE)
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let frames = docmee_client(&server)
        .with_request_timeout(Duration::from_millis(100))
        .generate_outline("tk", &OutlineRequest::default())
        .await
        .unwrap();
    let outcome = StreamingConsumer::default()
        .consume(frames, PresentationDecoder::new("generateOutline"))
        .finish()
        .await;

    assert_eq!(outcome.into_result().unwrap(), "# Slow");
}

// =============================================================================
// Recognition
// =============================================================================

#[tokio::test]
async fn test_recognition_polls_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/async/pdf"))
        .and(header("authorization", "Bearer doc2x-key"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "code": "success", "data": { "uuid": "task-1" } })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/async/status"))
        .and(query_param("uuid", "task-1"))
        .respond_with(status("processing"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/async/status"))
        .and(query_param("uuid", "task-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "success",
            "data": {
                "status": "success",
                "result": { "pages": [ { "md": "# One\n\nalpha" }, { "md": "**two**" } ] }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let text = doc2x_recognizer(&server)
        .recognize(
            &SourceDocument::Url("https://host/Scan.PDF?sig=1".into()),
            ResultMode::Text,
        )
        .await
        .unwrap();

    assert_eq!(text, "One\nalpha\ntwo");
}

#[tokio::test]
async fn test_recognition_falls_back_to_legacy_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/async/img"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/img/async"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "code": "success", "data": { "uuid": "img-1" } })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/async/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "success",
            "data": { "status": "success", "result": { "pages": [ { "md": "caption" } ] } }
        })))
        .mount(&server)
        .await;

    let markdown = doc2x_recognizer(&server)
        .recognize(
            &SourceDocument::Url("https://host/photo.png".into()),
            ResultMode::Markdown,
        )
        .await
        .unwrap();
    assert_eq!(markdown, "caption");
}

#[tokio::test]
async fn test_recognition_failure_and_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "code": "success", "data": { "uuid": "t" } })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/async/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "success",
            "data": { "status": "failed", "detail": "file is encrypted" }
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/async/status"))
        .respond_with(status("processing"))
        .mount(&server)
        .await;

    let recognizer = doc2x_recognizer(&server);
    let source = SourceDocument::Url("https://host/a.pdf".into());

    let failed = recognizer
        .recognize(&source, ResultMode::Markdown)
        .await
        .unwrap_err();
    assert_eq!(
        failed,
        GenerationError::Provider {
            operation: "poll".to_string(),
            message: "file is encrypted".to_string()
        }
    );

    let timed_out = recognizer
        .recognize(&source, ResultMode::Markdown)
        .await
        .unwrap_err();
    assert_eq!(timed_out.kind(), ErrorKind::Timeout);
}

#[tokio::test]
async fn test_docx_text_mode_skips_the_provider() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/brief.docx"))
        .respond_with(
            ResponseTemplate::new(200).set_body_bytes(docx(&["Brief", "Ship on Friday"])),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let text = doc2x_recognizer(&server)
        .recognize(
            &SourceDocument::Url(format!("{}/files/brief.docx", server.uri())),
            ResultMode::Text,
        )
        .await
        .unwrap();

    assert_eq!(text, "Brief\nShip on Friday\n");
}

#[tokio::test]
async fn test_docx_markdown_is_rendered_stored_and_recognized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/brief.docx"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(docx(&["Brief"])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/async/pdf"))
        .and(body_string_contains("uploads%2Fdocx%2F"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "code": "success", "data": { "uuid": "task-w" } })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/async/status"))
        .and(query_param("uuid", "task-w"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "success",
            "data": { "status": "success", "result": { "pages": [ { "md": "# Brief" } ] } }
        })))
        .mount(&server)
        .await;

    let files = Arc::new(MemoryFileStore::new());
    let markdown = doc2x_recognizer(&server)
        .with_file_store(files.clone())
        .recognize(
            &SourceDocument::Url(format!("{}/files/brief.docx", server.uri())),
            ResultMode::Markdown,
        )
        .await
        .unwrap();
    assert_eq!(markdown, "# Brief");

    let submitted = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.url.path() == "/api/v1/async/pdf")
        .unwrap();
    let form = String::from_utf8(submitted.body).unwrap();
    let stored_url = form
        .split('&')
        .find_map(|pair| pair.strip_prefix("pdf_url="))
        .unwrap()
        .replace("%3A", ":")
        .replace("%2F", "/");
    assert!(stored_url.ends_with(".pdf"), "{stored_url}");
    assert!(files.get(&stored_url).unwrap().starts_with(b"%PDF-"));
}

#[tokio::test]
async fn test_recognition_missing_config_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = MapConfig::new().with("doc2x.url", server.uri());
    let recognizer = Doc2xRecognizer::new(
        Doc2xClient::new(Arc::new(config)).unwrap(),
        AsyncTaskPoller::new(Arc::new(ManualClock::new())),
        PollPolicy::default(),
    );
    let err = recognizer
        .recognize(
            &SourceDocument::Url("https://host/a.pdf".into()),
            ResultMode::Markdown,
        )
        .await
        .unwrap_err();

    assert_eq!(
        err,
        GenerationError::Configuration {
            key: "doc2x.key".to_string()
        }
    );
}
