use std::sync::Arc;
use std::time::Duration;

use mockito::Server;
use scribe_chat::{
    ControllerSettings, ExchangeOutcome, MarkdownHtml, MemorySink, SessionController, SinkEvent,
};
use scribe_core::{Message, Role};
use scribe_session::{FileStore, KeyValueStore, LoadOutcome, MemoryStore, SessionStore};
use scribe_stream::{BackendConfig, HttpChatBackend};

fn settings() -> ControllerSettings {
    ControllerSettings {
        reveal_interval: Duration::from_millis(20),
        system_prompt: Some("You are a helpful assistant.".to_string()),
        greeting: Some("Hello!".to_string()),
    }
}

fn controller(
    server: &Server,
    store: Arc<dyn KeyValueStore>,
) -> (SessionController, Arc<MemorySink>) {
    let backend =
        HttpChatBackend::new(BackendConfig::new(format!("{}/api/chat", server.url()))).unwrap();
    let sink = Arc::new(MemorySink::new());
    let controller = SessionController::new(
        Arc::new(backend),
        SessionStore::new(store),
        sink.clone(),
        Arc::new(MarkdownHtml),
        settings(),
    );
    (controller, sink)
}

#[tokio::test]
async fn test_streamed_reply_is_committed() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/chat")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body("data: {\"response\":\"A\"}\n\ndata: [DONE]\n")
        .create_async()
        .await;

    let store = Arc::new(MemoryStore::new());
    let (controller, sink) = controller(&server, store.clone());

    let outcome = controller.submit("question").await.unwrap();
    mock.assert_async().await;

    assert_eq!(
        outcome,
        ExchangeOutcome::Committed {
            response: "A".to_string()
        }
    );
    assert_eq!(sink.last_entry().unwrap().content, "<p>A</p>\n");
    assert_eq!(controller.history().last(), Some(&Message::assistant("A")));
    assert!(store.contains("chat_history").await.unwrap());
}

#[tokio::test]
async fn test_server_error_details_are_shown() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/api/chat")
        .with_status(500)
        .with_header("content-type", "application/json")
        .with_body(r#"{"details":"overloaded"}"#)
        .create_async()
        .await;

    let store = Arc::new(MemoryStore::new());
    let (controller, sink) = controller(&server, store.clone());
    let before = controller.history().len();

    let outcome = controller.submit("question").await.unwrap();
    assert!(matches!(outcome, ExchangeOutcome::Failed { ref message } if message.contains("overloaded")));

    let notice = sink.last_entry().unwrap();
    assert_eq!(notice.role, Role::Assistant);
    assert!(notice.content.contains("overloaded"));

    let history = controller.history();
    assert_eq!(history.len(), before + 1);
    assert_eq!(history.last(), Some(&Message::user("question")));
    assert!(store.is_empty());
    assert!(sink.input_enabled());
}

#[tokio::test]
async fn test_empty_body_fails_without_placeholder() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/api/chat")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body("")
        .create_async()
        .await;

    let (controller, sink) = controller(&server, Arc::new(MemoryStore::new()));

    let outcome = controller.submit("question").await.unwrap();
    assert_eq!(
        outcome,
        ExchangeOutcome::Failed {
            message: "no response".to_string()
        }
    );

    let events = sink.events();
    let placeholder = events
        .iter()
        .find_map(|e| match e {
            SinkEvent::Began(id) => Some(*id),
            _ => None,
        })
        .unwrap();
    assert!(events.contains(&SinkEvent::Removed(placeholder)));
    assert!(sink.entries().iter().all(|e| e.id != placeholder));
    assert!(sink.last_entry().unwrap().content.contains("no response"));
}

#[tokio::test]
async fn test_session_survives_restart() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/chat")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"response":"**bold** reply"}"#)
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::TempDir::new().unwrap();
    let store = Arc::new(FileStore::new(dir.path()).await.unwrap());
    let (first, _) = controller(&server, store);
    first.restore().await.unwrap();
    first.submit("question").await.unwrap();
    mock.assert_async().await;

    let store = Arc::new(FileStore::new(dir.path()).await.unwrap());
    let (second, sink) = controller(&server, store);
    let outcome = second.restore().await.unwrap();

    assert!(matches!(outcome, LoadOutcome::Loaded(_)));
    assert_eq!(second.history(), first.history());
    assert_eq!(second.history().len(), 4);

    let contents: Vec<String> = sink.entries().into_iter().map(|e| e.content).collect();
    assert_eq!(
        contents,
        vec![
            "<p>Hello!</p>\n",
            "<p>question</p>\n",
            "<p><strong>bold</strong> reply</p>\n",
        ]
    );
}
