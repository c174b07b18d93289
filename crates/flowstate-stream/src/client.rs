use std::pin::Pin;

use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use tracing::{Instrument as _, debug, info_span, warn};

use crate::config::ClientConfig;
use crate::errors::ClientError;
use crate::reader::StreamingChunkReader;
use crate::session::ChatSession;
use crate::step::StepEvent;

const NEW_THREAD_MESSAGE: &str = "Start new conversation";
const ERROR_BODY_LIMIT: usize = 200;

type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static>>;

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
    user_id: &'a str,
}

#[derive(Deserialize)]
struct ThreadCreated {
    session_id: String,
}

/// HTTP client for the FlowState chat backend.
pub struct FlowStateClient {
    client: reqwest::Client,
    config: ClientConfig,
    reader: StreamingChunkReader,
}

impl FlowStateClient {
    /// Creates a client from explicit configuration.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let url = config.api_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ClientError::Config(format!(
                "api_url must be an http(s) URL, got {url:?}"
            )));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            config,
            reader: StreamingChunkReader::default(),
        })
    }

    /// Creates a client using `FLOWSTATE_ENV` / `FLOWSTATE_API_URL`.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Replaces the reader used for streamed turns.
    pub fn with_reader(mut self, reader: StreamingChunkReader) -> Self {
        self.reader = reader;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns whether the backend root answers with a success status.
    pub async fn health_check(&self) -> bool {
        let result = self
            .client
            .get(self.config.endpoint("/"))
            .timeout(self.config.request_timeout)
            .send()
            .await;
        match result {
            Ok(response) => {
                let ok = response.status().is_success();
                debug!(status = response.status().as_u16(), ok, "backend health check");
                ok
            }
            Err(e) => {
                warn!(error = %e, api_url = %self.config.api_url, "backend health check failed");
                false
            }
        }
    }

    /// Starts a new conversation and returns its thread id.
    pub async fn create_thread(&self, session: &ChatSession) -> Result<String, ClientError> {
        let payload = ChatRequest {
            message: NEW_THREAD_MESSAGE,
            session_id: None,
            user_id: session.effective_user_id(),
        };
        let response = self.post_chat(session, &payload).await?;
        let created: ThreadCreated = response.json().await.map_err(|e| {
            ClientError::InvalidResponse(format!("thread response missing session_id: {e}"))
        })?;
        debug!(thread_id = %created.session_id, "created chat thread");
        Ok(created.session_id)
    }

    /// Creates a fresh thread and stores it on the session.
    pub async fn reset_thread(&self, session: &mut ChatSession) -> Result<String, ClientError> {
        let thread_id = self.create_thread(session).await?;
        session.set_thread_id(thread_id.clone());
        Ok(thread_id)
    }

    /// Sends a message on the session's current thread.
    pub async fn send_message(
        &self,
        session: &ChatSession,
        content: &str,
    ) -> Result<(), ClientError> {
        let thread_id = session.require_thread()?;
        if content.trim().is_empty() {
            return Err(ClientError::Validation("message must not be empty".into()));
        }
        let payload = ChatRequest {
            message: content,
            session_id: Some(thread_id),
            user_id: session.effective_user_id(),
        };
        self.post_chat(session, &payload).await?;
        Ok(())
    }

    /// Streams one chat turn, surfacing agent steps as they arrive.
    ///
    /// `on_complete` runs once when the turn ends normally. Upstream error
    /// records, read failures and timeouts are returned as errors instead.
    pub async fn stream_chat<F, C>(
        &self,
        session: &ChatSession,
        message: &str,
        on_step: F,
        on_complete: C,
    ) -> Result<(), ClientError>
    where
        F: FnMut(StepEvent),
        C: FnOnce(String),
    {
        let token = session.bearer_token()?;
        if message.trim().is_empty() {
            return Err(ClientError::Validation("message must not be empty".into()));
        }
        let payload = ChatRequest {
            message,
            session_id: session.current_thread(),
            user_id: session.effective_user_id(),
        };
        let url = self.config.endpoint("/api/chat/stream");
        let request_id = uuid::Uuid::new_v4();
        let span = info_span!(
            "chat_stream",
            %request_id,
            thread_id = session.current_thread().unwrap_or("-"),
        );

        let turn = async move {
            let response = self
                .client
                .post(&url)
                .bearer_auth(token)
                .header(ACCEPT, "text/event-stream")
                .json(&payload)
                .send()
                .await
                .map_err(ClientError::transport)?;
            let response = error_for_status(response).await?;
            debug!(status = response.status().as_u16(), "chat stream opened");

            let body: Option<ByteStream> = if response.status() == StatusCode::NO_CONTENT {
                None
            } else {
                Some(Box::pin(response.bytes_stream()))
            };
            self.reader.consume(body, on_step, on_complete).await?;
            Ok::<(), ClientError>(())
        }
        .instrument(span);

        match self.config.stream_timeout {
            Some(limit) => tokio::time::timeout(limit, turn)
                .await
                .map_err(|_| ClientError::Timeout(limit))?,
            None => turn.await,
        }
    }

    async fn post_chat(
        &self,
        session: &ChatSession,
        payload: &ChatRequest<'_>,
    ) -> Result<reqwest::Response, ClientError> {
        let token = session.bearer_token()?;
        let response = self
            .client
            .post(self.config.endpoint("/chat"))
            .bearer_auth(token)
            .timeout(self.config.request_timeout)
            .json(payload)
            .send()
            .await
            .map_err(ClientError::transport)?;
        error_for_status(response).await
    }
}

async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    warn!(status = status.as_u16(), "backend request failed");
    Err(ClientError::Http {
        status: status.as_u16(),
        body: body.chars().take(ERROR_BODY_LIMIT).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StreamError;
    use crate::reader::CompletionPolicy;
    use crate::step::StepKind;
    use std::cell::RefCell;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    const EVENT_STREAM_HEAD: &str = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream";

    /// Serves one canned HTTP response and hands back the raw request text.
    async fn serve_once(
        head: String,
        body: String,
        hold: Option<Duration>,
    ) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let request = read_request(&mut socket).await;
            socket
                .write_all(format!("{head}\r\nconnection: close\r\n\r\n{body}").as_bytes())
                .await
                .expect("write");
            if let Some(hold) = hold {
                tokio::time::sleep(hold).await;
            }
            let _ = socket.shutdown().await;
            request
        });
        (format!("http://{addr}"), handle)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0_u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.expect("read");
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    return text;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    fn client_for(url: &str) -> FlowStateClient {
        FlowStateClient::new(ClientConfig::new(url)).expect("client")
    }

    #[test]
    fn rejects_non_http_api_url() {
        let err = FlowStateClient::new(ClientConfig::new("localhost:5001"))
            .err()
            .expect("should fail");
        assert!(matches!(err, ClientError::Config(msg) if msg.contains("http(s)")));
    }

    #[tokio::test]
    async fn stream_chat_delivers_steps_and_completion() {
        let body = [
            StepEvent::new(StepKind::Routing, "Main Agent", "Routing request")
                .to_wire_line()
                .expect("encode"),
            "data: {\"type\":\"text\",\"content\":\"All set.\"}\n".to_string(),
            StepEvent::tool("PM", "get_assignments_in_date_range")
                .to_wire_line()
                .expect("encode"),
            "data: [DONE]\n".to_string(),
        ]
        .concat();
        let (url, server) =
            serve_once(EVENT_STREAM_HEAD.to_string(), body, None).await;
        let client = client_for(&url)
            .with_reader(StreamingChunkReader::new().completion_policy(CompletionPolicy::Accumulated));
        let session = ChatSession::new("tok-1").user_id("u-7").thread_id("t-3");

        let steps = RefCell::new(Vec::new());
        let completed = RefCell::new(Vec::new());
        client
            .stream_chat(
                &session,
                "what is due this week?",
                |step| steps.borrow_mut().push(step),
                |text| completed.borrow_mut().push(text),
            )
            .await
            .expect("stream ok");

        let steps = steps.into_inner();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].kind, StepKind::Routing);
        assert_eq!(steps[1].tool_name(), Some("get_assignments_in_date_range"));
        assert_eq!(completed.into_inner(), vec!["All set.".to_string()]);

        let request = server.await.expect("server").to_ascii_lowercase();
        assert!(request.starts_with("post /api/chat/stream "), "{request}");
        assert!(request.contains("authorization: bearer tok-1"));
        assert!(request.contains("accept: text/event-stream"));
        assert!(request.contains("\"session_id\":\"t-3\""));
        assert!(request.contains("\"user_id\":\"u-7\""));
    }

    #[tokio::test]
    async fn stream_chat_surfaces_upstream_error_record() {
        let (url, _server) = serve_once(
            EVENT_STREAM_HEAD.to_string(),
            "data: {\"type\":\"error\",\"content\":\"boom\"}\n".to_string(),
            None,
        )
        .await;
        let mut completed = false;
        let err = client_for(&url)
            .stream_chat(&ChatSession::new("tok"), "hi", |_| {}, |_| completed = true)
            .await
            .expect_err("error record");
        assert_eq!(err, ClientError::Stream(StreamError::Upstream("boom".into())));
        assert_eq!(err.to_string(), "boom");
        assert!(!completed);
    }

    #[tokio::test]
    async fn non_success_status_maps_to_http_error_with_truncated_body() {
        let long_body = "x".repeat(500);
        let (url, _server) = serve_once(
            format!("HTTP/1.1 502 Bad Gateway\r\ncontent-length: {}", long_body.len()),
            long_body,
            None,
        )
        .await;
        let err = client_for(&url)
            .stream_chat(&ChatSession::new("tok"), "hi", |_| {}, |_| {})
            .await
            .expect_err("502");
        match err {
            ClientError::Http { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body.len(), 200);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_content_response_has_no_stream() {
        let (url, _server) = serve_once("HTTP/1.1 204 No Content".to_string(), String::new(), None).await;
        let err = client_for(&url)
            .stream_chat(&ChatSession::new("tok"), "hi", |_| {}, |_| {})
            .await
            .expect_err("204");
        assert_eq!(err, ClientError::Stream(StreamError::NoStream));
    }

    #[tokio::test]
    async fn stream_timeout_wraps_the_whole_turn() {
        let (url, _server) = serve_once(
            EVENT_STREAM_HEAD.to_string(),
            "data: {\"type\":\"routing\",\"agent\":\"A\",\"message\":\"m\"}\n".to_string(),
            Some(Duration::from_secs(5)),
        )
        .await;
        let client = FlowStateClient::new(
            ClientConfig::new(url).stream_timeout(Duration::from_millis(200)),
        )
        .expect("client");
        let mut steps = 0;
        let err = client
            .stream_chat(&ChatSession::new("tok"), "hi", |_| steps += 1, |_| {})
            .await
            .expect_err("timeout");
        assert_eq!(err, ClientError::Timeout(Duration::from_millis(200)));
        assert!(steps <= 1);
    }

    #[tokio::test]
    async fn calls_require_a_token_before_any_io() {
        let client = client_for("http://127.0.0.1:9");
        let anonymous = ChatSession::new("");
        assert_eq!(
            client.stream_chat(&anonymous, "hi", |_| {}, |_| {}).await,
            Err(ClientError::Unauthenticated)
        );
        assert_eq!(
            client.create_thread(&anonymous).await,
            Err(ClientError::Unauthenticated)
        );
    }

    #[tokio::test]
    async fn send_message_requires_thread_and_content() {
        let client = client_for("http://127.0.0.1:9");
        assert_eq!(
            client.send_message(&ChatSession::new("tok"), "hello").await,
            Err(ClientError::MissingThread)
        );
        assert!(matches!(
            client
                .send_message(&ChatSession::new("tok").thread_id("t"), "  ")
                .await,
            Err(ClientError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn reset_thread_stores_new_thread_id() {
        let reply = r#"{"session_id":"thread-42","response":"ok"}"#;
        let (url, server) = serve_once(
            format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}",
                reply.len()
            ),
            reply.to_string(),
            None,
        )
        .await;
        let mut session = ChatSession::new("tok");
        let id = client_for(&url)
            .reset_thread(&mut session)
            .await
            .expect("thread");
        assert_eq!(id, "thread-42");
        assert_eq!(session.current_thread(), Some("thread-42"));

        let request = server.await.expect("server").to_ascii_lowercase();
        assert!(request.starts_with("post /chat "), "{request}");
        assert!(request.contains("\"message\":\"start new conversation\""));
        assert!(request.contains("\"user_id\":\"default_user\""));
        assert!(!request.contains("session_id"));
    }

    #[tokio::test]
    async fn health_check_reports_reachability() {
        let (url, _server) =
            serve_once("HTTP/1.1 200 OK\r\ncontent-length: 2".to_string(), "ok".to_string(), None).await;
        assert!(client_for(&url).health_check().await);

        let closed = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = closed.local_addr().expect("addr");
        drop(closed);
        assert!(!client_for(&format!("http://{addr}")).health_check().await);
    }
}
