//! HTTP streaming transport.
//!
//! Each JSON-RPC message is POSTed to the server URL. The server answers with
//! either a plain JSON body or a `text/event-stream` whose `data:` events
//! carry JSON-RPC messages; the first response with a matching id wins.
//! A server-assigned `Mcp-Session-Id` is echoed on later requests and the
//! session is ended with `DELETE` on teardown.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Client as HttpClient;

use super::errors::McpError;
use super::transport::{next_request_id, Transport};
use super::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Header carrying the server-assigned session id.
const SESSION_HEADER: &str = "mcp-session-id";

// ─── Transport ───────────────────────────────────────────────────────────────

/// JSON-RPC over HTTP POST with JSON or SSE framed responses.
pub struct HttpStreamTransport {
    server_name: String,
    url: String,
    http: HttpClient,
    headers: HeaderMap,
    session_id: Option<String>,
    closed: bool,
}

impl HttpStreamTransport {
    /// Build the HTTP client. No request is sent until the handshake.
    pub fn connect(
        server_name: &str,
        url: &str,
        extra_headers: &HashMap<String, String>,
    ) -> Result<Self, McpError> {
        let parsed = reqwest::Url::parse(url).map_err(|e| McpError::ConfigError {
            reason: format!("server '{server_name}' has an invalid url '{url}': {e}"),
        })?;

        let mut headers = HeaderMap::new();
        for (key, value) in extra_headers {
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| McpError::ConfigError {
                reason: format!("server '{server_name}' has an invalid header name '{key}': {e}"),
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| McpError::ConfigError {
                reason: format!("server '{server_name}' has an invalid value for header '{key}': {e}"),
            })?;
            headers.insert(name, value);
        }

        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| McpError::ConnectFailed {
                name: server_name.to_string(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            server_name: server_name.to_string(),
            url: parsed.to_string(),
            http,
            headers,
            session_id: None,
            closed: false,
        })
    }

    /// POST one JSON-RPC message and return the raw response.
    async fn post(&mut self, body: &serde_json::Value) -> Result<reqwest::Response, McpError> {
        if self.closed {
            return Err(McpError::TransportError {
                server: self.server_name.clone(),
                reason: "transport already closed".into(),
            });
        }

        let mut request = self
            .http
            .post(&self.url)
            .headers(self.headers.clone())
            .header(ACCEPT, "application/json, text/event-stream")
            .json(body);
        if let Some(session_id) = &self.session_id {
            request = request.header(SESSION_HEADER, session_id);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_connect() {
                McpError::ConnectFailed {
                    name: self.server_name.clone(),
                    reason: e.to_string(),
                }
            } else {
                McpError::TransportError {
                    server: self.server_name.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        if let Some(id) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            self.session_id = Some(id.to_string());
        }

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(McpError::TransportError {
                server: self.server_name.clone(),
                reason: format!("HTTP {}: {}", status.as_u16(), body_text.trim()),
            });
        }

        Ok(response)
    }

    async fn read_sse_response(
        &self,
        response: reqwest::Response,
        id: u64,
    ) -> Result<JsonRpcResponse, McpError> {
        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::default();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| McpError::TransportError {
                server: self.server_name.clone(),
                reason: format!("stream read error: {e}"),
            })?;
            for payload in decoder.push(&bytes) {
                if let Some(resp) = match_response(&payload, id) {
                    return Ok(resp);
                }
            }
        }

        for payload in decoder.finish() {
            if let Some(resp) = match_response(&payload, id) {
                return Ok(resp);
            }
        }

        Err(McpError::TransportError {
            server: self.server_name.clone(),
            reason: "event stream ended before a response arrived".into(),
        })
    }
}

#[async_trait]
impl Transport for HttpStreamTransport {
    async fn request(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = next_request_id();
        let body = serde_json::to_value(JsonRpcRequest::new(id, method, params)).map_err(|e| {
            McpError::TransportError {
                server: self.server_name.clone(),
                reason: format!("failed to serialize request: {e}"),
            }
        })?;

        let response = self.post(&body).await?;

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(is_event_stream_content_type);

        if is_event_stream {
            return self.read_sse_response(response, id).await;
        }

        let text = response.text().await.map_err(|e| McpError::TransportError {
            server: self.server_name.clone(),
            reason: format!("failed to read response body: {e}"),
        })?;
        serde_json::from_str::<JsonRpcResponse>(&text).map_err(|e| McpError::ProtocolError {
            server: self.server_name.clone(),
            reason: format!("malformed JSON-RPC response: {e}"),
        })
    }

    async fn notify(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        let body = serde_json::to_value(JsonRpcNotification::new(method, params)).map_err(|e| {
            McpError::TransportError {
                server: self.server_name.clone(),
                reason: format!("failed to serialize notification: {e}"),
            }
        })?;
        self.post(&body).await.map(|_| ())
    }

    async fn end_session(&mut self) -> Result<(), McpError> {
        let Some(session_id) = self.session_id.take() else {
            return Ok(());
        };
        // Servers may answer 405 when they don't support explicit termination.
        let result = self
            .http
            .delete(&self.url)
            .headers(self.headers.clone())
            .header(SESSION_HEADER, &session_id)
            .send()
            .await;
        if let Err(e) = result {
            tracing::debug!(server = %self.server_name, error = %e, "session DELETE failed");
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), McpError> {
        self.closed = true;
        Ok(())
    }
}

/// Parse an SSE payload and keep it only if it answers request `id`.
fn match_response(payload: &str, id: u64) -> Option<JsonRpcResponse> {
    JsonRpcResponse::parse_reply(payload, id)
}

fn is_event_stream_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(str::trim)
        .is_some_and(|value| value.eq_ignore_ascii_case("text/event-stream"))
}

// ─── SSE Decoding ────────────────────────────────────────────────────────────

/// Incremental SSE decoder yielding the `data` payload of each complete event.
///
/// Bytes are buffered until a full line is available, so a multi-byte
/// character split across network chunks decodes intact. Multiple `data:`
/// lines in one event are joined with `\n`. Comments and other fields
/// (`event:`, `id:`, `retry:`) are ignored.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Feed a chunk; returns payloads of every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        let mut start = 0;
        while let Some(pos) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let newline = start + pos;
            let mut end = newline;
            if end > start && self.buffer[end - 1] == b'\r' {
                end -= 1;
            }
            let line = std::str::from_utf8(&self.buffer[start..end])
                .map(str::to_owned)
                .map_err(|e| e.to_string());
            self.handle_line(line, &mut payloads);
            start = newline + 1;
        }
        self.buffer.drain(..start);
        payloads
    }

    /// Flush a trailing event that was not terminated by a blank line.
    pub fn finish(&mut self) -> Vec<String> {
        let mut payloads = Vec::new();
        let rest = std::mem::take(&mut self.buffer);
        if !rest.is_empty() {
            let line = String::from_utf8(rest).map_err(|e| e.to_string());
            self.handle_line(line, &mut payloads);
        }
        self.dispatch(&mut payloads);
        payloads
    }

    fn handle_line(&mut self, line: Result<String, String>, payloads: &mut Vec<String>) {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::debug!(error = %e, "skipping SSE line with invalid UTF-8");
                return;
            }
        };
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            self.dispatch(payloads);
        } else if let Some(value) = line.strip_prefix("data:") {
            self.data
                .push(value.strip_prefix(' ').unwrap_or(value).to_string());
        }
    }

    fn dispatch(&mut self, payloads: &mut Vec<String>) {
        if self.data.is_empty() {
            return;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        if !data.trim().is_empty() {
            payloads.push(data);
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_decoder_handles_chunk_boundaries() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        assert_eq!(decoder.push(b":1}\n\n"), vec!["{\"a\":1}"]);
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_sse_decoder_skips_comments_and_fields() {
        let mut decoder = SseDecoder::default();
        let out = decoder.push(b": keep-alive\n\nevent: message\nid: 7\ndata: x\n\n");
        assert_eq!(out, vec!["x"]);
    }

    #[test]
    fn test_sse_decoder_joins_multiline_data_and_crlf() {
        let mut decoder = SseDecoder::default();
        let out = decoder.push(b"data: line1\r\ndata: line2\r\n\r\n");
        assert_eq!(out, vec!["line1\nline2"]);
    }

    #[test]
    fn test_sse_decoder_keeps_multibyte_char_split_across_chunks() {
        let event = "data: {\"text\":\"café\"}\n\n".as_bytes();
        let split = event.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(&event[..split]).is_empty());
        assert_eq!(decoder.push(&event[split..]), vec!["{\"text\":\"café\"}"]);
    }

    #[test]
    fn test_sse_decoder_finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish(), vec!["tail"]);
    }

    #[test]
    fn test_match_response_filters_by_id() {
        let payload = r#"{"jsonrpc":"2.0","id":4,"result":{}}"#;
        assert!(match_response(payload, 4).is_some());
        assert!(match_response(payload, 5).is_none());
        assert!(match_response(r#"{"jsonrpc":"2.0","method":"notifications/progress"}"#, 4).is_none());
        assert!(match_response(r#"{"jsonrpc":"2.0","id":4,"method":"roots/list"}"#, 4).is_none());
    }

    #[test]
    fn test_detects_event_stream_content_type() {
        assert!(is_event_stream_content_type("text/event-stream; charset=utf-8"));
        assert!(!is_event_stream_content_type("application/json"));
    }

    #[test]
    fn test_connect_rejects_invalid_url() {
        let result = HttpStreamTransport::connect("bad", "not a url", &HashMap::new());
        assert!(matches!(result, Err(McpError::ConfigError { .. })));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_connect_failure() {
        // Port 9 (discard) on localhost is almost never listening.
        let mut transport =
            HttpStreamTransport::connect("down", "http://127.0.0.1:9/mcp", &HashMap::new())
                .unwrap();
        let err = transport.request("initialize", None).await.unwrap_err();
        assert!(matches!(
            err,
            McpError::ConnectFailed { .. } | McpError::TransportError { .. }
        ));
    }
}
