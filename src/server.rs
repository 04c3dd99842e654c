//! MCP JSON-RPC dispatcher over stdio.
//!
//! Reads JSON-RPC 2.0 requests from stdin (one per line) and writes
//! responses to stdout, strictly in arrival order. Logs go to stderr only;
//! stdout never carries anything but protocol frames.
//!
//! ## Supported methods
//!
//! | Method        | Description                                   |
//! |---------------|-----------------------------------------------|
//! | `initialize`  | Handshake, returns capabilities               |
//! | `initialized` | Client-ready notification (no response)       |
//! | `tools/list`  | List registered tool definitions              |
//! | `tools/call`  | Execute a tool and return its content         |
//!
//! ## Error tiers
//!
//! Protocol failures (malformed envelope, unknown method, unknown tool)
//! produce JSON-RPC error objects. Tool-logic failures (validation, remote
//! errors) produce a *successful* response whose payload sets `isError` -
//! the host shows those to the end user and the session continues.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::protocol::{
    Capabilities, Implementation, InitializeParams, InitializeResult, Request, Response,
    ToolCallParams, ToolCallResult, ToolsCapability, ToolsListResult, Tool, INTERNAL_ERROR,
    INVALID_PARAMS, INVALID_REQUEST, JSONRPC_VERSION, METHOD_NOT_FOUND, PARSE_ERROR,
    PROTOCOL_VERSION, SERVER_NAME, SERVER_VERSION,
};

/// An async tool handler: takes the loop's cancellation token and the raw
/// call arguments, returns content or an internal error. Internal errors are
/// rendered as error-flagged tool results, never as protocol errors.
pub type ToolHandler = Box<
    dyn Fn(CancellationToken, Value) -> BoxFuture<'static, anyhow::Result<ToolCallResult>>
        + Send
        + Sync,
>;

struct RegisteredTool {
    tool: Tool,
    handler: Arc<ToolHandler>,
}

/// The MCP server: a tool registry plus per-session state.
///
/// Registration happens once at startup; the RwLock permits concurrent
/// lookups during dispatch while serializing writes.
pub struct Server {
    tools: RwLock<HashMap<String, RegisteredTool>>,
    /// Set by a successful `initialize`. Deliberately not enforced before
    /// `tools/call`: out-of-order clients are tolerated (and logged).
    initialized: AtomicBool,
}

/// Why the dispatch loop stopped, other than clean end-of-input.
#[derive(Debug)]
pub enum ServeError {
    /// The cancellation token fired (e.g. SIGINT/SIGTERM).
    Cancelled,
    /// Reading stdin or writing stdout failed.
    Io(std::io::Error),
}

impl std::fmt::Display for ServeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServeError::Cancelled => write!(f, "dispatch loop cancelled"),
            ServeError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for ServeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServeError::Io(e) => Some(e),
            ServeError::Cancelled => None,
        }
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl Server {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            initialized: AtomicBool::new(false),
        }
    }

    /// Register a tool. Last registration wins on name collision.
    pub async fn register_tool(&self, tool: Tool, handler: ToolHandler) {
        debug!(name = %tool.name, "registered tool");
        self.tools.write().await.insert(
            tool.name.clone(),
            RegisteredTool {
                tool,
                handler: Arc::new(handler),
            },
        );
    }

    /// True once a client has completed the `initialize` handshake.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Relaxed)
    }

    /// Run the server on stdin/stdout until EOF or cancellation.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), ServeError> {
        self.run_with_io(shutdown, tokio::io::stdin(), tokio::io::stdout())
            .await
    }

    /// Run the server with custom I/O streams (tests drive this directly).
    ///
    /// Returns `Ok(())` on clean end-of-input, `Err(Cancelled)` when the
    /// token fires, `Err(Io)` on a stream failure. Cancellation is checked
    /// before each line is processed, so a cancelled loop never emits a
    /// partial response for an unprocessed line.
    pub async fn run_with_io<R, W>(
        &self,
        shutdown: CancellationToken,
        input: R,
        mut output: W,
    ) -> Result<(), ServeError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut reader = BufReader::new(input);
        let mut line = String::new();

        info!(version = SERVER_VERSION, "server starting");

        loop {
            line.clear();
            let read = tokio::select! {
                biased;
                () = shutdown.cancelled() => return Err(ServeError::Cancelled),
                read = reader.read_line(&mut line) => read.map_err(ServeError::Io)?,
            };
            if read == 0 {
                return Ok(()); // EOF
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            if let Some(response) = self.handle_message(&shutdown, trimmed).await {
                write_response(&mut output, &response)
                    .await
                    .map_err(ServeError::Io)?;
            }
        }
    }

    /// Parse and dispatch one request line. `None` means no response is
    /// emitted (the `initialized` notification).
    async fn handle_message(&self, shutdown: &CancellationToken, raw: &str) -> Option<Response> {
        let request: Request = match serde_json::from_str(raw) {
            Ok(request) => request,
            Err(e) => {
                error!(error = %e, "failed to parse request");
                return Some(Response::error(None, PARSE_ERROR, "Parse error"));
            }
        };

        if request.jsonrpc != JSONRPC_VERSION {
            return Some(Response::error(
                request.id,
                INVALID_REQUEST,
                "Invalid JSON-RPC version",
            ));
        }

        debug!(method = %request.method, "handling request");

        let Request {
            id, method, params, ..
        } = request;

        match method.as_str() {
            "initialize" => Some(self.handle_initialize(id, params)),
            "initialized" => {
                // Notification: acknowledged silently, never answered
                debug!("client reported initialization complete");
                None
            }
            "tools/list" => Some(self.handle_tools_list(id).await),
            "tools/call" => Some(self.handle_tools_call(shutdown, id, params).await),
            other => Some(Response::error(
                id,
                METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            )),
        }
    }

    fn handle_initialize(&self, id: Option<Value>, params: Option<Value>) -> Response {
        let params: InitializeParams = match params.and_then(|p| serde_json::from_value(p).ok()) {
            Some(params) => params,
            None => return Response::error(id, INVALID_PARAMS, "Invalid initialize params"),
        };

        self.initialized.store(true, Ordering::Relaxed);

        info!(
            client = %params.client_info.name,
            client_version = %params.client_info.version,
            protocol_version = %params.protocol_version,
            "initialized"
        );

        success_or_internal(
            id,
            InitializeResult {
                protocol_version: PROTOCOL_VERSION.to_string(),
                capabilities: Capabilities {
                    tools: Some(ToolsCapability::default()),
                },
                server_info: Implementation {
                    name: SERVER_NAME.to_string(),
                    version: SERVER_VERSION.to_string(),
                },
            },
        )
    }

    async fn handle_tools_list(&self, id: Option<Value>) -> Response {
        let tools = self.tools.read().await;
        let tools: Vec<Tool> = tools.values().map(|entry| entry.tool.clone()).collect();
        success_or_internal(id, ToolsListResult { tools })
    }

    async fn handle_tools_call(
        &self,
        shutdown: &CancellationToken,
        id: Option<Value>,
        params: Option<Value>,
    ) -> Response {
        let params: ToolCallParams = match params.and_then(|p| serde_json::from_value(p).ok()) {
            Some(params) => params,
            None => return Response::error(id, INVALID_PARAMS, "Invalid tools/call params"),
        };

        if !self.is_initialized() {
            warn!(tool = %params.name, "tools/call before initialize, serving anyway");
        }

        let handler = {
            let tools = self.tools.read().await;
            match tools.get(&params.name) {
                Some(entry) => Arc::clone(&entry.handler),
                None => {
                    return Response::error(
                        id,
                        INVALID_PARAMS,
                        format!("Unknown tool: {}", params.name),
                    )
                }
            }
        };

        let args = match params.arguments {
            Some(value) if !value.is_null() => value,
            _ => json!({}),
        };

        debug!(tool = %params.name, "calling tool");

        let result = match handler(shutdown.clone(), args).await {
            Ok(result) => result,
            Err(e) => {
                error!(tool = %params.name, "tool error: {e:#}");
                ToolCallResult::error(format!("{e:#}"))
            }
        };

        success_or_internal(id, result)
    }
}

fn success_or_internal(id: Option<Value>, result: impl Serialize) -> Response {
    match serde_json::to_value(result) {
        Ok(value) => Response::success(id, value),
        Err(e) => Response::error(id, INTERNAL_ERROR, e.to_string()),
    }
}

/// Write one response line, newline-terminated and flushed immediately.
async fn write_response<W: AsyncWrite + Unpin>(
    output: &mut W,
    response: &Response,
) -> std::io::Result<()> {
    let mut data = serde_json::to_vec(response)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    data.push(b'\n');
    output.write_all(&data).await?;
    output.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Content;

    const INIT_REQUEST: &str = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","capabilities":{},"clientInfo":{"name":"test","version":"1.0"}}}"#;

    fn echo_tool() -> (Tool, ToolHandler) {
        (
            Tool {
                name: "echo".to_string(),
                description: "Echo the input".to_string(),
                input_schema: json!({ "type": "object" }),
            },
            Box::new(|_shutdown, args| {
                Box::pin(async move { Ok(ToolCallResult::text(format!("echoed: {args}"))) })
            }),
        )
    }

    fn failing_tool() -> (Tool, ToolHandler) {
        (
            Tool {
                name: "broken".to_string(),
                description: "Always fails".to_string(),
                input_schema: json!({ "type": "object" }),
            },
            Box::new(|_shutdown, _args| {
                Box::pin(async move { Err(anyhow::anyhow!("remote service unreachable")) })
            }),
        )
    }

    /// Feed `input` through the dispatch loop and collect the output lines.
    async fn run_lines(server: &Server, input: &str) -> Vec<Response> {
        let mut output = Vec::new();
        server
            .run_with_io(CancellationToken::new(), input.as_bytes(), &mut output)
            .await
            .unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    fn tool_result(response: &Response) -> ToolCallResult {
        serde_json::from_value(response.result.clone().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn initialize_returns_server_identity() {
        let server = Server::new();
        let responses = run_lines(&server, &format!("{INIT_REQUEST}\n")).await;

        assert_eq!(responses.len(), 1);
        let response = &responses[0];
        assert!(response.error.is_none());
        assert_eq!(response.id, Some(json!(1)));
        let result = response.result.as_ref().unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);
        assert!(server.is_initialized());
    }

    #[tokio::test]
    async fn initialize_without_params_is_invalid() {
        let server = Server::new();
        let responses =
            run_lines(&server, "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"initialize\"}\n").await;

        let error = responses[0].error.as_ref().unwrap();
        assert_eq!(error.code, INVALID_PARAMS);
        assert!(!server.is_initialized());
    }

    #[tokio::test]
    async fn initialized_notification_produces_no_output() {
        let server = Server::new();
        let input = format!(
            "{INIT_REQUEST}\n{}\n{}\n",
            r#"{"jsonrpc":"2.0","method":"initialized"}"#,
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list","params":{}}"#,
        );
        let responses = run_lines(&server, &input).await;

        // initialize and tools/list answered; initialized silent
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[1].id, Some(json!(2)));
    }

    #[tokio::test]
    async fn blank_lines_are_skipped() {
        let server = Server::new();
        let input = format!("\n   \n{INIT_REQUEST}\n\n");
        let responses = run_lines(&server, &input).await;
        assert_eq!(responses.len(), 1);
    }

    #[tokio::test]
    async fn parse_error_has_no_id() {
        let server = Server::new();
        let responses = run_lines(&server, "{invalid json\n").await;

        let response = &responses[0];
        assert_eq!(response.error.as_ref().unwrap().code, PARSE_ERROR);
        assert_eq!(response.id, None);
    }

    #[tokio::test]
    async fn wrong_jsonrpc_version_is_rejected() {
        let server = Server::new();
        let responses =
            run_lines(&server, "{\"jsonrpc\":\"1.0\",\"id\":7,\"method\":\"tools/list\"}\n").await;

        let response = &responses[0];
        assert_eq!(response.error.as_ref().unwrap().code, INVALID_REQUEST);
        assert_eq!(response.id, Some(json!(7)));
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let server = Server::new();
        let responses =
            run_lines(&server, "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"unknown/method\"}\n")
                .await;

        let error = responses[0].error.as_ref().unwrap();
        assert_eq!(error.code, METHOD_NOT_FOUND);
        assert!(error.message.contains("unknown/method"));
    }

    #[tokio::test]
    async fn response_id_echoes_null_and_string_ids() {
        let server = Server::new();
        let input = concat!(
            "{\"jsonrpc\":\"2.0\",\"id\":null,\"method\":\"tools/list\"}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":\"abc\",\"method\":\"tools/list\"}\n",
        );
        let responses = run_lines(&server, input).await;

        assert_eq!(responses[0].id, Some(Value::Null));
        assert_eq!(responses[1].id, Some(json!("abc")));
    }

    #[tokio::test]
    async fn tools_list_returns_registered_tools_idempotently() {
        let server = Server::new();
        let (tool, handler) = echo_tool();
        server.register_tool(tool, handler).await;

        let request = "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/list\"}\n";
        let responses = run_lines(&server, &format!("{request}{request}")).await;

        let names = |response: &Response| -> Vec<String> {
            let mut names: Vec<String> = response.result.as_ref().unwrap()["tools"]
                .as_array()
                .unwrap()
                .iter()
                .map(|t| t["name"].as_str().unwrap().to_string())
                .collect();
            names.sort();
            names
        };
        assert_eq!(names(&responses[0]), vec!["echo"]);
        assert_eq!(names(&responses[0]), names(&responses[1]));
    }

    #[tokio::test]
    async fn tools_call_dispatches_to_handler() {
        let server = Server::new();
        let (tool, handler) = echo_tool();
        server.register_tool(tool, handler).await;

        let input = format!(
            "{INIT_REQUEST}\n{}\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"echo","arguments":{"msg":"hello"}}}"#,
        );
        let responses = run_lines(&server, &input).await;

        let result = tool_result(&responses[1]);
        assert!(!result.is_error);
        assert_eq!(
            result.content[0],
            Content::text("echoed: {\"msg\":\"hello\"}")
        );
    }

    #[tokio::test]
    async fn unknown_tool_is_invalid_params_not_tool_error() {
        let server = Server::new();
        let responses = run_lines(
            &server,
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/call\",\"params\":{\"name\":\"nope\",\"arguments\":{}}}\n",
        )
        .await;

        let response = &responses[0];
        assert!(response.result.is_none());
        let error = response.error.as_ref().unwrap();
        assert_eq!(error.code, INVALID_PARAMS);
        assert!(error.message.contains("nope"));
    }

    #[tokio::test]
    async fn malformed_call_params_are_invalid_params() {
        let server = Server::new();
        let responses = run_lines(
            &server,
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/call\",\"params\":\"not an object\"}\n",
        )
        .await;

        assert_eq!(responses[0].error.as_ref().unwrap().code, INVALID_PARAMS);
    }

    #[tokio::test]
    async fn handler_failure_is_error_flagged_result_not_protocol_error() {
        let server = Server::new();
        let (tool, handler) = failing_tool();
        server.register_tool(tool, handler).await;

        let responses = run_lines(
            &server,
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/call\",\"params\":{\"name\":\"broken\",\"arguments\":{}}}\n",
        )
        .await;

        let response = &responses[0];
        assert!(response.error.is_none(), "tool failure must not be an RPC error");
        let result = tool_result(response);
        assert!(result.is_error);
        assert_eq!(
            result.content[0].as_text().unwrap(),
            "remote service unreachable"
        );
    }

    #[tokio::test]
    async fn uninitialized_tools_call_is_served() {
        // Out-of-order clients are tolerated: no initialize first.
        let server = Server::new();
        let (tool, handler) = echo_tool();
        server.register_tool(tool, handler).await;

        let responses = run_lines(
            &server,
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/call\",\"params\":{\"name\":\"echo\",\"arguments\":{}}}\n",
        )
        .await;

        let response = &responses[0];
        assert!(response.error.is_none());
        assert!(!tool_result(response).is_error);
    }

    #[tokio::test]
    async fn missing_arguments_default_to_empty_object() {
        let server = Server::new();
        let (tool, handler) = echo_tool();
        server.register_tool(tool, handler).await;

        let responses = run_lines(
            &server,
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/call\",\"params\":{\"name\":\"echo\"}}\n",
        )
        .await;

        let result = tool_result(&responses[0]);
        assert_eq!(result.content[0], Content::text("echoed: {}"));
    }

    #[tokio::test]
    async fn cancelled_token_stops_loop_before_processing() {
        let server = Server::new();
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let mut output = Vec::new();
        let result = server
            .run_with_io(shutdown, INIT_REQUEST.as_bytes(), &mut output)
            .await;

        assert!(matches!(result, Err(ServeError::Cancelled)));
        assert!(output.is_empty(), "no partial response after cancellation");
    }

    #[tokio::test]
    async fn eof_returns_ok() {
        let server = Server::new();
        let mut output = Vec::new();
        let result = server
            .run_with_io(CancellationToken::new(), "".as_bytes(), &mut output)
            .await;
        assert!(result.is_ok());
        assert!(output.is_empty());
    }
}
