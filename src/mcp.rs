/// MCP Tool Surface + Transport Loop: the six named tools, dispatched
/// to a shared `Dispatcher`, served over one of three transports
/// selected by configuration.
///
/// This is a minimal ambient transport rather than a full protocol
/// implementation: it routes `{tool, arguments}` to a handler and
/// serializes the handler's result back out as a text content blob,
/// which is all a caller needs to drive `run_python_code` and friends.
/// Grounded on the teacher's synchronous, non-async style: the HTTP
/// modes below use `tiny_http` rather than pulling in an async runtime.
use crate::dependency_ticker::DependencyTicker;
use crate::dispatcher::Dispatcher;
use crate::types::{HealthStatus, Language, RunRequest, RunnerOptions};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};
use std::sync::Arc;

#[derive(Deserialize)]
struct ToolInvocation {
    tool: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Serialize)]
struct ToolResponse {
    content: Value,
    #[serde(rename = "isError")]
    is_error: bool,
}

#[derive(Deserialize)]
struct CodeArgs {
    code: String,
    #[serde(default)]
    preload: String,
    #[serde(default)]
    enable_network: bool,
}

/// Shared handle every transport loop dispatches tool calls through.
#[derive(Clone)]
pub struct McpServer {
    dispatcher: Dispatcher,
    deps: Arc<DependencyTicker>,
    started_at: std::time::Instant,
}

impl McpServer {
    pub fn new(dispatcher: Dispatcher, deps: Arc<DependencyTicker>) -> Self {
        Self {
            dispatcher,
            deps,
            started_at: std::time::Instant::now(),
        }
    }

    /// Route one invocation to its handler. Never panics: unknown tool
    /// names come back as a structured error response, matching the
    /// `IsError` contract every other failure mode uses.
    pub fn handle(&self, invocation: ToolInvocation) -> ToolResponse {
        let result = match invocation.tool.as_str() {
            "run_python_code" => self.run_code(Language::Python, invocation.arguments),
            "run_nodejs_code" => self.run_code(Language::Node, invocation.arguments),
            "list_python_dependencies" => self.list_dependencies(),
            "refresh_python_dependencies" => self.refresh_dependencies(),
            "update_python_dependencies" => self.update_dependencies(invocation.arguments),
            "health_check" => self.health_check(),
            other => Err(format!("unknown tool '{}'", other)),
        };

        match result {
            // A handler can report failure two ways: an `Err` (malformed
            // request, routing failure) or an `Ok` payload whose own
            // `success` field is false (the run completed but the code
            // didn't, e.g. TIMEOUT/SPAWN_FAILED/a nonzero exit). Both set
            // `isError`, matching the original's "response.Code != 0 ->
            // NewToolResultError" rule.
            Ok(content) => {
                let is_error = content.get("success").and_then(Value::as_bool) == Some(false);
                ToolResponse { content, is_error }
            }
            Err(message) => ToolResponse {
                content: json!({ "error": message, "timestamp": timestamp() }),
                is_error: true,
            },
        }
    }

    fn run_code(&self, language: Language, arguments: Value) -> Result<Value, String> {
        let args: CodeArgs = serde_json::from_value(arguments)
            .map_err(|e| format!("invalid arguments: {}", e))?;

        let mut request = RunRequest::new(language, args.code.into_bytes(), self.dispatcher.config().execution.worker_timeout);
        if !args.preload.is_empty() {
            request = request.with_preload(args.preload.into_bytes());
        }
        request = request.with_options(RunnerOptions {
            enable_network: args.enable_network && self.dispatcher.config().security.enable_network,
        });

        let result = self.dispatcher.submit(request);
        match result {
            Ok(run_result) if run_result.is_success() => Ok(json!({
                "success": true,
                "stdout": run_result.stdout,
                "stderr": run_result.stderr,
                "error": Value::Null,
                "timestamp": timestamp(),
                "language": language.as_str(),
            })),
            Ok(run_result) => Ok(json!({
                "success": false,
                "stdout": run_result.stdout,
                "stderr": run_result.stderr,
                "error": run_result.message,
                "timestamp": timestamp(),
                "language": language.as_str(),
            })),
            Err(e) => {
                // A timeout still carries whatever the child emitted
                // before the kill signal; every other error kind has no
                // partial output to offer.
                let (stdout, stderr) = match &e {
                    crate::types::SandboxError::Timeout { stdout, stderr, .. } => {
                        (stdout.clone(), stderr.clone())
                    }
                    _ => (String::new(), String::new()),
                };
                Ok(json!({
                    "success": false,
                    "stdout": stdout,
                    "stderr": stderr,
                    "error": e.to_string(),
                    "timestamp": timestamp(),
                    "language": language.as_str(),
                }))
            }
        }
    }

    fn list_dependencies(&self) -> Result<Value, String> {
        let snapshot = self.deps.current();
        Ok(json!({
            "success": true,
            "dependencies": snapshot.dependencies,
            "timestamp": timestamp(),
        }))
    }

    fn refresh_dependencies(&self) -> Result<Value, String> {
        let snapshot = self.deps.refresh_now();
        Ok(json!({
            "success": true,
            "dependencies": snapshot.dependencies,
            "timestamp": timestamp(),
        }))
    }

    fn update_dependencies(&self, _arguments: Value) -> Result<Value, String> {
        let requirements = self.dispatcher.config().python.requirements.clone();
        match self.deps.update(&requirements) {
            Ok(_) => Ok(json!({
                "success": true,
                "message": format!("updated {} package(s)", requirements.len()),
                "timestamp": timestamp(),
            })),
            Err(e) => Ok(json!({
                "success": false,
                "message": e.to_string(),
                "timestamp": timestamp(),
            })),
        }
    }

    fn health_check(&self) -> Result<Value, String> {
        let status = HealthStatus {
            service: self.dispatcher.config().mcp.name.clone(),
            status: "ok".to_string(),
            runtime: format!("{:?}", self.started_at.elapsed()),
            config: format!("{:?}", self.dispatcher.config().mcp.transport.mode),
        };
        Ok(json!({
            "success": true,
            "service": status.service,
            "status": status.status,
            "runtime": status.runtime,
            "config": status.config,
            "timestamp": timestamp(),
        }))
    }
}

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Line-framed stdio loop: one JSON `ToolInvocation` per input line, one
/// JSON `ToolResponse` per output line. Log output must never share
/// stdout with this stream, which is why `SandboxConfig::load` forces
/// `logging.show_log = false` whenever this mode is selected.
pub fn run_stdio(server: McpServer) -> io::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<ToolInvocation>(&line) {
            Ok(invocation) => server.handle(invocation),
            Err(e) => ToolResponse {
                content: json!({ "error": format!("malformed request: {}", e), "timestamp": timestamp() }),
                is_error: true,
            },
        };
        let encoded = serde_json::to_string(&response)?;
        writeln!(stdout, "{}", encoded)?;
        stdout.flush()?;
    }
    Ok(())
}

/// Minimal HTTP transport covering both the SSE-style (`/sse` event
/// stream + `/message` POST) and the stateless `/mcp` single-endpoint
/// variants. Since this service's tool calls are all short-lived
/// request/response pairs, both modes serve the same handler and only
/// differ in path and response content-type.
pub fn run_http(server: McpServer, port: u16) -> io::Result<()> {
    let server_http = tiny_http::Server::http(("0.0.0.0", port))
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

    log::info!("mcp http transport listening on port {}", port);

    for mut request in server_http.incoming_requests() {
        let path = request.url().to_string();
        let mut body = String::new();
        if request.as_reader().read_to_string(&mut body).is_err() {
            let _ = request.respond(tiny_http::Response::from_string("bad request").with_status_code(400));
            continue;
        }

        let response = match path.as_str() {
            "/mcp" | "/message" => match serde_json::from_str::<ToolInvocation>(&body) {
                Ok(invocation) => server.handle(invocation),
                Err(e) => ToolResponse {
                    content: json!({ "error": format!("malformed request: {}", e), "timestamp": timestamp() }),
                    is_error: true,
                },
            },
            "/sse" => ToolResponse {
                content: json!({ "error": "use POST /message to invoke a tool", "timestamp": timestamp() }),
                is_error: true,
            },
            _ => ToolResponse {
                content: json!({ "error": format!("unknown path '{}'", path), "timestamp": timestamp() }),
                is_error: true,
            },
        };

        let encoded = serde_json::to_string(&response).unwrap_or_default();
        let http_response = tiny_http::Response::from_string(encoded).with_header(
            tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap(),
        );
        let _ = request.respond(http_response);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SandboxConfig;
    use crate::dependency_ticker::DependencyTicker;

    fn test_server() -> McpServer {
        let config = Arc::new(SandboxConfig::default());
        let dispatcher = Dispatcher::new(Arc::clone(&config));
        let deps = Arc::new(DependencyTicker::new(config));
        McpServer::new(dispatcher, deps)
    }

    #[test]
    fn unknown_tool_name_reports_a_structured_error() {
        let server = test_server();
        let response = server.handle(ToolInvocation {
            tool: "delete_everything".to_string(),
            arguments: Value::Null,
        });
        assert!(response.is_error);
    }

    #[test]
    fn health_check_reports_success() {
        let server = test_server();
        let response = server.handle(ToolInvocation {
            tool: "health_check".to_string(),
            arguments: Value::Null,
        });
        assert!(!response.is_error);
        assert_eq!(response.content["status"], "ok");
    }

    #[test]
    fn list_dependencies_starts_empty_before_any_refresh() {
        let server = test_server();
        let response = server.handle(ToolInvocation {
            tool: "list_python_dependencies".to_string(),
            arguments: Value::Null,
        });
        assert!(!response.is_error);
        assert_eq!(response.content["dependencies"], json!([]));
    }

    #[test]
    fn run_code_with_missing_required_argument_is_a_bad_request() {
        let server = test_server();
        let response = server.handle(ToolInvocation {
            tool: "run_python_code".to_string(),
            arguments: json!({}),
        });
        assert!(response.is_error);
    }

    #[test]
    fn update_dependencies_failure_sets_is_error() {
        let mut config = SandboxConfig::default();
        config.python.path = "/nonexistent/python-interpreter".to_string();
        config.python.requirements = vec!["somepkg".to_string()];
        let config = Arc::new(config);
        let dispatcher = Dispatcher::new(Arc::clone(&config));
        let deps = Arc::new(DependencyTicker::new(config));
        let server = McpServer::new(dispatcher, deps);

        let response = server.handle(ToolInvocation {
            tool: "update_python_dependencies".to_string(),
            arguments: Value::Null,
        });
        assert!(response.is_error);
        assert_eq!(response.content["success"], false);
    }
}
