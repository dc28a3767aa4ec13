//! MCP server transport (C12): JSON-RPC 2.0 over stdin/stdout, speaking
//! the same wire protocol this codebase's client side would use against a
//! third-party MCP server — here, this process is the server being
//! connected to. One JSON object per line (newline-delimited JSON).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin, Stdout};

use super::{tool_definitions, ToolRegistry};

const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "waypoint";

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcErrorBody>,
}

#[derive(Debug, Serialize)]
struct JsonRpcErrorBody {
    code: i64,
    message: String,
}

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Runs the MCP server loop over `stdin`/`stdout` until the input stream
/// closes. Every request is handled independently; a malformed line
/// produces a JSON-RPC parse error response rather than terminating the loop.
pub async fn serve(registry: Arc<ToolRegistry>, stdin: Stdin, mut stdout: Stdout) -> std::io::Result<()> {
    let mut lines = BufReader::new(stdin).lines();

    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
            Ok(request) => handle_request(&registry, request).await,
            Err(err) => JsonRpcResponse {
                jsonrpc: "2.0",
                id: Value::Null,
                result: None,
                error: Some(JsonRpcErrorBody {
                    code: PARSE_ERROR,
                    message: format!("failed to parse request: {err}"),
                }),
            },
        };

        let Some(response) = response else {
            continue;
        };

        let mut payload = serde_json::to_vec(&response).unwrap_or_default();
        payload.push(b'\n');
        stdout.write_all(&payload).await?;
        stdout.flush().await?;
    }

    Ok(())
}

async fn handle_request(registry: &Arc<ToolRegistry>, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
    let id = request.id.clone();

    match request.method.as_str() {
        "notifications/initialized" => None,
        "initialize" => Some(ok_response(id, handle_initialize())),
        "tools/list" => Some(ok_response(id, handle_tools_list())),
        "tools/call" => Some(match handle_tools_call(registry, request.params).await {
            Ok(result) => ok_response(id, result),
            Err(err) => err_response(id, err),
        }),
        other => Some(JsonRpcResponse {
            jsonrpc: "2.0",
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(JsonRpcErrorBody {
                code: METHOD_NOT_FOUND,
                message: format!("unknown method: {other}"),
            }),
        }),
    }
}

fn ok_response(id: Option<Value>, result: Value) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0",
        id: id.unwrap_or(Value::Null),
        result: Some(result),
        error: None,
    }
}

fn err_response(id: Option<Value>, error: JsonRpcErrorBody) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0",
        id: id.unwrap_or(Value::Null),
        result: None,
        error: Some(error),
    }
}

fn handle_initialize() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {"tools": {}},
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        }
    })
}

fn handle_tools_list() -> Value {
    let tools: Vec<Value> = tool_definitions()
        .into_iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "inputSchema": tool.input_schema,
            })
        })
        .collect();
    json!({"tools": tools})
}

async fn handle_tools_call(
    registry: &Arc<ToolRegistry>,
    params: Value,
) -> Result<Value, JsonRpcErrorBody> {
    let params: ToolCallParams = serde_json::from_value(params).map_err(|err| JsonRpcErrorBody {
        code: INVALID_PARAMS,
        message: format!("invalid tools/call params: {err}"),
    })?;

    match registry.call(&params.name, params.arguments).await {
        Ok(result) => Ok(json!({
            "content": [{"type": "text", "text": result.to_string()}],
            "isError": false,
        })),
        Err(err) => Ok(json!({
            "content": [{"type": "text", "text": err.message()}],
            "isError": true,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_reports_protocol_version() {
        let result = handle_initialize();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
    }

    #[test]
    fn tools_list_includes_known_tool() {
        let result = handle_tools_list();
        let names: Vec<&str> = result["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"purchase_initiate"));
    }
}
