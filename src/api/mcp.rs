use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::domain::{QueryError, ValidationError};
use crate::services::query_service::{QueryService, SearchRequest};

const PARSE_ERROR: i32 = -32700;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;

#[derive(Serialize, Deserialize, Debug)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Option<Value>,
    pub id: Option<Value>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<Value>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    fn failure(id: Option<Value>, code: i32, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data,
            }),
            id,
        }
    }
}

pub async fn start_server(query: Arc<QueryService>) {
    tracing::info!("Starting MCP Server (JSON-RPC over Stdio)...");

    let reader = BufReader::new(tokio::io::stdin());
    let writer = tokio::io::stdout();

    if let Err(e) = serve(reader, writer, &query).await {
        tracing::error!("MCP server stopped: {}", e);
    }
}

/// Answer newline-delimited JSON-RPC requests from `reader` until EOF.
pub async fn serve<R, W>(reader: R, mut writer: W, query: &QueryService) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<JsonRpcRequest>(input) {
            Ok(req) => handle_request(req, query),
            Err(e) => {
                tracing::error!("Failed to parse JSON-RPC: {}", e);
                Some(JsonRpcResponse::failure(
                    None,
                    PARSE_ERROR,
                    format!("Parse error: {}", e),
                    None,
                ))
            }
        };

        // Notifications get no response
        if let Some(response) = response {
            let output = serde_json::to_string(&response)?;
            writer.write_all(output.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
    }
    Ok(())
}

pub fn handle_request(req: JsonRpcRequest, query: &QueryService) -> Option<JsonRpcResponse> {
    let Some(id) = req.id else {
        tracing::debug!("Received notification: {}", req.method);
        return None;
    };
    let id = Some(id);

    let response = match req.method.as_str() {
        "initialize" => {
            // Echo the client's protocol version back
            let client_protocol_version = req
                .params
                .as_ref()
                .and_then(|p| p.get("protocolVersion"))
                .and_then(|v| v.as_str())
                .unwrap_or("2024-11-05");

            tracing::info!(
                "MCP client connected with protocol version: {}",
                client_protocol_version
            );

            JsonRpcResponse::success(
                id,
                json!({
                    "protocolVersion": client_protocol_version,
                    "capabilities": { "tools": {} },
                    "serverInfo": {
                        "name": "nadlan-mcp",
                        "version": env!("CARGO_PKG_VERSION")
                    }
                }),
            )
        }
        "tools/list" => JsonRpcResponse::success(id, tool_definitions()),
        "tools/call" => {
            let params = req.params.unwrap_or_else(|| json!({}));
            let name = params.get("name").and_then(|v| v.as_str()).unwrap_or("");
            let args = params.get("arguments").cloned().unwrap_or(Value::Null);
            call_tool(id, name, &args, query)
        }
        "ping" => JsonRpcResponse::success(id, json!({})),
        other => JsonRpcResponse::failure(
            id,
            METHOD_NOT_FOUND,
            format!("Method not found: {}", other),
            None,
        ),
    };

    Some(response)
}

fn call_tool(id: Option<Value>, name: &str, args: &Value, query: &QueryService) -> JsonRpcResponse {
    let result = match name {
        "search_listings" => SearchRequest::from_json(args)
            .map_err(QueryError::from)
            .and_then(|request| query.search(&request))
            .map(|response| to_value(&response)),
        "get_listing" => match args.get("listing_id").and_then(|v| v.as_str()) {
            Some(listing_id) => query.get(listing_id).map(|listing| to_value(&listing)),
            None => Err(ValidationError::new("listing_id", "required string").into()),
        },
        "catalog_summary" => Ok(to_value(&query.summary())),
        other => {
            return JsonRpcResponse::failure(
                id,
                METHOD_NOT_FOUND,
                format!("Unknown tool: {}", other),
                None,
            );
        }
    };

    match result {
        Ok(value) => JsonRpcResponse::success(id, text_content(&value, false)),
        Err(QueryError::Validation(e)) => JsonRpcResponse::failure(
            id,
            INVALID_PARAMS,
            e.to_string(),
            Some(json!({ "field": e.field })),
        ),
        Err(e @ QueryError::NotFound(_)) => {
            JsonRpcResponse::success(id, text_content(&json!({ "error": e.to_string() }), true))
        }
    }
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn text_content(value: &Value, is_error: bool) -> Value {
    let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    json!({
        "content": [ { "type": "text", "text": text } ],
        "structuredContent": value,
        "isError": is_error
    })
}

fn tool_definitions() -> Value {
    json!({
        "tools": [
            {
                "name": "search_listings",
                "description": "Search real-estate listings by transaction type, distance from a point, free text, price range, rooms, neighbourhood and amenities",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "transaction_type": {
                            "type": "string",
                            "enum": ["ForSale", "ForRent", "Unknown"]
                        },
                        "near": {
                            "type": "object",
                            "properties": {
                                "lat": { "type": "number" },
                                "lon": { "type": "number" },
                                "radius_km": { "type": "number", "exclusiveMinimum": 0 }
                            },
                            "required": ["lat", "lon", "radius_km"]
                        },
                        "text": { "type": "string", "description": "Case-insensitive match on description and address" },
                        "limit": { "type": "integer", "minimum": 0 },
                        "min_price": { "type": "number", "minimum": 0 },
                        "max_price": { "type": "number", "minimum": 0 },
                        "min_rooms": { "type": "number", "minimum": 0 },
                        "neighbourhoods": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "Listings in any of these neighbourhoods (case-insensitive)"
                        },
                        "has_parking": { "type": "boolean" },
                        "has_elevator": { "type": "boolean" },
                        "has_balcony": { "type": "boolean" },
                        "features": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "Other configured amenities every listing must have"
                        },
                        "sort_by": {
                            "type": "string",
                            "enum": ["distance", "price_asc", "price_desc"]
                        }
                    },
                    "additionalProperties": false
                }
            },
            {
                "name": "get_listing",
                "description": "Get a single listing by its id",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "listing_id": { "type": "string" }
                    },
                    "required": ["listing_id"]
                }
            },
            {
                "name": "catalog_summary",
                "description": "Catalog statistics: listing counts per transaction type and data-quality counts",
                "inputSchema": {
                    "type": "object",
                    "properties": {}
                }
            }
        ]
    })
}
