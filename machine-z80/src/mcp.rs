//! JSON-RPC control server for the machine.
//!
//! Reads newline-delimited JSON-RPC 2.0 requests from stdin and writes
//! responses to stdout. Lets scripts and agents load programs, run them
//! to a target cycle, and inspect any register, memory cell or port —
//! purely headless.

#![allow(clippy::cast_possible_truncation)]

use std::io::{self, BufRead, Write};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use emu_core::Observable;

use crate::snapshot::Snapshot;
use crate::Z80Machine;

// ---------------------------------------------------------------------------
// JSON-RPC types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RpcRequest {
    jsonrpc: String,
    method: String,
    #[serde(default)]
    params: JsonValue,
    id: JsonValue,
}

#[derive(Serialize)]
struct RpcResponse {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
    id: JsonValue,
}

#[derive(Serialize)]
struct RpcError {
    code: i32,
    message: String,
}

impl RpcResponse {
    fn success(id: JsonValue, result: JsonValue) -> Self {
        Self {
            jsonrpc: "2.0",
            result: Some(result),
            error: None,
            id,
        }
    }

    fn error(id: JsonValue, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0",
            result: None,
            error: Some(RpcError { code, message }),
            id,
        }
    }
}

/// Invalid-params helper.
fn invalid_params(id: JsonValue, what: &str) -> RpcResponse {
    RpcResponse::error(id, -32602, format!("Invalid params: {what}"))
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// JSON-RPC server wrapping a machine instance.
pub struct McpServer {
    machine: Z80Machine,
}

impl McpServer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            machine: Z80Machine::new(),
        }
    }

    /// Run the server loop: read JSON-RPC from stdin, write responses
    /// to stdout, until stdin closes.
    pub fn run(&mut self) {
        let stdin = io::stdin();
        let stdout = io::stdout();
        let mut stdout = stdout.lock();

        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let response = self.handle_line(line);
            let _ = writeln!(
                stdout,
                "{}",
                serde_json::to_string(&response).unwrap_or_default()
            );
            let _ = stdout.flush();
        }
    }

    /// Parse and dispatch one request line.
    fn handle_line(&mut self, line: &str) -> RpcResponse {
        let request: RpcRequest = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                log::warn!("bad request: {e}");
                return RpcResponse::error(JsonValue::Null, -32700, format!("Parse error: {e}"));
            }
        };

        if request.jsonrpc != "2.0" {
            return RpcResponse::error(request.id, -32600, "Invalid JSON-RPC version".to_string());
        }

        self.dispatch(&request.method, &request.params, request.id)
    }

    /// Dispatch a method call to the appropriate handler.
    fn dispatch(&mut self, method: &str, params: &JsonValue, id: JsonValue) -> RpcResponse {
        match method {
            "reset" => self.handle_reset(id),
            "load_program" => self.handle_load_program(params, id),
            "step" => self.handle_step(params, id),
            "run_until_cycle" => self.handle_run_until_cycle(params, id),
            "query" => self.handle_query(params, id),
            "peek" => self.handle_peek(params, id),
            "poke" => self.handle_poke(params, id),
            "read_port" => self.handle_read_port(params, id),
            "write_port" => self.handle_write_port(params, id),
            "snapshot" => self.handle_snapshot(id),
            _ => RpcResponse::error(id, -32601, format!("Unknown method: {method}")),
        }
    }

    // === Handlers ===

    fn handle_reset(&mut self, id: JsonValue) -> RpcResponse {
        self.machine.reset();
        RpcResponse::success(id, serde_json::json!({"status": "ok"}))
    }

    /// `{"data": "<base64>", "address": 0}`
    fn handle_load_program(&mut self, params: &JsonValue, id: JsonValue) -> RpcResponse {
        let Some(data) = params.get("data").and_then(JsonValue::as_str) else {
            return invalid_params(id, "missing 'data'");
        };
        let address = params.get("address").and_then(JsonValue::as_u64).unwrap_or(0);
        if address > 0xFFFF {
            return invalid_params(id, "'address' out of range");
        }

        match BASE64.decode(data) {
            Ok(bytes) => {
                self.machine.load_program(&bytes, address as u16);
                RpcResponse::success(id, serde_json::json!({"loaded": bytes.len()}))
            }
            Err(e) => invalid_params(id, &format!("'data' is not base64: {e}")),
        }
    }

    /// `{"count": 1}` — execute N instructions.
    fn handle_step(&mut self, params: &JsonValue, id: JsonValue) -> RpcResponse {
        let count = params.get("count").and_then(JsonValue::as_u64).unwrap_or(1);
        let mut t_states = 0u64;
        for _ in 0..count {
            t_states += u64::from(self.machine.step());
        }
        RpcResponse::success(
            id,
            serde_json::json!({
                "t_states": t_states,
                "pc": self.machine.cpu().regs.pc,
                "halted": self.machine.is_halted(),
            }),
        )
    }

    /// `{"target": 100000}`
    fn handle_run_until_cycle(&mut self, params: &JsonValue, id: JsonValue) -> RpcResponse {
        let Some(target) = params.get("target").and_then(JsonValue::as_u64) else {
            return invalid_params(id, "missing 'target'");
        };
        self.machine.run_until_cycle(target);
        RpcResponse::success(
            id,
            serde_json::json!({
                "cycles": self.machine.cycle_count(),
                "pc": self.machine.cpu().regs.pc,
                "halted": self.machine.is_halted(),
            }),
        )
    }

    /// `{"path": "hl"}` — query any Observable path on the CPU.
    fn handle_query(&mut self, params: &JsonValue, id: JsonValue) -> RpcResponse {
        let Some(path) = params.get("path").and_then(JsonValue::as_str) else {
            return invalid_params(id, "missing 'path'");
        };
        match self.machine.cpu().query(path) {
            Some(value) => RpcResponse::success(
                id,
                serde_json::json!({"path": path, "value": value_to_json(&value)}),
            ),
            None => RpcResponse::error(id, -32000, format!("Unknown path: {path}")),
        }
    }

    /// `{"address": 32768}`
    fn handle_peek(&mut self, params: &JsonValue, id: JsonValue) -> RpcResponse {
        let Some(address) = params.get("address").and_then(JsonValue::as_u64) else {
            return invalid_params(id, "missing 'address'");
        };
        if address > 0xFFFF {
            return invalid_params(id, "'address' out of range");
        }
        let value = self.machine.read_memory(address as u16);
        RpcResponse::success(id, serde_json::json!({"address": address, "value": value}))
    }

    /// `{"address": 32768, "value": 255}`
    fn handle_poke(&mut self, params: &JsonValue, id: JsonValue) -> RpcResponse {
        let (Some(address), Some(value)) = (
            params.get("address").and_then(JsonValue::as_u64),
            params.get("value").and_then(JsonValue::as_u64),
        ) else {
            return invalid_params(id, "missing 'address' or 'value'");
        };
        if address > 0xFFFF || value > 0xFF {
            return invalid_params(id, "'address' or 'value' out of range");
        }
        self.machine.write_memory(address as u16, value as u8);
        RpcResponse::success(id, serde_json::json!({"status": "ok"}))
    }

    /// `{"port": 254}`
    fn handle_read_port(&mut self, params: &JsonValue, id: JsonValue) -> RpcResponse {
        let Some(port) = params.get("port").and_then(JsonValue::as_u64) else {
            return invalid_params(id, "missing 'port'");
        };
        if port > 0xFF {
            return invalid_params(id, "'port' out of range");
        }
        let value = self.machine.read_port(port as u8);
        RpcResponse::success(id, serde_json::json!({"port": port, "value": value}))
    }

    /// `{"port": 254, "value": 1}`
    fn handle_write_port(&mut self, params: &JsonValue, id: JsonValue) -> RpcResponse {
        let (Some(port), Some(value)) = (
            params.get("port").and_then(JsonValue::as_u64),
            params.get("value").and_then(JsonValue::as_u64),
        ) else {
            return invalid_params(id, "missing 'port' or 'value'");
        };
        if port > 0xFF || value > 0xFF {
            return invalid_params(id, "'port' or 'value' out of range");
        }
        self.machine.write_port(port as u8, value as u8);
        RpcResponse::success(id, serde_json::json!({"status": "ok"}))
    }

    fn handle_snapshot(&mut self, id: JsonValue) -> RpcResponse {
        let snap = Snapshot::capture(&mut self.machine);
        match serde_json::to_value(&snap) {
            Ok(value) => RpcResponse::success(id, value),
            Err(e) => RpcResponse::error(id, -32000, format!("Snapshot failed: {e}")),
        }
    }
}

impl Default for McpServer {
    fn default() -> Self {
        Self::new()
    }
}

fn value_to_json(value: &emu_core::Value) -> JsonValue {
    match *value {
        emu_core::Value::Bool(v) => serde_json::json!(v),
        emu_core::Value::U8(v) => serde_json::json!(v),
        emu_core::Value::U16(v) => serde_json::json!(v),
        emu_core::Value::U64(v) => serde_json::json!(v),
    }
}
