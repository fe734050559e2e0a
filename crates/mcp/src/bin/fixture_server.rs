//! Scriptable MCP server used by the stdio integration tests.

use clap::Parser;
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "mcp-fixture-server")]
struct Options {
    /// Tool names to advertise
    #[arg(
        long,
        value_delimiter = ',',
        default_values = [
            "echo", "fail", "hang", "late", "stall", "env", "rpc_error", "bad_error", "ping_back",
        ]
    )]
    tools: Vec<String>,

    /// Split tools/list into pages of this size
    #[arg(long)]
    page_size: Option<usize>,

    /// Answer initialize with an error
    #[arg(long)]
    fail_handshake: bool,

    /// Never answer initialize
    #[arg(long)]
    hang_handshake: bool,

    /// Exit immediately with status 3
    #[arg(long)]
    exit_on_start: bool,

    /// Keep running after stdin reaches EOF
    #[arg(long)]
    ignore_stdin_close: bool,

    /// Print a banner on stdout and noise on stderr
    #[arg(long)]
    chatty: bool,

    /// Write the process id here
    #[arg(long)]
    pid_file: Option<PathBuf>,
}

fn sleep_forever() -> ! {
    loop {
        std::thread::sleep(Duration::from_secs(60));
    }
}

fn send(out: &mut impl Write, message: &Value) -> io::Result<()> {
    writeln!(out, "{}", message)?;
    out.flush()
}

fn tool_schema(name: &str) -> Value {
    json!({
        "name": name,
        "description": format!("fixture tool {}", name),
        "inputSchema": { "type": "object", "properties": {} }
    })
}

fn text_result(text: impl Into<String>, is_error: bool) -> Value {
    json!({ "content": [{ "type": "text", "text": text.into() }], "isError": is_error })
}

fn main() -> io::Result<()> {
    let options = Options::parse();

    if let Some(path) = &options.pid_file {
        std::fs::write(path, std::process::id().to_string())?;
    }
    if options.exit_on_start {
        std::process::exit(3);
    }

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut out = io::stdout();

    if options.chatty {
        writeln!(out, "fixture server starting up")?;
        out.flush()?;
        eprintln!("fixture: debug noise on stderr");
    }

    while let Some(line) = lines.next() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let msg: Value = match serde_json::from_str(&line) {
            Ok(msg) => msg,
            Err(e) => {
                eprintln!("fixture: bad input {}: {}", line, e);
                continue;
            }
        };

        let method = msg["method"].as_str().unwrap_or_default().to_string();
        let id = msg.get("id").cloned().unwrap_or(Value::Null);
        if id.is_null() {
            // notification
            continue;
        }

        let reply = match method.as_str() {
            "initialize" if options.hang_handshake => continue,
            "initialize" if options.fail_handshake => json!({
                "jsonrpc": "2.0", "id": id,
                "error": { "code": -32000, "message": "handshake refused" }
            }),
            "initialize" => json!({
                "jsonrpc": "2.0", "id": id,
                "result": {
                    "protocolVersion": "2024-11-05",
                    "capabilities": { "tools": {} },
                    "serverInfo": { "name": "fixture", "version": "0.0.1" }
                }
            }),
            "tools/list" => {
                let start: usize = msg["params"]["cursor"]
                    .as_str()
                    .and_then(|c| c.parse().ok())
                    .unwrap_or(0);
                let size = options.page_size.unwrap_or(options.tools.len().max(1));
                let end = (start + size).min(options.tools.len());
                let tools: Vec<Value> = options.tools[start.min(end)..end]
                    .iter()
                    .map(|t| tool_schema(t))
                    .collect();
                let mut result = json!({ "tools": tools });
                if end < options.tools.len() {
                    result["nextCursor"] = json!(end.to_string());
                }
                json!({ "jsonrpc": "2.0", "id": id, "result": result })
            }
            "tools/call" => {
                let name = msg["params"]["name"].as_str().unwrap_or_default();
                let args = msg["params"]["arguments"].clone();
                match name {
                    "echo" => json!({ "jsonrpc": "2.0", "id": id, "result": text_result(args.to_string(), false) }),
                    "fail" => json!({ "jsonrpc": "2.0", "id": id, "result": text_result("boom", true) }),
                    "hang" => continue,
                    "late" => {
                        let ms = args["ms"].as_u64().unwrap_or(500);
                        std::thread::sleep(Duration::from_millis(ms));
                        json!({ "jsonrpc": "2.0", "id": id, "result": text_result("late reply", false) })
                    }
                    // stop reading stdin altogether
                    "stall" => sleep_forever(),
                    "env" => {
                        let vars: serde_json::Map<String, Value> =
                            std::env::vars().map(|(k, v)| (k, Value::String(v))).collect();
                        json!({ "jsonrpc": "2.0", "id": id, "result": text_result(Value::Object(vars).to_string(), false) })
                    }
                    "rpc_error" => json!({
                        "jsonrpc": "2.0", "id": id,
                        "error": { "code": -32602, "message": "invalid arguments" }
                    }),
                    "bad_error" => json!({ "jsonrpc": "2.0", "id": id, "error": { "code": -32000 } }),
                    "ping_back" => {
                        send(&mut out, &json!({ "jsonrpc": "2.0", "id": "srv-1", "method": "ping" }))?;
                        let pong: Value = match lines.next() {
                            Some(l) => serde_json::from_str(&l?).unwrap_or(Value::Null),
                            None => break,
                        };
                        send(&mut out, &json!({ "jsonrpc": "2.0", "method": "notifications/message", "params": { "level": "info" } }))?;
                        let answered = pong["id"] == "srv-1" && pong["result"].is_object();
                        json!({ "jsonrpc": "2.0", "id": id, "result": text_result(if answered { "pong received" } else { "no pong" }, !answered) })
                    }
                    other => json!({
                        "jsonrpc": "2.0", "id": id,
                        "error": { "code": -32601, "message": format!("unknown tool {}", other) }
                    }),
                }
            }
            other => json!({
                "jsonrpc": "2.0", "id": id,
                "error": { "code": -32601, "message": format!("unknown method {}", other) }
            }),
        };

        send(&mut out, &reply)?;
    }

    if options.ignore_stdin_close {
        sleep_forever();
    }

    Ok(())
}
