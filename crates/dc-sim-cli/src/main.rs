use std::io::{self, BufRead, Write};

use clap::Parser;
use serde::{Deserialize, Serialize};

use dc_sim::facade::{Action, Gateway};
use dc_sim::ConfigurationRaw;

fn init_logger() {
    use env_logger::Builder;
    Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Optional YAML configuration file applied before the first request.
    #[clap(short, long)]
    config: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request {
    Configure { config: ConfigurationRaw },
    Reset { seed: u64 },
    Step { action: ActionWire },
    Render,
    RenderJson,
    Close,
}

/// Wire encoding of the two action schemas: a bare integer
/// for the simple `target_vm_id` form, or a 4-element array for the
/// structured `[action_type, target_vm_id, target_host_id, vm_type_index]`
/// form.
#[derive(Deserialize)]
#[serde(untagged)]
enum ActionWire {
    Simple(i64),
    Structured([i64; 4]),
}

impl From<ActionWire> for Action {
    fn from(wire: ActionWire) -> Self {
        match wire {
            ActionWire::Simple(target_vm_id) => Action::Simple { target_vm_id },
            ActionWire::Structured([action_type, target_vm_id, target_host_id, vm_type_index]) => Action::Structured {
                action_type: action_type.clamp(0, u8::MAX as i64) as u8,
                target_vm_id,
                target_host_id,
                vm_type_index: vm_type_index.max(0) as u32,
            },
        }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum Response {
    Ok(serde_json::Value),
    Err { ok: bool, error: String },
}

fn err_response(message: impl Into<String>) -> Response {
    Response::Err {
        ok: false,
        error: message.into(),
    }
}

fn main() {
    init_logger();
    let args = Args::parse();

    let mut gateway = Gateway::new().expect("default configuration must validate");
    if let Some(path) = &args.config {
        let text = std::fs::read_to_string(path).unwrap_or_else(|e| {
            eprintln!("failed to read config {}: {}", path, e);
            std::process::exit(1);
        });
        let raw: ConfigurationRaw = serde_yaml::from_str(&text).unwrap_or_else(|e| {
            eprintln!("failed to parse config {}: {}", path, e);
            std::process::exit(1);
        });
        if let Err(e) = gateway.configure(raw) {
            eprintln!("invalid config {}: {}", path, e);
            std::process::exit(1);
        }
        log::info!("loaded initial configuration from {}", path);
    }

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("stdin read error: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(&line) {
            Ok(req) => handle(&mut gateway, req),
            Err(e) => err_response(format!("malformed request: {}", e)),
        };

        let _ = writeln!(out, "{}", serde_json::to_string(&response).unwrap());
        let _ = out.flush();

        if matches!(response, Response::Ok(ref v) if v.get("closed").is_some()) {
            break;
        }
    }
}

fn handle(gateway: &mut Gateway, req: Request) -> Response {
    match req {
        Request::Configure { config } => match gateway.configure(config) {
            Ok(()) => Response::Ok(serde_json::json!({"ok": true})),
            Err(e) => err_response(e.to_string()),
        },
        Request::Reset { seed } => match gateway.reset(seed) {
            Ok((observation, info)) => Response::Ok(serde_json::json!({"ok": true, "observation": observation, "info": info})),
            Err(e) => err_response(e.to_string()),
        },
        Request::Step { action } => match gateway.step(action.into()) {
            Ok(result) => Response::Ok(serde_json::json!({
                "ok": true,
                "observation": result.observation,
                "reward": result.reward,
                "terminated": result.terminated,
                "truncated": result.truncated,
                "info": result.info,
            })),
            Err(e) => err_response(e.to_string()),
        },
        Request::Render => Response::Ok(serde_json::json!({"ok": true, "render": gateway.render()})),
        Request::RenderJson => match gateway.render_json() {
            Ok(json) => Response::Ok(serde_json::json!({"ok": true, "render_json": json})),
            Err(e) => err_response(e.to_string()),
        },
        Request::Close => {
            gateway.close();
            Response::Ok(serde_json::json!({"ok": true, "closed": true}))
        }
    }
}
