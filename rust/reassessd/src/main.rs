mod backend;
mod config;
mod ipc;
mod logging;
mod pages;
mod workflow;

use serde_json::json;
use std::io::{self, BufRead, Write};
use tracing::{error, info, warn};

fn main() {
    logging::init();

    let config = match config::Config::load() {
        Ok(c) => c,
        Err(e) => {
            let message = format!("{e:#}");
            warn!(error = %message, "config not loaded; using defaults");
            config::Config::default()
        }
    };
    info!(
        version = env!("CARGO_PKG_VERSION"),
        export_dir = %config.export_dir.to_string_lossy(),
        "reassessd ready"
    );
    let mut state = ipc::AppState::new(config);

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "stdin read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                warn!(error = %e, "unparsable request line");
                let resp = json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    info!("stdin closed; exiting");
}
