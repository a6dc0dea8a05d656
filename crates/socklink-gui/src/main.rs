mod client;
mod gui_app;
mod state;

use std::sync::{Arc, Mutex};

use socklink_core::SessionConfig;
use state::GuiState;
use tokio::sync::mpsc;

fn load_config() -> SessionConfig {
    let loaded = match std::env::var("SOCKLINK_CONFIG") {
        Ok(path) => std::fs::read_to_string(&path)
            .map_err(|e| format!("{path}: {e}"))
            .and_then(|json| SessionConfig::from_json(&json).map_err(|e| format!("{path}: {e}"))),
        Err(_) => {
            let config = SessionConfig::from_env();
            config.validate().map(|()| config).map_err(|e| e.to_string())
        }
    };
    loaded.unwrap_or_else(|e| {
        tracing::warn!("Ignoring configuration ({}); using defaults", e);
        SessionConfig::default()
    })
}

fn main() -> eframe::Result<()> {
    // ── Logging ───────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .compact()
        .init();

    let config = load_config();

    // ── Shared state ──────────────────────────────────────────────────────
    let shared_state: state::SharedState =
        Arc::new(Mutex::new(GuiState::new(config.endpoint.clone())));

    // ── Window options ────────────────────────────────────────────────────
    let window_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("SockLink")
            .with_inner_size([520.0, 680.0])
            .with_min_inner_size([400.0, 480.0])
            .with_resizable(true),
        ..Default::default()
    };

    eframe::run_native(
        "SockLink",
        window_options,
        Box::new(move |cc| {
            let state_bg = Arc::clone(&shared_state);
            let ctx_bg   = cc.egui_ctx.clone();
            let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

            // Session runs on its own tokio runtime, off the egui main thread.
            let spawned = std::thread::Builder::new()
                .name("socklink-session".into())
                .spawn(move || {
                    let rt = match tokio::runtime::Builder::new_multi_thread()
                        .worker_threads(2)
                        .enable_all()
                        .build()
                    {
                        Ok(rt) => rt,
                        Err(e) => {
                            tracing::error!("Failed to build tokio runtime: {}", e);
                            return;
                        }
                    };
                    rt.block_on(client::run(config, state_bg, ctx_bg, cmd_rx));
                });
            if let Err(e) = spawned {
                tracing::error!("Failed to spawn session thread: {}", e);
            }

            Ok(Box::new(gui_app::SockLinkApp::new(cc, shared_state, cmd_tx)))
        }),
    )
}
