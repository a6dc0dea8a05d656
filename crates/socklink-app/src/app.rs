use std::sync::Arc;

use anyhow::{Context, Result};
use socklink_core::{
    ConnectionState, InboundMessage, Payload, PingOutcome, SendOutcome, SendReport, SessionConfig,
};
use socklink_session::{EventSink, Fanout, Session, TracingSink};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::command::{Command, HELP};

/// Headless client loop.
///
/// # Configuration
/// `SOCKLINK_CONFIG` names a JSON file with the full [`SessionConfig`];
/// otherwise the individual `SOCKLINK_*` variables are read (see
/// [`SessionConfig::from_env`]).
///
/// # Flow
/// 1. Build one [`Session`] with a console sink and a tracing sink
/// 2. Read commands from stdin, one per line
/// 3. Long-running operations (connect, disconnect, ping) run on their own
///    task so `disconnect` can interrupt a pending handshake
/// 4. `quit` or EOF disconnects and exits
pub async fn run() -> Result<()> {
    let config = load_config()?;
    info!(
        "Endpoint {} | periodic ping: {}",
        config.endpoint,
        if config.enable_periodic_ping {
            format!("every {} ms", config.ping_interval_ms)
        } else {
            "off".to_owned()
        }
    );

    let sinks = Fanout::new()
        .with(Arc::new(ConsoleSink))
        .with(Arc::new(TracingSink));
    let session = Arc::new(Session::new(config, Arc::new(sinks)));

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(msg) if msg.is_empty() => continue,
            Err(msg) => {
                println!("{msg}");
                continue;
            }
        };

        match command {
            Command::Connect(url) => spawn_connect(&session, url),
            Command::Disconnect => spawn_disconnect(&session),
            Command::Toggle => {
                if session.current_state().can_connect() {
                    spawn_connect(&session, None);
                } else {
                    spawn_disconnect(&session);
                }
            }
            Command::Send(text) => {
                let session = Arc::clone(&session);
                tokio::spawn(async move {
                    // Rejections and write faults; successful sends print through the sink.
                    if let Err(e) = session.send(&text).await.and_then(SendOutcome::into_result) {
                        println!("! {e}");
                    }
                });
            }
            Command::Ping => {
                let session = Arc::clone(&session);
                tokio::spawn(async move {
                    if let Err(e) = session.ping().await {
                        println!("! {e}");
                    }
                });
            }
            Command::State => println!("state: {}", session.current_state()),
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
        }
    }

    session.disconnect().await?;
    Ok(())
}

fn spawn_connect(session: &Arc<Session>, url: Option<String>) {
    let session = Arc::clone(session);
    tokio::spawn(async move {
        let result = match url {
            Some(url) => session.connect(&url).await,
            None => session.connect_default().await,
        };
        if let Err(e) = result {
            println!("! {e}");
        }
    });
}

fn spawn_disconnect(session: &Arc<Session>) {
    let session = Arc::clone(session);
    tokio::spawn(async move {
        if let Err(e) = session.disconnect().await {
            warn!("Disconnect failed: {}", e);
        }
    });
}

fn load_config() -> Result<SessionConfig> {
    match std::env::var("SOCKLINK_CONFIG") {
        Ok(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config file {path}"))?;
            SessionConfig::from_json(&json).with_context(|| format!("parsing config file {path}"))
        }
        Err(_) => {
            let config = SessionConfig::from_env();
            config.validate().context("invalid SOCKLINK_* environment")?;
            Ok(config)
        }
    }
}

// ── Console sink ──────────────────────────────────────────────────────────────

/// Human-facing echo of session events on stdout.
struct ConsoleSink;

impl EventSink for ConsoleSink {
    fn on_state_changed(&self, state: &ConnectionState) {
        match state.failure_reason() {
            Some(reason) => println!("* {}: {}", state.label(), reason),
            None => println!("* {}", state.label()),
        }
    }

    fn on_message_received(&self, message: InboundMessage) {
        let at = message.received_at.format("%H:%M:%S");
        match message.payload {
            Payload::Text(text) => println!("< [{at}] {text}"),
            Payload::Binary(data) => println!("< [{at}] <{} bytes binary>", data.len()),
        }
    }

    fn on_send_completed(&self, report: &SendReport) {
        if report.outcome.is_sent() {
            println!("> {}", report.message.payload);
        }
    }

    fn on_ping_completed(&self, outcome: &PingOutcome) {
        match outcome {
            PingOutcome::Alive { rtt } => println!("pong in {} ms", rtt.as_millis()),
            PingOutcome::Unreachable { reason } => println!("! ping failed: {reason}"),
        }
    }
}
