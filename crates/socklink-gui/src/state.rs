use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, Utc};
use socklink_core::ConnectionState;

pub const MAX_LOG_LINES: usize = 300;
pub const MAX_MESSAGES: usize = 500;

// ── Message list ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageLine {
    pub direction: Direction,
    pub text: String,
    pub at: DateTime<Local>,
}

// ── GuiState ──────────────────────────────────────────────────────────────────

pub struct GuiState {
    pub state:    ConnectionState,
    pub endpoint: String,
    pub messages: VecDeque<MessageLine>,
    pub logs:     VecDeque<String>,
    /// Round-trip of the most recent successful ping.
    pub last_rtt_ms: Option<u128>,
}

impl GuiState {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            state:       ConnectionState::Idle,
            endpoint:    endpoint.into(),
            messages:    VecDeque::new(),
            logs:        VecDeque::new(),
            last_rtt_ms: None,
        }
    }

    /// Append a line to the circular log buffer (max 300 entries).
    pub fn push_log(&mut self, line: impl Into<String>) {
        let line = format!("{} {}", Local::now().format("%H:%M:%S"), line.into());
        tracing::debug!("[GUI log] {}", line);
        if self.logs.len() >= MAX_LOG_LINES {
            self.logs.pop_front();
        }
        self.logs.push_back(line);
    }

    pub fn push_message(&mut self, direction: Direction, text: impl Into<String>, at: DateTime<Utc>) {
        if self.messages.len() >= MAX_MESSAGES {
            self.messages.pop_front();
        }
        self.messages.push_back(MessageLine {
            direction,
            text: text.into(),
            at: at.with_timezone(&Local),
        });
    }

    /// Send and Ping are only offered while connected.
    pub fn can_exchange(&self) -> bool {
        self.state.is_connected()
    }
}

/// Shared handle passed between the GUI thread and the async session task.
pub type SharedState = Arc<Mutex<GuiState>>;
