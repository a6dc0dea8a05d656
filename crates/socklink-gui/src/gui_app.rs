use egui::{
    Align, Color32, FontFamily, FontId, Frame, Layout, Margin, RichText, ScrollArea, Stroke, Vec2,
};
use socklink_core::ConnectionState;
use tokio::sync::mpsc;

use crate::client::UiCommand;
use crate::state::{Direction, MessageLine, SharedState};

// ── Colours ───────────────────────────────────────────────────────────────────

const BG_PANEL:  Color32 = Color32::from_rgb(28,  30,  36);
const BG_INSET:  Color32 = Color32::from_rgb(20,  22,  28);
const BG_CARD:   Color32 = Color32::from_rgb(36,  38,  46);
const ACCENT:    Color32 = Color32::from_rgb(99, 144, 255);
const TEXT_DIM:  Color32 = Color32::from_rgb(130, 135, 148);
const TEXT_NORM: Color32 = Color32::from_rgb(210, 215, 230);

fn state_color(state: &ConnectionState) -> Color32 {
    match state {
        ConnectionState::Idle | ConnectionState::Closed => Color32::from_rgb(160, 160, 160),
        ConnectionState::Connecting | ConnectionState::Closing => Color32::from_rgb(230, 185, 50),
        ConnectionState::Connected => Color32::from_rgb(60, 200, 80),
        ConnectionState::Failed(_) => Color32::from_rgb(220, 60, 60),
    }
}

// ── App struct ────────────────────────────────────────────────────────────────

pub struct SockLinkApp {
    state:            SharedState,
    commands:         mpsc::UnboundedSender<UiCommand>,
    endpoint_input:   String,
    message_input:    String,
    auto_scroll_logs: bool,
}

impl SockLinkApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        state: SharedState,
        commands: mpsc::UnboundedSender<UiCommand>,
    ) -> Self {
        let mut visuals = egui::Visuals::dark();
        visuals.window_fill              = BG_PANEL;
        visuals.panel_fill               = BG_PANEL;
        visuals.extreme_bg_color         = BG_INSET;
        visuals.faint_bg_color           = BG_CARD;
        visuals.widgets.inactive.bg_fill = BG_CARD;
        visuals.widgets.hovered.bg_fill  = Color32::from_rgb(50, 53, 65);
        visuals.widgets.active.bg_fill   = Color32::from_rgb(65, 68, 82);
        cc.egui_ctx.set_visuals(visuals);

        let endpoint_input = state
            .lock()
            .map(|s| s.endpoint.clone())
            .unwrap_or_default();

        Self {
            state,
            commands,
            endpoint_input,
            message_input: String::new(),
            auto_scroll_logs: true,
        }
    }

    fn dispatch(&self, command: UiCommand) {
        if self.commands.send(command).is_err() {
            tracing::warn!("Session task is gone; command dropped");
        }
    }
}

// ── eframe::App implementation ────────────────────────────────────────────────

impl eframe::App for SockLinkApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Snapshot state to avoid holding the lock across rendering
        let snap = {
            let s = self.state.lock().unwrap_or_else(|e| e.into_inner());
            StateSnapshot {
                state:       s.state.clone(),
                can_send:    s.can_exchange(),
                last_rtt_ms: s.last_rtt_ms,
                messages:    s.messages.iter().cloned().collect(),
                logs:        s.logs.iter().cloned().collect(),
            }
        };

        egui::CentralPanel::default()
            .frame(Frame::none().fill(BG_PANEL).inner_margin(Margin::same(10.0)))
            .show(ctx, |ui| {
                render_header(ui);
                ui.add_space(10.0);

                self.render_status_card(ui, &snap);
                ui.add_space(10.0);

                self.render_compose_card(ui, &snap);
                ui.add_space(10.0);

                render_messages(ui, &snap.messages);
                ui.add_space(10.0);

                render_log_panel(ui, &snap.logs, &mut self.auto_scroll_logs);
            });
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.dispatch(UiCommand::Disconnect);
    }
}

// ── Rendering helpers ─────────────────────────────────────────────────────────

fn render_header(ui: &mut egui::Ui) {
    ui.horizontal(|ui| {
        ui.label(
            RichText::new("SockLink")
                .font(FontId::new(24.0, FontFamily::Proportional))
                .strong()
                .color(Color32::WHITE),
        );
        ui.label(
            RichText::new("WebSocket client")
                .font(FontId::new(14.0, FontFamily::Proportional))
                .color(ACCENT),
        );
    });
}

impl SockLinkApp {
    fn render_status_card(&mut self, ui: &mut egui::Ui, snap: &StateSnapshot) {
        card(ui, |ui| {
            ui.horizontal(|ui| {
                let (rect, _) = ui.allocate_exact_size(Vec2::splat(12.0), egui::Sense::hover());
                ui.painter().circle_filled(rect.center(), 5.0, state_color(&snap.state));
                ui.label(RichText::new(snap.state.label()).strong().color(TEXT_NORM));

                if let Some(reason) = snap.state.failure_reason() {
                    ui.label(
                        RichText::new(format!(": {}", reason))
                            .color(Color32::from_rgb(220, 100, 100))
                            .font(FontId::new(12.0, FontFamily::Proportional)),
                    );
                }
                if let (true, Some(rtt)) = (snap.can_send, snap.last_rtt_ms) {
                    ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                        ui.label(RichText::new(format!("rtt {} ms", rtt)).color(TEXT_DIM));
                    });
                }
            });
            ui.add_space(6.0);

            ui.horizontal(|ui| {
                let editable = snap.state.can_connect();
                ui.add_enabled(
                    editable,
                    egui::TextEdit::singleline(&mut self.endpoint_input)
                        .hint_text("wss://echo.websocket.org")
                        .desired_width(ui.available_width() - 120.0),
                );

                let (label, enabled) = match &snap.state {
                    s if s.can_connect() => ("Connect", true),
                    ConnectionState::Closing => ("Disconnect", false),
                    _ => ("Disconnect", true),
                };
                if ui
                    .add_enabled(enabled, egui::Button::new(label).min_size(Vec2::new(100.0, 24.0)))
                    .clicked()
                {
                    if snap.state.can_connect() {
                        self.dispatch(UiCommand::Connect(self.endpoint_input.trim().to_owned()));
                    } else {
                        self.dispatch(UiCommand::Disconnect);
                    }
                }
            });
        });
    }

    fn render_compose_card(&mut self, ui: &mut egui::Ui, snap: &StateSnapshot) {
        card(ui, |ui| {
            ui.horizontal(|ui| {
                let response = ui.add_enabled(
                    snap.can_send,
                    egui::TextEdit::singleline(&mut self.message_input)
                        .hint_text("Message")
                        .desired_width(ui.available_width() - 150.0),
                );
                let submitted = response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));

                let send_clicked = ui
                    .add_enabled(
                        snap.can_send && !self.message_input.is_empty(),
                        egui::Button::new("Send").min_size(Vec2::new(64.0, 24.0)),
                    )
                    .clicked();
                if (send_clicked || submitted) && snap.can_send && !self.message_input.is_empty() {
                    let text = std::mem::take(&mut self.message_input);
                    self.dispatch(UiCommand::Send(text));
                }

                if ui
                    .add_enabled(snap.can_send, egui::Button::new("Ping").min_size(Vec2::new(64.0, 24.0)))
                    .clicked()
                {
                    self.dispatch(UiCommand::Ping);
                }
            });
        });
    }
}

fn render_messages(ui: &mut egui::Ui, messages: &[MessageLine]) {
    ui.label(
        RichText::new("Messages")
            .color(TEXT_DIM)
            .font(FontId::new(12.0, FontFamily::Proportional)),
    );
    ui.add_space(3.0);

    inset(ui, |ui| {
        ScrollArea::vertical()
            .id_salt("message_scroll")
            .max_height(220.0)
            .auto_shrink([false, false])
            .stick_to_bottom(true)
            .show(ui, |ui| {
                ui.set_min_width(ui.available_width());
                for line in messages {
                    let (arrow, color) = match line.direction {
                        Direction::Sent     => ("→", ACCENT),
                        Direction::Received => ("←", Color32::from_rgb(60, 200, 80)),
                    };
                    ui.horizontal_wrapped(|ui| {
                        ui.label(
                            RichText::new(line.at.format("%H:%M:%S").to_string())
                                .font(FontId::new(11.5, FontFamily::Monospace))
                                .color(TEXT_DIM),
                        );
                        ui.label(RichText::new(arrow).color(color));
                        ui.label(RichText::new(&line.text).color(TEXT_NORM));
                    });
                }
            });
    });
}

fn render_log_panel(ui: &mut egui::Ui, logs: &[String], auto_scroll: &mut bool) {
    ui.horizontal(|ui| {
        ui.label(
            RichText::new("Log")
                .color(TEXT_DIM)
                .font(FontId::new(12.0, FontFamily::Proportional)),
        );
        ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
            ui.checkbox(auto_scroll, RichText::new("auto-scroll").color(TEXT_DIM));
        });
    });
    ui.add_space(3.0);

    let log_height = (ui.available_size().y - 30.0).max(120.0);
    inset(ui, |ui| {
        ScrollArea::vertical()
            .id_salt("log_scroll")
            .max_height(log_height)
            .auto_shrink([false, false])
            .stick_to_bottom(*auto_scroll)
            .show(ui, |ui| {
                ui.set_min_width(ui.available_width());
                for line in logs {
                    let color = if line.contains("[ERROR]") {
                        Color32::from_rgb(220, 80, 70)
                    } else if line.contains("[WARN]") {
                        Color32::from_rgb(220, 165, 50)
                    } else {
                        Color32::from_rgb(160, 170, 185)
                    };
                    ui.label(
                        RichText::new(line)
                            .font(FontId::new(11.5, FontFamily::Monospace))
                            .color(color),
                    );
                }
            });
    });
}

// ── Utilities ─────────────────────────────────────────────────────────────────

fn card(ui: &mut egui::Ui, add_contents: impl FnOnce(&mut egui::Ui)) {
    Frame::none()
        .fill(BG_CARD)
        .inner_margin(Margin::symmetric(12.0, 10.0))
        .rounding(egui::Rounding::same(8.0))
        .stroke(Stroke::new(1.0, Color32::from_rgb(50, 53, 68)))
        .show(ui, |ui| {
            ui.set_min_width(ui.available_width());
            add_contents(ui);
        });
}

fn inset(ui: &mut egui::Ui, add_contents: impl FnOnce(&mut egui::Ui)) {
    Frame::none()
        .fill(BG_INSET)
        .inner_margin(Margin::symmetric(8.0, 6.0))
        .stroke(Stroke::new(1.0, Color32::from_rgb(45, 48, 60)))
        .rounding(egui::Rounding::same(6.0))
        .show(ui, add_contents);
}

// ── Snapshot (to avoid holding lock during paint) ─────────────────────────────

struct StateSnapshot {
    state:       ConnectionState,
    can_send:    bool,
    last_rtt_ms: Option<u128>,
    messages:    Vec<MessageLine>,
    logs:        Vec<String>,
}
