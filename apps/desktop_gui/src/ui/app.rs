use std::time::Duration;

use client_core::{presentation, visualizer::BAR_MAX_HEIGHT};
use crossbeam_channel::{Receiver, Sender};
use eframe::egui;
use shared::domain::{SessionPhase, TranscriptRole};

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::UiEvent;
use crate::controller::orchestration::dispatch_backend_command;
use crate::controller::view_model::{Screen, ShopViewModel};

const ACCENT: egui::Color32 = egui::Color32::WHITE;
const MUTED: egui::Color32 = egui::Color32::from_rgb(113, 113, 122);
const SURFACE: egui::Color32 = egui::Color32::from_rgb(24, 24, 27);
const BORDER: egui::Color32 = egui::Color32::from_rgb(39, 39, 42);
const USER_BUBBLE: egui::Color32 = egui::Color32::from_rgb(63, 63, 70);

const BAR_WIDTH: f32 = 8.0;
const BAR_GAP: f32 = 4.0;

pub struct SalesvoiceApp {
    cmd_tx: Sender<BackendCommand>,
    ui_rx: Receiver<UiEvent>,
    view: ShopViewModel,
    dispatch_status: String,
}

impl SalesvoiceApp {
    pub fn bootstrap(cmd_tx: Sender<BackendCommand>, ui_rx: Receiver<UiEvent>) -> Self {
        let mut app = Self {
            cmd_tx,
            ui_rx,
            view: ShopViewModel::default(),
            dispatch_status: String::new(),
        };
        app.send(BackendCommand::Bootstrap);
        app
    }

    fn send(&mut self, cmd: BackendCommand) {
        dispatch_backend_command(&self.cmd_tx, cmd, &mut self.dispatch_status);
    }

    fn process_ui_events(&mut self) {
        while let Ok(event) = self.ui_rx.try_recv() {
            self.view.apply(event);
        }
    }

    fn status_line(&self) -> Option<&str> {
        if !self.dispatch_status.is_empty() {
            return Some(&self.dispatch_status);
        }
        self.view.last_error.as_ref().map(|_| self.view.status.as_str())
    }

    fn show_loading_screen(&self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(ui.available_height() * 0.4);
                ui.add(egui::Spinner::new().size(28.0));
                ui.add_space(8.0);
                ui.label(egui::RichText::new(presentation::LOADING_TEXT).color(MUTED));
            });
        });
    }

    fn show_start_screen(&mut self, ctx: &egui::Context) {
        let mut start_clicked = false;
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(ui.available_height() * 0.35);
                ui.heading(egui::RichText::new(presentation::APP_TITLE).size(32.0).strong());
                ui.label(egui::RichText::new(presentation::APP_SUBTITLE).color(MUTED));
                ui.add_space(24.0);

                let connecting = self.view.phase == SessionPhase::Connecting;
                let button = egui::Button::new(
                    egui::RichText::new(presentation::START_BUTTON_TEXT).size(16.0),
                )
                .min_size(egui::vec2(200.0, 44.0));
                if ui.add_enabled(!connecting, button).clicked() {
                    start_clicked = true;
                }
                if connecting {
                    ui.add_space(8.0);
                    ui.add(egui::Spinner::new());
                }
                if let Some(status) = self.status_line() {
                    ui.add_space(12.0);
                    ui.label(egui::RichText::new(status).color(egui::Color32::LIGHT_RED));
                }
            });
        });
        if start_clicked {
            self.send(BackendCommand::StartSession);
        }
    }

    fn show_header(&self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.vertical(|ui| {
                    ui.label(egui::RichText::new(presentation::APP_TITLE).size(20.0).strong());
                    ui.label(egui::RichText::new(presentation::APP_SUBTITLE).size(9.0).color(MUTED));
                });
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    agent_state_pill(ui, &self.view);
                });
            });
        });
    }

    fn show_control_bar(&mut self, ctx: &egui::Context) {
        let mut next_command = None;
        egui::TopBottomPanel::bottom("control_bar").show(ctx, |ui| {
            ui.horizontal_centered(|ui| {
                if self.view.phase == SessionPhase::Connected {
                    let mut microphone = self.view.microphone_enabled;
                    let label = if microphone { "🎤 Mute" } else { "🎤 Unmute" };
                    if ui.toggle_value(&mut microphone, label).changed() {
                        next_command = Some(BackendCommand::SetMicrophone {
                            enabled: microphone,
                        });
                    }
                    if ui.button("Leave").clicked() {
                        next_command = Some(BackendCommand::StopSession);
                    }
                } else if self.view.can_start()
                    && ui.button(presentation::START_BUTTON_TEXT).clicked()
                {
                    next_command = Some(BackendCommand::StartSession);
                }
                let color = if self.view.agent_is_listening() {
                    ACCENT
                } else {
                    MUTED
                };
                ui.label(
                    egui::RichText::new(presentation::agent_state_text(self.view.agent_state))
                        .size(10.0)
                        .color(color),
                );
                if let Some(status) = self.status_line() {
                    ui.label(egui::RichText::new(status).size(10.0).color(egui::Color32::LIGHT_RED));
                }
            });
        });
        if let Some(cmd) = next_command {
            self.send(cmd);
        }
    }

    fn show_shop_panel(&self, ctx: &egui::Context) {
        egui::SidePanel::left("shop_panel")
            .resizable(false)
            .exact_width(320.0)
            .show(ctx, |ui| {
                let cart_height = (ui.available_height() / 3.0).max(150.0);
                ui.allocate_ui(egui::vec2(ui.available_width(), cart_height), |ui| {
                    cart_section(ui, &self.view);
                });
                ui.separator();
                catalog_section(ui, &self.view);
            });
    }

    fn show_conversation(&self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            let transcript_height = (ui.available_height() - 80.0).max(0.0);
            ui.allocate_ui(egui::vec2(ui.available_width(), transcript_height), |ui| {
                egui::ScrollArea::vertical()
                    .stick_to_bottom(true)
                    .auto_shrink([false, false])
                    .show(ui, |ui| {
                        if let Some(placeholder) = self.view.transcript_placeholder() {
                            ui.vertical_centered(|ui| {
                                ui.add_space(40.0);
                                ui.label(egui::RichText::new(placeholder).italics().color(MUTED));
                            });
                        }
                        for message in &self.view.transcript {
                            transcript_bubble(ui, message.role, &message.content);
                        }
                    });
            });
            ui.vertical_centered(|ui| {
                ui.add_space(20.0);
                audio_bars(ui, &self.view.bar_heights);
            });
        });
    }

    fn show_success_overlay(&self, ctx: &egui::Context) {
        if !self.view.success_overlay {
            return;
        }
        egui::Area::new(egui::Id::new("success_overlay"))
            .order(egui::Order::Foreground)
            .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .show(ctx, |ui| {
                egui::Frame::popup(ui.style()).show(ui, |ui| {
                    ui.set_min_width(280.0);
                    ui.vertical_centered(|ui| {
                        ui.label(egui::RichText::new("✔").size(36.0).color(ACCENT));
                        ui.label(
                            egui::RichText::new(presentation::SUCCESS_TITLE)
                                .size(20.0)
                                .strong(),
                        );
                        ui.label(egui::RichText::new(presentation::SUCCESS_BODY).color(MUTED));
                    });
                });
            });
    }
}

fn agent_state_pill(ui: &mut egui::Ui, view: &ShopViewModel) {
    let dot = if view.agent_is_listening() { ACCENT } else { MUTED };
    egui::Frame::new()
        .fill(SURFACE)
        .stroke(egui::Stroke::new(1.0, BORDER))
        .corner_radius(12.0)
        .inner_margin(egui::Margin::symmetric(10, 4))
        .show(ui, |ui| {
            ui.horizontal(|ui| {
                ui.label(egui::RichText::new("●").color(dot));
                ui.label(
                    egui::RichText::new(presentation::agent_state_text(view.agent_state))
                        .size(11.0)
                        .color(MUTED),
                );
            });
        });
}

fn cart_section(ui: &mut egui::Ui, view: &ShopViewModel) {
    ui.horizontal(|ui| {
        ui.label(egui::RichText::new(presentation::CART_HEADING).strong().color(MUTED));
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            ui.label(egui::RichText::new(presentation::format_inr(view.cart_total)).strong());
        });
    });
    ui.separator();
    if view.cart.is_empty() {
        ui.centered_and_justified(|ui| {
            ui.label(
                egui::RichText::new(presentation::EMPTY_CART_TEXT)
                    .italics()
                    .color(MUTED),
            );
        });
        return;
    }
    egui::ScrollArea::vertical()
        .id_salt("cart_scroll")
        .auto_shrink([false, false])
        .show(ui, |ui| {
            for item in &view.cart {
                egui::Frame::group(ui.style()).show(ui, |ui| {
                    ui.set_width(ui.available_width());
                    ui.horizontal(|ui| {
                        ui.vertical(|ui| {
                            ui.label(egui::RichText::new(&item.product.name).strong());
                            ui.label(
                                egui::RichText::new(presentation::line_breakdown(item))
                                    .size(10.0)
                                    .color(MUTED),
                            );
                        });
                        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                            ui.label(
                                egui::RichText::new(presentation::format_inr(item.line_total()))
                                    .strong(),
                            );
                        });
                    });
                });
            }
        });
}

fn catalog_section(ui: &mut egui::Ui, view: &ShopViewModel) {
    ui.label(
        egui::RichText::new(presentation::CATALOG_HEADING)
            .strong()
            .color(MUTED),
    );
    ui.separator();
    egui::ScrollArea::vertical()
        .id_salt("catalog_scroll")
        .auto_shrink([false, false])
        .show(ui, |ui| {
            for product in &view.catalog {
                egui::Frame::group(ui.style()).show(ui, |ui| {
                    ui.set_width(ui.available_width());
                    ui.horizontal(|ui| {
                        ui.label(egui::RichText::new(presentation::icon_for(product)).size(22.0));
                        ui.vertical(|ui| {
                            ui.label(egui::RichText::new(&product.name).strong());
                            ui.label(
                                egui::RichText::new(format!(
                                    "{} • {}",
                                    product.category,
                                    presentation::stock_label(product)
                                ))
                                .size(10.0)
                                .color(MUTED),
                            );
                        });
                        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                            ui.label(
                                egui::RichText::new(presentation::format_inr(product.price))
                                    .size(15.0)
                                    .strong(),
                            );
                        });
                    });
                });
            }
        });
}

fn transcript_bubble(ui: &mut egui::Ui, role: TranscriptRole, content: &str) {
    let (align, fill) = match role {
        TranscriptRole::User => (egui::Align::Max, USER_BUBBLE),
        TranscriptRole::Assistant => (egui::Align::Min, SURFACE),
    };
    ui.with_layout(egui::Layout::top_down(align), |ui| {
        egui::Frame::new()
            .fill(fill)
            .corner_radius(10.0)
            .inner_margin(egui::Margin::symmetric(12, 8))
            .show(ui, |ui| {
                ui.set_max_width(ui.available_width() * 0.7);
                ui.label(content);
            });
    });
    ui.add_space(6.0);
}

fn audio_bars(ui: &mut egui::Ui, heights: &[f32]) {
    let count = heights.len() as f32;
    let width = count * BAR_WIDTH + (count - 1.0).max(0.0) * BAR_GAP;
    let (rect, _) =
        ui.allocate_exact_size(egui::vec2(width, BAR_MAX_HEIGHT + 8.0), egui::Sense::hover());
    let painter = ui.painter_at(rect);
    for (index, height) in heights.iter().enumerate() {
        let x = rect.left() + index as f32 * (BAR_WIDTH + BAR_GAP) + BAR_WIDTH / 2.0;
        let bar = egui::Rect::from_center_size(
            egui::pos2(x, rect.center().y),
            egui::vec2(BAR_WIDTH, *height),
        );
        painter.rect_filled(bar, 4.0, ACCENT);
    }
}

impl eframe::App for SalesvoiceApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_ui_events();

        match self.view.screen() {
            Screen::Loading => self.show_loading_screen(ctx),
            Screen::Start => self.show_start_screen(ctx),
            Screen::Shop => {
                self.show_header(ctx);
                self.show_control_bar(ctx);
                self.show_shop_panel(ctx);
                self.show_conversation(ctx);
                self.show_success_overlay(ctx);
            }
        }

        if self.view.phase == SessionPhase::Connected {
            ctx.request_repaint_after(Duration::from_millis(16));
        } else {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
    }
}
