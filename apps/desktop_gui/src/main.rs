use std::path::PathBuf;

mod backend_bridge;
mod controller;
mod ui;

use clap::Parser;
use client_core::load_settings;
use crossbeam_channel::bounded;
use eframe::egui;
use tracing_subscriber::EnvFilter;

use crate::backend_bridge::{
    commands::BackendCommand,
    runtime::{launch, BackendConfig},
};
use crate::controller::events::UiEvent;
use crate::ui::SalesvoiceApp;

#[derive(Parser, Debug)]
#[command(name = "salesvoice-gui", about = "Salesvoice desktop client")]
struct StartupArgs {
    #[arg(long)]
    backend_url: Option<String>,
    /// Replay a recorded room session (JSON Lines) instead of a live room.
    #[arg(long)]
    replay: Option<PathBuf>,
}

fn main() -> eframe::Result<()> {
    let args = StartupArgs::parse();
    let settings = load_settings().with_backend_url(args.backend_url);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_filter.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let (cmd_tx, cmd_rx) = bounded::<BackendCommand>(64);
    let (ui_tx, ui_rx) = bounded::<UiEvent>(2048);
    launch(
        BackendConfig {
            settings,
            replay: args.replay,
        },
        cmd_rx,
        ui_tx,
    );

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Salesvoice")
            .with_inner_size([1180.0, 760.0])
            .with_min_inner_size([900.0, 600.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Salesvoice",
        options,
        Box::new(|cc| {
            cc.egui_ctx.set_visuals(egui::Visuals::dark());
            Ok(Box::new(SalesvoiceApp::bootstrap(cmd_tx, ui_rx)))
        }),
    )
}
