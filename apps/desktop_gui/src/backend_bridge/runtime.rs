//! Runtime bridge between UI command queue and backend event intake.

use std::{path::PathBuf, sync::Arc, thread};

use client_core::{ClientSettings, SessionError, ShopClient};
use crossbeam_channel::{Receiver, Sender};
use livekit_integration::{LiveKitRoomConnector, MissingLiveKitConnector, ScriptedRoomConnector};

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::{classify_bootstrap_failure, UiError, UiErrorContext, UiEvent};

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub settings: ClientSettings,
    pub replay: Option<PathBuf>,
}

fn startup_failure(ui_tx: &Sender<UiEvent>, message: String) {
    tracing::error!("{message}");
    let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
        UiErrorContext::BackendStartup,
        format!("backend worker startup failure: {message}"),
    )));
}

async fn build_connector(
    replay: Option<PathBuf>,
) -> Result<Arc<dyn LiveKitRoomConnector>, String> {
    let Some(path) = replay else {
        return Ok(Arc::new(MissingLiveKitConnector));
    };
    let connector = ScriptedRoomConnector::load(&path)
        .await
        .map_err(|err| err.to_string())?;
    tracing::info!(
        path = %path.display(),
        steps = connector.step_count(),
        "backend: using replayed room"
    );
    Ok(Arc::new(connector))
}

pub fn launch(config: BackendConfig, cmd_rx: Receiver<BackendCommand>, ui_tx: Sender<UiEvent>) {
    thread::spawn(move || {
        let _ = ui_tx.try_send(UiEvent::Info("Backend worker starting...".to_string()));
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                startup_failure(&ui_tx, format!("failed to build runtime: {err}"));
                return;
            }
        };

        runtime.block_on(async move {
            let connector = match build_connector(config.replay).await {
                Ok(connector) => connector,
                Err(err) => {
                    startup_failure(&ui_tx, format!("replay script unusable: {err}"));
                    return;
                }
            };
            let client = match ShopClient::from_settings(&config.settings, connector) {
                Ok(client) => client,
                Err(err) => {
                    startup_failure(&ui_tx, err.to_string());
                    return;
                }
            };

            let mut events = client.subscribe_events();
            let ui_tx_clone = ui_tx.clone();
            let event_task = tokio::spawn(async move {
                while let Ok(event) = events.recv().await {
                    let _ = ui_tx_clone.try_send(UiEvent::from(event));
                }
            });
            let _ = ui_tx.try_send(UiEvent::Info(format!(
                "Backend worker ready ({})",
                config.settings.backend_url
            )));

            while let Ok(cmd) = cmd_rx.recv() {
                tracing::info!(command = cmd.name(), "backend: command");
                match cmd {
                    // A failed bootstrap already reaches the UI as ClientEvent::Error;
                    // the window stays on the loading screen.
                    BackendCommand::Bootstrap => {
                        if let Err(err) = client.bootstrap().await {
                            let message = format!("{err:#}");
                            tracing::error!(
                                hint = %classify_bootstrap_failure(&message),
                                "backend: bootstrap failed: {message}"
                            );
                        }
                    }
                    BackendCommand::StartSession => match client.start().await {
                        Ok(()) => {}
                        // Connect failures already reach the UI through ClientEvent::Error.
                        Err(SessionError::Connect(_) | SessionError::ServerUrl(_)) => {}
                        Err(err) => {
                            let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                                UiErrorContext::Session,
                                err.to_string(),
                            )));
                        }
                    },
                    BackendCommand::SetMicrophone { enabled } => {
                        if let Err(err) = client.set_microphone_enabled(enabled).await {
                            let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                                UiErrorContext::Microphone,
                                err.to_string(),
                            )));
                        }
                    }
                    BackendCommand::StopSession => {
                        if let Err(err) = client.stop().await {
                            tracing::error!("backend: stop failed: {err}");
                        }
                    }
                }
            }

            tracing::info!("backend: command queue closed, shutting down");
            let _ = client.stop().await;
            event_task.abort();
        });
    });
}
