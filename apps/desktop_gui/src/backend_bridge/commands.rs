//! Backend commands queued from UI to backend worker.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendCommand {
    Bootstrap,
    StartSession,
    SetMicrophone { enabled: bool },
    StopSession,
}

impl BackendCommand {
    pub fn name(self) -> &'static str {
        match self {
            Self::Bootstrap => "bootstrap",
            Self::StartSession => "start_session",
            Self::SetMicrophone { .. } => "set_microphone",
            Self::StopSession => "stop_session",
        }
    }
}
