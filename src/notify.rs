//! Notification sink
//!
//! User-facing error surfacing. Validation failures are reported here
//! synchronously at the call site; transport failures never are (they show
//! up on the session state watch instead).

use std::sync::Mutex;

use tracing::{error, info};

/// Sink for user-facing notifications
pub trait Notifier: Send + Sync {
    fn error(&self, message: &str);

    fn info(&self, message: &str) {
        let _ = message;
    }
}

/// Default sink that forwards to the tracing subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn error(&self, message: &str) {
        error!(target: "parlor::notify", "{}", message);
    }

    fn info(&self, message: &str) {
        info!(target: "parlor::notify", "{}", message);
    }
}

/// Test sink that records every message
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    errors: Mutex<Vec<String>>,
    infos: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().expect("notifier poisoned").clone()
    }

    pub fn infos(&self) -> Vec<String> {
        self.infos.lock().expect("notifier poisoned").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn error(&self, message: &str) {
        self.errors
            .lock()
            .expect("notifier poisoned")
            .push(message.to_string());
    }

    fn info(&self, message: &str) {
        self.infos
            .lock()
            .expect("notifier poisoned")
            .push(message.to_string());
    }
}
