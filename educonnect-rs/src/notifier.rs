//! Desktop notifications via notify-rust (D-Bus).
//!
//! Used for lightweight notices such as a failed voice capture; the
//! conversation itself never depends on them.

use notify_rust::Notification;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct Notifier {
    enabled: bool,
}

impl Notifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn notify(&self, summary: &str, body: &str) {
        if !self.enabled {
            return;
        }

        debug!("Notification: {summary}");

        if let Err(e) = Notification::new()
            .appname("EduConnect")
            .summary(summary)
            .body(body)
            .icon("audio-input-microphone")
            .timeout(3000)
            .show()
        {
            warn!("Failed to show notification: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_notifier_is_silent() {
        let notifier = Notifier::new(false);
        notifier.notify("Voice input", "ignored");
        assert!(!notifier.enabled);
    }
}
