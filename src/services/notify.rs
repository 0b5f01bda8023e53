// User-facing notification sink.

use std::fmt;

/// Severity of a user notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifyLevel {
    Info,
    Success,
    Error,
}

impl fmt::Display for NotifyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NotifyLevel::Info => "info",
            NotifyLevel::Success => "success",
            NotifyLevel::Error => "error",
        };
        f.write_str(name)
    }
}

/// Destination for short status messages shown to the user (toasts, a status bar,
/// a terminal). Fire-and-forget.
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NotifyLevel, message: &str);
}

/// Default notifier: routes messages into the tracing pipeline
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, level: NotifyLevel, message: &str) {
        match level {
            NotifyLevel::Info | NotifyLevel::Success => {
                tracing::info!(target: "vision_insight::notify", %level, "{}", message)
            }
            NotifyLevel::Error => {
                tracing::error!(target: "vision_insight::notify", %level, "{}", message)
            }
        }
    }
}

/// Messages shown around the analysis and feedback round trips
pub mod messages {
    pub const ANALYZING: &str = "Analyzing image...";
    pub const ANALYSIS_COMPLETED: &str = "Analysis completed!";
    pub const ANALYSIS_FAILED: &str = "Analysis failed. Please try again.";
    pub const SUBMITTING_FEEDBACK: &str = "Submitting feedback...";
    pub const FEEDBACK_THANKS: &str = "Thank you! Your feedback will help us improve.";
    pub const FEEDBACK_FAILED: &str = "Could not submit feedback.";
}
