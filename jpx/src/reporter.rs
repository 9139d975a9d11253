use log::{error, warn};

/// Sink for warnings and errors raised while decoding or encoding.
///
/// A reporter is passed into every call, so concurrent calls can report to
/// independent sinks.
pub trait Reporter {
    fn warning(&self, message: &str);
    fn error(&self, message: &str);
}

/// Reporter forwarding to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn warning(&self, message: &str) {
        warn!("{}", message);
    }

    fn error(&self, message: &str) {
        error!("{}", message);
    }
}
