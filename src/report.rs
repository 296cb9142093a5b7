//! Where diagnostic reports go.
//!
//! A report is a preformatted, multi-line string. The default sink writes it
//! through `tracing`; applications that ship reports elsewhere (a metrics
//! pipeline, an alerting webhook) implement [`ReportSink`] or pass a closure.

use tracing::warn;

/// Receives diagnostic reports. Implementations must not block for long: the
/// sink is called on the caller's thread for every shed call.
pub trait ReportSink: Send + Sync {
    fn report(&self, message: &str);
}

/// Emits each report as a `WARN` event on the `circuit_breaker` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn report(&self, message: &str) {
        warn!(target: "circuit_breaker", "{message}");
    }
}

impl<F> ReportSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn report(&self, message: &str) {
        self(message)
    }
}

/// Identity of the current process, as it appears in reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessIdentity {
    pub name: String,
    pub pid: u32,
}

impl ProcessIdentity {
    pub fn current() -> Self {
        let name = std::env::current_exe()
            .ok()
            .and_then(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            name,
            pid: std::process::id(),
        }
    }
}

impl std::fmt::Display for ProcessIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.name, self.pid)
    }
}
