//! Logger collaborator: fire-and-forget hooks for pool diagnostics.

/// Logging hooks injected through [`PoolConfig::with_logger`].
///
/// Calls are fire-and-forget: they must never block and never alter control
/// flow. The pool routes all of its internal diagnostics through this trait.
///
/// [`PoolConfig::with_logger`]: crate::PoolConfig::with_logger
pub trait Logger: Send + Sync {
    fn debug(&self, msg: &str);
    fn info(&self, msg: &str);
    fn warn(&self, msg: &str);
    fn error(&self, msg: &str);
}

/// Default logger: forwards to the matching `tracing` macros.
///
/// Emits nothing unless the host application installs a subscriber, which
/// makes it the silent default while keeping output one `tracing_subscriber`
/// init away.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn debug(&self, msg: &str) {
        tracing::debug!(target: "tokenpool", "{msg}");
    }

    fn info(&self, msg: &str) {
        tracing::info!(target: "tokenpool", "{msg}");
    }

    fn warn(&self, msg: &str) {
        tracing::warn!(target: "tokenpool", "{msg}");
    }

    fn error(&self, msg: &str) {
        tracing::error!(target: "tokenpool", "{msg}");
    }
}

/// Discards every message unconditionally.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopLogger;

impl Logger for NopLogger {
    fn debug(&self, _msg: &str) {}

    fn info(&self, _msg: &str) {}

    fn warn(&self, _msg: &str) {}

    fn error(&self, _msg: &str) {}
}
