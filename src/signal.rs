//! Ctrl+C handling.
//!
//! A process can register only one `ctrlc` hook, so a single global
//! [`ShutdownHandler`] owns it. Whatever controller is currently attached is
//! cancelled when the signal arrives; the run then winds down through the
//! normal cancellation path and the binary exits with code 130.
//!
//! ```rust,no_run
//! use dupsweep::signal::install_handler;
//! use dupsweep::workspace::{Workspace, WorkspaceConfig};
//!
//! let workspace = Workspace::new(WorkspaceConfig::default()).unwrap();
//! let handler = install_handler().unwrap();
//! handler.attach(workspace.controller());
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use crate::control::OperationController;

/// Exit status for SIGINT (128 + 2).
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Shared interrupt state: a flag plus the controller to cancel.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandler {
    flag: Arc<AtomicBool>,
    target: Arc<Mutex<Option<Weak<OperationController>>>>,
}

impl ShutdownHandler {
    /// A handler with no signal hook and nothing attached.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel `controller` on the next interrupt. Replaces any previous one.
    pub fn attach(&self, controller: &Arc<OperationController>) {
        let mut target = self
            .target
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *target = Some(Arc::downgrade(controller));
    }

    /// Stop forwarding interrupts.
    pub fn detach(&self) {
        let mut target = self
            .target
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *target = None;
    }

    /// Whether an interrupt was received since the last reset.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Act as if Ctrl+C was pressed. Returns whether a run was cancelled.
    pub fn request_shutdown(&self) -> bool {
        self.flag.store(true, Ordering::SeqCst);
        let controller = self
            .target
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade);
        match controller {
            Some(controller) => controller.cancel(),
            None => false,
        }
    }

    /// Clear the flag.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Failure to register the process signal hook.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// `ctrlc` refused the handler.
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

static GLOBAL_HANDLER: OnceLock<ShutdownHandler> = OnceLock::new();

/// Install the process-wide Ctrl+C hook, or return the one already installed.
///
/// # Errors
///
/// Returns [`SignalError`] if the hook cannot be registered on first use.
pub fn install_handler() -> Result<ShutdownHandler, SignalError> {
    if let Some(handler) = GLOBAL_HANDLER.get() {
        handler.reset();
        return Ok(handler.clone());
    }

    let handler = ShutdownHandler::new();
    let hooked = handler.clone();
    ctrlc::set_handler(move || {
        let _ = writeln!(std::io::stderr(), "\nInterrupted. Cancelling...");
        let _ = std::io::stderr().flush();
        let cancelled = hooked.request_shutdown();
        log::info!("Interrupt received (run cancelled: {})", cancelled);
    })?;

    Ok(GLOBAL_HANDLER.get_or_init(|| handler).clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{OperationKind, OperationState};

    #[test]
    fn test_request_without_target() {
        let handler = ShutdownHandler::new();
        assert!(!handler.is_shutdown_requested());
        assert!(!handler.request_shutdown());
        assert!(handler.is_shutdown_requested());

        handler.reset();
        assert!(!handler.is_shutdown_requested());
    }

    #[test]
    fn test_request_cancels_attached_run() {
        let controller = Arc::new(OperationController::new());
        let _run = controller.begin(OperationKind::Scan, 1).unwrap();

        let handler = ShutdownHandler::new();
        handler.attach(&controller);
        assert!(handler.clone().request_shutdown());
        assert_eq!(controller.state(), OperationState::Cancelling);
    }

    #[test]
    fn test_detach_and_dropped_controller() {
        let handler = ShutdownHandler::new();
        {
            let controller = Arc::new(OperationController::new());
            handler.attach(&controller);
        }
        assert!(!handler.request_shutdown());

        let controller = Arc::new(OperationController::new());
        let _run = controller.begin(OperationKind::Delete, 1).unwrap();
        handler.attach(&controller);
        handler.detach();
        assert!(!handler.request_shutdown());
        assert_eq!(controller.state(), OperationState::Running);
    }

    #[test]
    fn test_exit_code_interrupted() {
        assert_eq!(EXIT_CODE_INTERRUPTED, 130);
    }
}
