//! Interrupt handling for running commands (SIGINT/SIGTERM)
//!
//! On the first signal the remote command is terminated and the pull of
//! results is still attempted within a bounded grace period. A second signal
//! requests immediate exit, which also abandons that pull.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Exit code for runs cancelled before the remote command reported one
pub const EXIT_CODE_CANCELLED: i32 = 130;

/// Shared signal state
#[derive(Debug, Default)]
pub struct SignalState {
    /// First signal received
    cancel_requested: AtomicBool,
    /// Second signal received
    immediate_exit: AtomicBool,
    signal_count: AtomicU8,
}

impl SignalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    /// Check if immediate exit has been requested (double-SIGINT)
    pub fn is_immediate_exit(&self) -> bool {
        self.immediate_exit.load(Ordering::SeqCst)
    }

    pub fn signal_count(&self) -> u8 {
        self.signal_count.load(Ordering::SeqCst)
    }

    /// Record a signal and return the action to take
    pub fn handle_signal(&self) -> SignalAction {
        let count = self.signal_count.fetch_add(1, Ordering::SeqCst);

        if count == 0 {
            self.cancel_requested.store(true, Ordering::SeqCst);
            SignalAction::InitiateCancellation
        } else if count == 1 {
            self.immediate_exit.store(true, Ordering::SeqCst);
            SignalAction::ImmediateExit
        } else {
            SignalAction::Ignore
        }
    }
}

/// Action to take after receiving a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// First signal: terminate the remote command, then pull
    InitiateCancellation,
    /// Second signal: stop everything
    ImmediateExit,
    Ignore,
}

/// Cheap cloneable view of the signal state handed to collaborators
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<SignalState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: Arc<SignalState>) -> Self {
        Self { state }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancel_requested()
    }

    pub fn is_immediate_exit(&self) -> bool {
        self.state.is_immediate_exit()
    }

    /// Simulate a signal. The CLI never calls this; signals arrive through
    /// [`SignalHandler`].
    pub fn cancel(&self) -> SignalAction {
        self.state.handle_signal()
    }

    /// Sleep for up to `duration`, returning early with `true` once
    /// cancellation is requested
    pub fn sleep(&self, duration: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < duration {
            if self.is_cancelled() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(50).min(duration));
        }
        self.is_cancelled()
    }
}

/// Installs the process-wide handler feeding a [`SignalState`]
pub struct SignalHandler {
    state: Arc<SignalState>,
}

impl SignalHandler {
    pub fn new() -> Self {
        Self {
            state: Arc::new(SignalState::new()),
        }
    }

    pub fn token(&self) -> CancelToken {
        CancelToken::from_state(Arc::clone(&self.state))
    }

    /// Install the handler for SIGINT and SIGTERM. Call once at startup.
    pub fn install(&self) -> Result<(), ctrlc::Error> {
        let state = Arc::clone(&self.state);
        ctrlc::set_handler(move || match state.handle_signal() {
            SignalAction::InitiateCancellation => {
                tracing::warn!("interrupt received, stopping remote command and pulling results");
            }
            SignalAction::ImmediateExit => {
                tracing::warn!("second interrupt received, exiting without waiting");
            }
            SignalAction::Ignore => {}
        })
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_state_initial() {
        let state = SignalState::new();
        assert!(!state.is_cancel_requested());
        assert!(!state.is_immediate_exit());
        assert_eq!(state.signal_count(), 0);
    }

    #[test]
    fn test_first_signal_initiates_cancellation() {
        let state = SignalState::new();
        assert_eq!(state.handle_signal(), SignalAction::InitiateCancellation);
        assert!(state.is_cancel_requested());
        assert!(!state.is_immediate_exit());
    }

    #[test]
    fn test_second_signal_requests_immediate_exit() {
        let state = SignalState::new();
        state.handle_signal();
        assert_eq!(state.handle_signal(), SignalAction::ImmediateExit);
        assert!(state.is_immediate_exit());
        assert_eq!(state.handle_signal(), SignalAction::Ignore);
        assert_eq!(state.signal_count(), 3);
    }

    #[test]
    fn test_token_clones_share_state() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
        assert!(!token.is_immediate_exit());
    }

    #[test]
    fn test_handler_token_sees_state() {
        let handler = SignalHandler::new();
        let token = handler.token();
        handler.state.handle_signal();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_sleep_returns_early_when_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        let start = Instant::now();
        assert!(token.sleep(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
