//! Worker lifecycle state machine.

use serde::{Deserialize, Serialize};

use crate::ServiceWorkerError;

/// Lifecycle state of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Install event running (precaching).
    #[default]
    Installing,
    /// Installed, waiting for activation.
    Waiting,
    /// Active and controlling clients.
    Active,
    /// Replaced by a newer worker.
    Redundant,
}

impl LifecycleState {
    /// Only an active worker intercepts fetches.
    pub fn can_intercept_fetch(&self) -> bool {
        matches!(self, LifecycleState::Active)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Installing => write!(f, "installing"),
            LifecycleState::Waiting => write!(f, "waiting"),
            LifecycleState::Active => write!(f, "active"),
            LifecycleState::Redundant => write!(f, "redundant"),
        }
    }
}

/// Tracks the current state, the skip-waiting request, and any transition
/// whose work is still running.
#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
    state: LifecycleState,
    skip_waiting: bool,
    // Target of a transition that has started but not completed.
    pending: Option<LifecycleState>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Claim the install. Fails if not installing or already claimed.
    pub fn begin_install(&mut self) -> Result<(), ServiceWorkerError> {
        self.begin(LifecycleState::Installing, LifecycleState::Waiting)
    }

    /// Installing → Waiting. Happens whether or not precaching succeeded.
    pub fn install_complete(&mut self) -> Result<(), ServiceWorkerError> {
        self.transition(LifecycleState::Installing, LifecycleState::Waiting)
    }

    /// Ask to activate as soon as installation is done.
    pub fn skip_waiting(&mut self) {
        self.skip_waiting = true;
    }

    /// Waiting with skip-waiting requested and no activation under way.
    pub fn should_activate(&self) -> bool {
        self.state == LifecycleState::Waiting && self.skip_waiting && self.pending.is_none()
    }

    /// Claim the activation. Fails if not waiting or already claimed.
    pub fn begin_activation(&mut self) -> Result<(), ServiceWorkerError> {
        self.begin(LifecycleState::Waiting, LifecycleState::Active)
    }

    /// Waiting → Active.
    pub fn activate(&mut self) -> Result<(), ServiceWorkerError> {
        self.transition(LifecycleState::Waiting, LifecycleState::Active)
    }

    /// Any state → Redundant.
    pub fn make_redundant(&mut self) {
        self.pending = None;
        self.state = LifecycleState::Redundant;
    }

    fn begin(&mut self, from: LifecycleState, to: LifecycleState) -> Result<(), ServiceWorkerError> {
        if let Some(pending) = self.pending {
            return Err(ServiceWorkerError::InvalidState(format!(
                "cannot move to {to}, already moving to {pending}"
            )));
        }
        self.expect(from, to)?;
        self.pending = Some(to);
        Ok(())
    }

    fn transition(
        &mut self,
        from: LifecycleState,
        to: LifecycleState,
    ) -> Result<(), ServiceWorkerError> {
        self.expect(from, to)?;
        self.pending = None;
        self.state = to;
        Ok(())
    }

    fn expect(&self, from: LifecycleState, to: LifecycleState) -> Result<(), ServiceWorkerError> {
        if self.state != from {
            return Err(ServiceWorkerError::InvalidState(format!(
                "cannot move to {to} from {}, expected {from}",
                self.state
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_happy_path() {
        let mut lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), LifecycleState::Installing);
        assert!(!lifecycle.state().can_intercept_fetch());

        lifecycle.install_complete().unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Waiting);
        assert!(!lifecycle.should_activate());

        lifecycle.skip_waiting();
        assert!(lifecycle.should_activate());

        lifecycle.activate().unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Active);
        assert!(lifecycle.state().can_intercept_fetch());
        assert!(!lifecycle.should_activate());
    }

    #[test]
    fn test_activate_before_install_fails() {
        let mut lifecycle = Lifecycle::new();
        let err = lifecycle.activate().unwrap_err();
        assert!(matches!(err, ServiceWorkerError::InvalidState(_)));
        assert_eq!(lifecycle.state(), LifecycleState::Installing);
    }

    #[test]
    fn test_double_install_fails() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.install_complete().unwrap();
        assert!(lifecycle.install_complete().is_err());
    }

    #[test]
    fn test_redundant_is_terminal_for_transitions() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.make_redundant();
        assert!(lifecycle.install_complete().is_err());
        assert!(lifecycle.activate().is_err());
        assert_eq!(lifecycle.state().to_string(), "redundant");
    }

    #[test]
    fn test_skip_waiting_before_install_is_remembered() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.skip_waiting();
        assert!(!lifecycle.should_activate());
        lifecycle.install_complete().unwrap();
        assert!(lifecycle.should_activate());
    }

    #[test]
    fn test_activation_can_only_be_claimed_once() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.begin_install().unwrap();
        assert!(lifecycle.begin_install().is_err());
        lifecycle.skip_waiting();
        lifecycle.install_complete().unwrap();

        assert!(lifecycle.should_activate());
        lifecycle.begin_activation().unwrap();
        assert!(!lifecycle.should_activate());
        assert!(matches!(
            lifecycle.begin_activation(),
            Err(ServiceWorkerError::InvalidState(_))
        ));

        lifecycle.activate().unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Active);
        assert!(lifecycle.begin_activation().is_err());
    }
}
