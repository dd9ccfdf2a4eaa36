//! Provisioning State Machine
//!
//! This module provides an authoritative, Rust-side source of truth for provisioning
//! progress. It enforces valid phase transitions and makes it impossible to skip
//! steps programmatically.
//!
//! # Design Principles
//!
//! - **Single Source of Truth**: The `ProvisionContext` owns the current phase
//! - **Validated Transitions**: Only the immediate next phase is reachable
//! - **No Global State**: State is owned by `ProvisionContext`, not global/static
//! - **Fail Fast**: An invalid transition is an error, never a silent no-op
//!
//! # Phase Flow
//!
//! ```text
//! NotStarted
//!     ↓
//! BaseSelected
//!     ↓
//! AuxInstalled
//!     ↓
//! SourceFetched
//!     ↓
//! PackageInstalled
//!
//! (Any non-terminal phase can transition to Failed)
//! ```
//!
//! Each arrow is one provisioning step: selecting the base environment (1),
//! installing the auxiliary packages (2), fetching the source checkout (3), and
//! installing the fetched package (4). The phase names record what has already
//! happened, so `failed_at` pins down exactly which step was in flight when a
//! run died.

use crate::host::{HostInfo, NetworkState};
use crate::plan::StepKind;
use std::fmt;
use thiserror::Error;

/// Provisioning phases in sequential order.
///
/// Each phase records the last completed provisioning step. Phases are ordered
/// and can only progress forward (except for failure transitions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProvisionPhase {
    /// Provisioning has not started yet
    NotStarted = 0,

    /// Step 1 done: base environment resolved to a prefix and interpreter
    BaseSelected = 1,

    /// Step 2 done: auxiliary packages installed into the selected base
    AuxInstalled = 2,

    /// Step 3 done: source checkout cloned under the working directory
    SourceFetched = 3,

    /// Step 4 done: the fetched package installed (terminal success state)
    PackageInstalled = 4,

    /// Provisioning failed (terminal state)
    /// The context records the phase at which failure occurred
    Failed = 255,
}

impl ProvisionPhase {
    /// Returns the numeric order of this phase (0-4, 255 for Failed)
    #[inline]
    pub const fn order(self) -> u8 {
        self as u8
    }

    /// Returns true if this is a terminal state (PackageInstalled or Failed)
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::PackageInstalled | Self::Failed)
    }

    /// Returns the next phase in the sequence, or None if at a terminal state
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::NotStarted => Some(Self::BaseSelected),
            Self::BaseSelected => Some(Self::AuxInstalled),
            Self::AuxInstalled => Some(Self::SourceFetched),
            Self::SourceFetched => Some(Self::PackageInstalled),
            Self::PackageInstalled | Self::Failed => None,
        }
    }

    /// Returns the previous phase in the sequence, or None if at NotStarted or Failed
    pub const fn previous(self) -> Option<Self> {
        match self {
            Self::BaseSelected => Some(Self::NotStarted),
            Self::AuxInstalled => Some(Self::BaseSelected),
            Self::SourceFetched => Some(Self::AuxInstalled),
            Self::PackageInstalled => Some(Self::SourceFetched),
            Self::NotStarted | Self::Failed => None,
        }
    }

    /// Returns a human-readable description of this phase
    pub const fn description(self) -> &'static str {
        match self {
            Self::NotStarted => "Not started",
            Self::BaseSelected => "Base environment selected",
            Self::AuxInstalled => "Auxiliary packages installed",
            Self::SourceFetched => "Source checkout fetched",
            Self::PackageInstalled => "Provisioning complete",
            Self::Failed => "Provisioning failed",
        }
    }

    /// Returns the approximate progress percentage for this phase
    pub const fn progress_percent(self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::BaseSelected => 10,
            Self::AuxInstalled => 35,
            Self::SourceFetched => 60,
            Self::PackageInstalled => 100,
            Self::Failed => 0, // Progress is meaningless for failed state
        }
    }

    /// Returns all phases in order (excluding Failed)
    pub const fn all_phases() -> &'static [Self] {
        &[
            Self::NotStarted,
            Self::BaseSelected,
            Self::AuxInstalled,
            Self::SourceFetched,
            Self::PackageInstalled,
        ]
    }
}

impl fmt::Display for ProvisionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur during phase transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PhaseTransitionError {
    /// Attempted to skip one or more phases
    #[error("Cannot skip from {from} to {to} (must transition through intermediate phases)")]
    SkippedPhase {
        from: ProvisionPhase,
        to: ProvisionPhase,
    },

    /// Attempted to go backwards (not allowed)
    #[error("Cannot go backwards from {from} to {to} (provisioning is forward-only)")]
    BackwardTransition {
        from: ProvisionPhase,
        to: ProvisionPhase,
    },

    /// Attempted to transition from a terminal state
    #[error("Cannot transition from terminal phase {from} (provisioning is {})", if *from == ProvisionPhase::PackageInstalled { "complete" } else { "failed" })]
    FromTerminalPhase { from: ProvisionPhase },

    /// Attempted to transition to the same state
    #[error("Already at phase {phase}")]
    AlreadyAtPhase { phase: ProvisionPhase },
}

/// Context for tracking provisioning state.
///
/// This struct owns the current provisioning phase and provides validated
/// transition methods. It ensures that steps cannot be skipped and that
/// transitions only move forward (except for failure).
///
/// # Example
///
/// ```
/// use labstrap::state::{ProvisionContext, ProvisionPhase};
///
/// let mut ctx = ProvisionContext::new();
/// assert_eq!(ctx.current_phase(), ProvisionPhase::NotStarted);
///
/// // Advance to next phase
/// ctx.advance().unwrap();
/// assert_eq!(ctx.current_phase(), ProvisionPhase::BaseSelected);
///
/// // Cannot skip phases
/// assert!(ctx.transition_to(ProvisionPhase::SourceFetched).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct ProvisionContext {
    /// Current provisioning phase
    current: ProvisionPhase,

    /// Phase at which failure occurred (if any)
    failed_at: Option<ProvisionPhase>,

    /// History of completed phases with timestamps (phase, unix timestamp)
    /// This allows debugging and progress reporting without global state
    phase_history: Vec<(ProvisionPhase, u64)>,

    /// Detected network connectivity, set at startup and refreshable later
    network_state: NetworkState,
}

impl Default for ProvisionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ProvisionContext {
    /// Create a new provisioning context in the NotStarted state.
    ///
    /// Defaults to Offline network (safe default). Use `with_host()` to
    /// initialize with detected host info.
    pub fn new() -> Self {
        Self {
            current: ProvisionPhase::NotStarted,
            failed_at: None,
            phase_history: Vec::with_capacity(ProvisionPhase::all_phases().len()),
            network_state: NetworkState::Offline,
        }
    }

    /// Create a new provisioning context initialized with detected host info.
    ///
    /// This is the preferred constructor for production use. It stores the
    /// probe results for the lifetime of the run.
    pub fn with_host(host: &HostInfo) -> Self {
        Self {
            current: ProvisionPhase::NotStarted,
            failed_at: None,
            phase_history: Vec::with_capacity(ProvisionPhase::all_phases().len()),
            network_state: host.network,
        }
    }

    /// Returns the detected network connectivity state.
    #[inline]
    pub fn network_state(&self) -> NetworkState {
        self.network_state
    }

    /// Refresh network connectivity state (e.g., after connectivity returns).
    pub fn refresh_network(&mut self) {
        self.network_state = crate::host::detect_network();
        tracing::info!("Network state refreshed: {}", self.network_state);
    }

    /// Returns the current provisioning phase
    #[inline]
    pub fn current_phase(&self) -> ProvisionPhase {
        self.current
    }

    /// Returns the phase at which failure occurred, if any
    #[inline]
    pub fn failed_at(&self) -> Option<ProvisionPhase> {
        self.failed_at
    }

    /// Returns the step that was in flight when the run failed, if any.
    ///
    /// Failure is recorded against the phase the context occupied when the
    /// step died, so the failing step is the one leaving that phase.
    pub fn failed_step(&self) -> Option<StepKind> {
        match self.failed_at? {
            ProvisionPhase::NotStarted => Some(StepKind::SelectBase),
            ProvisionPhase::BaseSelected => Some(StepKind::InstallAux),
            ProvisionPhase::AuxInstalled => Some(StepKind::FetchSource),
            ProvisionPhase::SourceFetched => Some(StepKind::InstallPackage),
            // Terminal phases never carry an in-flight step
            ProvisionPhase::PackageInstalled | ProvisionPhase::Failed => None,
        }
    }

    /// Returns true if provisioning has completed successfully
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.current == ProvisionPhase::PackageInstalled
    }

    /// Returns true if provisioning has failed
    #[inline]
    pub fn is_failed(&self) -> bool {
        self.current == ProvisionPhase::Failed
    }

    /// Returns true if provisioning is in progress (not terminal)
    #[inline]
    pub fn is_in_progress(&self) -> bool {
        !self.current.is_terminal() && self.current != ProvisionPhase::NotStarted
    }

    /// Returns the current progress percentage (0-100)
    #[inline]
    pub fn progress_percent(&self) -> u8 {
        self.current.progress_percent()
    }

    /// Returns the phase history as a slice of (phase, timestamp) pairs
    pub fn phase_history(&self) -> &[(ProvisionPhase, u64)] {
        &self.phase_history
    }

    /// Advance to the next phase in sequence.
    ///
    /// # Errors
    ///
    /// - `FromTerminalPhase` if already at PackageInstalled or Failed
    pub fn advance(&mut self) -> Result<ProvisionPhase, PhaseTransitionError> {
        // Cannot advance from terminal state
        if self.current.is_terminal() {
            return Err(PhaseTransitionError::FromTerminalPhase { from: self.current });
        }

        // Get next phase (safe: we checked is_terminal above)
        // SAFETY: next() only returns None for terminal phases, which we checked above
        let next_phase = self.current.next().expect(
            "INTERNAL ERROR: non-terminal phase returned None from next() - this is a bug",
        );

        // Record transition
        self.record_phase_transition(next_phase);
        self.current = next_phase;

        Ok(next_phase)
    }

    /// Transition to a specific phase (must be the next phase in sequence).
    ///
    /// This is stricter than `advance()` - it validates that you're transitioning
    /// to the expected phase, preventing logic errors.
    ///
    /// # Errors
    ///
    /// - `AlreadyAtPhase` if target is the current phase
    /// - `BackwardTransition` if target is before current
    /// - `SkippedPhase` if target is not the immediate next phase
    /// - `FromTerminalPhase` if current is a terminal state
    pub fn transition_to(
        &mut self,
        target: ProvisionPhase,
    ) -> Result<ProvisionPhase, PhaseTransitionError> {
        // Cannot transition from terminal state
        if self.current.is_terminal() {
            return Err(PhaseTransitionError::FromTerminalPhase { from: self.current });
        }

        // Cannot transition to same state
        if target == self.current {
            return Err(PhaseTransitionError::AlreadyAtPhase { phase: target });
        }

        // Cannot transition to Failed via this method (use fail() instead)
        if target == ProvisionPhase::Failed {
            return Err(PhaseTransitionError::SkippedPhase {
                from: self.current,
                to: target,
            });
        }

        // Check for backward transition
        if target.order() < self.current.order() {
            return Err(PhaseTransitionError::BackwardTransition {
                from: self.current,
                to: target,
            });
        }

        // Check for skipped phases
        let next_phase = self.current.next();
        if next_phase != Some(target) {
            return Err(PhaseTransitionError::SkippedPhase {
                from: self.current,
                to: target,
            });
        }

        // Valid transition
        self.record_phase_transition(target);
        self.current = target;

        Ok(target)
    }

    /// Mark the provisioning run as failed.
    ///
    /// This can be called from any non-terminal state and records which phase
    /// the failure occurred at.
    ///
    /// # Errors
    ///
    /// - `FromTerminalPhase` if already at PackageInstalled or Failed
    pub fn fail(&mut self) -> Result<(), PhaseTransitionError> {
        if self.current.is_terminal() {
            return Err(PhaseTransitionError::FromTerminalPhase { from: self.current });
        }

        self.failed_at = Some(self.current);
        self.record_phase_transition(ProvisionPhase::Failed);
        self.current = ProvisionPhase::Failed;

        Ok(())
    }

    /// Record a phase transition in the history
    fn record_phase_transition(&mut self, phase: ProvisionPhase) {
        // Use monotonic-ish timestamp (seconds since UNIX_EPOCH)
        // This is acceptable for logging purposes
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0); // Fallback to 0 if system time is before epoch (shouldn't happen)

        self.phase_history.push((phase, timestamp));
    }

    /// Reset the context to NotStarted state.
    ///
    /// This clears all history and the failure record. Use with caution.
    pub fn reset(&mut self) {
        self.current = ProvisionPhase::NotStarted;
        self.failed_at = None;
        self.phase_history.clear();
    }
}
