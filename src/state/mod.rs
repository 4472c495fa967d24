// State management module
//
// This module provides the StateManager which wraps ScanState with thread-safe access
// using Arc<RwLock<T>>, validates status transitions and emits change events for GUI updates.

use crate::models::{
    FailureKind, Language, NetworkJoinInfo, ScanFailure, ScanMode, ScanState, ScanStatus,
};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::sync::broadcast;

/// Change events emitted when state is modified
///
/// These events notify interested parties (primarily the GUI) about state
/// changes without requiring them to poll the state.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// The status machine moved
    StatusChanged { from: ScanStatus, to: ScanStatus },

    /// A different input mode was selected
    ModeChanged { mode: ScanMode },

    /// A payload was accepted and is being "connected"
    JoinInfoReady { identifier: String },

    /// The flow ended in an error panel
    Failed { kind: FailureKind, message: String },

    /// Flashlight capability or state changed
    IlluminationChanged { supported: bool, on: bool },

    /// Display language changed
    LanguageChanged { language: Language },

    /// State has been reset to mode selection
    StateReset,
}

/// Errors raised by state mutations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("Invalid status transition {from} -> {to} in {mode:?} mode")]
    InvalidTransition {
        from: ScanStatus,
        to: ScanStatus,
        mode: ScanMode,
    },
}

/// Thread-safe state manager with event emission
///
/// This is the central state component that:
/// - Provides thread-safe access to [`ScanState`] via `Arc<RwLock<T>>`
/// - Rejects status transitions that [`ScanState::can_transition_to`] forbids
/// - Detects state changes and emits [`StateChange`] events
/// - Supports subscribing to state changes via tokio broadcast channels
///
/// Validation happens under the write lock, so concurrent callers observe a
/// strictly serialized sequence of statuses.
pub struct StateManager {
    state: Arc<RwLock<ScanState>>,

    /// Multiple subscribers can listen for state changes
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with default state and a 100-event channel buffer
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(ScanState::default())),
            state_tx,
        }
    }

    /// Clone of the current state
    pub fn snapshot(&self) -> ScanState {
        self.state.read().unwrap().clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let status = state_manager.read(|state| state.status);
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&ScanState) -> R,
    {
        let state = self.state.read().unwrap();
        f(&state)
    }

    /// Update non-status fields and emit change events
    ///
    /// Status changes made here bypass validation; use [`transition`](Self::transition)
    /// for those.
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut ScanState),
    {
        let mut state = self.state.write().unwrap();
        let old_state = state.clone();

        update_fn(&mut state);

        self.emit(&old_state, &state)
    }

    /// Move the status machine to `to`, then apply `update_fn`.
    ///
    /// Fails without touching state if the move is not allowed.
    pub fn transition_with<F>(&self, to: ScanStatus, update_fn: F) -> Result<Vec<StateChange>, StateError>
    where
        F: FnOnce(&mut ScanState),
    {
        self.apply_transition(|_| {}, to, update_fn)
    }

    /// `prepare`, validate and apply `to`, then `update_fn`, all under one write lock.
    ///
    /// Readers never observe the prepared intermediate state, and events are
    /// computed against the state before `prepare`.
    fn apply_transition<P, F>(&self, prepare: P, to: ScanStatus, update_fn: F) -> Result<Vec<StateChange>, StateError>
    where
        P: FnOnce(&mut ScanState),
        F: FnOnce(&mut ScanState),
    {
        let mut state = self.state.write().unwrap();
        let mut next = state.clone();
        prepare(&mut next);

        if !next.can_transition_to(to) {
            tracing::warn!("Rejected status transition {} -> {} ({:?} mode)", next.status, to, next.mode);
            return Err(StateError::InvalidTransition {
                from: next.status,
                to,
                mode: next.mode,
            });
        }

        next.status = to;
        update_fn(&mut next);

        let old_state = std::mem::replace(&mut *state, next);
        tracing::debug!("Status {} -> {}", old_state.status, to);
        Ok(self.emit(&old_state, &state))
    }

    pub fn transition(&self, to: ScanStatus) -> Result<Vec<StateChange>, StateError> {
        self.transition_with(to, |_| {})
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    fn emit(&self, old: &ScanState, new: &ScanState) -> Vec<StateChange> {
        let changes = Self::detect_changes(old, new);

        for change in &changes {
            // Ignore send errors - it's OK if no one is listening
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    /// Detect what changed between two states and generate events
    fn detect_changes(old: &ScanState, new: &ScanState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.mode != new.mode {
            changes.push(StateChange::ModeChanged { mode: new.mode });
        }

        if old.status != new.status {
            changes.push(StateChange::StatusChanged {
                from: old.status,
                to: new.status,
            });
        }

        if old.join_info != new.join_info {
            if let Some(info) = &new.join_info {
                changes.push(StateChange::JoinInfoReady {
                    identifier: info.identifier.clone(),
                });
            }
        }

        if old.failure != new.failure {
            if let Some(failure) = &new.failure {
                changes.push(StateChange::Failed {
                    kind: failure.kind,
                    message: failure.message.clone(),
                });
            }
        }

        if old.illumination_supported != new.illumination_supported
            || old.illumination_on != new.illumination_on
        {
            changes.push(StateChange::IlluminationChanged {
                supported: new.illumination_supported,
                on: new.illumination_on,
            });
        }

        if old.language != new.language {
            changes.push(StateChange::LanguageChanged {
                language: new.language,
            });
        }

        changes
    }

    // Convenience methods for the scan flow

    /// Enter camera mode and ask for device access (`Idle`/`Error -> RequestingAccess`)
    pub fn begin_camera_request(&self) -> Result<Vec<StateChange>, StateError> {
        self.apply_transition(
            |state| {
                let retrying = state.mode == ScanMode::Camera
                    && matches!(state.status, ScanStatus::Idle | ScanStatus::Error);
                if !retrying {
                    state.mode = ScanMode::Camera;
                    state.reset_run();
                }
            },
            ScanStatus::RequestingAccess,
            |state| {
                state.failure = None;
                state.join_info = None;
            },
        )
    }

    /// Enter image mode and start its single decode (`Idle -> Scanning`)
    pub fn begin_image_scan(&self) -> Result<Vec<StateChange>, StateError> {
        self.apply_transition(
            |state| {
                state.mode = ScanMode::Image;
                state.reset_run();
            },
            ScanStatus::Scanning,
            |_| {},
        )
    }

    /// Device granted: record capability and start scanning
    pub fn camera_ready(&self, illumination_supported: bool) -> Result<Vec<StateChange>, StateError> {
        self.transition_with(ScanStatus::Scanning, |state| {
            state.illumination_supported = illumination_supported;
            state.illumination_on = false;
        })
    }

    /// Accepted payload: `Scanning -> Connecting`
    pub fn begin_connecting(&self, info: NetworkJoinInfo) -> Result<Vec<StateChange>, StateError> {
        tracing::info!("Connecting to network node {}", info.identifier);
        self.transition_with(ScanStatus::Connecting, |state| {
            state.join_info = Some(info);
        })
    }

    /// Simulated handshake finished
    pub fn complete(&self) -> Result<Vec<StateChange>, StateError> {
        self.transition(ScanStatus::Success)
    }

    /// End the run in the error panel with a message in the current language
    pub fn fail(&self, kind: FailureKind) -> Result<Vec<StateChange>, StateError> {
        self.transition_with(ScanStatus::Error, |state| {
            let message = kind.message(state.language).to_string();
            tracing::warn!("Scan failed ({:?}): {}", kind, message);
            state.failure = Some(ScanFailure { kind, message });
            state.illumination_supported = false;
            state.illumination_on = false;
        })
    }

    pub fn set_illumination(&self, supported: bool, on: bool) -> Vec<StateChange> {
        self.update(|state| {
            state.illumination_supported = supported;
            state.illumination_on = on;
        })
    }

    /// Switch language, re-localizing a visible failure message
    pub fn set_language(&self, language: Language) -> Vec<StateChange> {
        self.update(|state| {
            state.language = language;
            if let Some(failure) = state.failure.as_mut() {
                failure.message = failure.kind.message(language).to_string();
            }
        })
    }

    /// Return to mode selection, clearing the current run
    pub fn reset(&self) -> Vec<StateChange> {
        let mut changes = self.update(|state| {
            state.mode = ScanMode::Select;
            state.reset_run();
        });

        let reset_event = StateChange::StateReset;
        let _ = self.state_tx.send(reset_event.clone());
        changes.push(reset_event);

        changes
    }

    /// Load user preferences from configuration
    pub fn load_from_config(&self, config: &crate::models::ScannerConfig) -> Vec<StateChange> {
        tracing::info!("Loaded scanner config: language={:?}", config.ui.language);
        self.set_language(config.ui.language)
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}
