//! Integration tests for StateManager with state change events
//!
//! These tests verify that the StateManager correctly:
//! - Emits state change events along the scan flow
//! - Rejects transitions the status machine forbids
//! - Supports multiple subscribers
//! - Serializes concurrent transitions

use goti_scanner::models::{FailureKind, Language, NetworkJoinInfo, ScanMode, ScanStatus};
use goti_scanner::{StateChange, StateError, StateManager};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{Duration, timeout};

async fn next_event(rx: &mut broadcast::Receiver<StateChange>) -> StateChange {
    timeout(Duration::from_millis(100), rx.recv())
        .await
        .expect("Timeout waiting for event")
        .expect("Channel closed")
}

fn drain_statuses(rx: &mut broadcast::Receiver<StateChange>) -> Vec<(ScanStatus, ScanStatus)> {
    let mut statuses = Vec::new();
    while let Ok(change) = rx.try_recv() {
        if let StateChange::StatusChanged { from, to } = change {
            statuses.push((from, to));
        }
    }
    statuses
}

fn join_info(identifier: &str) -> NetworkJoinInfo {
    NetworkJoinInfo {
        identifier: identifier.to_string(),
        secret: None,
    }
}

#[tokio::test]
async fn test_camera_request_emits_mode_then_status() {
    let state = Arc::new(StateManager::new());
    let mut rx = state.subscribe();

    state.begin_camera_request().unwrap();

    assert_eq!(next_event(&mut rx).await, StateChange::ModeChanged { mode: ScanMode::Camera });
    assert_eq!(
        next_event(&mut rx).await,
        StateChange::StatusChanged {
            from: ScanStatus::Idle,
            to: ScanStatus::RequestingAccess,
        }
    );
}

#[tokio::test]
async fn test_full_camera_flow_status_sequence() {
    let state = StateManager::new();
    let mut rx = state.subscribe();

    state.begin_camera_request().unwrap();
    state.camera_ready(true).unwrap();
    state.begin_connecting(join_info("GotiNet")).unwrap();
    state.complete().unwrap();

    assert_eq!(
        drain_statuses(&mut rx),
        vec![
            (ScanStatus::Idle, ScanStatus::RequestingAccess),
            (ScanStatus::RequestingAccess, ScanStatus::Scanning),
            (ScanStatus::Scanning, ScanStatus::Connecting),
            (ScanStatus::Connecting, ScanStatus::Success),
        ]
    );

    let snapshot = state.snapshot();
    assert_eq!(snapshot.join_info.unwrap().identifier, "GotiNet");
    assert!(snapshot.illumination_supported);
}

#[tokio::test]
async fn test_image_flow_skips_permission_step() {
    let state = StateManager::new();
    let mut rx = state.subscribe();

    state.begin_image_scan().unwrap();
    state.fail(FailureKind::DecodeRejected).unwrap();

    assert_eq!(
        drain_statuses(&mut rx),
        vec![
            (ScanStatus::Idle, ScanStatus::Scanning),
            (ScanStatus::Scanning, ScanStatus::Error),
        ]
    );
    assert_eq!(state.read(|s| s.mode), ScanMode::Image);
}

#[test]
fn test_success_is_unreachable_without_connecting() {
    let state = StateManager::new();
    state.begin_camera_request().unwrap();
    state.camera_ready(false).unwrap();

    let err = state.complete().unwrap_err();
    assert_eq!(
        err,
        StateError::InvalidTransition {
            from: ScanStatus::Scanning,
            to: ScanStatus::Success,
            mode: ScanMode::Camera,
        }
    );
    assert_eq!(state.read(|s| s.status), ScanStatus::Scanning);
}

#[test]
fn test_camera_scanning_cannot_fail_after_access_granted() {
    let state = StateManager::new();
    state.begin_camera_request().unwrap();
    state.camera_ready(false).unwrap();

    assert!(state.fail(FailureKind::DecodeRejected).is_err());
    assert!(state.read(|s| s.failure.is_none()));
}

#[test]
fn test_retry_from_access_denied() {
    let state = StateManager::new();
    state.begin_camera_request().unwrap();
    state.fail(FailureKind::AccessDenied).unwrap();

    state.begin_camera_request().unwrap();

    let snapshot = state.snapshot();
    assert_eq!(snapshot.status, ScanStatus::RequestingAccess);
    assert!(snapshot.failure.is_none());
}

#[tokio::test]
async fn test_reset_returns_to_selection() {
    let state = StateManager::new();
    state.begin_camera_request().unwrap();
    state.fail(FailureKind::AccessDenied).unwrap();
    let mut rx = state.subscribe();

    state.reset();

    let mut saw_reset = false;
    while let Ok(change) = rx.try_recv() {
        saw_reset |= change == StateChange::StateReset;
    }
    assert!(saw_reset);

    let snapshot = state.snapshot();
    assert_eq!(snapshot.status, ScanStatus::Idle);
    assert_eq!(snapshot.mode, ScanMode::Select);
    assert!(snapshot.failure.is_none());
}

#[test]
fn test_language_switch_relocalizes_failure() {
    let state = StateManager::new();
    state.set_language(Language::En);
    state.begin_image_scan().unwrap();
    state.fail(FailureKind::DecodeRejected).unwrap();

    state.set_language(Language::Bn);

    let failure = state.read(|s| s.failure.clone()).unwrap();
    assert_eq!(failure.message, FailureKind::DecodeRejected.message(Language::Bn));
}

#[tokio::test]
async fn test_multiple_subscribers_receive_events() {
    let state = Arc::new(StateManager::new());
    let mut rx1 = state.subscribe();
    let mut rx2 = state.subscribe();

    state.set_language(Language::En);

    assert_eq!(
        next_event(&mut rx1).await,
        StateChange::LanguageChanged { language: Language::En }
    );
    assert_eq!(
        next_event(&mut rx2).await,
        StateChange::LanguageChanged { language: Language::En }
    );
}

#[test]
fn test_concurrent_transitions_are_serialized() {
    let state = Arc::new(StateManager::new());
    state.begin_camera_request().unwrap();
    state.camera_ready(false).unwrap();

    // Only one thread may win Scanning -> Connecting
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let state = Arc::clone(&state);
            std::thread::spawn(move || state.begin_connecting(join_info(&format!("node-{}", i))).is_ok())
        })
        .collect();

    let winners = handles.into_iter().map(|h| h.join().unwrap()).filter(|ok| *ok).count();

    assert_eq!(winners, 1);
    assert_eq!(state.read(|s| s.status), ScanStatus::Connecting);
}
