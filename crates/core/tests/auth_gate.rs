mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{user, MockSessionStore, RecordingNavigator};
use todo_core::auth::{AuthGate, GateConfig, GateState, PendingRedirect, DEFAULT_REDIRECT_DELAY};
use todo_core::navigation::Route;

fn gate_with(store: MockSessionStore) -> (Arc<AuthGate>, Arc<RecordingNavigator>, Arc<MockSessionStore>) {
    let store = Arc::new(store);
    let navigator = Arc::new(RecordingNavigator::default());
    let gate = AuthGate::new(store.clone(), GateConfig::default()).with_navigator(navigator.clone());
    (Arc::new(gate), navigator, store)
}

#[tokio::test]
async fn nothing_renders_while_the_check_is_in_flight() {
    let store = MockSessionStore::signed_in(user());
    let release = store.hold_session_checks();
    let (gate, navigator, _) = gate_with(store);

    let running = tokio::spawn({
        let gate = Arc::clone(&gate);
        async move { gate.activate(Route::Tasks).await }
    });
    tokio::task::yield_now().await;

    let state = gate.state().await;
    assert_eq!(state, GateState::Checking);
    assert!(!state.allows_render());

    release.notify_one();
    let outcome = running.await.unwrap();
    assert!(outcome.state.allows_render());
    assert!(outcome.redirect.is_none());
    assert!(navigator.routes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn missing_session_redirects_once_after_the_delay() {
    let (gate, navigator, _) = gate_with(MockSessionStore::signed_out());

    let outcome = gate.activate(Route::Tasks).await;
    assert_eq!(outcome.state, GateState::Unauthenticated);
    assert_eq!(
        outcome.redirect,
        Some(PendingRedirect {
            route: Route::SignIn,
            delay: DEFAULT_REDIRECT_DELAY,
        })
    );
    assert!(gate.redirect_pending());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(navigator.routes().is_empty());

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(navigator.routes(), vec![Route::SignIn]);
    assert!(!gate.redirect_pending());
}

#[tokio::test(start_paused = true)]
async fn failed_lookup_is_treated_as_signed_out() {
    let (gate, navigator, store) = gate_with(MockSessionStore::failing("connection reset"));

    let outcome = gate.activate(Route::Tasks).await;
    assert_eq!(outcome.state, GateState::Unauthenticated);
    assert!(!outcome.state.allows_render());

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(navigator.routes(), vec![Route::SignIn]);
    assert_eq!(store.calls(), vec!["get_session"]);
}

#[tokio::test(start_paused = true)]
async fn repeated_activation_does_not_stack_redirects() {
    let (gate, navigator, _) = gate_with(MockSessionStore::signed_out());

    gate.activate(Route::Tasks).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    gate.activate(Route::Tasks).await;

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(navigator.routes(), vec![Route::SignIn]);
}

#[tokio::test(start_paused = true)]
async fn no_redirect_when_already_on_sign_in() {
    let (gate, navigator, _) = gate_with(MockSessionStore::signed_out());

    let outcome = gate.activate(Route::SignIn).await;
    assert_eq!(outcome.state, GateState::Unauthenticated);
    assert!(outcome.redirect.is_none());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(navigator.routes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn signed_in_viewer_stays_put() {
    let viewer = user();
    let (gate, navigator, _) = gate_with(MockSessionStore::signed_in(viewer.clone()));

    let outcome = gate.activate(Route::Tasks).await;
    assert_eq!(outcome.state.user(), Some(&viewer));
    assert!(outcome.redirect.is_none());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(navigator.routes().is_empty());
}

#[tokio::test]
async fn gate_without_navigator_only_reports_the_redirect() {
    let store = Arc::new(MockSessionStore::signed_out());
    let config = GateConfig {
        redirect_delay: Duration::from_millis(10),
        ..GateConfig::default()
    };
    let gate = AuthGate::new(store, config);

    let outcome = gate.activate(Route::Tasks).await;
    assert_eq!(outcome.redirect.map(|r| r.delay), Some(Duration::from_millis(10)));
    assert!(!gate.redirect_pending());
}
