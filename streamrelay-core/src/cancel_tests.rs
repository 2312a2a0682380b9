use super::*;
use crate::config::DEFAULT_CANCEL_TIMEOUT;
use crate::source::SourceError;
use crate::test_utils::MockSource;

fn setup(source: &MockSource) -> (SessionRegistry, CancelHandle) {
    setup_with_timeout(source, DEFAULT_CANCEL_TIMEOUT)
}

fn setup_with_timeout(source: &MockSource, timeout: Duration) -> (SessionRegistry, CancelHandle) {
    let registry = SessionRegistry::new();
    let source: Arc<dyn GenerationSource> = Arc::new(source.clone());
    let handle = CancelHandle::new(
        GenerationIds::new("conv-1", "msg-1"),
        StateCell::new(),
        source,
        timeout,
        &registry,
    );
    registry.register(handle.clone()).unwrap();
    (registry, handle)
}

#[tokio::test]
async fn test_cancel_runs_every_step_once() {
    let source = MockSource::new();
    let (registry, handle) = setup(&source);
    let token = handle.token();

    assert_eq!(handle.cancel().await, CancelOutcome::Cancelled);

    assert_eq!(handle.state(), SessionState::Cancelled);
    assert!(token.is_cancelled());
    assert!(handle.is_cancelled());
    assert_eq!(
        source.cancel_calls(),
        vec![("conv-1".to_string(), vec!["msg-1".to_string()])]
    );
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_second_cancel_is_noop() {
    let source = MockSource::new();
    let (_registry, handle) = setup(&source);

    handle.cancel().await;
    let again = handle.clone().cancel().await;

    assert_eq!(again, CancelOutcome::AlreadyTerminal(SessionState::Cancelled));
    assert_eq!(source.cancel_count(), 1);
}

#[tokio::test]
async fn test_cancel_after_other_terminal_state() {
    let source = MockSource::new();
    let (registry, handle) = setup(&source);
    handle.state_cell().finish(SessionState::Errored).unwrap();

    assert_eq!(
        handle.cancel().await,
        CancelOutcome::AlreadyTerminal(SessionState::Errored)
    );
    assert!(!handle.is_cancelled());
    assert_eq!(source.cancel_count(), 0);
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_upstream_failure_is_swallowed() {
    let source = MockSource::new().failing_cancel(SourceError::Network("down".to_string()));
    let (registry, handle) = setup(&source);

    assert_eq!(handle.cancel().await, CancelOutcome::Cancelled);
    assert_eq!(source.cancel_count(), 1);
    assert!(registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_slow_upstream_cancel_is_abandoned() {
    let source = MockSource::new().with_cancel_delay(Duration::from_secs(60));
    let (registry, handle) = setup_with_timeout(&source, Duration::from_secs(1));
    let started = tokio::time::Instant::now();

    assert_eq!(handle.cancel().await, CancelOutcome::Cancelled);

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_secs(2));
    assert_eq!(handle.state(), SessionState::Cancelled);
    assert_eq!(source.cancel_count(), 1);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_cancel_without_registry() {
    let source = MockSource::new();
    let (registry, handle) = setup(&source);
    drop(registry);

    assert_eq!(handle.cancel().await, CancelOutcome::Cancelled);
    assert!(!handle.unregister());
}
