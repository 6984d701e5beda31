/// Dispatcher concurrency-bound tests that don't require spawning a
/// real sandboxed child: the overflow-queue rejection path triggers
/// before any permit is acquired.
use sandboxd::config::SandboxConfig;
use sandboxd::dispatcher::Dispatcher;
use sandboxd::types::{Language, RunRequest};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn submit_rejects_when_overflow_queue_is_already_full() {
    let mut config = SandboxConfig::default();
    config.execution.max_workers = 1;
    config.execution.max_requests = 0;
    let dispatcher = Dispatcher::new(Arc::new(config));

    // With max_requests = 0, even the first submission racing for a
    // permit registers as "queued" before it can be granted one, so it
    // is rejected outright rather than blocking forever.
    let request = RunRequest::new(Language::Python, b"pass".to_vec(), Duration::from_secs(1));
    let result = dispatcher.submit(request);
    assert!(result.is_err());
}
