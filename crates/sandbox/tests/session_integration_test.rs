//! Session integration tests.
//!
//! Tests the full pipeline: Tool → SandboxSession → Supervisor → SandboxEngine
//! (MockEngine). These tests do NOT require Docker — the mock engine gives
//! deterministic behavior and records what was built and destroyed.

use serde_json::json;
use std::sync::Arc;

use codepod_core::traits::Tool;
use codepod_sandbox::engine::{MockEngine, RawRun};
use codepod_sandbox::tools::{
    ClearStateTool, ExecuteCodeTool, GetStateTool, SandboxSession, SetStateTool,
};
use codepod_sandbox::{ResourceLimits, STATE_MARKER, TRUNCATION_MARKER};

// =============================================================================
// Helpers
// =============================================================================

fn mock_session(runs: Vec<RawRun>) -> (Arc<SandboxSession>, Arc<MockEngine>) {
    mock_session_with_limits(runs, ResourceLimits::default())
}

fn mock_session_with_limits(
    runs: Vec<RawRun>,
    limits: ResourceLimits,
) -> (Arc<SandboxSession>, Arc<MockEngine>) {
    let engine = Arc::new(MockEngine::new(runs));
    let session = Arc::new(SandboxSession::new(engine.clone(), limits));
    (session, engine)
}

fn ok_run(output: impl Into<String>) -> RawRun {
    RawRun {
        output: output.into(),
        exit_code: 0,
        timed_out: false,
    }
}

// =============================================================================
// 1. State round-trip: seed → observe → persist → inspect
// =============================================================================

#[tokio::test]
async fn test_state_round_trip() {
    let (session, engine) = mock_session(vec![
        ok_run("v\n"),
        ok_run(format!("{} {{\"k2\": \"v2\"}}\n", STATE_MARKER)),
    ]);

    // Seed k out-of-band
    session.set_state("k", json!("v")).await.unwrap();

    // First execution observes the seeded value via the rendered prefix
    let result = session.execute("print(k)").await.unwrap();
    assert_eq!(result.stdout, "v\n");
    assert!(
        engine.built_snippets()[0].starts_with("k = \"v\"\n"),
        "prefix must carry the seeded state"
    );

    // Second execution emits a state-update marker for k2
    session.execute("print_state_update()").await.unwrap();

    let state = session.get_state().await;
    assert_eq!(state.get("k"), Some(&json!("v")));
    assert_eq!(state.get("k2"), Some(&json!("v2")));
}

// =============================================================================
// 2. An execution never observes its own state updates in the prefix
// =============================================================================

#[tokio::test]
async fn test_merge_happens_after_run_not_before() {
    let (session, engine) = mock_session(vec![
        ok_run(format!("{} {{\"n\": 1}}\n", STATE_MARKER)),
        ok_run(""),
    ]);

    session.execute("first").await.unwrap();
    session.execute("second").await.unwrap();

    let built = engine.built_snippets();
    assert!(
        !built[0].contains("n = 1"),
        "first execution must not see its own update"
    );
    assert!(
        built[1].starts_with("n = 1\n"),
        "second execution must see the first one's update"
    );
}

// =============================================================================
// 3. Malformed marker lines are non-fatal and leave state unchanged
// =============================================================================

#[tokio::test]
async fn test_malformed_state_line_is_non_fatal() {
    let (session, _) = mock_session(vec![ok_run(format!(
        "{} not-a-json-object\n",
        STATE_MARKER
    ))]);

    session.set_state("kept", json!(1)).await.unwrap();
    let result = session.execute("noise()").await.unwrap();

    assert!(result.success(), "execute must not raise for bad markers");
    let state = session.get_state().await;
    assert_eq!(state.len(), 1);
    assert_eq!(state.get("kept"), Some(&json!(1)));
}

// =============================================================================
// 4. Timeout flows through the façade as data
// =============================================================================

#[tokio::test]
async fn test_timeout_through_facade() {
    let (session, engine) = mock_session(vec![RawRun {
        output: "partial".into(),
        exit_code: -1,
        timed_out: true,
    }]);

    let result = session.execute("for i in range(10**9): pass").await.unwrap();

    assert_eq!(result.error.as_deref(), Some("timeout"));
    assert_eq!(result.exit_code, -1);
    assert_eq!(result.stdout, "");
    assert_eq!(engine.destroy_count(), 1, "environment must be torn down");

    // No merge happened on the timed-out path
    assert!(session.get_state().await.is_empty());
}

// =============================================================================
// 5. Truncation exactness through the façade
// =============================================================================

#[tokio::test]
async fn test_truncation_through_facade() {
    let limits = ResourceLimits {
        max_output_bytes: 1000,
        ..ResourceLimits::default()
    };
    let (session, _) = mock_session_with_limits(vec![ok_run("x".repeat(5000))], limits);

    let result = session.execute("print('x' * 5000)").await.unwrap();

    assert!(result.truncated);
    assert_eq!(result.stdout.len(), 1000 + TRUNCATION_MARKER.len());
    assert!(result.stdout.ends_with(TRUNCATION_MARKER));
}

// =============================================================================
// 6. Every execution gets its own environment, always released
// =============================================================================

#[tokio::test]
async fn test_one_environment_per_execution() {
    let (session, engine) = mock_session(vec![ok_run("a"), ok_run("b"), ok_run("c")]);

    for code in ["print('a')", "print('b')", "print('c')"] {
        session.execute(code).await.unwrap();
    }

    assert_eq!(engine.built_snippets().len(), 3);
    assert_eq!(engine.destroy_count(), 3);
}

// =============================================================================
// 7. Concurrent execute calls on one session serialize
// =============================================================================

#[tokio::test]
async fn test_concurrent_execute_serializes() {
    let (session, engine) = mock_session(vec![
        ok_run(format!("{} {{\"a\": 1}}\n", STATE_MARKER)),
        ok_run(format!("{} {{\"b\": 2}}\n", STATE_MARKER)),
    ]);

    let (r1, r2) = tokio::join!(session.execute("one"), session.execute("two"));
    r1.unwrap();
    r2.unwrap();

    // Both updates landed; neither interleaved with the other
    let state = session.get_state().await;
    assert_eq!(state.get("a"), Some(&json!(1)));
    assert_eq!(state.get("b"), Some(&json!(2)));

    // The second submission saw the first one's merged state in its prefix
    let built = engine.built_snippets();
    assert_eq!(built.len(), 2);
    assert!(built[1].starts_with("a = 1\n"));
}

// =============================================================================
// 8. Tool façade end to end: execute + state tools
// =============================================================================

#[tokio::test]
async fn test_tool_facade_pipeline() {
    let (session, _) = mock_session(vec![ok_run("2\n")]);

    let execute = ExecuteCodeTool::new(session.clone());
    let get_state = GetStateTool::new(session.clone());
    let set_state = SetStateTool::new(session.clone());
    let clear_state = ClearStateTool::new(session);

    // Seed state through the tool surface
    let out = set_state
        .execute(json!({"key": "answer", "value": 42}))
        .await
        .unwrap();
    assert!(out.success);

    // Execute
    let out = execute.execute(json!({"code": "print(1+1)"})).await.unwrap();
    assert!(out.success);
    assert!(out.content.contains('2'));

    // Inspect
    let out = get_state.execute(json!({})).await.unwrap();
    assert!(out.content.contains("\"answer\": 42"));

    // Clear
    let out = clear_state.execute(json!({})).await.unwrap();
    assert!(out.success);
    let out = get_state.execute(json!({})).await.unwrap();
    assert!(!out.content.contains("answer"));
}

// =============================================================================
// 9. Seeding rejects values that cannot be re-injected
// =============================================================================

#[tokio::test]
async fn test_set_state_tool_rejects_nested_values() {
    let (session, _) = mock_session(vec![]);
    let set_state = SetStateTool::new(session);

    let err = set_state
        .execute(json!({"key": "cfg", "value": {"nested": true}}))
        .await;
    assert!(err.is_err(), "nested values violate the flat-state invariant");
}
