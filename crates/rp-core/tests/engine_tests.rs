//! Integration tests for the execution engine, conditional and parallel stages.

use async_trait::async_trait;
use rp_core::{
    chain, execute, execute_with, if_else, in_parallel, in_sequence, BoxError, Chain, Context,
    RecordingLogger, SharedLogger, Stage, StageError, StatusCode,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Test stages
// =============================================================================

/// Configurable stage that counts its runs.
struct Probe {
    label: String,
    runs: Arc<AtomicUsize>,
    output: Option<Value>,
    fail_with: Option<&'static str>,
    delay: Duration,
    ctx_write: Option<&'static str>,
}

impl Probe {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            runs: Arc::new(AtomicUsize::new(0)),
            output: None,
            fail_with: None,
            delay: Duration::ZERO,
            ctx_write: None,
        }
    }

    fn returning(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }

    fn failing(mut self, message: &'static str) -> Self {
        self.fail_with = Some(message);
        self
    }

    fn sleeping(mut self, millis: u64) -> Self {
        self.delay = Duration::from_millis(millis);
        self
    }

    fn writing(mut self, key: &'static str) -> Self {
        self.ctx_write = Some(key);
        self
    }

    fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.runs)
    }
}

#[async_trait]
impl Stage for Probe {
    fn display(&self) -> String {
        self.label.clone()
    }

    async fn run(
        &self,
        input: Value,
        ctx: &Context,
        _logger: Option<&SharedLogger>,
    ) -> Result<Value, BoxError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(message) = self.fail_with {
            return Err(message.into());
        }
        let out = self.output.clone().unwrap_or(input);
        if let Some(key) = self.ctx_write {
            ctx.set_value(key, out.clone());
        }
        Ok(out)
    }
}

/// Stage with its own error translation.
struct Teapot;

#[async_trait]
impl Stage for Teapot {
    fn display(&self) -> String {
        "teapot".to_string()
    }

    async fn run(
        &self,
        _input: Value,
        _ctx: &Context,
        _logger: Option<&SharedLogger>,
    ) -> Result<Value, BoxError> {
        Err("short and stout".into())
    }

    fn on_error(&self, err: BoxError) -> StageError {
        StageError::new(StatusCode::IM_A_TEAPOT, json!({ "tea": err.to_string() }))
    }
}

fn recorder() -> (Arc<RecordingLogger>, SharedLogger) {
    let recorder = RecordingLogger::new();
    let shared: SharedLogger = recorder.clone();
    (recorder, shared)
}

// =============================================================================
// Sequential execution
// =============================================================================

#[tokio::test]
async fn test_identity_chain_returns_input_and_logs_in_order() {
    let (recorder, logger) = recorder();
    let pipe = chain![Probe::new("a"), Probe::new("b"), Probe::new("c")];

    let out = execute_with(&pipe, json!({ "k": 1 }), &Context::new(), Some(&logger))
        .await
        .unwrap();

    assert_eq!(out, json!({ "k": 1 }));
    assert_eq!(
        recorder.events(),
        vec![
            "start Starting pipeline...",
            r#"run a {"k":1}"#,
            r#"ok a {"k":1}"#,
            r#"run b {"k":1}"#,
            r#"ok b {"k":1}"#,
            r#"run c {"k":1}"#,
            r#"ok c {"k":1}"#,
        ]
    );
}

#[tokio::test]
async fn test_execute_starts_from_null() {
    let pipe = Chain::first(Probe::new("a"));
    let out = execute(&pipe, &Context::new(), None).await.unwrap();
    assert_eq!(out, Value::Null);
}

#[tokio::test]
async fn test_outputs_thread_through_stages() {
    let pipe = chain![
        Probe::new("one").returning(json!(1)),
        Probe::new("two").returning(json!(2)),
    ];
    assert_eq!(execute(&pipe, &Context::new(), None).await.unwrap(), json!(2));
}

#[tokio::test]
async fn test_fail_fast_skips_remaining_stages() {
    let (recorder, logger) = recorder();
    let s1 = Probe::new("s1");
    let s2 = Probe::new("s2").failing("lookup failed");
    let s3 = Probe::new("s3");
    let (c1, c2, c3) = (s1.counter(), s2.counter(), s3.counter());

    let err = execute(&chain![s1, s2, s3], &Context::new(), Some(&logger))
        .await
        .unwrap_err();

    assert_eq!(err, StageError::bad_request("lookup failed"));
    assert_eq!(c1.load(Ordering::SeqCst), 1);
    assert_eq!(c2.load(Ordering::SeqCst), 1);
    assert_eq!(c3.load(Ordering::SeqCst), 0);
    assert_eq!(
        recorder.events(),
        vec![
            "start Starting pipeline...",
            "run s1 null",
            "ok s1 null",
            "run s2 null",
            "err s2",
            "error 400",
        ]
    );
}

#[tokio::test]
async fn test_stage_on_error_is_used() {
    let err = execute(&chain![Probe::new("a"), Teapot], &Context::new(), None)
        .await
        .unwrap_err();
    assert_eq!(err.code, StatusCode::IM_A_TEAPOT);
    assert_eq!(err.payload, json!({ "tea": "short and stout" }));
}

#[tokio::test]
async fn test_catch_overrides_last_stage_error() {
    let pipe = chain![Probe::new("a"), Teapot].catch(StatusCode::PAYMENT_REQUIRED, "pay first");

    let err = execute(&pipe, &Context::new(), None).await.unwrap_err();
    assert_eq!(err.code, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(err.payload, json!({ "error": "pay first" }));
}

#[tokio::test]
async fn test_catch_on_earlier_stage_survives_then() {
    let pipe = Chain::first(Probe::new("a").failing("raw"))
        .catch(StatusCode::UNAUTHORIZED, "who are you")
        .then(Probe::new("b"));

    let err = execute(&pipe, &Context::new(), None).await.unwrap_err();
    assert_eq!(err, StageError::with_message(StatusCode::UNAUTHORIZED, "who are you"));
}

#[tokio::test]
async fn test_in_sequence_executes_all_chains() {
    let pipe = in_sequence(vec![
        Chain::first(Probe::new("a").returning(json!("a"))),
        chain![Probe::new("b"), Probe::new("c").writing("seen")],
    ])
    .unwrap();

    let ctx = Context::new();
    assert_eq!(execute(&pipe, &ctx, None).await.unwrap(), json!("a"));
    assert_eq!(ctx.get_value("seen"), Some(json!("a")));
}

// =============================================================================
// Conditional
// =============================================================================

#[tokio::test]
async fn test_if_else_runs_only_selected_branch() {
    let then = Probe::new("then").returning(json!("yes"));
    let otherwise = Probe::new("else").returning(json!("no"));
    let (then_runs, else_runs) = (then.counter(), otherwise.counter());

    let pipe = chain![
        Probe::new("flag").returning(json!(true)),
        if_else(
            |input, _ctx| input.as_bool().unwrap_or(false),
            Some(Chain::first(then)),
            Some(Chain::first(otherwise)),
        ),
    ];

    assert_eq!(execute(&pipe, &Context::new(), None).await.unwrap(), json!("yes"));
    assert_eq!(then_runs.load(Ordering::SeqCst), 1);
    assert_eq!(else_runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_if_else_predicate_reads_context() {
    let pipe = Chain::first(if_else(
        |_input, ctx| ctx.contains("admin"),
        Some(Chain::first(Probe::new("then").returning(json!("admin")))),
        Some(Chain::first(Probe::new("else").returning(json!("guest")))),
    ));

    let ctx = Context::new();
    assert_eq!(execute(&pipe, &ctx, None).await.unwrap(), json!("guest"));
    ctx.set("admin", true);
    assert_eq!(execute(&pipe, &ctx, None).await.unwrap(), json!("admin"));
}

#[tokio::test]
async fn test_if_then_only_with_false_predicate_is_noop() {
    let stage = if_else(|_, _| false, Some(Chain::first(Probe::new("then"))), None);
    assert_eq!(stage.display(), "If => then");

    let out = stage.run(json!("ignored"), &Context::new(), None).await.unwrap();
    assert_eq!(out, Value::Null);
}

#[tokio::test]
async fn test_if_else_failure_passes_through_verbatim() {
    let pipe = chain![
        if_else(|_, _| true, Some(chain![Probe::new("inner"), Teapot]), None),
        Probe::new("after"),
    ];

    let err = execute(&pipe, &Context::new(), None).await.unwrap_err();
    assert_eq!(err.code, StatusCode::IM_A_TEAPOT);
    assert_eq!(err.payload, json!({ "tea": "short and stout" }));
}

#[tokio::test]
async fn test_if_else_shares_logger_with_branch() {
    let (recorder, logger) = recorder();
    let pipe = Chain::first(if_else(
        |_, _| true,
        Some(Chain::first(Probe::new("inner"))),
        None,
    ));

    execute(&pipe, &Context::new(), Some(&logger)).await.unwrap();
    let events = recorder.events();
    assert!(events.contains(&"ok inner null".to_string()));
    assert_eq!(events.last().unwrap(), "ok If => then null");
}

// =============================================================================
// Parallel
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_outputs_keep_chain_order() {
    let pipe = Chain::first(in_parallel(vec![
        Chain::first(Probe::new("c1").sleeping(5).returning(json!("out1"))),
        Chain::first(Probe::new("c2").sleeping(80).returning(json!("out2"))),
        Chain::first(Probe::new("c3").returning(json!("out3"))),
    ]));

    let out = execute(&pipe, &Context::new(), None).await.unwrap();
    assert_eq!(out, json!(["out1", "out2", "out3"]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_branches_overlap() {
    let branches = (0..4).map(|i| Chain::first(Probe::new(&format!("b{}", i)).sleeping(100)));
    let pipe = Chain::first(in_parallel(branches));

    let start = std::time::Instant::now();
    execute(&pipe, &Context::new(), None).await.unwrap();
    assert!(start.elapsed() < Duration::from_millis(350));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_reports_lowest_index_failure() {
    // c1 finishes last, c3 first: the error must still come from c1.
    let c1 = chain![
        Probe::new("c1").sleeping(60),
        Probe::new("c1-fail").failing("first"),
    ]
    .catch(StatusCode::NOT_FOUND, "c1 failed");
    let c3 = Chain::first(Probe::new("c3").failing("third"))
        .catch(StatusCode::CONFLICT, "c3 failed");

    let pipe = Chain::first(in_parallel(vec![
        c1,
        Chain::first(Probe::new("c2").returning(json!(2))),
        c3,
    ]));

    let err = execute(&pipe, &Context::new(), None).await.unwrap_err();
    assert_eq!(err, StageError::with_message(StatusCode::NOT_FOUND, "c1 failed"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_waits_for_all_branches_after_failure() {
    let slow = Probe::new("slow").sleeping(50).writing("slow.done");
    let slow_runs = slow.counter();

    let pipe = chain![
        in_parallel(vec![
            Chain::first(Probe::new("fast").failing("nope")),
            Chain::first(slow),
        ]),
        Probe::new("never"),
    ];

    let ctx = Context::new();
    let err = execute(&pipe, &ctx, None).await.unwrap_err();
    assert_eq!(err, StageError::bad_request("nope"));
    assert_eq!(slow_runs.load(Ordering::SeqCst), 1);
    assert!(ctx.contains("slow.done"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_branches_share_context() {
    let ctx = Context::new();
    ctx.set_value("order.id", json!(42));

    let pipe = chain![
        in_parallel(vec![
            Chain::first(Probe::new("customer").returning(json!("ada")).writing("db.customer")),
            Chain::first(Probe::new("inventory").returning(json!(7)).writing("db.inventory")),
        ]),
        Probe::new("after"),
    ];

    let out = execute(&pipe, &ctx, None).await.unwrap();
    assert_eq!(out, json!(["ada", 7]));
    assert_eq!(ctx.get_value("db.customer"), Some(json!("ada")));
    assert_eq!(ctx.get_value("db.inventory"), Some(json!(7)));
    assert_eq!(ctx.get_value("order.id"), Some(json!(42)));
}

#[tokio::test]
async fn test_parallel_branch_logging_is_opt_in() {
    let (quiet, quiet_logger) = recorder();
    let pipe = Chain::first(in_parallel(vec![Chain::first(Probe::new("branch"))]));
    execute(&pipe, &Context::new(), Some(&quiet_logger)).await.unwrap();
    assert!(!quiet.events().iter().any(|e| e.contains("branch")));

    let (loud, loud_logger) = recorder();
    let pipe = Chain::first(
        in_parallel(vec![Chain::first(Probe::new("branch"))]).log_branches(true),
    );
    execute(&pipe, &Context::new(), Some(&loud_logger)).await.unwrap();
    assert!(loud.events().contains(&"ok branch null".to_string()));
}

#[tokio::test]
async fn test_parallel_with_no_branches() {
    let pipe = Chain::first(in_parallel(Vec::new()));
    assert_eq!(execute(&pipe, &Context::new(), None).await.unwrap(), json!([]));
}
