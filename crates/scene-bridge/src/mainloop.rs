//! Deferred execution on the host application's main loop.
//!
//! Host APIs are only safe to touch from the host's own main thread, while
//! requests arrive on whatever task the listener gave them. This module is
//! the boundary between the two worlds: [`channel`] produces a
//! [`MainLoopHandle`] for submitting work from anywhere and a
//! [`MainLoopRunner`] the host drives from its tick callback. Completion
//! flows back through a one-shot slot per task, so a waiter that gives up
//! simply abandons its slot and the late result is discarded.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::config::MainLoopConfig;
use crate::error::{BridgeError, Result};
use crate::host::{ToolError, ToolResult};

type TaskFn = Box<dyn FnOnce() -> ToolResult + Send>;

struct ScheduledTask {
    label: String,
    work: TaskFn,
    reply: oneshot::Sender<ToolResult>,
    enqueued_at: Instant,
}

struct QueueState {
    tasks: VecDeque<ScheduledTask>,
    runner_alive: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    config: MainLoopConfig,
}

impl Shared {
    // Tasks execute outside the lock, so a panicking task cannot poison it;
    // recover anyway rather than propagate a stray poison.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Create a connected handle/runner pair.
pub fn channel(config: MainLoopConfig) -> (MainLoopHandle, MainLoopRunner) {
    let shared = Arc::new(Shared {
        state: Mutex::new(QueueState {
            tasks: VecDeque::new(),
            runner_alive: true,
        }),
        config,
    });
    (
        MainLoopHandle {
            shared: shared.clone(),
        },
        MainLoopRunner { shared },
    )
}

/// Submits work to the host main loop from any thread or task.
#[derive(Clone)]
pub struct MainLoopHandle {
    shared: Arc<Shared>,
}

impl MainLoopHandle {
    /// Schedule `work` and wait for its outcome.
    ///
    /// The wait is cooperative: on timeout the caller walks away and its
    /// completion slot is abandoned. The work itself is not cancelled; if it
    /// runs later its result is discarded. `label` names the operation in
    /// logs and error messages.
    pub async fn submit<F>(
        &self,
        label: impl Into<String>,
        timeout: Duration,
        work: F,
    ) -> Result<Value>
    where
        F: FnOnce() -> ToolResult + Send + 'static,
    {
        let label = label.into();
        let (reply_tx, reply_rx) = oneshot::channel();

        {
            let mut state = self.shared.lock();
            if !state.runner_alive {
                return Err(BridgeError::MainLoopClosed);
            }
            if state.tasks.len() >= self.shared.config.max_queue_depth {
                warn!(
                    task = %label,
                    depth = state.tasks.len(),
                    "main loop queue full, rejecting task"
                );
                return Err(BridgeError::QueueFull {
                    capacity: self.shared.config.max_queue_depth,
                });
            }
            state.tasks.push_back(ScheduledTask {
                label: label.clone(),
                work: Box::new(work),
                reply: reply_tx,
                enqueued_at: Instant::now(),
            });
        }

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(tool_err))) => Err(BridgeError::Operation {
                operation: label,
                message: tool_err.message().to_string(),
            }),
            Ok(Err(_closed)) => Err(BridgeError::MainLoopClosed),
            Err(_elapsed) => {
                warn!(task = %label, ?timeout, "timed out waiting for main loop");
                Err(BridgeError::Timeout {
                    operation: label,
                    timeout,
                })
            }
        }
    }

    /// Tasks currently waiting for the runner.
    pub fn pending(&self) -> usize {
        self.shared.lock().tasks.len()
    }

    /// False once the runner half has been dropped.
    pub fn is_open(&self) -> bool {
        self.shared.lock().runner_alive
    }
}

/// Executes queued work; owned by the host main loop.
///
/// There is exactly one runner per channel and it is not clonable, so queued
/// work only ever executes on the thread the host drives it from.
pub struct MainLoopRunner {
    shared: Arc<Shared>,
}

impl MainLoopRunner {
    /// Drain and execute everything queued at the moment of the call.
    ///
    /// Tasks run serially in submission order on the calling thread. Work
    /// arriving while the batch executes stays queued for the next tick.
    /// Returns the number of tasks executed.
    pub fn run_pending(&self) -> usize {
        let batch: Vec<ScheduledTask> = {
            let mut state = self.shared.lock();
            state.tasks.drain(..).collect()
        };

        let executed = batch.len();
        for task in batch {
            execute(task);
        }
        executed
    }

    /// Tick delay hint for the host: short while work is flowing, long once
    /// the queue has gone quiet. `executed` is the last `run_pending` count.
    pub fn suggested_delay(&self, executed: usize) -> Duration {
        if executed > 0 || !self.shared.lock().tasks.is_empty() {
            self.shared.config.busy_poll_interval
        } else {
            self.shared.config.idle_poll_interval
        }
    }
}

impl Drop for MainLoopRunner {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.runner_alive = false;
        // Dropping queued tasks drops their reply senders, so waiters fail
        // fast instead of hanging until their timeout.
        let stranded = state.tasks.len();
        state.tasks.clear();
        if stranded > 0 {
            warn!(stranded, "main loop runner dropped with tasks queued");
        }
    }
}

fn execute(task: ScheduledTask) {
    let ScheduledTask {
        label,
        work,
        reply,
        enqueued_at,
    } = task;

    let queued_for = enqueued_at.elapsed();
    let started = Instant::now();

    let outcome = match catch_unwind(AssertUnwindSafe(move || work())) {
        Ok(result) => result,
        Err(panic) => {
            let message = panic_message(&panic);
            warn!(task = %label, %message, "task panicked on main loop");
            Err(ToolError::new(format!("{label} panicked: {message}")))
        }
    };

    debug!(
        task = %label,
        queued_ms = queued_for.as_millis() as u64,
        ran_ms = started.elapsed().as_millis() as u64,
        ok = outcome.is_ok(),
        "main loop task finished"
    );

    // A waiter that timed out has dropped its receiver; nothing to do.
    let _ = reply.send(outcome);
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    const TICK: Duration = Duration::from_millis(2);
    const WAIT: Duration = Duration::from_secs(2);

    /// Simulated host main loop on a plain OS thread.
    struct TestLoop {
        stop: Arc<AtomicBool>,
        thread: Option<thread::JoinHandle<()>>,
    }

    impl TestLoop {
        fn spawn(runner: MainLoopRunner) -> Self {
            let stop = Arc::new(AtomicBool::new(false));
            let flag = stop.clone();
            let thread = thread::spawn(move || {
                while !flag.load(Ordering::Relaxed) {
                    runner.run_pending();
                    thread::sleep(TICK);
                }
            });
            Self {
                stop,
                thread: Some(thread),
            }
        }
    }

    impl Drop for TestLoop {
        fn drop(&mut self) {
            self.stop.store(true, Ordering::Relaxed);
            if let Some(thread) = self.thread.take() {
                let _ = thread.join();
            }
        }
    }

    #[tokio::test]
    async fn test_submit_executes_work() {
        let (handle, runner) = channel(MainLoopConfig::default());
        let _host = TestLoop::spawn(runner);

        let value = handle
            .submit("probe", WAIT, || Ok(json!({"ok": true})))
            .await
            .unwrap();
        assert_eq!(value, json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_work_runs_on_the_loop_thread() {
        let (handle, runner) = channel(MainLoopConfig::default());
        let _host = TestLoop::spawn(runner);

        let submitter = thread::current().id();
        let value = handle
            .submit("where_am_i", WAIT, move || {
                Ok(json!({"same_thread": thread::current().id() == submitter}))
            })
            .await
            .unwrap();
        assert_eq!(value, json!({"same_thread": false}));
    }

    #[tokio::test]
    async fn test_tool_error_becomes_operation_error() {
        let (handle, runner) = channel(MainLoopConfig::default());
        let _host = TestLoop::spawn(runner);

        let err = handle
            .submit("fail_op", WAIT, || {
                Err(ToolError::new("no object named Cube"))
            })
            .await
            .unwrap_err();

        match err {
            BridgeError::Operation { operation, message } => {
                assert_eq!(operation, "fail_op");
                assert!(message.contains("no object named Cube"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_abandons_slot_and_loop_stays_healthy() {
        let (handle, runner) = channel(MainLoopConfig::default());
        let _host = TestLoop::spawn(runner);

        let err = handle
            .submit("slow_op", Duration::from_millis(10), || {
                thread::sleep(Duration::from_millis(150));
                Ok(json!({}))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Timeout { .. }));

        // The late result lands in an abandoned slot; the loop keeps going.
        let value = handle
            .submit("after", WAIT, || Ok(json!({"alive": true})))
            .await
            .unwrap();
        assert_eq!(value, json!({"alive": true}));
    }

    #[tokio::test]
    async fn test_panicking_task_is_reported_and_contained() {
        let (handle, runner) = channel(MainLoopConfig::default());
        let _host = TestLoop::spawn(runner);

        let err = handle
            .submit("explode", WAIT, || panic!("scene graph corrupted"))
            .await
            .unwrap_err();
        match err {
            BridgeError::Operation { message, .. } => {
                assert!(message.contains("scene graph corrupted"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let value = handle.submit("after", WAIT, || Ok(json!({}))).await.unwrap();
        assert_eq!(value, json!({}));
    }

    #[tokio::test]
    async fn test_queue_full_rejects_submission() {
        let config = MainLoopConfig {
            max_queue_depth: 1,
            ..Default::default()
        };
        let (handle, _runner) = channel(config);

        // Nobody ticks the runner, so the first task parks in the queue.
        let parked = tokio::spawn({
            let handle = handle.clone();
            async move {
                handle
                    .submit("first", Duration::from_millis(200), || Ok(json!({})))
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.pending(), 1);

        let err = handle
            .submit("second", Duration::from_millis(200), || Ok(json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::QueueFull { capacity: 1 }));

        let first = parked.await.unwrap().unwrap_err();
        assert!(matches!(first, BridgeError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_dropped_runner_fails_queued_and_new_waiters() {
        let (handle, runner) = channel(MainLoopConfig::default());
        assert!(handle.is_open());

        let stranded = tokio::spawn({
            let handle = handle.clone();
            async move { handle.submit("stranded", WAIT, || Ok(json!({}))).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        drop(runner);
        assert!(!handle.is_open());

        let err = stranded.await.unwrap().unwrap_err();
        assert!(matches!(err, BridgeError::MainLoopClosed));

        let err = handle
            .submit("late", WAIT, || Ok(json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::MainLoopClosed));
    }

    #[tokio::test]
    async fn test_batch_runs_in_submission_order() {
        let (handle, runner) = channel(MainLoopConfig::default());
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = tokio::spawn({
            let handle = handle.clone();
            let order = order.clone();
            async move {
                handle
                    .submit("first", WAIT, move || {
                        order.lock().unwrap().push("first");
                        Ok(json!({}))
                    })
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second = tokio::spawn({
            let handle = handle.clone();
            let order = order.clone();
            async move {
                handle
                    .submit("second", WAIT, move || {
                        order.lock().unwrap().push("second");
                        Ok(json!({}))
                    })
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(runner.run_pending(), 2);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_suggested_delay_tracks_queue_state() {
        let (handle, runner) = channel(MainLoopConfig::default());

        assert_eq!(
            runner.suggested_delay(0),
            MainLoopConfig::DEFAULT_IDLE_POLL_INTERVAL
        );
        assert_eq!(
            runner.suggested_delay(3),
            MainLoopConfig::DEFAULT_BUSY_POLL_INTERVAL
        );

        // Queued but unexecuted work also counts as busy.
        let parked = tokio::spawn({
            let handle = handle.clone();
            async move {
                handle
                    .submit("parked", Duration::from_millis(100), || Ok(json!({})))
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(
            runner.suggested_delay(0),
            MainLoopConfig::DEFAULT_BUSY_POLL_INTERVAL
        );

        let _ = parked.await;
    }
}
