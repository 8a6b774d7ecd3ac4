//! Background initialization with retries.
//!
//! Service startup must not block on a dependency that happens to be
//! down. The initialization action runs in its own task and is retried
//! with a fixed backoff until it succeeds; once it has succeeded it
//! never runs again.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use lark_engine::EngineError;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum UsageError {
    #[error("background init was already started")]
    AlreadyStarted,
}

/// Which failures of the action are worth another attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Only an unreachable engine retries; anything else ends the loop
    /// loudly. Retrying a programming error would hide it forever.
    TransportOnly,
    /// Every failure retries.
    AllErrors,
}

// 1, 2, 4, 8, 16, then 32 forever
const BACKOFF_SECS: [u64; 6] = [1, 2, 4, 8, 16, 32];

fn backoff(attempt: usize) -> Duration {
    Duration::from_secs(BACKOFF_SECS[attempt.min(BACKOFF_SECS.len() - 1)])
}

pub type InitAction = Box<
    dyn Fn() -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync,
>;

pub struct BackgroundInit {
    started: AtomicBool,
    stopped: Arc<AtomicBool>,
    cancel: Arc<Notify>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Default for BackgroundInit {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundInit {
    pub fn new() -> BackgroundInit {
        BackgroundInit {
            started: AtomicBool::new(false),
            stopped: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(Notify::new()),
            task: Mutex::new(None),
        }
    }

    /// Launch the retry loop. Starting twice is a usage error.
    pub fn start(
        &self,
        policy: RetryPolicy,
        action: InitAction,
    ) -> Result<(), UsageError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(UsageError::AlreadyStarted);
        }
        let stopped = self.stopped.clone();
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            let mut attempt: usize = 0;
            loop {
                if stopped.load(Ordering::SeqCst) {
                    return;
                }
                match action().await {
                    Ok(()) => {
                        info!("background init done");
                        return;
                    }
                    Err(err) => {
                        if !retryable(policy, &err) {
                            error!(
                                "background init failed and won't retry: {err:?}"
                            );
                            return;
                        }
                        let delay = backoff(attempt);
                        attempt += 1;
                        warn!(
                            retry_in = delay.as_secs(),
                            "background init failed: {err:?}"
                        );
                        tokio::select! {
                            _ = cancel.notified() => return,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            }
        });
        *self.task.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// Request cancellation and wait for the loop to be fully gone.
    /// Wakes a sleeping backoff immediately. Safe to call at any time,
    /// including before `start` or more than once.
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.cancel.notify_one();
        let handle = self.task.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

fn retryable(policy: RetryPolicy, err: &anyhow::Error) -> bool {
    match policy {
        RetryPolicy::AllErrors => true,
        RetryPolicy::TransportOnly => matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::Transport(_))
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use tokio::time::Instant;

    fn recording_action(
        attempts: Arc<Mutex<Vec<Instant>>>,
        outcome: impl Fn(usize) -> Result<()> + Send + Sync + 'static,
    ) -> InitAction {
        Box::new(move || {
            let attempts = attempts.clone();
            let result = {
                let n = attempts.lock().unwrap().len();
                outcome(n)
            };
            attempts.lock().unwrap().push(Instant::now());
            Box::pin(async move { result })
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sequence_is_fixed() {
        let init = BackgroundInit::new();
        let attempts = Arc::new(Mutex::new(Vec::new()));
        init.start(
            RetryPolicy::AllErrors,
            recording_action(attempts.clone(), |_| Err(anyhow!("engine down"))),
        )
        .unwrap();

        // attempts land at 0, 1, 3, 7, 15, 31, 63, 95 seconds
        tokio::time::sleep(Duration::from_secs(100)).await;
        init.stop().await;

        let attempts = attempts.lock().unwrap();
        assert!(attempts.len() >= 8, "only {} attempts", attempts.len());
        let gaps: Vec<u64> = attempts
            .windows(2)
            .map(|w| (w[1] - w[0]).as_secs())
            .collect();
        assert_eq!(&gaps[..7], &[1, 2, 4, 8, 16, 32, 32]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_is_terminal() {
        let init = BackgroundInit::new();
        let attempts = Arc::new(Mutex::new(Vec::new()));
        init.start(
            RetryPolicy::AllErrors,
            recording_action(attempts.clone(), |n| {
                if n < 2 {
                    Err(anyhow!("engine down"))
                } else {
                    Ok(())
                }
            }),
        )
        .unwrap();

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(attempts.lock().unwrap().len(), 3);

        // a second start is refused even after success
        let action: InitAction = Box::new(|| Box::pin(async { Ok(()) }));
        assert!(matches!(
            init.start(RetryPolicy::AllErrors, action),
            Err(UsageError::AlreadyStarted)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_wakes_a_sleeping_backoff() {
        let init = BackgroundInit::new();
        let attempts = Arc::new(Mutex::new(Vec::new()));
        init.start(
            RetryPolicy::AllErrors,
            recording_action(attempts.clone(), |_| Err(anyhow!("engine down"))),
        )
        .unwrap();

        // at 40s the loop is 7s into a 32s backoff
        tokio::time::sleep(Duration::from_secs(40)).await;
        let before = attempts.lock().unwrap().len();
        let stop_started = Instant::now();
        init.stop().await;
        assert!(stop_started.elapsed() < Duration::from_secs(1));
        assert_eq!(attempts.lock().unwrap().len(), before);

        // and nothing runs after stop returned
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(attempts.lock().unwrap().len(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_transport_error_ends_the_loop_under_transport_only() {
        let init = BackgroundInit::new();
        let attempts = Arc::new(Mutex::new(Vec::new()));
        init.start(
            RetryPolicy::TransportOnly,
            recording_action(attempts.clone(), |n| {
                if n == 0 {
                    Err(EngineError::Transport(anyhow!("connection refused"))
                        .into())
                } else {
                    Err(anyhow!("bad configuration"))
                }
            }),
        )
        .unwrap();

        tokio::time::sleep(Duration::from_secs(120)).await;
        // the transport failure retried once, the second error was final
        assert_eq!(attempts.lock().unwrap().len(), 2);
        init.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_start_is_safe() {
        let init = BackgroundInit::new();
        init.stop().await;
        init.stop().await;
    }
}
