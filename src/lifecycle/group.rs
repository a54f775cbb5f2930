//! Fail-fast task group.
//!
//! Runs any number of units concurrently under one shared
//! [`CancellationToken`]. The first unit to fail cancels the token so its
//! siblings can wind down; [`TaskGroup::join`] waits for every unit and
//! yields the failure that caused the cancellation.
//!
//! Cancellation is cooperative. A unit that never looks at its token runs
//! to completion and `join` waits for it.
//!
//! When several units fail, the one spawned first wins, unless its failure
//! was a reaction to the group already having failed. A unit counts as
//! reacting when it was last woken after the group failed.

use std::future::{poll_fn, Future};
use std::panic;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Wake, Waker};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Fan-out/fan-in group with fail-fast cancellation.
///
/// `join` consumes the group, so no unit can be spawned once draining has
/// begun.
pub struct TaskGroup<E> {
    token: CancellationToken,
    tasks: JoinSet<Outcome<E>>,
    spawned: usize,
    /// Set by the first failing unit, just before it cancels the token.
    failed: Arc<AtomicBool>,
}

struct Outcome<E> {
    index: usize,
    result: Result<(), E>,
    /// Whether the unit was last woken after the group had failed.
    reacted: bool,
}

/// Wraps a unit's waker and notes whether the group had failed at the time
/// of the wake-up.
struct NotingWaker {
    inner: Waker,
    failed: Arc<AtomicBool>,
    woken_after_failure: Arc<AtomicBool>,
}

impl Wake for NotingWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.woken_after_failure
            .store(self.failed.load(Ordering::SeqCst), Ordering::SeqCst);
        self.inner.wake_by_ref();
    }
}

impl<E: Send + 'static> TaskGroup<E> {
    /// Create a group whose token is a child of `parent`.
    ///
    /// Cancelling `parent` cancels the group; a failing unit only cancels
    /// the group's own token.
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
            tasks: JoinSet::new(),
            spawned: 0,
            failed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The token shared by every unit of this group.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Number of units spawned so far.
    pub fn len(&self) -> usize {
        self.spawned
    }

    pub fn is_empty(&self) -> bool {
        self.spawned == 0
    }

    /// Start `unit` on the runtime with a clone of the group token.
    pub fn spawn<F, Fut>(&mut self, unit: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        let index = self.spawned;
        self.spawned += 1;

        let token = self.token.clone();
        let failed = self.failed.clone();
        let fut = unit(token.clone());
        self.tasks.spawn(async move {
            // A unit first polled after the group failed counts as woken then.
            let woken_after_failure = Arc::new(AtomicBool::new(failed.load(Ordering::SeqCst)));
            let mut fut = pin!(fut);
            let result = poll_fn(|cx| {
                let waker = Waker::from(Arc::new(NotingWaker {
                    inner: cx.waker().clone(),
                    failed: failed.clone(),
                    woken_after_failure: woken_after_failure.clone(),
                }));
                fut.as_mut().poll(&mut Context::from_waker(&waker))
            })
            .await;

            let reacted = woken_after_failure.load(Ordering::SeqCst);
            if result.is_err() {
                failed.store(true, Ordering::SeqCst);
                token.cancel();
            }
            Outcome {
                index,
                result,
                reacted,
            }
        });
    }

    /// Wait for every unit to return.
    ///
    /// Returns the failure of the lowest-indexed unit among those that did
    /// not react to an earlier failure. Units released at the same moment
    /// are ranked by spawn order, not by which finished first. When every
    /// failure was a reaction, the first one recorded is returned.
    ///
    /// A panicking unit cancels the group; the panic is resumed here once all
    /// other units have returned.
    pub async fn join(mut self) -> Result<(), E> {
        let mut primary: Option<(usize, E)> = None;
        let mut secondary: Option<E> = None;
        let mut panicked = None;

        while let Some(joined) = self.tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(err) => {
                    self.failed.store(true, Ordering::SeqCst);
                    self.token.cancel();
                    if err.is_panic() && panicked.is_none() {
                        panicked = Some(err.into_panic());
                    }
                    continue;
                }
            };

            let Err(err) = outcome.result else {
                continue;
            };

            if outcome.reacted {
                if secondary.is_none() {
                    secondary = Some(err);
                }
                continue;
            }

            match &primary {
                Some((index, _)) if *index < outcome.index => {}
                _ => primary = Some((outcome.index, err)),
            }
        }

        if let Some(payload) = panicked {
            panic::resume_unwind(payload);
        }

        match primary.map(|(_, err)| err).or(secondary) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
