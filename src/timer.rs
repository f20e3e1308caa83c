use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, error, trace};

use crate::config::TimerConfig;
use crate::error::TimerError;
use crate::observer::TimerObserver;
use crate::source::{FireHandler, Schedule, TimerSource};

/// Opaque caller payload, handed back unchanged through [`Timer::context`].
pub type TimerContext = Arc<dyn Any + Send + Sync>;

/// Run state. A live scheduling source exists exactly while the state is
/// `Suspended` or `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerState {
    Invalid,
    Suspended,
    Running,
}

struct Inner {
    state: TimerState,
    /// Set by the first effective cancel. One-way: an invalidated timer can
    /// never be rearmed.
    invalidated: bool,
    config: TimerConfig,
    context: Option<TimerContext>,
    observer: Option<Weak<dyn TimerObserver>>,
    source: Option<TimerSource>,
}

impl Inner {
    fn observer(&self) -> Option<Arc<dyn TimerObserver>> {
        self.observer.as_ref().and_then(Weak::upgrade)
    }
}

pub(crate) struct TimerCore {
    inner: Mutex<Inner>,
    runtime: Handle,
}

/// A pausable one-shot or repeating timer.
///
/// Constructed invalid; nothing is scheduled until the first [`start`]. The
/// first `start` lazily creates the scheduling source, so context changes
/// made after construction are honored. [`cancel`] (or the observer going
/// away, or a fire-once timer firing) permanently invalidates the timer.
///
/// `Timer` is a cheap clonable handle: clones share one timer and one
/// scheduling source. All control operations are non-blocking, safe to call
/// from any thread, and no-ops when they do not apply, so racing callers can
/// never double-suspend the source or resurrect a cancelled timer.
///
/// [`start`]: Timer::start
/// [`cancel`]: Timer::cancel
#[derive(Clone)]
pub struct Timer {
    core: Arc<TimerCore>,
}

impl Timer {
    /// Validates `config` and resolves the runtime the fires will run on.
    /// The returned timer is invalid until [`start`](Timer::start) is called.
    pub fn new(
        config: TimerConfig,
        observer: Option<Arc<dyn TimerObserver>>,
    ) -> Result<Self, TimerError> {
        config.validate()?;
        let mut config = config;
        let runtime = match config.runtime.take() {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| TimerError::NoRuntime)?,
        };
        debug!(
            interval_ms = config.interval.as_millis() as u64,
            fire_once = config.fire_once,
            clock = ?config.clock,
            "timer created"
        );
        Ok(Self {
            core: Arc::new(TimerCore {
                runtime,
                inner: Mutex::new(Inner {
                    state: TimerState::Invalid,
                    invalidated: false,
                    config,
                    context: None,
                    observer: observer.as_ref().map(Arc::downgrade),
                    source: None,
                }),
            }),
        })
    }

    /// Starts or resumes delivery. No-op when already running or cancelled.
    ///
    /// The first effective call creates the scheduling source and emits
    /// `on_armed` before any fire can be delivered, followed by `on_resume`.
    /// Later calls on a suspended timer emit `on_resume` only.
    pub fn start(&self) {
        let (observer, armed) = {
            let mut inner = self.lock();
            if inner.invalidated || inner.state == TimerState::Running {
                return;
            }
            let armed = if inner.source.is_none() {
                let schedule = Schedule {
                    interval: inner.config.interval,
                    // Leeway is meaningless for a single deadline.
                    leeway: if inner.config.fire_once {
                        Duration::ZERO
                    } else {
                        inner.config.leeway
                    },
                    fire_once: inner.config.fire_once,
                    clock: inner.config.clock,
                };
                let source = TimerSource::spawn(schedule, &self.core.runtime, self.fire_handler());
                inner.source = Some(source);
                true
            } else {
                false
            };
            inner.state = TimerState::Running;
            (inner.observer(), armed)
        };

        trace!("timer resume");
        if let Some(observer) = &observer {
            if armed {
                observer.on_armed(self);
            }
            observer.on_resume(self);
        }

        // Release delivery only after the notifications, and only if no
        // pause or cancel won the race while they ran. The source was
        // created suspended, so nothing can fire before on_armed.
        let inner = self.lock();
        if !inner.invalidated && inner.state == TimerState::Running {
            if let Some(source) = &inner.source {
                source.resume();
            }
        }
    }

    /// Suspends delivery. No-op unless currently running, so repeated calls
    /// can never suspend the source twice.
    pub fn pause(&self) {
        let observer = {
            let mut inner = self.lock();
            if inner.state != TimerState::Running {
                return;
            }
            inner.state = TimerState::Suspended;
            if let Some(source) = &inner.source {
                source.suspend();
            }
            inner.observer()
        };

        trace!("timer suspend");
        if let Some(observer) = observer {
            observer.on_suspend(self);
        }
    }

    /// Permanently invalidates the timer. Safe to call at any time from any
    /// thread; every call after the first effective one is a no-op, and so
    /// is a call on a timer that was never armed (the timer stays startable
    /// then, since there is nothing to tear down).
    ///
    /// Emits `on_will_invalidate` while the observer is still registered,
    /// then detaches the fire handler so no new fire can be dispatched,
    /// cancels the source, and resumes it once more if it was suspended so
    /// its parked task can observe the cancellation and exit. Config is
    /// reset to defaults and the user context is released.
    pub fn cancel(&self) {
        let (observer, source, was_suspended) = {
            let mut inner = self.lock();
            if inner.invalidated {
                return;
            }
            // A timer that was never armed has nothing to tear down and
            // stays startable
            let Some(source) = inner.source.take() else {
                return;
            };
            inner.invalidated = true;
            let was_suspended = inner.state == TimerState::Suspended;
            inner.state = TimerState::Invalid;
            inner.config = TimerConfig::default();
            inner.context = None;
            let observer = inner.observer.take().and_then(|weak| weak.upgrade());
            (observer, source, was_suspended)
        };

        debug!("timer invalidating");
        if let Some(observer) = &observer {
            observer.on_will_invalidate(self);
        }

        source.detach_handler();
        source.cancel();
        if was_suspended {
            // One more resume for the road, to unpark the source's teardown.
            trace!("resuming suspended source for teardown");
            source.resume();
        }
    }

    /// The current observer, if one is registered and still alive.
    pub fn observer(&self) -> Option<Arc<dyn TimerObserver>> {
        self.lock().observer()
    }

    /// Replaces the observer. Swapping in a new one emits no notifications;
    /// passing `None` cancels the timer, since a timer with no one to call
    /// is meaningless.
    pub fn set_observer(&self, observer: Option<Arc<dyn TimerObserver>>) {
        match observer {
            None => self.cancel(),
            Some(observer) => {
                let mut inner = self.lock();
                if inner.invalidated {
                    return;
                }
                inner.observer = Some(Arc::downgrade(&observer));
            }
        }
    }

    /// The caller payload, as last set. Cleared on cancel.
    pub fn context(&self) -> Option<TimerContext> {
        self.lock().context.clone()
    }

    /// Attaches an opaque payload, retrievable from observer callbacks via
    /// [`context`](Timer::context). No-op on a cancelled timer.
    pub fn set_context(&self, context: Option<TimerContext>) {
        let mut inner = self.lock();
        if inner.invalidated {
            return;
        }
        inner.context = context;
    }

    pub fn is_invalid(&self) -> bool {
        self.lock().state == TimerState::Invalid
    }

    pub fn is_running(&self) -> bool {
        self.lock().state == TimerState::Running
    }

    ///True while the timer is configured to fire once; false again after
    ///that one fire, because the self-cancel resets the config.
    pub fn is_fire_once(&self) -> bool {
        self.lock().config.fire_once
    }

    ///Write equivalent of the running state: `true` starts, `false` pauses.
    pub fn set_running(&self, running: bool) {
        if running {
            self.start();
        } else {
            self.pause();
        }
    }

    /// The handler the source invokes on each fire. Holds the core weakly,
    /// so a source outliving every timer handle fires into nothing.
    fn fire_handler(&self) -> FireHandler {
        let weak = Arc::downgrade(&self.core);
        Arc::new(move || {
            if let Some(core) = weak.upgrade() {
                Timer { core }.deliver_fire();
            }
        })
    }

    fn deliver_fire(&self) {
        let (observer, fire_once) = {
            let inner = self.lock();
            if inner.invalidated {
                return;
            }
            (inner.observer(), inner.config.fire_once)
        };

        match observer {
            Some(observer) => {
                // A panicking observer must not corrupt the timer's state;
                // the fire is simply lost.
                if catch_unwind(AssertUnwindSafe(|| observer.on_fire(self))).is_err() {
                    error!("timer observer panicked in on_fire");
                }
                if fire_once {
                    self.cancel();
                }
            }
            // The observer went away; nothing left to call.
            None => self.cancel(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.core.inner.lock().unwrap()
    }
}
