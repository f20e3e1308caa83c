use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::trace;

use crate::config::ClockKind;

/// How long a wall-clock sleep may run before the deadline is re-checked
/// against `SystemTime`, so a system suspend shifts the fire promptly.
const WALL_RECHECK: Duration = Duration::from_secs(1);

/// Callback invoked on the source's task whenever the timer elapses.
pub(crate) type FireHandler = Arc<dyn Fn() + Send + Sync>;

/// What the source task arms. Captured once at spawn; a source is never
/// rescheduled.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Schedule {
    pub interval: Duration,
    pub leeway: Duration,
    pub fire_once: bool,
    pub clock: ClockKind,
}

/// Command state for the source task. Idempotent by construction: the latest
/// value wins, so repeated suspends or resumes cannot unbalance the task.
#[derive(Debug, Clone, Copy, Default)]
struct Command {
    running: bool,
    cancelled: bool,
}

/// The scheduling primitive: one spawned task that sleeps until the next
/// deadline and invokes the fire handler. Fires are serialized by the task
/// itself, so two fires of one source are never in flight at once.
///
/// Sources are born suspended; delivery starts on the first [`resume`]. A
/// cancelled source that is still suspended parks until it is resumed once
/// more, so a suspended source must be resumed before it is released.
///
/// [`resume`]: TimerSource::resume
pub(crate) struct TimerSource {
    commands: watch::Sender<Command>,
    handler: Arc<Mutex<Option<FireHandler>>>,
}

impl TimerSource {
    pub fn spawn(schedule: Schedule, runtime: &Handle, handler: FireHandler) -> Self {
        let (commands, rx) = watch::channel(Command::default());
        let slot = Arc::new(Mutex::new(Some(handler)));
        runtime.spawn(run(schedule, rx, Arc::clone(&slot)));
        trace!(
            interval_ms = schedule.interval.as_millis() as u64,
            leeway_ms = schedule.leeway.as_millis() as u64,
            fire_once = schedule.fire_once,
            clock = ?schedule.clock,
            "timer source created"
        );
        Self {
            commands,
            handler: slot,
        }
    }

    pub fn resume(&self) {
        self.commands.send_modify(|cmd| cmd.running = true);
    }

    pub fn suspend(&self) {
        self.commands.send_modify(|cmd| cmd.running = false);
    }

    pub fn cancel(&self) {
        self.commands.send_modify(|cmd| cmd.cancelled = true);
    }

    /// Clears the fire handler so no new fire can be dispatched. An
    /// invocation already in flight runs to completion.
    pub fn detach_handler(&self) {
        self.handler.lock().unwrap().take();
    }
}

async fn run(
    schedule: Schedule,
    mut commands: watch::Receiver<Command>,
    handler: Arc<Mutex<Option<FireHandler>>>,
) {
    let mut deadline = Deadline::first(schedule.clock, schedule.interval);

    loop {
        let cmd = *commands.borrow_and_update();

        if cmd.cancelled {
            if cmd.running {
                trace!("timer source cancelled");
                break;
            }
            // A suspended source holds its teardown until resumed, or until
            // every handle to it is gone.
            if commands.changed().await.is_err() {
                break;
            }
            continue;
        }

        if !cmd.running {
            if commands.changed().await.is_err() {
                break;
            }
            continue;
        }

        tokio::select! {
            _ = deadline.wait() => {
                fire(&handler);
                if schedule.fire_once {
                    break;
                }
                deadline.advance(schedule.interval);
            }
            changed = commands.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

fn fire(handler: &Mutex<Option<FireHandler>>) {
    // Clone out of the slot so a detach can land while the handler runs.
    let current = handler.lock().unwrap().clone();
    if let Some(handler) = current {
        handler();
    }
}

/// The next fire instant, tracked on whichever clock the schedule chose.
/// Deadlines advance on a fixed cadence from the arming instant; the source
/// never exploits its leeway, so fires target the nominal deadline.
enum Deadline {
    Monotonic(Instant),
    Wall(SystemTime),
}

impl Deadline {
    fn first(clock: ClockKind, interval: Duration) -> Self {
        match clock {
            ClockKind::Monotonic => Deadline::Monotonic(Instant::now() + interval),
            ClockKind::WallClock => Deadline::Wall(SystemTime::now() + interval),
        }
    }

    /// Moves to the next deadline. Deadlines missed while the source was
    /// suspended or delayed are coalesced into one; the cadence stays
    /// anchored to the arming instant.
    fn advance(&mut self, interval: Duration) {
        match self {
            Deadline::Monotonic(at) => {
                *at += interval;
                let now = Instant::now();
                if *at < now {
                    let skipped = (now - *at).as_nanos() / interval.as_nanos() + 1;
                    let skipped = u32::try_from(skipped).unwrap_or(u32::MAX);
                    *at += interval * skipped;
                }
            }
            Deadline::Wall(at) => {
                *at += interval;
                match SystemTime::now().duration_since(*at) {
                    Ok(behind) if !behind.is_zero() => {
                        let skipped = behind.as_nanos() / interval.as_nanos() + 1;
                        let skipped = u32::try_from(skipped).unwrap_or(u32::MAX);
                        *at += interval * skipped;
                    }
                    _ => {}
                }
            }
        }
    }

    async fn wait(&self) {
        match self {
            Deadline::Monotonic(at) => tokio::time::sleep_until(*at).await,
            Deadline::Wall(at) => loop {
                let remaining = match at.duration_since(SystemTime::now()) {
                    Ok(remaining) if !remaining.is_zero() => remaining,
                    _ => return,
                };
                tokio::time::sleep(remaining.min(WALL_RECHECK)).await;
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn schedule(interval_ms: u64, fire_once: bool) -> Schedule {
        Schedule {
            interval: Duration::from_millis(interval_ms),
            leeway: Duration::ZERO,
            fire_once,
            clock: ClockKind::Monotonic,
        }
    }

    #[tokio::test]
    async fn source_is_born_suspended() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let _source = TimerSource::spawn(
            schedule(20, false),
            &Handle::current(),
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn detached_handler_never_fires() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let source = TimerSource::spawn(
            schedule(20, false),
            &Handle::current(),
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        source.detach_handler();
        source.resume();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn one_shot_source_fires_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let source = TimerSource::spawn(
            schedule(20, true),
            &Handle::current(),
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        source.resume();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
