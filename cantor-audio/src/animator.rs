//! Timed parameter transitions.
//!
//! The animator owns every running ramp (fade, pan, pitch) for every voice in
//! a bank. Ramps advance on `tick`, usually driven by a `Ticker` thread. At
//! most one ramp runs per (voice, kind); starting another replaces it.
//!
//! Completion callbacks run after the state lock is released but under the
//! fire lock, so `cancel` returning guarantees the cancelled ramp neither
//! writes again nor reports completion.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use cantor_types::{Easing, TransitionKind, VoiceId};
use crossbeam_channel::{select, Sender};

use crate::bank::VoiceBank;
use crate::sync::lock;
use crate::telemetry::TickTelemetry;

/// How a transition ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionEnd {
    Completed,
    Cancelled,
}

/// Notified once when a transition completes or is cancelled.
pub type TransitionCallback = Box<dyn FnOnce(TransitionEnd) + Send>;

/// User-facing completion: runs only if the transition reaches its target.
pub type Completion = Box<dyn FnOnce() + Send>;

/// Wrap a completion so it ignores cancellation.
pub fn on_completed(done: Completion) -> TransitionCallback {
    Box::new(move |end| {
        if end == TransitionEnd::Completed {
            done();
        }
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransitionId(u64);

impl TransitionId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What to ramp, where to, and how.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ramp {
    pub kind: TransitionKind,
    pub target: f32,
    pub duration: Duration,
    pub easing: Easing,
}

impl Ramp {
    pub fn new(kind: TransitionKind, target: f32, duration: Duration) -> Self {
        Self {
            kind,
            target,
            duration,
            easing: Easing::Linear,
        }
    }

    pub fn with_easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }
}

struct Transition {
    id: TransitionId,
    voice: VoiceId,
    ramp: Ramp,
    from: f32,
    elapsed: Duration,
    on_end: Option<TransitionCallback>,
}

impl Transition {
    /// Advance by `dt`. Returns the value to write and whether the ramp is done.
    fn advance(&mut self, dt: Duration) -> (f32, bool) {
        self.elapsed += dt;
        let ramp = &self.ramp;
        if ramp.duration.is_zero() || self.elapsed >= ramp.duration {
            return (ramp.target, true);
        }
        let t = self.elapsed.as_secs_f32() / ramp.duration.as_secs_f32();
        (self.from + (ramp.target - self.from) * ramp.easing.apply(t), false)
    }
}

#[derive(Default)]
struct AnimatorState {
    transitions: Vec<Transition>,
}

impl AnimatorState {
    fn take(&mut self, pred: impl Fn(&Transition) -> bool) -> Option<Transition> {
        let pos = self.transitions.iter().position(pred)?;
        Some(self.transitions.remove(pos))
    }
}

pub struct Animator {
    bank: Arc<VoiceBank>,
    state: Mutex<AnimatorState>,
    /// Held by `tick` for its whole run and by blocking cancels.
    fire_lock: Mutex<()>,
    firing_thread: Mutex<Option<ThreadId>>,
    suspended: AtomicBool,
    next_id: AtomicU64,
}

impl Animator {
    pub fn new(bank: Arc<VoiceBank>) -> Arc<Self> {
        Arc::new(Self {
            bank,
            state: Mutex::new(AnimatorState::default()),
            fire_lock: Mutex::new(()),
            firing_thread: Mutex::new(None),
            suspended: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn bank(&self) -> &Arc<VoiceBank> {
        &self.bank
    }

    /// Start ramping `voice` from its current value. An existing ramp of the
    /// same kind on that voice is replaced and its callback told `Cancelled`.
    pub fn start(
        &self,
        voice: VoiceId,
        ramp: Ramp,
        on_end: Option<TransitionCallback>,
    ) -> Option<TransitionId> {
        let (id, displaced) = self.insert(voice, ramp, on_end)?;
        if let Some(cb) = displaced.and_then(|t| t.on_end) {
            cb(TransitionEnd::Cancelled);
        }
        Some(id)
    }

    /// Like `start`, but a displaced ramp's callback is dropped unrun.
    /// Safe to call while holding locks the callbacks might take.
    pub fn start_quiet(
        &self,
        voice: VoiceId,
        ramp: Ramp,
        on_end: Option<TransitionCallback>,
    ) -> Option<TransitionId> {
        self.insert(voice, ramp, on_end).map(|(id, _)| id)
    }

    fn insert(
        &self,
        voice: VoiceId,
        ramp: Ramp,
        on_end: Option<TransitionCallback>,
    ) -> Option<(TransitionId, Option<Transition>)> {
        let ramp = Ramp {
            target: ramp.kind.clamp(ramp.target),
            ..ramp
        };
        let mut state = lock(&self.state);
        let from = self.bank.slot(voice)?.value(ramp.kind);
        let id = TransitionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let displaced = state.take(|t| t.voice == voice && t.ramp.kind == ramp.kind);
        log::trace!(
            target: "animator",
            "voice {}: {} {} -> {} over {:?}",
            voice,
            ramp.kind,
            from,
            ramp.target,
            ramp.duration
        );
        state.transitions.push(Transition {
            id,
            voice,
            ramp,
            from,
            elapsed: Duration::ZERO,
            on_end,
        });
        Some((id, displaced))
    }

    /// Cancel a transition. Its callback is told `Cancelled` before this
    /// returns. Blocks while a tick is running, unless called from inside a
    /// callback on the ticking thread.
    pub fn cancel(&self, id: TransitionId) -> bool {
        self.cancel_where(|t| t.id == id)
    }

    /// Cancel whatever `kind` ramp is running on `voice`.
    pub fn cancel_for(&self, voice: VoiceId, kind: TransitionKind) -> bool {
        self.cancel_where(|t| t.voice == voice && t.ramp.kind == kind)
    }

    fn cancel_where(&self, pred: impl Fn(&Transition) -> bool) -> bool {
        let cancelled = if self.on_firing_thread() {
            lock(&self.state).take(pred)
        } else {
            let _fire = lock(&self.fire_lock);
            lock(&self.state).take(pred)
        };
        match cancelled {
            Some(t) => {
                log::debug!(target: "animator", "voice {}: {} ramp cancelled", t.voice, t.ramp.kind);
                if let Some(cb) = t.on_end {
                    cb(TransitionEnd::Cancelled);
                }
                true
            }
            None => false,
        }
    }

    /// Drop a ramp without waiting for a running tick and without running its
    /// callback. A completion already collected by that tick may still fire,
    /// so callers must be able to recognise it as stale.
    pub fn discard_for(&self, voice: VoiceId, kind: TransitionKind) -> bool {
        lock(&self.state)
            .take(|t| t.voice == voice && t.ramp.kind == kind)
            .is_some()
    }

    /// `discard_for` every kind on one voice.
    pub fn discard_voice(&self, voice: VoiceId) -> usize {
        let mut state = lock(&self.state);
        let before = state.transitions.len();
        state.transitions.retain(|t| t.voice != voice);
        before - state.transitions.len()
    }

    pub fn is_active(&self, id: TransitionId) -> bool {
        lock(&self.state).transitions.iter().any(|t| t.id == id)
    }

    pub fn is_active_for(&self, voice: VoiceId, kind: TransitionKind) -> bool {
        lock(&self.state)
            .transitions
            .iter()
            .any(|t| t.voice == voice && t.ramp.kind == kind)
    }

    pub fn active_count(&self) -> usize {
        lock(&self.state).transitions.len()
    }

    /// Freeze or unfreeze ticking. Elapsed time does not accumulate while
    /// frozen.
    pub fn set_suspended(&self, suspended: bool) {
        self.suspended.store(suspended, Ordering::Release);
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    /// Advance every ramp by `dt` and run the callbacks of those that reached
    /// their target. Returns the number completed.
    pub fn tick(&self, dt: Duration) -> usize {
        let _fire = lock(&self.fire_lock);
        if self.is_suspended() {
            return 0;
        }
        let finished: Vec<Option<TransitionCallback>> = {
            let mut state = lock(&self.state);
            let bank = &self.bank;
            let mut finished = Vec::new();
            state.transitions.retain_mut(|t| {
                let (value, done) = t.advance(dt);
                if let Some(mut slot) = bank.slot(t.voice) {
                    slot.set_value(t.ramp.kind, value);
                }
                if done {
                    finished.push(t.on_end.take());
                }
                !done
            });
            finished
        };
        let completed = finished.len();
        if completed > 0 {
            *lock(&self.firing_thread) = Some(thread::current().id());
            for cb in finished.into_iter().flatten() {
                cb(TransitionEnd::Completed);
            }
            *lock(&self.firing_thread) = None;
        }
        completed
    }

    fn on_firing_thread(&self) -> bool {
        *lock(&self.firing_thread) == Some(thread::current().id())
    }

    /// Tick on a background thread every `interval` until the returned
    /// `Ticker` is dropped. With `report_every`, a tick-time summary is
    /// logged at that period.
    pub fn spawn_ticker(
        self: &Arc<Self>,
        interval: Duration,
        report_every: Option<Duration>,
    ) -> io::Result<Ticker> {
        let animator: Weak<Animator> = Arc::downgrade(self);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let handle = thread::Builder::new()
            .name("cantor-ticker".into())
            .spawn(move || {
                let ticks = crossbeam_channel::tick(interval);
                let mut telemetry = TickTelemetry::new(interval);
                let mut last = Instant::now();
                let mut last_report = Instant::now();
                loop {
                    select! {
                        recv(ticks) -> msg => {
                            let Ok(now) = msg else { break };
                            let Some(animator) = animator.upgrade() else { break };
                            let dt = now.saturating_duration_since(last);
                            last = now;
                            let started = Instant::now();
                            animator.tick(dt);
                            telemetry.record(started.elapsed());
                            if let Some(every) = report_every {
                                if last_report.elapsed() >= every {
                                    last_report = Instant::now();
                                    let s = telemetry.take_summary();
                                    log::debug!(
                                        target: "animator",
                                        "ticks: avg {}us, p95 {}us, max {}us, {} overruns ({} samples)",
                                        s.avg_us, s.p95_us, s.max_us, s.overruns, s.samples
                                    );
                                }
                            }
                        }
                        recv(shutdown_rx) -> _ => break,
                    }
                }
                log::debug!(target: "animator", "ticker stopped");
            })?;
        Ok(Ticker {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }
}

impl fmt::Debug for Animator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Animator")
            .field("active", &self.active_count())
            .field("suspended", &self.is_suspended())
            .finish()
    }
}

/// Background ticking thread. Stops and joins on drop.
pub struct Ticker {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.shutdown.take();
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}
