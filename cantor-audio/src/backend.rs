//! Voice backend trait: the capability interface of a single playback unit.
//!
//! `VoiceBackend` captures what the middleware *means* to do with one voice
//! (play a buffer, stop, pause, write a control parameter) independently of
//! how it's done (an OpenAL source, a mixer slot, a hardware channel).
//! This enables unit testing of pooling and suspension logic without an
//! audio device.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cantor_types::{BufferId, Property};

/// Result type for backend operations.
pub type BackendResult<T = ()> = Result<T, BackendError>;

/// Error from a backend operation.
#[derive(Debug, Clone)]
pub struct BackendError(pub String);

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BackendError {}

impl From<std::io::Error> for BackendError {
    fn from(e: std::io::Error) -> Self {
        BackendError(e.to_string())
    }
}

impl From<String> for BackendError {
    fn from(s: String) -> Self {
        BackendError(s)
    }
}

/// Semantic-level voice trait.
///
/// The middleware caches every property it writes, so backends are
/// write-only apart from `is_playing`. Muting and the interruptible flag are
/// handled above this layer: a muted voice receives `Property::Gain(0.0)` and
/// never sees `Property::Muted` or `Property::Interruptible`.
pub trait VoiceBackend: Send {
    /// Start playing a buffer from the beginning.
    fn play(&self, buffer: BufferId) -> BackendResult;

    /// Stop playback. Stopping an idle voice is a no-op.
    fn stop(&self);

    /// Pause or resume without losing the playback position.
    fn set_paused(&self, paused: bool);

    /// Whether a sound is currently playing (paused counts as playing).
    fn is_playing(&self) -> bool;

    /// Write one control parameter.
    fn apply(&self, property: Property);
}

// ─── Test Voice ─────────────────────────────────────────────────────

/// An operation recorded by `TestVoice` for assertion in tests.
#[derive(Debug, Clone, PartialEq)]
pub enum TestOp {
    Play(BufferId),
    Stop,
    SetPaused(bool),
    Apply(Property),
}

/// A test voice that records all operations into a vector for assertions.
/// Playback lasts until `finish` or `stop` is called. Uses `Mutex` for
/// interior mutability so the voice is `Send + Sync` (needed for
/// `Arc<TestVoice>` sharing).
pub struct TestVoice {
    ops: Mutex<Vec<TestOp>>,
    playing: AtomicBool,
    refuse_play: AtomicBool,
}

impl TestVoice {
    pub fn new() -> Self {
        Self {
            ops: Mutex::new(Vec::new()),
            playing: AtomicBool::new(false),
            refuse_play: AtomicBool::new(false),
        }
    }

    /// Return all recorded operations.
    pub fn operations(&self) -> Vec<TestOp> {
        self.ops.lock().unwrap().clone()
    }

    /// Clear recorded operations.
    pub fn clear(&self) {
        self.ops.lock().unwrap().clear();
    }

    /// Count operations matching a predicate.
    pub fn count<F: Fn(&TestOp) -> bool>(&self, f: F) -> usize {
        self.ops.lock().unwrap().iter().filter(|op| f(op)).count()
    }

    /// The most recent value written for a property variant, if any.
    pub fn last_apply<F: Fn(&Property) -> bool>(&self, f: F) -> Option<Property> {
        self.ops.lock().unwrap().iter().rev().find_map(|op| match op {
            TestOp::Apply(p) if f(p) => Some(*p),
            _ => None,
        })
    }

    /// The most recent gain written, if any.
    pub fn last_gain(&self) -> Option<f32> {
        match self.last_apply(|p| matches!(p, Property::Gain(_))) {
            Some(Property::Gain(g)) => Some(g),
            _ => None,
        }
    }

    /// Buffers passed to `play`, in order.
    pub fn buffers_played(&self) -> Vec<BufferId> {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .filter_map(|op| match op {
                TestOp::Play(b) => Some(*b),
                _ => None,
            })
            .collect()
    }

    /// Simulate the sound running out.
    pub fn finish(&self) {
        self.playing.store(false, Ordering::SeqCst);
    }

    /// Make subsequent `play` calls fail.
    pub fn set_refuse_play(&self, refuse: bool) {
        self.refuse_play.store(refuse, Ordering::SeqCst);
    }
}

impl VoiceBackend for TestVoice {
    fn play(&self, buffer: BufferId) -> BackendResult {
        if self.refuse_play.load(Ordering::SeqCst) {
            return Err(BackendError(format!("refused buffer {}", buffer)));
        }
        self.ops.lock().unwrap().push(TestOp::Play(buffer));
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.ops.lock().unwrap().push(TestOp::Stop);
        self.playing.store(false, Ordering::SeqCst);
    }

    fn set_paused(&self, paused: bool) {
        self.ops.lock().unwrap().push(TestOp::SetPaused(paused));
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn apply(&self, property: Property) {
        self.ops.lock().unwrap().push(TestOp::Apply(property));
    }
}

impl Default for TestVoice {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps `Arc<TestVoice>` to implement `VoiceBackend` so the bank can
/// own a `Box<dyn VoiceBackend>` while tests retain an `Arc` for assertions.
pub struct SharedTestVoice(pub Arc<TestVoice>);

impl VoiceBackend for SharedTestVoice {
    fn play(&self, buffer: BufferId) -> BackendResult {
        self.0.play(buffer)
    }
    fn stop(&self) {
        self.0.stop()
    }
    fn set_paused(&self, paused: bool) {
        self.0.set_paused(paused)
    }
    fn is_playing(&self) -> bool {
        self.0.is_playing()
    }
    fn apply(&self, property: Property) {
        self.0.apply(property)
    }
}

/// Build `count` shared test voices plus boxed backends wrapping them.
pub fn test_voices(count: usize) -> (Vec<Arc<TestVoice>>, Vec<Box<dyn VoiceBackend>>) {
    let voices: Vec<Arc<TestVoice>> = (0..count).map(|_| Arc::new(TestVoice::new())).collect();
    let backends = voices
        .iter()
        .map(|v| Box::new(SharedTestVoice(Arc::clone(v))) as Box<dyn VoiceBackend>)
        .collect();
    (voices, backends)
}

// ─── NullVoice ──────────────────────────────────────────────────────

/// A no-op voice that accepts everything and never reports playing.
/// Useful when no audio device is available.
pub struct NullVoice;

impl VoiceBackend for NullVoice {
    fn play(&self, _: BufferId) -> BackendResult { Ok(()) }
    fn stop(&self) {}
    fn set_paused(&self, _: bool) {}
    fn is_playing(&self) -> bool { false }
    fn apply(&self, _: Property) {}
}
