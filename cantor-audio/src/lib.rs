//! # cantor-audio
//!
//! Voice pooling, channel aggregation and suspend coordination on top of a
//! small, hard-capped set of playback voices.
//!
//! - `VoiceBank` owns every voice; pools and channels refer to them by id.
//! - `Channel` routes play requests through its `VoicePool`, broadcasts
//!   property writes and aggregates fanned-out transitions.
//! - `Animator` drives timed parameter ramps.
//! - `SuspendNode` trees carry interrupt and manual suspension down to the
//!   voices.

pub mod animator;
pub mod backend;
pub mod bank;
pub mod channel;
pub mod pool;
pub mod source;
pub mod suspend;
pub mod telemetry;
pub mod voice;

mod sync;

pub use animator::{
    on_completed, Animator, Completion, Ramp, Ticker, TransitionCallback, TransitionEnd, TransitionId,
};
pub use backend::{BackendError, BackendResult, NullVoice, VoiceBackend};
pub use bank::{VoiceBank, MAX_VOICES};
pub use channel::Channel;
pub use pool::{Acquired, VoicePool};
pub use source::SoundSource;
pub use suspend::SuspendNode;
pub use telemetry::{TickSummary, TickTelemetry};
pub use voice::Voice;
