//! The control surface shared by a single voice and a channel of voices.

use std::time::Duration;

use cantor_types::{BufferId, PlayOptions, Property, TransitionKind, VoiceParams};

use crate::animator::{Completion, Ramp};
use crate::voice::Voice;

/// Something that can play sounds and have its parameters set or ramped.
///
/// Implemented by `Voice` (one playback unit) and `Channel` (a group of
/// voices sharing virtual parameter values).
pub trait SoundSource {
    /// Start `buffer`. Returns the voice it landed on, or `None` if nothing
    /// could play it.
    fn play(&self, buffer: BufferId, options: PlayOptions) -> Option<Voice>;

    fn stop(&self);

    fn set_paused(&self, paused: bool);

    fn is_paused(&self) -> bool;

    fn is_playing(&self) -> bool;

    /// Current parameter values. For a channel these are its virtual values.
    fn params(&self) -> VoiceParams;

    fn set_property(&self, property: Property);

    /// Ramp one parameter. `on_complete` runs once the target is reached and
    /// never if the ramp is stopped or replaced.
    fn transition(&self, ramp: Ramp, on_complete: Option<Completion>);

    fn stop_transition(&self, kind: TransitionKind);

    fn stop_transitions(&self) {
        for kind in TransitionKind::ALL {
            self.stop_transition(kind);
        }
    }

    fn set_gain(&self, gain: f32) {
        self.set_property(Property::Gain(gain));
    }

    fn set_pitch(&self, pitch: f32) {
        self.set_property(Property::Pitch(pitch));
    }

    fn set_pan(&self, pan: f32) {
        self.set_property(Property::Pan(pan));
    }

    fn set_muted(&self, muted: bool) {
        self.set_property(Property::Muted(muted));
    }

    fn set_looping(&self, looping: bool) {
        self.set_property(Property::Looping(looping));
    }

    fn set_interruptible(&self, interruptible: bool) {
        self.set_property(Property::Interruptible(interruptible));
    }

    fn fade_to(&self, gain: f32, duration: Duration, on_complete: Option<Completion>) {
        self.transition(Ramp::new(TransitionKind::Gain, gain, duration), on_complete);
    }

    fn pan_to(&self, pan: f32, duration: Duration, on_complete: Option<Completion>) {
        self.transition(Ramp::new(TransitionKind::Pan, pan, duration), on_complete);
    }

    fn pitch_to(&self, pitch: f32, duration: Duration, on_complete: Option<Completion>) {
        self.transition(Ramp::new(TransitionKind::Pitch, pitch, duration), on_complete);
    }
}
