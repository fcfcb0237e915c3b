use std::fmt;
use std::sync::Arc;

use cantor_types::{BufferId, PlayOptions, PoolId, Property, TransitionKind, VoiceId, VoiceParams};

use crate::animator::{on_completed, Animator, Completion, Ramp, TransitionId};
use crate::bank::VoiceBank;
use crate::source::SoundSource;
use crate::suspend::SuspendNode;

/// Handle to one voice in a bank.
///
/// Handles are cheap to clone and stay valid for the bank's lifetime. They
/// do not confer ownership: the voice may be reclaimed by its pool and
/// reused for another sound while a handle is still held.
#[derive(Clone)]
pub struct Voice {
    id: VoiceId,
    animator: Arc<Animator>,
}

impl Voice {
    pub fn new(id: VoiceId, animator: Arc<Animator>) -> Self {
        Self { id, animator }
    }

    pub fn id(&self) -> VoiceId {
        self.id
    }

    fn bank(&self) -> &VoiceBank {
        self.animator.bank()
    }

    /// Pool currently owning this voice.
    pub fn owner(&self) -> Option<PoolId> {
        self.bank().owner(self.id)
    }

    pub fn suspend_node(&self) -> Option<&Arc<SuspendNode>> {
        self.bank().suspend_node(self.id)
    }

    /// Start a ramp and return its id. A running ramp of the same kind is
    /// replaced.
    pub fn start_transition(&self, ramp: Ramp, on_complete: Option<Completion>) -> Option<TransitionId> {
        self.animator.start(self.id, ramp, on_complete.map(on_completed))
    }

    pub fn cancel_transition(&self, id: TransitionId) -> bool {
        self.animator.cancel(id)
    }

    pub fn is_transitioning(&self, kind: TransitionKind) -> bool {
        self.animator.is_active_for(self.id, kind)
    }
}

impl SoundSource for Voice {
    fn play(&self, buffer: BufferId, options: PlayOptions) -> Option<Voice> {
        let mut slot = self.bank().slot(self.id)?;
        for property in options.properties() {
            slot.apply(property);
        }
        match slot.play(buffer) {
            Ok(()) => Some(self.clone()),
            Err(e) => {
                log::warn!(target: "pool", "voice {}: play {} failed: {}", self.id, buffer, e);
                None
            }
        }
    }

    fn stop(&self) {
        if let Some(mut slot) = self.bank().slot(self.id) {
            slot.stop();
        }
    }

    fn set_paused(&self, paused: bool) {
        if let Some(mut slot) = self.bank().slot(self.id) {
            slot.set_paused(paused);
        }
    }

    fn is_paused(&self) -> bool {
        self.bank().is_paused(self.id)
    }

    fn is_playing(&self) -> bool {
        self.bank().is_playing(self.id)
    }

    fn params(&self) -> VoiceParams {
        self.bank().params(self.id).unwrap_or_default()
    }

    fn set_property(&self, property: Property) {
        if let Some(mut slot) = self.bank().slot(self.id) {
            slot.apply(property);
        }
    }

    fn transition(&self, ramp: Ramp, on_complete: Option<Completion>) {
        self.start_transition(ramp, on_complete);
    }

    fn stop_transition(&self, kind: TransitionKind) {
        self.animator.cancel_for(self.id, kind);
    }
}

impl fmt::Debug for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Voice").field("id", &self.id).finish()
    }
}

impl PartialEq for Voice {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Arc::ptr_eq(&self.animator, &other.animator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{test_voices, TestOp, TestVoice};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn setup() -> (Arc<TestVoice>, Voice) {
        let (mut voices, backends) = test_voices(1);
        let animator = Animator::new(VoiceBank::new(backends));
        (voices.remove(0), Voice::new(VoiceId::new(0), animator))
    }

    #[test]
    fn test_play_applies_overrides_first() {
        let (backend, voice) = setup();
        backend.clear();
        let played = voice.play(BufferId::new(4), PlayOptions::new().gain(0.3).looping(true));
        assert_eq!(played, Some(voice.clone()));
        assert_eq!(
            backend.operations(),
            vec![
                TestOp::Apply(Property::Gain(0.3)),
                TestOp::Apply(Property::Looping(true)),
                TestOp::Play(BufferId::new(4)),
            ]
        );
        assert!(voice.params().looping);
    }

    #[test]
    fn test_refused_play_returns_none() {
        let (backend, voice) = setup();
        backend.set_refuse_play(true);
        assert!(voice.play(BufferId::new(1), PlayOptions::new()).is_none());
        assert!(!voice.is_playing());
    }

    #[test]
    fn test_muted_voice_keeps_gain() {
        let (backend, voice) = setup();
        voice.set_gain(0.4);
        voice.set_muted(true);
        assert_eq!(backend.last_gain(), Some(0.0));
        voice.set_muted(false);
        assert_eq!(backend.last_gain(), Some(0.4));
    }

    #[test]
    fn test_stop_transition_suppresses_completion() {
        let (_, voice) = setup();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        voice.fade_to(
            0.0,
            Duration::from_millis(100),
            Some(Box::new(move || flag.store(true, Ordering::SeqCst))),
        );
        assert!(voice.is_transitioning(TransitionKind::Gain));
        voice.stop_transition(TransitionKind::Gain);
        voice.animator.tick(Duration::from_secs(1));
        assert!(!fired.load(Ordering::SeqCst));
        assert_eq!(voice.params().gain, 1.0);
    }

    #[test]
    fn test_cancel_transition_by_id() {
        let (_, voice) = setup();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let id = voice
            .start_transition(
                Ramp::new(TransitionKind::Pan, 1.0, Duration::from_millis(100)),
                Some(Box::new(move || flag.store(true, Ordering::SeqCst))),
            )
            .unwrap();
        voice.animator.tick(Duration::from_millis(50));

        assert!(voice.cancel_transition(id));
        assert!(!voice.cancel_transition(id));
        assert!(!voice.is_transitioning(TransitionKind::Pan));
        let pan = voice.params().pan;
        voice.animator.tick(Duration::from_secs(1));
        assert!(!fired.load(Ordering::SeqCst));
        assert_eq!(voice.params().pan, pan);
        assert!(pan < 1.0);
    }

    #[test]
    fn test_pitch_ramp_completes() {
        let (backend, voice) = setup();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        voice.pitch_to(
            2.0,
            Duration::from_millis(50),
            Some(Box::new(move || flag.store(true, Ordering::SeqCst))),
        );
        voice.animator.tick(Duration::from_millis(50));
        assert!(fired.load(Ordering::SeqCst));
        assert_eq!(
            backend.last_apply(|p| matches!(p, Property::Pitch(_))),
            Some(Property::Pitch(2.0))
        );
    }
}
