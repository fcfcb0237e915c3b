use std::io;
use std::sync::{Arc, Weak};
use std::time::Duration;

use cantor_audio::{
    Animator, Channel, Completion, Ramp, SoundSource, SuspendNode, Ticker, Voice, VoiceBackend,
    VoiceBank,
};
use cantor_types::{BufferId, Easing, PlayOptions, TransitionKind, VoiceId, VoiceParams};

use crate::config::Config;
use crate::interrupts::{InterruptEvent, InterruptFeed, InterruptHandler, InterruptSender};

/// Owns every moving part of one audio session: the voice bank, the
/// animator and its ticker, the root suspend node, the interrupt feed and
/// the shared effects channel.
///
/// Channels made with `new_channel` hang off the root node, so suspending or
/// interrupting the session pauses them too.
pub struct AudioSession {
    // Threads stop before the channels they could touch go away.
    _ticker: Ticker,
    _feed: InterruptFeed,
    interrupts: Arc<InterruptHandler>,
    sender: InterruptSender,
    effects: Channel,
    root: Arc<SuspendNode>,
    animator: Arc<Animator>,
    defaults: VoiceParams,
    easing: Easing,
}

impl AudioSession {
    /// Build a session from `config`, asking `factory` for each voice's
    /// backend. Fails only if a worker thread cannot be spawned.
    pub fn new<F>(config: &Config, factory: F) -> io::Result<Self>
    where
        F: FnMut(VoiceId) -> Box<dyn VoiceBackend>,
    {
        let bank = VoiceBank::with_factory(config.voice_count(), factory);
        let animator = Animator::new(bank);
        let ticker = animator.spawn_ticker(config.step_interval(), config.telemetry_interval())?;

        let frozen: Weak<Animator> = Arc::downgrade(&animator);
        let root = SuspendNode::new("session", move |suspended| {
            if let Some(animator) = frozen.upgrade() {
                animator.set_suspended(suspended);
            }
        });

        let interrupts = InterruptHandler::new(Arc::clone(&root), config.handle_interruptions());
        let (sender, feed) = InterruptFeed::spawn(Arc::clone(&interrupts))?;

        let defaults = config.voice_defaults();
        let effects = Channel::with_params(
            Arc::clone(&animator),
            config.reserved_voices(),
            VoiceParams {
                gain: config.effects_gain(),
                ..defaults
            },
        );
        effects.attach_to(&root);

        log::info!(
            target: "session",
            "started with {} voices, {} reserved for effects",
            animator.bank().len(),
            effects.voice_count()
        );

        Ok(Self {
            _ticker: ticker,
            _feed: feed,
            interrupts,
            sender,
            effects,
            root,
            animator,
            defaults,
            easing: config.easing(),
        })
    }

    pub fn animator(&self) -> &Arc<Animator> {
        &self.animator
    }

    pub fn bank(&self) -> &Arc<VoiceBank> {
        self.animator.bank()
    }

    /// Root of the suspend tree.
    pub fn root(&self) -> &Arc<SuspendNode> {
        &self.root
    }

    pub fn default_easing(&self) -> Easing {
        self.easing
    }

    // Suspension

    pub fn set_manually_suspended(&self, suspended: bool) {
        log::debug!(target: "session", "manual suspend {}", suspended);
        self.root.set_manually_suspended(suspended);
    }

    pub fn is_suspended(&self) -> bool {
        self.root.is_suspended()
    }

    pub fn is_interrupted(&self) -> bool {
        self.root.is_interrupted()
    }

    pub fn is_manually_suspended(&self) -> bool {
        self.root.is_manually_suspended()
    }

    // Interruptions

    /// Apply an interruption event on the calling thread.
    pub fn handle_interrupt(&self, event: InterruptEvent) {
        self.interrupts.apply(event);
    }

    /// Sender for delivering interruption events from another thread.
    pub fn interrupt_sender(&self) -> InterruptSender {
        self.sender.clone()
    }

    pub fn handles_interruptions(&self) -> bool {
        self.interrupts.is_enabled()
    }

    /// When turned off, later events are ignored and any interruption in
    /// force is lifted.
    pub fn set_handle_interruptions(&self, handle: bool) {
        self.interrupts.set_enabled(handle);
    }

    /// Lift an interruption whose end was never reported.
    pub fn force_end_interruption(&self) {
        if self.root.is_interrupted() {
            log::info!(target: "session", "forcing end of interruption");
        }
        self.root.set_interrupted(false);
    }

    // Channels

    /// A channel of up to `voices` unowned voices with the configured
    /// defaults, under the session's suspend root.
    pub fn new_channel(&self, voices: usize) -> Channel {
        let channel = Channel::with_params(Arc::clone(&self.animator), voices, self.defaults);
        channel.attach_to(&self.root);
        if channel.voice_count() < voices {
            log::warn!(
                target: "session",
                "asked for {} voices, only {} free",
                voices,
                channel.voice_count()
            );
        }
        channel
    }

    pub fn effects(&self) -> &Channel {
        &self.effects
    }

    /// Voices available to new channels.
    pub fn free_voices(&self) -> usize {
        self.bank().unowned_count()
    }

    pub fn reserved_voices(&self) -> usize {
        self.effects.voice_count()
    }

    /// Resize the effects channel. Returns the count it ended up with.
    pub fn set_reserved_voices(&self, count: usize) -> usize {
        self.effects.set_voice_count(count)
    }

    // Effects

    pub fn play_effect(&self, buffer: BufferId, options: PlayOptions) -> Option<Voice> {
        self.effects.play(buffer, options)
    }

    pub fn set_effects_paused(&self, paused: bool) {
        self.effects.set_paused(paused);
    }

    pub fn set_effects_muted(&self, muted: bool) {
        self.effects.set_muted(muted);
    }

    pub fn set_effects_volume(&self, gain: f32) {
        self.effects.set_gain(gain);
    }

    /// Fade the effects channel using the configured easing.
    pub fn fade_effects(&self, gain: f32, duration: Duration, on_complete: Option<Completion>) {
        let ramp = Ramp::new(TransitionKind::Gain, gain, duration).with_easing(self.easing);
        self.effects.transition(ramp, on_complete);
    }

    pub fn stop_all_effects(&self) {
        self.effects.stop();
    }

    /// Stop every voice in the bank, whichever channel owns it.
    pub fn stop_everything(&self) {
        for id in self.bank().ids() {
            Voice::new(id, Arc::clone(&self.animator)).stop();
        }
    }

    /// Stop all sound, restore the effects channel and lift manual
    /// suspension.
    pub fn reset_to_default(&self) {
        self.stop_everything();
        self.effects.reset_to_default();
        self.root.set_manually_suspended(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cantor_audio::backend::{SharedTestVoice, TestVoice};
    use cantor_audio::NullVoice;

    fn session() -> AudioSession {
        AudioSession::new(&Config::embedded(), |_| Box::new(NullVoice)).unwrap()
    }

    #[test]
    fn test_new_session_uses_config() {
        let session = session();
        assert_eq!(session.bank().len(), 32);
        assert_eq!(session.reserved_voices(), 24);
        assert_eq!(session.free_voices(), 8);
        assert!(session.handles_interruptions());
        assert_eq!(session.default_easing(), Easing::Linear);
    }

    #[test]
    fn test_suspending_root_freezes_animator() {
        let session = session();
        session.set_manually_suspended(true);
        assert!(session.animator().is_suspended());
        assert!(session.effects().is_suspended());
        session.set_manually_suspended(false);
        assert!(!session.animator().is_suspended());
    }

    #[test]
    fn test_new_channel_takes_free_voices() {
        let session = session();
        let channel = session.new_channel(5);
        assert_eq!(channel.voice_count(), 5);
        assert_eq!(session.free_voices(), 3);
        assert!(session.root().has_listener(channel.suspend_node()));
        drop(channel);
        assert_eq!(session.free_voices(), 8);
    }

    #[test]
    fn test_interrupt_ignored_when_handling_disabled() {
        let session = session();
        session.set_handle_interruptions(false);
        session.handle_interrupt(InterruptEvent::Began);
        assert!(!session.is_interrupted());
    }

    #[test]
    fn test_play_effect_reaches_backend() {
        let voice = Arc::new(TestVoice::new());
        let backend = Arc::clone(&voice);
        let session = AudioSession::new(&Config::embedded(), move |id| -> Box<dyn VoiceBackend> {
            if id.index() == 0 {
                Box::new(SharedTestVoice(Arc::clone(&backend)))
            } else {
                Box::new(NullVoice)
            }
        })
        .unwrap();
        let played = session.play_effect(BufferId::new(7), PlayOptions::new()).unwrap();
        assert_eq!(played.id(), VoiceId::new(0));
        assert_eq!(voice.buffers_played(), vec![BufferId::new(7)]);
    }
}
