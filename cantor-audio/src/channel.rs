//! Channels: a pool of voices driven as one sound source.
//!
//! A channel keeps virtual parameter values that every voice it routes a
//! play request to adopts, broadcasts property writes to all its voices, and
//! fans a transition out to one ramp per voice with a single aggregated
//! completion.
//!
//! Lock order: channel inner, then animator state, then bank slot. When two
//! channels are locked together (absorb) the lower address goes first.
//! Nothing here waits on the animator's fire lock, because ramp callbacks
//! run under it and take the channel lock.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use cantor_types::{BufferId, PlayOptions, Property, TransitionKind, VoiceId, VoiceParams};

use crate::animator::{Animator, Completion, Ramp, TransitionCallback, TransitionEnd};
use crate::bank::VoiceBank;
use crate::pool::VoicePool;
use crate::source::SoundSource;
use crate::suspend::SuspendNode;
use crate::sync::lock;
use crate::voice::Voice;

/// Bookkeeping for one fanned-out transition.
struct GroupTransition {
    generation: u64,
    target: f32,
    /// Voices whose ramp has neither completed nor been cancelled.
    pending: Vec<VoiceId>,
    completed: usize,
    on_complete: Option<Completion>,
}

struct ChannelInner {
    pool: VoicePool,
    params: VoiceParams,
    defaults: VoiceParams,
    paused: bool,
    closed: bool,
    groups: [Option<GroupTransition>; 3],
    generation: u64,
}

impl ChannelInner {
    fn is_pending(&self, kind: TransitionKind, voice: VoiceId) -> bool {
        self.groups[kind.index()]
            .as_ref()
            .map_or(false, |g| g.pending.contains(&voice))
    }

    /// Drop `voice` from whatever groups still wait on it. Returns the
    /// completions of groups this finished.
    fn detach(&mut self, voice: VoiceId) -> Vec<Completion> {
        TransitionKind::ALL
            .into_iter()
            .filter_map(|kind| self.resolve(kind, voice, TransitionEnd::Cancelled))
            .collect()
    }

    /// Record the end of one voice's ramp. Returns the user completion if the
    /// group is now finished.
    fn resolve(&mut self, kind: TransitionKind, voice: VoiceId, end: TransitionEnd) -> Option<Completion> {
        let group = self.groups[kind.index()].as_mut()?;
        let pos = group.pending.iter().position(|&v| v == voice)?;
        group.pending.swap_remove(pos);
        if end == TransitionEnd::Completed {
            group.completed += 1;
        }
        if !group.pending.is_empty() {
            return None;
        }
        let group = self.groups[kind.index()].take()?;
        if group.completed == 0 {
            log::debug!(target: "channel", "{} transition dropped, every ramp was cancelled", kind);
            return None;
        }
        self.params.apply(kind.property(group.target));
        group.on_complete
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }
}

struct ChannelShared {
    label: String,
    animator: Arc<Animator>,
    node: Arc<SuspendNode>,
    parent: Mutex<Option<Weak<SuspendNode>>>,
    inner: Mutex<ChannelInner>,
}

impl ChannelShared {
    fn bank(&self) -> &VoiceBank {
        self.animator.bank()
    }

    fn voice_node(&self, voice: VoiceId) -> Option<Arc<SuspendNode>> {
        self.bank().suspend_node(voice).cloned()
    }

    fn voice_finished(&self, kind: TransitionKind, generation: u64, voice: VoiceId, end: TransitionEnd) {
        let done = {
            let mut inner = lock(&self.inner);
            match inner.groups[kind.index()].as_ref() {
                Some(group) if group.generation == generation => {}
                _ => return,
            }
            inner.resolve(kind, voice, end)
        };
        if let Some(done) = done {
            log::debug!(target: "channel", "{}: {} transition complete", self.label, kind);
            done();
        }
    }

    /// Discard `voice`'s ramps and its share of any group transition.
    fn forget(&self, inner: &mut ChannelInner, voice: VoiceId) -> Vec<Completion> {
        self.animator.discard_voice(voice);
        inner.detach(voice)
    }
}

fn run(completions: Vec<Completion>) {
    for done in completions {
        done();
    }
}

/// A group of voices driven as one sound source.
///
/// Dropping a channel closes it: its voices are stopped and returned to the
/// bank.
pub struct Channel {
    shared: Arc<ChannelShared>,
}

impl Channel {
    /// A channel claiming up to `voices` unowned voices, with default
    /// parameters.
    pub fn new(animator: Arc<Animator>, voices: usize) -> Self {
        Self::with_params(animator, voices, VoiceParams::default())
    }

    /// A channel claiming up to `voices` unowned voices. `params` become both
    /// its virtual values and what `reset_to_default` restores.
    pub fn with_params(animator: Arc<Animator>, voices: usize, params: VoiceParams) -> Self {
        let pool = VoicePool::with_voices(Arc::clone(animator.bank()), voices);
        for &voice in pool.voices() {
            if let Some(mut slot) = animator.bank().slot(voice) {
                slot.apply_params(&params);
            }
        }
        let channel = Self::from_pool(animator, pool, params, params, false);
        channel.listen_to_voices(&channel.voices());
        channel
    }

    fn from_pool(
        animator: Arc<Animator>,
        pool: VoicePool,
        params: VoiceParams,
        defaults: VoiceParams,
        paused: bool,
    ) -> Self {
        let label = format!("channel {}", pool.id());
        log::debug!(target: "channel", "{}: created with {} voices", label, pool.len());
        Self {
            shared: Arc::new(ChannelShared {
                node: SuspendNode::detached(label.clone()),
                label,
                animator,
                parent: Mutex::new(None),
                inner: Mutex::new(ChannelInner {
                    pool,
                    params,
                    defaults,
                    paused,
                    closed: false,
                    groups: [None, None, None],
                    generation: 0,
                }),
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, ChannelInner> {
        lock(&self.shared.inner)
    }

    fn listen_to_voices(&self, voices: &[VoiceId]) {
        for &voice in voices {
            if let Some(node) = self.shared.voice_node(voice) {
                self.shared.node.add_listener(&node);
            }
        }
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    pub fn suspend_node(&self) -> &Arc<SuspendNode> {
        &self.shared.node
    }

    /// Register under `parent`, leaving any previous parent.
    pub fn attach_to(&self, parent: &Arc<SuspendNode>) {
        let previous = lock(&self.shared.parent).replace(Arc::downgrade(parent));
        if let Some(previous) = previous.and_then(|p| p.upgrade()) {
            if Arc::ptr_eq(&previous, parent) {
                return;
            }
            previous.release_listener(&self.shared.node);
        }
        parent.add_listener(&self.shared.node);
    }

    fn parent(&self) -> Option<Arc<SuspendNode>> {
        lock(&self.shared.parent).as_ref().and_then(Weak::upgrade)
    }

    pub fn is_suspended(&self) -> bool {
        self.shared.node.is_suspended()
    }

    pub fn set_manually_suspended(&self, suspended: bool) {
        self.shared.node.set_manually_suspended(suspended);
    }

    pub fn is_closed(&self) -> bool {
        self.inner().closed
    }

    pub fn voice_count(&self) -> usize {
        self.inner().pool.len()
    }

    pub fn voices(&self) -> Vec<VoiceId> {
        self.inner().pool.voices().to_vec()
    }

    /// Handle to a member voice.
    pub fn voice(&self, voice: VoiceId) -> Option<Voice> {
        self.inner()
            .pool
            .contains(voice)
            .then(|| Voice::new(voice, Arc::clone(&self.shared.animator)))
    }

    /// Whether a group transition of `kind` is still waiting on voices.
    pub fn is_transitioning(&self, kind: TransitionKind) -> bool {
        self.inner().groups[kind.index()].is_some()
    }

    /// Take an unowned voice into this channel. An idle voice adopts the
    /// channel's values straight away.
    pub fn add_voice(&self, voice: VoiceId) -> bool {
        {
            let mut inner = self.inner();
            if inner.closed || !inner.pool.add_voice(voice) {
                return false;
            }
            if let Some(mut slot) = self.shared.bank().slot(voice) {
                if slot.is_idle() {
                    slot.apply_params(&inner.params);
                }
            }
        }
        self.listen_to_voices(&[voice]);
        true
    }

    /// Hand a voice back to the bank. It keeps playing, but its ramps and its
    /// share of any group transition are cancelled.
    pub fn remove_voice(&self, voice: VoiceId) -> bool {
        let completions = {
            let mut inner = self.inner();
            if inner.closed || !inner.pool.remove_voice(voice) {
                return false;
            }
            self.shared.forget(&mut inner, voice)
        };
        run(completions);
        if let Some(node) = self.shared.voice_node(voice) {
            self.shared.node.release_listener(&node);
        }
        true
    }

    /// Grow by claiming unowned voices, or shrink by stopping and releasing
    /// the last ones. Returns the resulting count.
    pub fn set_voice_count(&self, count: usize) -> usize {
        let (added, removed, completions, len) = {
            let mut inner = self.inner();
            if inner.closed {
                return 0;
            }
            let len = inner.pool.len();
            let mut completions = Vec::new();
            let (added, removed) = if count > len {
                let added = inner.pool.claim(count - len);
                for &voice in &added {
                    if let Some(mut slot) = self.shared.bank().slot(voice) {
                        slot.apply_params(&inner.params);
                    }
                }
                (added, Vec::new())
            } else {
                let victims = inner.pool.voices()[count..].to_vec();
                for &voice in &victims {
                    if let Some(mut slot) = self.shared.bank().slot(voice) {
                        slot.stop();
                    }
                    completions.extend(self.shared.forget(&mut inner, voice));
                }
                let removed = inner.pool.release_last(victims.len());
                (Vec::new(), removed)
            };
            (added, removed, completions, inner.pool.len())
        };
        run(completions);
        self.listen_to_voices(&added);
        for voice in removed {
            if let Some(node) = self.shared.voice_node(voice) {
                self.shared.node.release_listener(&node);
            }
        }
        log::debug!(target: "channel", "{}: voice count now {}", self.shared.label, len);
        len
    }

    /// Move the last `n` voices (clamped) into a new channel that takes this
    /// channel's current values as its own defaults, shares its suspend state
    /// and sits under the same parent. Playing voices keep playing; their
    /// ramps here are cancelled.
    pub fn split(&self, n: usize) -> Channel {
        let (pool, params, paused, completions) = {
            let mut inner = self.inner();
            let pool = inner.pool.split_off(n);
            let mut completions = Vec::new();
            for &voice in pool.voices() {
                completions.extend(self.shared.forget(&mut inner, voice));
            }
            (pool, inner.params, inner.paused, completions)
        };
        run(completions);
        let moved = pool.voices().to_vec();
        let child = Channel::from_pool(Arc::clone(&self.shared.animator), pool, params, params, paused);

        // Latches go on the child before any voice moves over, so no voice
        // wakes in between.
        let parent = self.parent();
        let node = &self.shared.node;
        let own_manual = match &parent {
            Some(parent) if parent.is_manually_suspended() => parent.saved_manual(node) == Some(true),
            _ => node.is_manually_suspended(),
        };
        if own_manual {
            child.set_manually_suspended(true);
        }
        if let Some(parent) = &parent {
            child.attach_to(parent);
        }
        if node.is_interrupted() && !child.shared.node.is_interrupted() {
            child.shared.node.set_interrupted(true);
        }
        for voice in &moved {
            if let Some(node) = self.shared.voice_node(*voice) {
                self.shared.node.move_listener(&node, &child.shared.node);
            }
        }
        log::debug!(
            target: "channel",
            "{}: split {} voices into {}",
            self.shared.label,
            moved.len(),
            child.shared.label
        );
        child
    }

    /// Move every voice of `other` into this channel. `other` is left empty.
    pub fn absorb(&self, other: &Channel) {
        if Arc::ptr_eq(&self.shared, &other.shared) {
            return;
        }
        let (moved, completions) = {
            let (mut mine, mut theirs) =
                if Arc::as_ptr(&self.shared) < Arc::as_ptr(&other.shared) {
                    let mine = self.inner();
                    (mine, other.inner())
                } else {
                    let theirs = other.inner();
                    (self.inner(), theirs)
                };
            if mine.closed || theirs.closed {
                return;
            }
            let mut completions = Vec::new();
            for voice in theirs.pool.voices().to_vec() {
                completions.extend(other.shared.forget(&mut theirs, voice));
            }
            let moved = mine.pool.merge(&mut theirs.pool);
            for &voice in &moved {
                if let Some(mut slot) = self.shared.bank().slot(voice) {
                    if slot.is_idle() {
                        slot.apply_params(&mine.params);
                    } else if slot.is_playing() {
                        slot.set_paused(mine.paused);
                    }
                }
            }
            (moved, completions)
        };
        run(completions);
        for &voice in &moved {
            if let Some(node) = self.shared.voice_node(voice) {
                other.shared.node.move_listener(&node, &self.shared.node);
            }
        }
        log::debug!(
            target: "channel",
            "{}: absorbed {} voices from {}",
            self.shared.label,
            moved.len(),
            other.shared.label
        );
    }

    /// Restore the parameters the channel was created with and unpause.
    pub fn reset_to_default(&self) {
        self.stop_transitions();
        let mut inner = self.inner();
        if inner.closed {
            return;
        }
        inner.params = inner.defaults;
        inner.paused = false;
        for &voice in inner.pool.voices() {
            if let Some(mut slot) = self.shared.bank().slot(voice) {
                slot.apply_params(&inner.params);
                slot.set_paused(false);
            }
        }
    }

    /// Stop every voice and give them back to the bank. Later operations
    /// are no-ops.
    pub fn close(&self) {
        let voices = {
            let mut inner = self.inner();
            if inner.closed {
                return;
            }
            inner.closed = true;
            inner.groups = [None, None, None];
            let voices = inner.pool.voices().to_vec();
            for &voice in &voices {
                self.shared.animator.discard_voice(voice);
                if let Some(mut slot) = self.shared.bank().slot(voice) {
                    slot.stop();
                }
            }
            inner.pool.close();
            voices
        };
        for voice in voices {
            if let Some(node) = self.shared.voice_node(voice) {
                self.shared.node.release_listener(&node);
            }
        }
        if let Some(parent) = lock(&self.shared.parent).take().and_then(|p| p.upgrade()) {
            parent.remove_listener(&self.shared.node);
        }
        log::debug!(target: "channel", "{}: closed", self.shared.label);
    }

    fn voice_callback(&self, kind: TransitionKind, generation: u64, voice: VoiceId) -> TransitionCallback {
        let shared = Arc::downgrade(&self.shared);
        Box::new(move |end| {
            if let Some(shared) = shared.upgrade() {
                shared.voice_finished(kind, generation, voice, end);
            }
        })
    }
}

impl SoundSource for Channel {
    /// Route to a free voice, reclaiming an interruptible one if needed.
    /// Refused while the channel is suspended or closed.
    fn play(&self, buffer: BufferId, options: PlayOptions) -> Option<Voice> {
        if self.is_suspended() {
            log::debug!(target: "channel", "{}: suspended, refusing play", self.shared.label);
            return None;
        }
        let mut completions = Vec::new();
        let played = (|| {
            let mut inner = self.inner();
            if inner.closed {
                return None;
            }
            let Some(acquired) = inner.pool.acquire(true) else {
                log::debug!(target: "channel", "{}: no voice available", self.shared.label);
                return None;
            };
            let voice = acquired.voice;
            if acquired.reclaimed {
                completions.extend(self.shared.forget(&mut inner, voice));
            }
            for property in options.properties() {
                if let Some(kind) = property.transition_kind() {
                    if inner.is_pending(kind, voice) {
                        self.shared.animator.discard_for(voice, kind);
                        completions.extend(inner.resolve(kind, voice, TransitionEnd::Cancelled));
                    }
                }
            }
            let mut slot = self.shared.bank().slot(voice)?;
            for property in inner.params.properties() {
                let ramping = property
                    .transition_kind()
                    .map_or(false, |kind| inner.is_pending(kind, voice));
                if !ramping {
                    slot.apply(property);
                }
            }
            for property in options.properties() {
                slot.apply(property);
            }
            if let Err(e) = slot.play(buffer) {
                log::warn!(target: "channel", "{}: voice {} refused {}: {}", self.shared.label, voice, buffer, e);
                return None;
            }
            if inner.paused {
                slot.set_paused(true);
            }
            Some(voice)
        })();
        run(completions);
        played.map(|voice| Voice::new(voice, Arc::clone(&self.shared.animator)))
    }

    fn stop(&self) {
        let inner = self.inner();
        for &voice in inner.pool.voices() {
            if let Some(mut slot) = self.shared.bank().slot(voice) {
                slot.stop();
            }
        }
    }

    /// Pause or resume every playing voice. Idle voices stay available.
    fn set_paused(&self, paused: bool) {
        let mut inner = self.inner();
        if inner.closed {
            return;
        }
        inner.paused = paused;
        for &voice in inner.pool.voices() {
            if let Some(mut slot) = self.shared.bank().slot(voice) {
                if !paused || slot.is_playing() {
                    slot.set_paused(paused);
                }
            }
        }
    }

    fn is_paused(&self) -> bool {
        self.inner().paused
    }

    fn is_playing(&self) -> bool {
        let inner = self.inner();
        inner
            .pool
            .voices()
            .iter()
            .any(|&voice| self.shared.bank().is_playing(voice))
    }

    fn params(&self) -> VoiceParams {
        self.inner().params
    }

    /// Record a virtual value and push it to every voice. A write to a
    /// rampable property ends the group transition on it.
    fn set_property(&self, property: Property) {
        let mut inner = self.inner();
        if inner.closed {
            return;
        }
        inner.params.apply(property);
        if let Some(kind) = property.transition_kind() {
            if let Some(group) = inner.groups[kind.index()].take() {
                for voice in group.pending {
                    self.shared.animator.discard_for(voice, kind);
                }
            }
        }
        for &voice in inner.pool.voices() {
            if let Some(mut slot) = self.shared.bank().slot(voice) {
                slot.apply(property);
            }
        }
    }

    /// Start one ramp per member voice. `on_complete` runs once, after the
    /// last of them ends, provided at least one reached the target. A second
    /// transition of the same kind replaces this one and its ramps.
    fn transition(&self, ramp: Ramp, on_complete: Option<Completion>) {
        let kind = ramp.kind;
        let mut inner = self.inner();
        if inner.closed {
            return;
        }
        if let Some(old) = inner.groups[kind.index()].take() {
            for voice in old.pending {
                self.shared.animator.discard_for(voice, kind);
            }
        }
        let generation = inner.next_generation();
        let voices = inner.pool.voices().to_vec();
        let pending: Vec<VoiceId> = voices
            .into_iter()
            .filter(|&voice| {
                self.shared
                    .animator
                    .start_quiet(voice, ramp, Some(self.voice_callback(kind, generation, voice)))
                    .is_some()
            })
            .collect();
        if pending.is_empty() {
            log::debug!(target: "channel", "{}: no voices, {} transition dropped", self.shared.label, kind);
            return;
        }
        log::debug!(
            target: "channel",
            "{}: {} -> {} over {:?} on {} voices",
            self.shared.label,
            kind,
            ramp.target,
            ramp.duration,
            pending.len()
        );
        inner.groups[kind.index()] = Some(GroupTransition {
            generation,
            target: kind.clamp(ramp.target),
            pending,
            completed: 0,
            on_complete,
        });
    }

    /// Stop the `kind` ramps of every member voice. No completion fires.
    fn stop_transition(&self, kind: TransitionKind) {
        let mut inner = self.inner();
        inner.groups[kind.index()] = None;
        for &voice in inner.pool.voices() {
            self.shared.animator.discard_for(voice, kind);
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner();
        f.debug_struct("Channel")
            .field("label", &self.shared.label)
            .field("voices", &inner.pool.voices())
            .field("paused", &inner.paused)
            .field("closed", &inner.closed)
            .finish()
    }
}
