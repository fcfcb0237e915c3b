//! The voice arena.
//!
//! All voices of a session live here for the session's whole lifetime. Pools
//! refer to voices by `VoiceId`; ownership is a per-slot `owner` field that
//! only changes through compare-and-set, so a voice can never sit in two
//! pools at once.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use cantor_types::{BufferId, PoolId, Property, TransitionKind, VoiceId, VoiceParams};

use crate::backend::{BackendResult, VoiceBackend};
use crate::suspend::SuspendNode;
use crate::sync::lock;

/// Hard cap on simultaneous voices.
pub const MAX_VOICES: usize = 32;

pub(crate) struct VoiceSlot {
    backend: Box<dyn VoiceBackend>,
    params: VoiceParams,
    owner: Option<PoolId>,
    user_paused: bool,
    suspended: bool,
}

impl VoiceSlot {
    fn new(backend: Box<dyn VoiceBackend>) -> Self {
        let slot = Self {
            backend,
            params: VoiceParams::default(),
            owner: None,
            user_paused: false,
            suspended: false,
        };
        for property in slot.params.properties() {
            slot.push(property);
        }
        slot
    }

    pub(crate) fn params(&self) -> &VoiceParams {
        &self.params
    }

    pub(crate) fn value(&self, kind: TransitionKind) -> f32 {
        self.params.value(kind)
    }

    pub(crate) fn apply(&mut self, property: Property) {
        self.params.apply(property);
        self.push(property);
    }

    pub(crate) fn apply_params(&mut self, params: &VoiceParams) {
        for property in params.properties() {
            self.apply(property);
        }
    }

    pub(crate) fn set_value(&mut self, kind: TransitionKind, value: f32) {
        self.apply(kind.property(value));
    }

    /// Forward the cached value behind `property` to the backend.
    fn push(&self, property: Property) {
        let p = &self.params;
        match property {
            Property::Gain(_) | Property::Muted(_) => {
                let gain = if p.muted { 0.0 } else { p.gain };
                self.backend.apply(Property::Gain(gain));
            }
            Property::Pitch(_) => self.backend.apply(Property::Pitch(p.pitch)),
            Property::Pan(_) => self.backend.apply(Property::Pan(p.pan)),
            Property::Interruptible(_) => {}
            other => self.backend.apply(other),
        }
    }

    pub(crate) fn play(&mut self, buffer: BufferId) -> BackendResult {
        self.user_paused = false;
        self.backend.play(buffer)?;
        if self.suspended {
            self.backend.set_paused(true);
        }
        Ok(())
    }

    pub(crate) fn stop(&mut self) {
        self.user_paused = false;
        self.backend.stop();
    }

    pub(crate) fn set_paused(&mut self, paused: bool) {
        let was = self.is_paused();
        self.user_paused = paused;
        self.sync_paused(was);
    }

    fn set_suspended(&mut self, suspended: bool) {
        let was = self.is_paused();
        self.suspended = suspended;
        self.sync_paused(was);
    }

    fn sync_paused(&self, was: bool) {
        let now = self.is_paused();
        if was != now {
            self.backend.set_paused(now);
        }
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.user_paused || self.suspended
    }

    pub(crate) fn is_playing(&self) -> bool {
        self.backend.is_playing()
    }

    /// Not playing and not held by a user pause.
    pub(crate) fn is_idle(&self) -> bool {
        !self.user_paused && !self.backend.is_playing()
    }

    pub(crate) fn is_interruptible(&self) -> bool {
        self.params.interruptible
    }
}

pub struct VoiceBank {
    slots: Vec<Mutex<VoiceSlot>>,
    nodes: Vec<Arc<SuspendNode>>,
    next_pool: AtomicU32,
}

impl VoiceBank {
    /// Build a bank around the given backends. Anything past `MAX_VOICES`
    /// is dropped.
    pub fn new(mut backends: Vec<Box<dyn VoiceBackend>>) -> Arc<Self> {
        if backends.len() > MAX_VOICES {
            log::warn!(
                target: "pool",
                "{} voices requested, capping at {}",
                backends.len(),
                MAX_VOICES
            );
            backends.truncate(MAX_VOICES);
        }
        Arc::new_cyclic(|weak: &Weak<VoiceBank>| {
            let nodes = (0..backends.len())
                .map(|i| {
                    let id = VoiceId::new(i as u32);
                    let bank = weak.clone();
                    SuspendNode::new(format!("voice {}", id), move |suspended| {
                        if let Some(bank) = bank.upgrade() {
                            if let Some(mut slot) = bank.slot(id) {
                                slot.set_suspended(suspended);
                            }
                        }
                    })
                })
                .collect();
            let slots = backends
                .into_iter()
                .map(|b| Mutex::new(VoiceSlot::new(b)))
                .collect();
            Self {
                slots,
                nodes,
                next_pool: AtomicU32::new(1),
            }
        })
    }

    /// Build a bank of `count` voices, asking `factory` for each backend.
    pub fn with_factory<F>(count: usize, mut factory: F) -> Arc<Self>
    where
        F: FnMut(VoiceId) -> Box<dyn VoiceBackend>,
    {
        let count = count.min(MAX_VOICES);
        Self::new((0..count).map(|i| factory(VoiceId::new(i as u32))).collect())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = VoiceId> {
        (0..self.slots.len()).map(|i| VoiceId::new(i as u32))
    }

    pub(crate) fn slot(&self, id: VoiceId) -> Option<MutexGuard<'_, VoiceSlot>> {
        self.slots.get(id.index()).map(lock)
    }

    pub fn suspend_node(&self, id: VoiceId) -> Option<&Arc<SuspendNode>> {
        self.nodes.get(id.index())
    }

    pub fn params(&self, id: VoiceId) -> Option<VoiceParams> {
        self.slot(id).map(|s| *s.params())
    }

    pub fn is_playing(&self, id: VoiceId) -> bool {
        self.slot(id).map_or(false, |s| s.is_playing())
    }

    pub fn is_paused(&self, id: VoiceId) -> bool {
        self.slot(id).map_or(false, |s| s.is_paused())
    }

    pub fn owner(&self, id: VoiceId) -> Option<PoolId> {
        self.slot(id).and_then(|s| s.owner)
    }

    /// Voices not owned by any pool.
    pub fn unowned_count(&self) -> usize {
        self.slots.iter().filter(|slot| lock(*slot).owner.is_none()).count()
    }

    pub(crate) fn next_pool_id(&self) -> PoolId {
        PoolId::new(self.next_pool.fetch_add(1, Ordering::Relaxed))
    }

    /// Hand up to `count` unowned voices to `pool`, lowest ids first.
    pub(crate) fn claim(&self, pool: PoolId, count: usize) -> Vec<VoiceId> {
        let mut claimed = Vec::with_capacity(count);
        for id in self.ids() {
            if claimed.len() == count {
                break;
            }
            if let Some(mut slot) = self.slot(id) {
                if slot.owner.is_none() {
                    slot.owner = Some(pool);
                    claimed.push(id);
                }
            }
        }
        claimed
    }

    /// Change a voice's owner if it is currently owned by `from`.
    pub(crate) fn transfer(&self, id: VoiceId, from: Option<PoolId>, to: Option<PoolId>) -> bool {
        match self.slot(id) {
            Some(mut slot) if slot.owner == from => {
                slot.owner = to;
                true
            }
            _ => false,
        }
    }
}

impl std::fmt::Debug for VoiceBank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceBank")
            .field("voices", &self.slots.len())
            .field("unowned", &self.unowned_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{test_voices, NullVoice, TestOp};

    #[test]
    fn test_bank_caps_voice_count() {
        let bank = VoiceBank::with_factory(40, |_| Box::new(NullVoice));
        assert_eq!(bank.len(), MAX_VOICES);
        assert_eq!(bank.unowned_count(), MAX_VOICES);
    }

    #[test]
    fn test_claim_and_transfer_respect_ownership() {
        let (_, backends) = test_voices(3);
        let bank = VoiceBank::new(backends);
        let a = bank.next_pool_id();
        let b = bank.next_pool_id();
        assert_eq!(bank.claim(a, 2), vec![VoiceId::new(0), VoiceId::new(1)]);
        assert_eq!(bank.claim(b, 5), vec![VoiceId::new(2)]);

        assert!(!bank.transfer(VoiceId::new(0), Some(b), Some(a)));
        assert!(bank.transfer(VoiceId::new(0), Some(a), Some(b)));
        assert_eq!(bank.owner(VoiceId::new(0)), Some(b));
        assert_eq!(bank.unowned_count(), 0);
    }

    #[test]
    fn test_mute_is_layered_over_gain() {
        let (voices, backends) = test_voices(1);
        let bank = VoiceBank::new(backends);
        let id = VoiceId::new(0);
        {
            let mut slot = bank.slot(id).unwrap();
            slot.apply(Property::Gain(0.7));
            slot.apply(Property::Muted(true));
        }
        assert_eq!(voices[0].last_gain(), Some(0.0));
        assert_eq!(bank.params(id).unwrap().gain, 0.7);
        bank.slot(id).unwrap().apply(Property::Muted(false));
        assert_eq!(voices[0].last_gain(), Some(0.7));
        assert_eq!(voices[0].count(|op| matches!(op, TestOp::Apply(Property::Muted(_)))), 0);
    }

    #[test]
    fn test_suspend_node_pauses_backend() {
        let (voices, backends) = test_voices(1);
        let bank = VoiceBank::new(backends);
        let id = VoiceId::new(0);
        let node = Arc::clone(bank.suspend_node(id).unwrap());

        node.set_interrupted(true);
        assert!(bank.is_paused(id));
        bank.slot(id).unwrap().set_paused(true);
        node.set_interrupted(false);
        assert!(bank.is_paused(id), "user pause survives resume");
        bank.slot(id).unwrap().set_paused(false);

        let pauses: Vec<TestOp> = voices[0]
            .operations()
            .into_iter()
            .filter(|op| matches!(op, TestOp::SetPaused(_)))
            .collect();
        assert_eq!(pauses, vec![TestOp::SetPaused(true), TestOp::SetPaused(false)]);
    }
}
