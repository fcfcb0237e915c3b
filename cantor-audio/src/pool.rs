//! Voice pool: the set of voices a channel may route play requests to.
//!
//! Acquisition is scan-then-reclaim. The first idle voice in pool order
//! wins; failing that, the first interruptible voice is stopped and handed
//! out. An acquired voice moves to the back of the order, so repeated
//! reclamation cycles through the pool instead of hammering one voice.
//!
//! The pool does not touch transitions. Callers that reclaim a voice are
//! told so through `Acquired::reclaimed` and clean up after it.

use std::sync::Arc;

use cantor_types::{PoolId, VoiceId};

use crate::bank::{VoiceBank, VoiceSlot};

/// A voice handed out by `VoicePool::acquire`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acquired {
    pub voice: VoiceId,
    /// The voice was busy and has been stopped to satisfy this request.
    pub reclaimed: bool,
}

pub struct VoicePool {
    id: PoolId,
    bank: Arc<VoiceBank>,
    voices: Vec<VoiceId>,
    closed: bool,
}

impl VoicePool {
    /// An empty pool.
    pub fn new(bank: Arc<VoiceBank>) -> Self {
        let id = bank.next_pool_id();
        Self {
            id,
            bank,
            voices: Vec::new(),
            closed: false,
        }
    }

    /// A pool holding up to `count` voices nobody else owns.
    pub fn with_voices(bank: Arc<VoiceBank>, count: usize) -> Self {
        let mut pool = Self::new(bank);
        pool.claim(count);
        pool
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn bank(&self) -> &Arc<VoiceBank> {
        &self.bank
    }

    pub fn voices(&self) -> &[VoiceId] {
        &self.voices
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    pub fn contains(&self, voice: VoiceId) -> bool {
        self.voices.contains(&voice)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Take up to `count` unowned voices from the bank. Returns the voices
    /// actually added.
    pub fn claim(&mut self, count: usize) -> Vec<VoiceId> {
        if self.closed || count == 0 {
            return Vec::new();
        }
        let claimed = self.bank.claim(self.id, count);
        if claimed.len() < count {
            log::debug!(
                target: "pool",
                "pool {}: wanted {} voices, bank had {}",
                self.id,
                count,
                claimed.len()
            );
        }
        self.voices.extend_from_slice(&claimed);
        claimed
    }

    /// Add an unowned voice. Fails if another pool owns it.
    pub fn add_voice(&mut self, voice: VoiceId) -> bool {
        if self.closed || self.contains(voice) {
            return false;
        }
        if !self.bank.transfer(voice, None, Some(self.id)) {
            log::warn!(target: "pool", "pool {}: voice {} is owned elsewhere", self.id, voice);
            return false;
        }
        self.voices.push(voice);
        true
    }

    /// Remove a voice and hand it back to the bank. The voice keeps playing.
    pub fn remove_voice(&mut self, voice: VoiceId) -> bool {
        if self.closed {
            return false;
        }
        let Some(pos) = self.voices.iter().position(|&v| v == voice) else {
            return false;
        };
        self.voices.remove(pos);
        self.bank.transfer(voice, Some(self.id), None);
        true
    }

    /// Find a voice for a new sound. See the module docs for the order.
    pub fn acquire(&mut self, attempt_to_interrupt: bool) -> Option<Acquired> {
        if self.closed {
            return None;
        }
        let found = self
            .find(|slot| slot.is_idle(), false)
            .or_else(|| {
                attempt_to_interrupt
                    .then(|| self.find(|slot| slot.is_interruptible(), true))
                    .flatten()
            })?;
        let pos = found.0;
        let voice = self.voices.remove(pos);
        self.voices.push(voice);
        if found.1 {
            log::debug!(target: "pool", "pool {}: reclaimed voice {}", self.id, voice);
        }
        Some(Acquired {
            voice,
            reclaimed: found.1,
        })
    }

    fn find(
        &self,
        pred: impl Fn(&VoiceSlot) -> bool,
        stop: bool,
    ) -> Option<(usize, bool)> {
        self.voices.iter().enumerate().find_map(|(pos, &id)| {
            let mut slot = self.bank.slot(id)?;
            if !pred(&slot) {
                return None;
            }
            if stop {
                slot.stop();
            }
            Some((pos, stop))
        })
    }

    /// `acquire`, keeping only the voice.
    pub fn get_free_voice(&mut self, attempt_to_interrupt: bool) -> Option<VoiceId> {
        self.acquire(attempt_to_interrupt).map(|a| a.voice)
    }

    /// Move the last `n` voices (clamped) into a new pool.
    pub fn split_off(&mut self, n: usize) -> VoicePool {
        let mut other = VoicePool::new(Arc::clone(&self.bank));
        if self.closed {
            return other;
        }
        let at = self.voices.len() - n.min(self.voices.len());
        for voice in self.voices.split_off(at) {
            if self.bank.transfer(voice, Some(self.id), Some(other.id)) {
                other.voices.push(voice);
            }
        }
        other
    }

    /// Move every voice of `other` to the back of this pool. Returns the
    /// voices moved.
    pub fn merge(&mut self, other: &mut VoicePool) -> Vec<VoiceId> {
        if self.closed || other.closed || self.id == other.id {
            return Vec::new();
        }
        let mut moved = Vec::with_capacity(other.voices.len());
        for voice in other.voices.drain(..) {
            if self.bank.transfer(voice, Some(other.id), Some(self.id)) {
                self.voices.push(voice);
                moved.push(voice);
            }
        }
        moved
    }

    /// Give the last `n` voices (clamped) back to the bank. Returns them.
    pub fn release_last(&mut self, n: usize) -> Vec<VoiceId> {
        if self.closed {
            return Vec::new();
        }
        let at = self.voices.len() - n.min(self.voices.len());
        let released = self.voices.split_off(at);
        for &voice in &released {
            self.bank.transfer(voice, Some(self.id), None);
        }
        released
    }

    /// Give every voice back to the bank. Returns them.
    pub fn drain(&mut self) -> Vec<VoiceId> {
        let n = self.voices.len();
        self.release_last(n)
    }

    /// Release every voice. Every later operation is a no-op.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        let released = self.drain();
        log::debug!(target: "pool", "pool {}: closed, released {} voices", self.id, released.len());
        self.closed = true;
    }
}

impl Drop for VoicePool {
    fn drop(&mut self) {
        for &voice in &self.voices {
            self.bank.transfer(voice, Some(self.id), None);
        }
    }
}

impl std::fmt::Debug for VoicePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoicePool")
            .field("id", &self.id)
            .field("voices", &self.voices)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{test_voices, TestOp, TestVoice};
    use cantor_types::{BufferId, Property};

    fn setup(n: usize) -> (Vec<Arc<TestVoice>>, Arc<VoiceBank>) {
        let (voices, backends) = test_voices(n);
        (voices, VoiceBank::new(backends))
    }

    fn play(bank: &VoiceBank, id: VoiceId) {
        bank.slot(id).unwrap().play(BufferId::new(1)).unwrap();
    }

    fn ids(raw: &[u32]) -> Vec<VoiceId> {
        raw.iter().map(|&i| VoiceId::new(i)).collect()
    }

    #[test]
    fn test_idle_voice_preferred_in_order() {
        let (_, bank) = setup(3);
        let mut pool = VoicePool::with_voices(Arc::clone(&bank), 3);
        play(&bank, VoiceId::new(0));
        let got = pool.acquire(true).unwrap();
        assert_eq!(got.voice, VoiceId::new(1));
        assert!(!got.reclaimed);
    }

    #[test]
    fn test_reclamation_order_is_first_in_order() {
        let (voices, bank) = setup(3);
        let mut pool = VoicePool::with_voices(Arc::clone(&bank), 3);
        for id in pool.voices().to_vec() {
            play(&bank, id);
        }

        let first = pool.acquire(true).unwrap();
        assert_eq!(first, Acquired { voice: VoiceId::new(0), reclaimed: true });
        assert_eq!(voices[0].count(|op| *op == TestOp::Stop), 1);
        play(&bank, first.voice);

        assert_eq!(pool.get_free_voice(true), Some(VoiceId::new(1)));
        play(&bank, VoiceId::new(1));
        assert_eq!(pool.get_free_voice(true), Some(VoiceId::new(2)));
        play(&bank, VoiceId::new(2));
        assert_eq!(pool.get_free_voice(true), Some(VoiceId::new(0)));
    }

    #[test]
    fn test_no_reclaim_without_permission_or_interruptible() {
        let (_, bank) = setup(2);
        let mut pool = VoicePool::with_voices(Arc::clone(&bank), 2);
        for id in pool.voices().to_vec() {
            play(&bank, id);
        }
        assert_eq!(pool.get_free_voice(false), None);
        for id in pool.voices().to_vec() {
            bank.slot(id).unwrap().apply(Property::Interruptible(false));
        }
        assert_eq!(pool.get_free_voice(true), None);
    }

    #[test]
    fn test_user_paused_voice_is_not_idle() {
        let (voices, bank) = setup(1);
        let mut pool = VoicePool::with_voices(Arc::clone(&bank), 1);
        play(&bank, VoiceId::new(0));
        bank.slot(VoiceId::new(0)).unwrap().set_paused(true);
        voices[0].finish();
        assert_eq!(pool.get_free_voice(false), None);
    }

    #[test]
    fn test_voice_never_in_two_pools() {
        let (_, bank) = setup(2);
        let mut a = VoicePool::with_voices(Arc::clone(&bank), 2);
        let mut b = VoicePool::new(Arc::clone(&bank));
        assert!(!b.add_voice(VoiceId::new(0)));
        assert!(a.remove_voice(VoiceId::new(0)));
        assert!(b.add_voice(VoiceId::new(0)));
        assert!(!b.add_voice(VoiceId::new(0)));
        assert_eq!(bank.owner(VoiceId::new(0)), Some(b.id()));
        assert_eq!(a.voices(), &ids(&[1])[..]);
    }

    #[test]
    fn test_split_and_merge_preserve_voice_set() {
        let (_, bank) = setup(5);
        let mut pool = VoicePool::with_voices(Arc::clone(&bank), 5);
        let mut other = pool.split_off(2);
        assert_eq!(pool.voices(), &ids(&[0, 1, 2])[..]);
        assert_eq!(other.voices(), &ids(&[3, 4])[..]);
        assert_eq!(bank.owner(VoiceId::new(4)), Some(other.id()));

        let moved = pool.merge(&mut other);
        assert_eq!(moved, ids(&[3, 4]));
        assert!(other.is_empty());
        assert_eq!(pool.len(), 5);
        assert_eq!(bank.owner(VoiceId::new(4)), Some(pool.id()));
    }

    #[test]
    fn test_split_clamps() {
        let (_, bank) = setup(2);
        let mut pool = VoicePool::with_voices(Arc::clone(&bank), 2);
        assert!(pool.split_off(0).is_empty());
        let all = pool.split_off(10);
        assert_eq!(all.len(), 2);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_close_releases_and_disables() {
        let (_, bank) = setup(3);
        let mut pool = VoicePool::with_voices(Arc::clone(&bank), 3);
        pool.close();
        assert!(pool.is_closed());
        assert_eq!(bank.unowned_count(), 3);
        assert_eq!(pool.get_free_voice(true), None);
        assert!(pool.claim(1).is_empty());
        assert!(!pool.add_voice(VoiceId::new(0)));
    }

    #[test]
    fn test_drop_returns_voices_to_bank() {
        let (_, bank) = setup(4);
        {
            let _pool = VoicePool::with_voices(Arc::clone(&bank), 3);
            assert_eq!(bank.unowned_count(), 1);
        }
        assert_eq!(bank.unowned_count(), 4);
    }

    #[test]
    fn test_release_last_shrinks() {
        let (_, bank) = setup(4);
        let mut pool = VoicePool::with_voices(Arc::clone(&bank), 4);
        assert_eq!(pool.release_last(3), ids(&[1, 2, 3]));
        assert_eq!(pool.len(), 1);
        assert_eq!(bank.unowned_count(), 3);
    }
}
