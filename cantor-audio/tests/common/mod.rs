#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use cantor_audio::backend::{test_voices, TestVoice};
use cantor_audio::{Animator, Channel, VoiceBank};

pub const STEP: Duration = Duration::from_millis(10);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A bank of recording voices plus an animator over it.
pub struct TestRig {
    pub voices: Vec<Arc<TestVoice>>,
    pub animator: Arc<Animator>,
}

impl TestRig {
    pub fn new(count: usize) -> Self {
        init_logging();
        let (voices, backends) = test_voices(count);
        Self {
            voices,
            animator: Animator::new(VoiceBank::new(backends)),
        }
    }

    pub fn bank(&self) -> &Arc<VoiceBank> {
        self.animator.bank()
    }

    pub fn channel(&self, voices: usize) -> Channel {
        Channel::new(Arc::clone(&self.animator), voices)
    }

    /// Tick until no ramps remain, or `limit` ticks have run.
    pub fn settle(&self, limit: usize) -> usize {
        let mut ticks = 0;
        while self.animator.active_count() > 0 && ticks < limit {
            self.animator.tick(STEP);
            ticks += 1;
        }
        ticks
    }
}
