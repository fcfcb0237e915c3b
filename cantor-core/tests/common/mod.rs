#![allow(dead_code)]

use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cantor_audio::backend::{test_voices, TestVoice};
use cantor_audio::VoiceBackend;
use cantor_core::{AudioSession, Config};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Config from the embedded defaults plus `overrides` in TOML.
pub fn config(overrides: &str) -> Config {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(overrides.as_bytes()).unwrap();
    Config::load_from(Some(file.path()))
}

/// A session of `voices` recording voices, `reserved` of them for effects.
pub fn session(voices: usize, reserved: usize) -> (Vec<Arc<TestVoice>>, AudioSession) {
    init_logging();
    let config = config(&format!(
        "[session]\nvoices = {}\n\n[effects]\nreserved_voices = {}\n\n[transitions]\nstep_interval_ms = 5\n",
        voices, reserved
    ));
    let (recorders, backends) = test_voices(voices);
    let mut backends = backends.into_iter().map(Some).collect::<Vec<Option<Box<dyn VoiceBackend>>>>();
    let session = AudioSession::new(&config, |id| backends[id.index()].take().unwrap()).unwrap();
    (recorders, session)
}

/// Poll `cond` until it holds or a few seconds pass.
pub fn wait_for(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}
