use std::path::{Path, PathBuf};
use std::time::Duration;

use cantor_audio::MAX_VOICES;
use cantor_types::{Easing, VoiceParams};
use serde::Deserialize;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    session: SessionConfig,
    #[serde(default)]
    effects: EffectsConfig,
    #[serde(default)]
    transitions: TransitionsConfig,
    #[serde(default)]
    defaults: DefaultsConfig,
}

#[derive(Deserialize, Default)]
struct SessionConfig {
    voices: Option<usize>,
    handle_interruptions: Option<bool>,
}

#[derive(Deserialize, Default)]
struct EffectsConfig {
    reserved_voices: Option<usize>,
    gain: Option<f32>,
}

#[derive(Deserialize, Default)]
struct TransitionsConfig {
    step_interval_ms: Option<u64>,
    easing: Option<String>,
    telemetry_interval_secs: Option<u64>,
}

#[derive(Deserialize, Default)]
struct DefaultsConfig {
    gain: Option<f32>,
    pitch: Option<f32>,
    pan: Option<f32>,
    interruptible: Option<bool>,
    looping: Option<bool>,
}

pub struct Config {
    session: SessionConfig,
    effects: EffectsConfig,
    transitions: TransitionsConfig,
    defaults: DefaultsConfig,
}

impl Config {
    /// Built-in defaults merged with the user's config file, if any.
    pub fn load() -> Self {
        Self::load_from(user_config_path().as_deref())
    }

    /// Built-in defaults merged with the file at `path`. A missing or
    /// malformed file is logged and ignored.
    pub fn load_from(path: Option<&Path>) -> Self {
        let mut base: ConfigFile =
            toml::from_str(DEFAULT_CONFIG).expect("Failed to parse embedded config.toml");

        if let Some(path) = path {
            if path.exists() {
                match std::fs::read_to_string(path) {
                    Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                        Ok(user) => merge(&mut base, user),
                        Err(e) => {
                            log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e)
                        }
                    },
                    Err(e) => {
                        log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
                    }
                }
            }
        }

        Config {
            session: base.session,
            effects: base.effects,
            transitions: base.transitions,
            defaults: base.defaults,
        }
    }

    /// Built-in defaults only.
    pub fn embedded() -> Self {
        Self::load_from(None)
    }

    /// Voices to allocate (clamped to 1..=32).
    pub fn voice_count(&self) -> usize {
        self.session.voices.unwrap_or(MAX_VOICES).clamp(1, MAX_VOICES)
    }

    pub fn handle_interruptions(&self) -> bool {
        self.session.handle_interruptions.unwrap_or(true)
    }

    /// Voices for the effects channel (clamped to the voice count).
    pub fn reserved_voices(&self) -> usize {
        self.effects
            .reserved_voices
            .unwrap_or(24)
            .min(self.voice_count())
    }

    pub fn effects_gain(&self) -> f32 {
        self.effects.gain.unwrap_or(1.0).max(0.0)
    }

    /// Ramp step interval (clamped to 1..=1000 ms).
    pub fn step_interval(&self) -> Duration {
        Duration::from_millis(self.transitions.step_interval_ms.unwrap_or(33).clamp(1, 1000))
    }

    pub fn easing(&self) -> Easing {
        self.transitions
            .easing
            .as_deref()
            .and_then(Easing::parse)
            .unwrap_or_default()
    }

    /// Period of tick timing reports, `None` when disabled.
    pub fn telemetry_interval(&self) -> Option<Duration> {
        match self.transitions.telemetry_interval_secs.unwrap_or(30) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Starting parameters for new channels.
    pub fn voice_defaults(&self) -> VoiceParams {
        let fallback = VoiceParams::default();
        VoiceParams {
            gain: self.defaults.gain.unwrap_or(fallback.gain).max(0.0),
            pitch: self.defaults.pitch.unwrap_or(fallback.pitch).max(0.0),
            pan: self.defaults.pan.unwrap_or(fallback.pan).clamp(-1.0, 1.0),
            interruptible: self.defaults.interruptible.unwrap_or(fallback.interruptible),
            looping: self.defaults.looping.unwrap_or(fallback.looping),
            ..fallback
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::embedded()
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cantor").join("config.toml"))
}

fn merge(base: &mut ConfigFile, user: ConfigFile) {
    merge_session(&mut base.session, user.session);
    merge_effects(&mut base.effects, user.effects);
    merge_transitions(&mut base.transitions, user.transitions);
    merge_defaults(&mut base.defaults, user.defaults);
}

fn merge_session(base: &mut SessionConfig, user: SessionConfig) {
    if user.voices.is_some() {
        base.voices = user.voices;
    }
    if user.handle_interruptions.is_some() {
        base.handle_interruptions = user.handle_interruptions;
    }
}

fn merge_effects(base: &mut EffectsConfig, user: EffectsConfig) {
    if user.reserved_voices.is_some() {
        base.reserved_voices = user.reserved_voices;
    }
    if user.gain.is_some() {
        base.gain = user.gain;
    }
}

fn merge_transitions(base: &mut TransitionsConfig, user: TransitionsConfig) {
    if user.step_interval_ms.is_some() {
        base.step_interval_ms = user.step_interval_ms;
    }
    if user.easing.is_some() {
        base.easing = user.easing;
    }
    if user.telemetry_interval_secs.is_some() {
        base.telemetry_interval_secs = user.telemetry_interval_secs;
    }
}

fn merge_defaults(base: &mut DefaultsConfig, user: DefaultsConfig) {
    if user.gain.is_some() {
        base.gain = user.gain;
    }
    if user.pitch.is_some() {
        base.pitch = user.pitch;
    }
    if user.pan.is_some() {
        base.pan = user.pan;
    }
    if user.interruptible.is_some() {
        base.interruptible = user.interruptible;
    }
    if user.looping.is_some() {
        base.looping = user.looping;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn with_user_file(contents: &str) -> Config {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        Config::load_from(Some(file.path()))
    }

    #[test]
    fn test_load_embedded_config() {
        let config = Config::embedded();
        assert_eq!(config.voice_count(), 32);
        assert!(config.handle_interruptions());
        assert_eq!(config.reserved_voices(), 24);
        assert_eq!(config.effects_gain(), 1.0);
        assert_eq!(config.step_interval(), Duration::from_millis(33));
        assert_eq!(config.easing(), Easing::Linear);
        assert_eq!(config.telemetry_interval(), Some(Duration::from_secs(30)));
        assert_eq!(config.voice_defaults(), VoiceParams::default());
    }

    #[test]
    fn test_user_file_overrides_only_given_keys() {
        let config = with_user_file(
            "[session]\nvoices = 8\n\n[transitions]\neasing = \"scurve\"\n\n[defaults]\npan = -0.25\n",
        );
        assert_eq!(config.voice_count(), 8);
        assert_eq!(config.reserved_voices(), 8);
        assert!(config.handle_interruptions());
        assert_eq!(config.easing(), Easing::SCurve);
        assert_eq!(config.step_interval(), Duration::from_millis(33));
        assert_eq!(config.voice_defaults().pan, -0.25);
        assert_eq!(config.voice_defaults().gain, 1.0);
    }

    #[test]
    fn test_values_are_clamped() {
        let config = with_user_file(
            "[session]\nvoices = 500\n\n[transitions]\nstep_interval_ms = 0\ntelemetry_interval_secs = 0\n\n[defaults]\npan = 4.0\n",
        );
        assert_eq!(config.voice_count(), MAX_VOICES);
        assert_eq!(config.step_interval(), Duration::from_millis(1));
        assert_eq!(config.telemetry_interval(), None);
        assert_eq!(config.voice_defaults().pan, 1.0);
    }

    #[test]
    fn test_malformed_user_file_is_ignored() {
        let config = with_user_file("[session\nvoices = ");
        assert_eq!(config.voice_count(), 32);
    }

    #[test]
    fn test_unknown_easing_falls_back() {
        let config = with_user_file("[transitions]\neasing = \"wobbly\"\n");
        assert_eq!(config.easing(), Easing::Linear);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(Some(dir.path().join("absent.toml").as_path()));
        assert_eq!(config.voice_count(), 32);
    }
}
