//! # cantor-types
//!
//! Shared type definitions for the cantor voice middleware.
//! Identifiers, voice control parameters, and transition curves used by
//! cantor-audio and cantor-core.

mod easing;
mod property;

pub use easing::Easing;
pub use property::{PlayOptions, Point3, Property, TransitionKind, Vector3, VoiceParams};

/// Index of a voice inside the session's voice bank.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct VoiceId(u32);

impl VoiceId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
    pub fn get(self) -> u32 {
        self.0
    }
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for VoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a voice pool. Issued by the voice bank; never reused.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct PoolId(u32);

impl PoolId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
    pub fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for PoolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle to decoded audio owned by the voice backend.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct BufferId(u32);

impl BufferId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
    pub fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for BufferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_transparent_in_toml() {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct Wrapper {
            voice: VoiceId,
            buffer: BufferId,
        }
        let text = toml::to_string(&Wrapper {
            voice: VoiceId::new(3),
            buffer: BufferId::new(7),
        })
        .unwrap();
        assert!(text.contains("voice = 3"));
        let back: Wrapper = toml::from_str(&text).unwrap();
        assert_eq!(back.voice.index(), 3);
        assert_eq!(back.buffer.get(), 7);
    }
}
