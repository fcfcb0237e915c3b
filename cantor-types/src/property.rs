use serde::{Deserialize, Serialize};

/// A point in listener space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// A direction or velocity in listener space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Properties that can be ramped over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionKind {
    Gain,
    Pan,
    Pitch,
}

impl TransitionKind {
    pub const ALL: [TransitionKind; 3] = [TransitionKind::Gain, TransitionKind::Pan, TransitionKind::Pitch];

    /// Stable slot index, used for per-kind bookkeeping arrays.
    pub fn index(self) -> usize {
        match self {
            TransitionKind::Gain => 0,
            TransitionKind::Pan => 1,
            TransitionKind::Pitch => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TransitionKind::Gain => "gain",
            TransitionKind::Pan => "pan",
            TransitionKind::Pitch => "pitch",
        }
    }

    /// Wrap a scalar value as the matching property write.
    pub fn property(self, value: f32) -> Property {
        match self {
            TransitionKind::Gain => Property::Gain(value),
            TransitionKind::Pan => Property::Pan(value),
            TransitionKind::Pitch => Property::Pitch(value),
        }
    }

    /// Clamp a value into the legal range for this kind.
    pub fn clamp(self, value: f32) -> f32 {
        match self {
            TransitionKind::Gain => value.max(0.0),
            TransitionKind::Pan => value.clamp(-1.0, 1.0),
            TransitionKind::Pitch => value.max(0.0),
        }
    }
}

impl std::fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A single control-parameter write on a voice or channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Property {
    Gain(f32),
    Pitch(f32),
    Pan(f32),
    Position(Point3),
    Velocity(Vector3),
    Direction(Vector3),
    ReferenceDistance(f32),
    RolloffFactor(f32),
    MaxDistance(f32),
    Looping(bool),
    Muted(bool),
    Interruptible(bool),
}

impl Property {
    /// The transition kind this property belongs to, if it can be ramped.
    pub fn transition_kind(&self) -> Option<TransitionKind> {
        match self {
            Property::Gain(_) => Some(TransitionKind::Gain),
            Property::Pan(_) => Some(TransitionKind::Pan),
            Property::Pitch(_) => Some(TransitionKind::Pitch),
            _ => None,
        }
    }
}

/// The full set of control parameters carried by a voice.
///
/// A channel keeps one of these as its virtual values; every voice it routes
/// a play request to adopts them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceParams {
    pub gain: f32,
    pub pitch: f32,
    pub pan: f32,
    pub position: Point3,
    pub velocity: Vector3,
    pub direction: Vector3,
    pub reference_distance: f32,
    pub rolloff_factor: f32,
    pub max_distance: f32,
    pub looping: bool,
    pub muted: bool,
    pub interruptible: bool,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            gain: 1.0,
            pitch: 1.0,
            pan: 0.0,
            position: Point3::default(),
            velocity: Vector3::default(),
            direction: Vector3::default(),
            reference_distance: 1.0,
            rolloff_factor: 1.0,
            max_distance: f32::MAX,
            looping: false,
            muted: false,
            interruptible: true,
        }
    }
}

impl VoiceParams {
    /// Record a property write.
    pub fn apply(&mut self, property: Property) {
        match property {
            Property::Gain(v) => self.gain = TransitionKind::Gain.clamp(v),
            Property::Pitch(v) => self.pitch = TransitionKind::Pitch.clamp(v),
            Property::Pan(v) => self.pan = TransitionKind::Pan.clamp(v),
            Property::Position(p) => self.position = p,
            Property::Velocity(v) => self.velocity = v,
            Property::Direction(v) => self.direction = v,
            Property::ReferenceDistance(v) => self.reference_distance = v,
            Property::RolloffFactor(v) => self.rolloff_factor = v,
            Property::MaxDistance(v) => self.max_distance = v,
            Property::Looping(v) => self.looping = v,
            Property::Muted(v) => self.muted = v,
            Property::Interruptible(v) => self.interruptible = v,
        }
    }

    /// Current value of a rampable property.
    pub fn value(&self, kind: TransitionKind) -> f32 {
        match kind {
            TransitionKind::Gain => self.gain,
            TransitionKind::Pan => self.pan,
            TransitionKind::Pitch => self.pitch,
        }
    }

    /// Every property, in the order a backend should receive them.
    pub fn properties(&self) -> [Property; 12] {
        [
            Property::Gain(self.gain),
            Property::Pitch(self.pitch),
            Property::Pan(self.pan),
            Property::Position(self.position),
            Property::Velocity(self.velocity),
            Property::Direction(self.direction),
            Property::ReferenceDistance(self.reference_distance),
            Property::RolloffFactor(self.rolloff_factor),
            Property::MaxDistance(self.max_distance),
            Property::Looping(self.looping),
            Property::Muted(self.muted),
            Property::Interruptible(self.interruptible),
        ]
    }
}

/// Per-call overrides for a play request. `None` keeps the channel value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayOptions {
    pub gain: Option<f32>,
    pub pitch: Option<f32>,
    pub pan: Option<f32>,
    pub looping: Option<bool>,
}

impl PlayOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gain(mut self, gain: f32) -> Self {
        self.gain = Some(gain);
        self
    }

    pub fn pitch(mut self, pitch: f32) -> Self {
        self.pitch = Some(pitch);
        self
    }

    pub fn pan(mut self, pan: f32) -> Self {
        self.pan = Some(pan);
        self
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = Some(looping);
        self
    }

    /// Overrides as property writes, in application order.
    pub fn properties(&self) -> impl Iterator<Item = Property> {
        [
            self.gain.map(Property::Gain),
            self.pitch.map(Property::Pitch),
            self.pan.map(Property::Pan),
            self.looping.map(Property::Looping),
        ]
        .into_iter()
        .flatten()
    }
}
