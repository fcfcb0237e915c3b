use serde::{Deserialize, Serialize};

/// Shape of a timed transition. Maps progress in `[0, 1]` to `[0, 1]`,
/// with exact endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Easing {
    /// Constant rate of change.
    #[default]
    Linear,
    /// Slow at both ends, fast through the middle.
    SCurve,
    /// Slow start, fast finish.
    Exponential,
    /// Fast start, slow finish.
    Logarithmic,
}

/// 2^-10, the floor of the exponential curve before normalisation.
const EXP_FLOOR: f32 = 1.0 / 1024.0;

impl Easing {
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::SCurve => t * t * (3.0 - 2.0 * t),
            Easing::Exponential => exponential(t),
            Easing::Logarithmic => 1.0 - exponential(1.0 - t),
        }
    }

    /// Parse a config name. Case-insensitive.
    pub fn parse(name: &str) -> Option<Easing> {
        match name.to_lowercase().as_str() {
            "linear" => Some(Easing::Linear),
            "scurve" | "s-curve" | "s_curve" => Some(Easing::SCurve),
            "exponential" | "exp" => Some(Easing::Exponential),
            "logarithmic" | "log" => Some(Easing::Logarithmic),
            _ => None,
        }
    }
}

fn exponential(t: f32) -> f32 {
    if t <= 0.0 {
        return 0.0;
    }
    if t >= 1.0 {
        return 1.0;
    }
    (2.0_f32.powf(10.0 * (t - 1.0)) - EXP_FLOOR) / (1.0 - EXP_FLOOR)
}
