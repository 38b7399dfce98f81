//! Turns a time difference of arrival into a bearing relative to the
//! baseline between the two hydrophones.
//!
//! With the hydrophones `d` meters apart and sound travelling at `c` meters
//! per second, a wavefront arriving at an angle θ from broadside reaches one
//! hydrophone `d·sin(θ)/c` seconds before the other. Inverting that gives
//!
//! ```text
//! θ = asin(Δt · c / d)
//! ```
//!
//! A pair of sensors cannot tell a source in front of the baseline from one
//! behind it, so every [`Bearing`] carries an ambiguous twin rotated by π.

use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    f64::consts::{FRAC_PI_2, PI},
    fmt,
};

/// Angles coming out of the estimator.
pub type Radian = f64;

/// Angles as they are shown to a person.
pub type Degree = f64;

/// The physical layout of the array, fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Geometry {
    /// Distance between the two hydrophones, in meters.
    pub mic_distance: f64,
    /// Propagation speed of sound in the medium, in meters per second.
    pub speed_of_sound: f64,
}

impl Default for Geometry {
    /// Half a meter of baseline in seawater.
    fn default() -> Self {
        Self {
            mic_distance: 0.5,
            speed_of_sound: 1500.0,
        }
    }
}

impl Geometry {
    /// Build a [`Geometry`] without checking it, see [`Geometry::validate()`].
    pub fn new(mic_distance: f64, speed_of_sound: f64) -> Self {
        Self {
            mic_distance,
            speed_of_sound,
        }
    }

    /// Checks that an estimate can be computed with this geometry at all.
    pub fn validate(&self) -> Result<(), EstimatorError> {
        if self.mic_distance == 0.0 {
            return Err(EstimatorError::DegenerateGeometry);
        }
        if !self.mic_distance.is_finite() || self.mic_distance < 0.0 {
            return Err(EstimatorError::InvalidGeometry(
                "microphone distance must be a positive number of meters",
            ));
        }
        if !self.speed_of_sound.is_finite() || self.speed_of_sound <= 0.0 {
            return Err(EstimatorError::InvalidGeometry(
                "speed of sound must be a positive number of meters per second",
            ));
        }
        Ok(())
    }

    /// The largest |Δt| this array can physically observe, for a source
    /// sitting on the baseline itself.
    pub fn max_delta_t(&self) -> f64 {
        self.mic_distance / self.speed_of_sound
    }
}

/// The outcome of one estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bearing {
    /// The arcsine itself, always within `[-π/2, π/2]`.
    pub primary: Radian,
    /// `primary + π`, the mirror image the array cannot rule out.
    pub ambiguous: Radian,
    /// Set when `|Δt·c/d| > 1` and the angle was pinned to ±90°.
    pub saturated: bool,
}

impl Bearing {
    /// Rebuild the pair for a consumer that only ever received the primary
    /// angle. Saturation cannot be recovered from the angle alone.
    pub fn from_primary(primary: Radian) -> Self {
        Self {
            primary,
            ambiguous: primary + PI,
            saturated: false,
        }
    }

    /// The primary angle folded into `[0, 360)` degrees.
    pub fn primary_degrees(&self) -> Degree {
        normalize_degrees(self.primary)
    }

    /// The ambiguous angle folded into `[0, 360)` degrees.
    pub fn ambiguous_degrees(&self) -> Degree {
        normalize_degrees(self.ambiguous)
    }

    /// Both angles in `[0, 360)` degrees, smallest first.
    pub fn display_degrees(&self) -> [Degree; 2] {
        let a = self.primary_degrees();
        let b = self.ambiguous_degrees();
        if a <= b {
            [a, b]
        } else {
            [b, a]
        }
    }
}

/// Fold any angle into `[0, 360)` degrees.
pub fn normalize_degrees(angle: Radian) -> Degree {
    let deg = angle.to_degrees().rem_euclid(360.0);
    // rem_euclid rounds tiny negatives up to exactly 360
    if deg >= 360.0 {
        0.0
    } else {
        deg
    }
}

/// Estimate the bearing of a source from the arrival time difference
/// `delta_t` (seconds, signed by which hydrophone heard it first).
pub fn estimate(delta_t: f64, geometry: &Geometry) -> Result<Bearing, EstimatorError> {
    geometry.validate()?;
    if !delta_t.is_finite() {
        return Err(EstimatorError::NonFiniteDelta);
    }

    let arg = (delta_t * geometry.speed_of_sound) / geometry.mic_distance;
    let saturated = arg.abs() > 1.0;
    let primary = arg.clamp(-1.0, 1.0).asin();
    debug_assert!(primary.abs() <= FRAC_PI_2);

    Ok(Bearing {
        primary,
        ambiguous: primary + PI,
        saturated,
    })
}

/// Reasons an estimate could not be produced for a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimatorError {
    /// The hydrophones are configured zero meters apart.
    DegenerateGeometry,

    /// Some other part of the [`Geometry`] makes no physical sense.
    InvalidGeometry(&'static str),

    /// The time difference was NaN or infinite.
    NonFiniteDelta,
}

impl fmt::Display for EstimatorError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use EstimatorError as EE;
        let msg = match self {
            EE::DegenerateGeometry => {
                Cow::from("microphone distance is zero; set a non-zero distance in the geometry")
            }
            EE::InvalidGeometry(why) => Cow::from(format!("invalid geometry: {}", why)),
            EE::NonFiniteDelta => Cow::from("time difference is not a finite number"),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for EstimatorError {}
