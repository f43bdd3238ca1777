//! Hyperbolic coordinates and their derivation from Cartesian locations.
//!
//! A node's position in the hyperbolic plane is a polar pair `(r, t)`.
//! `(NaN, NaN)` encodes "unknown"; a coordinate is valid iff both components
//! are finite. Every coordinate travels with an 8-bit wrap-aware sequence
//! number so stale positions can be told from fresh ones.

use libm::{acoshf, atan2f, cosf, coshf, rintf, sinf, sinhf};

use crate::constants::{HYPER_LATTICE_R, LATTICE_R};

const TAU: f32 = 2.0 * core::f32::consts::PI;

/// The three translation angles, one per Cartesian axis.
const AXIS_ANGLES: [f32; 3] = [
    0.0,
    core::f32::consts::FRAC_PI_3,
    2.0 * core::f32::consts::FRAC_PI_3,
];

/// A polar position in the hyperbolic plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coord {
    /// Radial component.
    pub r: f32,
    /// Angular component, in `[0, 2π)`.
    pub t: f32,
}

impl Coord {
    /// The unknown coordinate.
    pub const UNKNOWN: Self = Self {
        r: f32::NAN,
        t: f32::NAN,
    };

    /// Create a coordinate.
    pub const fn new(r: f32, t: f32) -> Self {
        Self { r, t }
    }

    /// A coordinate is valid iff both components are finite.
    pub fn is_valid(&self) -> bool {
        self.r.is_finite() && self.t.is_finite()
    }

    /// The hyperbolic distance to `other`.
    pub fn distance(&self, other: &Coord) -> f32 {
        let arg = coshf(self.r) * coshf(other.r)
            - sinhf(self.r) * sinhf(other.r) * cosf(other.t - self.t);
        // Rounding can push the argument a hair under 1 for near-equal
        // points.
        acoshf(arg.max(1.0))
    }
}

impl core::fmt::Display for Coord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({:.4}, {:.4})", self.r, self.t)
    }
}

/// An 8-bit coordinate freshness counter with wrap-aware ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CoordSeq(pub u8);

impl CoordSeq {
    /// Whether `self` supersedes `other`, under signed 8-bit wrap.
    pub fn newer_than(&self, other: CoordSeq) -> bool {
        (self.0.wrapping_sub(other.0) as i8) > 0
    }

    /// Advance the counter.
    pub fn bump(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }
}

/// Translate `c` by hyperbolic distance `a` along the axis at `theta0`.
fn translate(c: Coord, a: f32, theta0: f32) -> Coord {
    let dt = c.t - theta0;

    let r = acoshf((sinhf(a) * sinhf(c.r) * cosf(dt) + coshf(a) * coshf(c.r)).max(1.0));
    let mut t = atan2f(
        sinhf(c.r) * sinf(dt),
        coshf(a) * sinhf(c.r) * cosf(dt) + sinhf(a) * coshf(c.r),
    ) + theta0;

    while t < 0.0 {
        t += TAU;
    }
    while t >= TAU {
        t -= TAU;
    }

    Coord::new(r, t)
}

/// Map a Cartesian location into the hyperbolic plane.
///
/// Each axis snaps to the nearest lattice point and scales to a hyperbolic
/// translation distance; the three translations are applied largest
/// magnitude first, each along its own axis angle. A non-finite input maps
/// to [`Coord::UNKNOWN`].
pub fn derive(x: f32, y: f32, z: f32) -> Coord {
    if !(x.is_finite() && y.is_finite() && z.is_finite()) {
        return Coord::UNKNOWN;
    }

    let mut axes = [
        (rintf(x / LATTICE_R) * HYPER_LATTICE_R, AXIS_ANGLES[0]),
        (rintf(y / LATTICE_R) * HYPER_LATTICE_R, AXIS_ANGLES[1]),
        (rintf(z / LATTICE_R) * HYPER_LATTICE_R, AXIS_ANGLES[2]),
    ];

    // Stable descending sort by magnitude: equal magnitudes keep x, y, z
    // order, giving one deterministic case per permutation.
    for i in 1..axes.len() {
        let mut j = i;
        while j > 0 && libm::fabsf(axes[j].0) > libm::fabsf(axes[j - 1].0) {
            axes.swap(j, j - 1);
            j -= 1;
        }
    }

    axes.iter()
        .filter(|(a, _)| *a != 0.0)
        .fold(Coord::new(0.0, 0.0), |c, (a, theta)| translate(c, *a, *theta))
}

/// The node's own coordinate, cached against small location jitter.
#[derive(Debug, Clone, Copy)]
pub struct LocalCoord {
    anchor: Option<(f32, f32, f32)>,
    coord: Coord,
    seq: CoordSeq,
}

impl Default for LocalCoord {
    fn default() -> Self {
        Self {
            anchor: None,
            coord: Coord::UNKNOWN,
            seq: CoordSeq::default(),
        }
    }
}

impl LocalCoord {
    /// The current coordinate.
    pub fn coord(&self) -> Coord {
        self.coord
    }

    /// The current freshness counter.
    pub fn seq(&self) -> CoordSeq {
        self.seq
    }

    /// Pin the node to a fixed coordinate, bypassing location derivation.
    /// Used for anchor nodes with a surveyed position. Bumps the sequence
    /// number.
    pub fn set_fixed(&mut self, coord: Coord) {
        self.anchor = None;
        self.coord = coord;
        self.seq.bump();
    }

    /// Feed a location report.
    ///
    /// The coordinate is recomputed only when the location moved more than
    /// two lattice pitches from the anchor of the last computation; the
    /// sequence number increments once per recomputation. Returns whether a
    /// recomputation happened.
    pub fn update_location(&mut self, x: f32, y: f32, z: f32) -> bool {
        if !(x.is_finite() && y.is_finite() && z.is_finite()) {
            self.anchor = None;
            self.coord = Coord::UNKNOWN;
            return false;
        }

        if let Some((ax, ay, az)) = self.anchor {
            let (dx, dy, dz) = (x - ax, y - ay, z - az);
            let limit = 2.0 * LATTICE_R;
            if dx * dx + dy * dy + dz * dz <= limit * limit {
                return false;
            }
        }

        self.anchor = Some((x, y, z));
        self.coord = derive(x, y, z);
        self.seq.bump();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_a_metric() {
        let a = Coord::new(2.0, 0.5);
        let b = Coord::new(3.5, 4.0);
        assert!((a.distance(&b) - b.distance(&a)).abs() < 1e-5);
        assert!(a.distance(&a).abs() < 1e-4);
    }

    #[test]
    fn collinear_distance() {
        // Points on the same ray differ by their radii.
        let a = Coord::new(2.0, 0.0);
        let b = Coord::new(5.0, 0.0);
        assert!((a.distance(&b) - 3.0).abs() < 1e-4);
    }

    #[test]
    fn sequence_wraps() {
        assert!(CoordSeq(1).newer_than(CoordSeq(255)));
        assert!(CoordSeq(255).newer_than(CoordSeq(254)));
        assert!(!CoordSeq(254).newer_than(CoordSeq(255)));
        assert!(!CoordSeq(7).newer_than(CoordSeq(7)));
    }

    #[test]
    fn derivation_is_stable() {
        // (2.5, 1.0, 0.5) snaps to lattice points (2, 1, 0); translation
        // order follows x >= y >= z.
        let first = derive(2.5, 1.0, 0.5);
        assert!(first.is_valid());
        assert!(first.r > 0.0);
        assert!((0.0..TAU).contains(&first.t));

        let again = derive(2.5, 1.0, 0.5);
        assert_eq!(first, again);
    }

    #[test]
    fn non_finite_location_is_unknown() {
        assert!(!derive(f32::NAN, 0.0, 0.0).is_valid());
        assert!(!derive(0.0, f32::INFINITY, 0.0).is_valid());
    }

    #[test]
    fn local_coord_caches_small_moves() {
        let mut local = LocalCoord::default();
        assert!(!local.coord().is_valid());

        assert!(local.update_location(2.5, 1.0, 0.5));
        assert_eq!(local.seq(), CoordSeq(1));
        let coord = local.coord();
        assert!(coord.is_valid());

        // Within two lattice pitches of the anchor: cached.
        assert!(!local.update_location(2.6, 1.1, 0.4));
        assert_eq!(local.seq(), CoordSeq(1));
        assert_eq!(local.coord(), coord);

        // A real move recomputes and bumps the sequence once.
        assert!(local.update_location(7.0, 1.0, 0.5));
        assert_eq!(local.seq(), CoordSeq(2));
    }

    #[test]
    fn translation_from_origin_lands_on_the_axis() {
        let c = translate(Coord::new(0.0, 0.0), 1.5, AXIS_ANGLES[1]);
        assert!((c.r - 1.5).abs() < 1e-5);
        assert!((c.t - AXIS_ANGLES[1]).abs() < 1e-5);
    }
}
