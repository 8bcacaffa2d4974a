//! View frustum and hierarchical box culling.

use glam::{DMat4, DVec3, DVec4};

use crate::obb::OrientedBoundingBox;

/// A plane `normal . p + distance = 0` with the inside on the positive side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: DVec3,
    pub distance: f64,
}

impl Plane {
    fn from_row(row: DVec4) -> Self {
        let normal = row.truncate();
        let length = normal.length();
        if length > 0.0 {
            Self {
                normal: normal / length,
                distance: row.w / length,
            }
        } else {
            Self {
                normal,
                distance: row.w,
            }
        }
    }

    #[must_use]
    pub fn signed_distance(&self, point: DVec3) -> f64 {
        self.normal.dot(point) + self.distance
    }
}

/// Set of frustum planes that still need testing.
///
/// Once a box is entirely inside a plane, every box nested within it is too,
/// so the plane can be dropped for the whole subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaneMask(u8);

impl PlaneMask {
    pub const ALL: Self = Self(0b11_1111);
    pub const NONE: Self = Self(0);

    #[must_use]
    pub const fn contains(self, plane: usize) -> bool {
        self.0 & (1 << plane) != 0
    }

    #[must_use]
    pub const fn without(self, plane: usize) -> Self {
        Self(self.0 & !(1 << plane))
    }

    #[must_use]
    pub const fn with(self, plane: usize) -> Self {
        Self(self.0 | (1 << plane))
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }
}

impl Default for PlaneMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// Result of testing a box against the active planes of a frustum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Containment {
    /// Entirely outside at least one plane.
    Outside,
    /// Entirely inside every plane.
    Inside,
    /// Straddles at least one plane; the mask holds the planes children still
    /// need to be tested against.
    Intersecting(PlaneMask),
}

impl Containment {
    #[must_use]
    pub fn is_visible(self) -> bool {
        !matches!(self, Self::Outside)
    }
}

/// Six-plane view frustum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    /// Left, right, bottom, top, near, far.
    planes: [Plane; 6],
}

impl Frustum {
    /// Extract the planes of a clip-from-world matrix with a `[0, 1]` depth
    /// range (glam's `perspective_rh` / `orthographic_rh` convention).
    #[must_use]
    pub fn from_clip_from_world(clip_from_world: DMat4) -> Self {
        let r0 = clip_from_world.row(0);
        let r1 = clip_from_world.row(1);
        let r2 = clip_from_world.row(2);
        let r3 = clip_from_world.row(3);
        Self {
            planes: [
                Plane::from_row(r3 + r0),
                Plane::from_row(r3 - r0),
                Plane::from_row(r3 + r1),
                Plane::from_row(r3 - r1),
                Plane::from_row(r2),
                Plane::from_row(r3 - r2),
            ],
        }
    }

    #[must_use]
    pub fn planes(&self) -> &[Plane; 6] {
        &self.planes
    }

    /// Test `obb` against the planes in `mask`.
    #[must_use]
    pub fn classify_obb(&self, obb: &OrientedBoundingBox, mask: PlaneMask) -> Containment {
        let mut remaining = mask;
        for (index, plane) in self.planes.iter().enumerate() {
            if !mask.contains(index) {
                continue;
            }
            let radius = obb.extents.x * obb.axis(0).dot(plane.normal).abs()
                + obb.extents.y * obb.axis(1).dot(plane.normal).abs()
                + obb.extents.z * obb.axis(2).dot(plane.normal).abs();
            let distance = plane.signed_distance(obb.center);
            if distance + radius < 0.0 {
                return Containment::Outside;
            }
            if distance - radius > 0.0 {
                remaining = remaining.without(index);
            }
        }
        if remaining.is_empty() {
            Containment::Inside
        } else {
            Containment::Intersecting(remaining)
        }
    }

    #[must_use]
    pub fn contains_point(&self, point: DVec3) -> bool {
        self.planes.iter().all(|plane| plane.signed_distance(point) >= 0.0)
    }
}
