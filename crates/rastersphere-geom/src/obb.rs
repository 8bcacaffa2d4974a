//! Oriented bounding boxes.

use glam::{DMat3, DVec3};

/// Oriented bounding box for frustum culling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedBoundingBox {
    pub center: DVec3,
    /// Half-lengths along each axis.
    pub extents: DVec3,
    /// Columns are the box's unit axes.
    pub orientation: DMat3,
}

impl OrientedBoundingBox {
    #[must_use]
    pub fn axis(&self, index: usize) -> DVec3 {
        self.orientation.col(index)
    }

    /// The eight corners of the box.
    #[must_use]
    pub fn corners(&self) -> [DVec3; 8] {
        let x = self.axis(0) * self.extents.x;
        let y = self.axis(1) * self.extents.y;
        let z = self.axis(2) * self.extents.z;
        let c = self.center;
        [
            c - x - y - z,
            c + x - y - z,
            c - x + y - z,
            c + x + y - z,
            c - x - y + z,
            c + x - y + z,
            c - x + y + z,
            c + x + y + z,
        ]
    }

    /// Whether `point` lies inside the box, allowing `tolerance` of slack on
    /// every face.
    #[must_use]
    pub fn contains_point(&self, point: DVec3, tolerance: f64) -> bool {
        let local = self.orientation.transpose() * (point - self.center);
        local.abs().cmple(self.extents + DVec3::splat(tolerance)).all()
    }

    /// Map box-local coordinates in `[-1, 1]^3` to world space.
    #[must_use]
    pub fn point_at(&self, unit: DVec3) -> DVec3 {
        self.center + self.orientation * (unit * self.extents)
    }
}

/// Accumulates points in a fixed orthonormal frame and produces the tightest
/// box in that frame.
#[derive(Debug, Clone)]
pub struct ObbBuilder {
    orientation: DMat3,
    min: DVec3,
    max: DVec3,
}

impl ObbBuilder {
    /// Frame whose z axis is `z_axis` and whose y axis is `y_hint` made
    /// orthogonal to it. Falls back to an arbitrary perpendicular when `y_hint`
    /// is (nearly) parallel to `z_axis`, and to the global z axis when
    /// `z_axis` is zero.
    #[must_use]
    pub fn new(z_axis: DVec3, y_hint: DVec3) -> Self {
        let z = z_axis.try_normalize().unwrap_or(DVec3::Z);
        let y = (y_hint - z * y_hint.dot(z))
            .try_normalize()
            .unwrap_or_else(|| z.any_orthonormal_pair().1);
        let x = y.cross(z);
        Self::from_orientation(DMat3::from_cols(x, y, z))
    }

    #[must_use]
    pub fn from_orientation(orientation: DMat3) -> Self {
        Self {
            orientation,
            min: DVec3::splat(f64::INFINITY),
            max: DVec3::splat(f64::NEG_INFINITY),
        }
    }

    pub fn add_point(&mut self, point: DVec3) {
        let local = self.orientation.transpose() * point;
        self.min = self.min.min(local);
        self.max = self.max.max(local);
    }

    /// Grow to contain every corner of `obb`.
    pub fn add_obb(&mut self, obb: &OrientedBoundingBox) {
        for corner in obb.corners() {
            self.add_point(corner);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x
    }

    /// Returns `None` if no points were added.
    #[must_use]
    pub fn build(&self) -> Option<OrientedBoundingBox> {
        if self.is_empty() {
            return None;
        }
        let local_center = (self.min + self.max) * 0.5;
        Some(OrientedBoundingBox {
            center: self.orientation * local_center,
            extents: (self.max - self.min) * 0.5,
            orientation: self.orientation,
        })
    }
}
