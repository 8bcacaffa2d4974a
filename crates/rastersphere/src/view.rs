//! Camera state consumed by the renderer.

use glam::{DMat4, DVec3};
use rastersphere_geom::Frustum;

/// Projection parameters. Depth maps to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective {
        /// Vertical field of view in radians.
        fov_y: f64,
        near: f64,
        far: f64,
    },
    Orthographic {
        /// Half the view volume's height in world units.
        half_height: f64,
        near: f64,
        far: f64,
    },
}

/// Render target size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    #[must_use]
    pub fn aspect_ratio(&self) -> f64 {
        f64::from(self.width.max(1)) / f64::from(self.height.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    pub view_from_world: DMat4,
    pub projection: Projection,
    pub viewport: Viewport,
}

impl ViewState {
    /// Camera at `eye` looking at `target`.
    #[must_use]
    pub fn look_at(
        eye: DVec3,
        target: DVec3,
        up: DVec3,
        projection: Projection,
        viewport: Viewport,
    ) -> Self {
        Self {
            view_from_world: DMat4::look_at_rh(eye, target, up),
            projection,
            viewport,
        }
    }

    #[must_use]
    pub fn clip_from_view(&self) -> DMat4 {
        let aspect = self.viewport.aspect_ratio();
        match self.projection {
            Projection::Perspective { fov_y, near, far } => {
                DMat4::perspective_rh(fov_y, aspect, near, far)
            }
            Projection::Orthographic {
                half_height,
                near,
                far,
            } => {
                let half_width = half_height * aspect;
                DMat4::orthographic_rh(
                    -half_width,
                    half_width,
                    -half_height,
                    half_height,
                    near,
                    far,
                )
            }
        }
    }

    #[must_use]
    pub fn clip_from_world(&self) -> DMat4 {
        self.clip_from_view() * self.view_from_world
    }

    #[must_use]
    pub fn eye_position(&self) -> DVec3 {
        self.view_from_world.inverse().w_axis.truncate()
    }

    #[must_use]
    pub fn frustum(&self) -> Frustum {
        Frustum::from_clip_from_world(self.clip_from_world())
    }

    /// Smallest size, in world units, that one screen pixel can project to on
    /// the unit sphere.
    ///
    /// For a perspective view this is the footprint of a pixel at the nearest
    /// point of the globe (never closer than the near plane). For an
    /// orthographic view every pixel has the same footprint.
    #[must_use]
    pub fn min_pixel_size_on_sphere(&self) -> f64 {
        let height = f64::from(self.viewport.height.max(1));
        match self.projection {
            Projection::Perspective { fov_y, near, .. } => {
                let distance = (self.eye_position().length() - 1.0).max(near);
                2.0 * distance * (fov_y * 0.5).tan() / height
            }
            Projection::Orthographic { half_height, .. } => 2.0 * half_height / height,
        }
    }
}
