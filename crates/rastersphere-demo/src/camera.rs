//! Scripted orbit camera.
//!
//! Circles the globe at a fixed latitude while descending, so a run sweeps
//! through every level of detail. Ground speed scales with altitude the same
//! way a free-flight camera's would: slow near the surface, fast far away.

use glam::DVec3;
use rastersphere::geom::georeference::sphere_position;
use rastersphere::{Projection, ViewState, Viewport};

/// Radius used to convert unit-sphere altitudes to metres for speed scaling.
const EARTH_RADIUS_METERS: f64 = 6_371_000.0;
/// Ground speed at low altitude, in metres per second.
const BASE_SPEED_METERS: f64 = 1000.0;
/// Lowest altitude the camera descends to, in globe radii.
pub const MIN_ALTITUDE: f64 = 1e-3;

#[derive(Debug, Clone, Copy)]
pub struct OrbitCamera {
    /// Degrees east.
    pub longitude: f64,
    /// Degrees north. Kept away from the poles so "up" stays well defined.
    pub latitude: f64,
    /// Height above the surface in globe radii.
    pub altitude: f64,
    /// Seconds for the altitude to halve.
    pub descent_half_life: f64,
    pub fov_y: f64,
    pub viewport: Viewport,
}

impl OrbitCamera {
    #[must_use]
    pub fn new(viewport: Viewport) -> Self {
        Self {
            longitude: 0.0,
            latitude: 20.0,
            altitude: 3.0,
            descent_half_life: 0.5,
            fov_y: 60f64.to_radians(),
            viewport,
        }
    }

    /// Angular ground speed in degrees per second.
    #[must_use]
    pub fn angular_speed(&self) -> f64 {
        let altitude = self.altitude.max(0.0) * EARTH_RADIUS_METERS;
        let speed_factor = ((altitude / 10_000.0).max(1.0) + 1.0).powf(1.337) / 6.0;
        let speed_factor = speed_factor.min(2600.0);
        (BASE_SPEED_METERS * speed_factor / EARTH_RADIUS_METERS).to_degrees()
    }

    /// Step the orbit forward by `dt` seconds.
    pub fn advance(&mut self, dt: f64) {
        self.longitude = (self.longitude + self.angular_speed() * dt) % 360.0;
        let descent = 0.5f64.powf(dt / self.descent_half_life);
        self.altitude = (self.altitude * descent).max(MIN_ALTITUDE);
    }

    #[must_use]
    pub fn eye(&self) -> DVec3 {
        sphere_position(self.longitude, self.latitude) * (1.0 + self.altitude)
    }

    /// Looking straight down at the globe's centre.
    #[must_use]
    pub fn view(&self) -> ViewState {
        let near = (self.altitude * 0.5).max(MIN_ALTITUDE * 0.1);
        ViewState::look_at(
            self.eye(),
            DVec3::ZERO,
            DVec3::Z,
            Projection::Perspective {
                fov_y: self.fov_y,
                near,
                far: self.altitude + 3.0,
            },
            self.viewport,
        )
    }
}
