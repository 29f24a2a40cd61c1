//! Cameras that scene passes render through

use glam::{Mat4, Vec3};

use crate::id::IdString;

/// Camera projection type.
///
/// The aspect ratio is not stored: a scene pass takes it from the render
/// target it draws into, so one camera serves targets of any shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective { fov_y: f32, near: f32, far: f32 },
    /// `height` world units tall, width follows the target aspect ratio
    Orthographic { height: f32, near: f32, far: f32 },
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Perspective {
            fov_y: std::f32::consts::FRAC_PI_4,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Projection {
    pub fn perspective(fov_y_degrees: f32, near: f32, far: f32) -> Self {
        Projection::Perspective {
            fov_y: fov_y_degrees.to_radians(),
            near,
            far,
        }
    }

    pub fn orthographic(height: f32, near: f32, far: f32) -> Self {
        Projection::Orthographic { height, near, far }
    }

    /// Projection matrix for a target with the given aspect ratio
    pub fn matrix(&self, aspect: f32) -> Mat4 {
        match *self {
            Projection::Perspective { fov_y, near, far } => {
                Mat4::perspective_rh(fov_y, aspect, near, far)
            }
            Projection::Orthographic { height, near, far } => {
                let half_h = height / 2.0;
                let half_w = half_h * aspect;
                Mat4::orthographic_rh(-half_w, half_w, -half_h, half_h, near, far)
            }
        }
    }
}

/// Named camera owned by a [`Scene`](super::Scene)
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub name: IdString,
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub projection: Projection,
}

impl Camera {
    pub fn new(name: &str, position: Vec3, target: Vec3) -> Self {
        Self {
            name: IdString::new(name),
            position,
            target,
            up: Vec3::Y,
            projection: Projection::default(),
        }
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// View-projection matrix when rendering into a target of `aspect`
    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        self.projection.matrix(aspect) * self.view_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn test_aspect_follows_target() {
        let camera = Camera::new("main", Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO);
        assert_ne!(camera.view_projection(16.0 / 9.0), camera.view_projection(1.0));
    }

    #[test]
    fn test_orthographic_extent() {
        let camera = Camera::new("shadow", Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO)
            .with_projection(Projection::orthographic(4.0, 0.1, 100.0));
        // top right corner of a 2:1 target lands on the clip-space corner
        let corner = camera.view_projection(2.0) * Vec4::new(4.0, 2.0, 0.0, 1.0);
        assert!((corner.x / corner.w - 1.0).abs() < 1e-5);
        assert!((corner.y / corner.w - 1.0).abs() < 1e-5);
    }
}
