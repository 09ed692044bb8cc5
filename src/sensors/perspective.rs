// Copyright @yucwang 2026

use nalgebra::{Isometry3, Perspective3, Point3};

use crate::core::sensor::Sensor;
use crate::math::constants::{Float, Matrix4f, Vector2f, Vector3f, Vector4f};
use crate::math::ray::Ray3f;

/// Pinhole camera described by its inverse view-projection matrix.
pub struct PerspectiveCamera {
    inverse_view_projection: Matrix4f,
    width: usize,
    height: usize,
}

impl PerspectiveCamera {
    pub fn new(origin: Vector3f,
               target: Vector3f,
               up: Vector3f,
               fov_y_radians: Float,
               width: usize,
               height: usize) -> Option<Self> {
        let aspect = width as Float / height.max(1) as Float;
        let view = Isometry3::look_at_rh(&Point3::from(origin), &Point3::from(target), &up);
        let projection = Perspective3::new(aspect, fov_y_radians, 1e-3, 100.0);
        let view_projection = projection.to_homogeneous() * view.to_homogeneous();
        let inverse_view_projection = view_projection.try_inverse()?;
        Some(Self::from_inverse_view_projection(inverse_view_projection, width, height))
    }

    pub fn from_inverse_view_projection(inverse_view_projection: Matrix4f,
                                        width: usize, height: usize) -> Self {
        Self { inverse_view_projection, width, height }
    }

    fn unproject(&self, x: Float, y: Float, z: Float) -> Vector3f {
        let p = self.inverse_view_projection * Vector4f::new(x, y, z, 1.0);
        p.xyz() / p.w
    }
}

impl Sensor for PerspectiveCamera {
    fn sample_ray(&self, u: &Vector2f) -> Ray3f {
        let x = 2.0 * u.x - 1.0;
        let y = 1.0 - 2.0 * u.y;
        let near = self.unproject(x, y, -1.0);
        let far = self.unproject(x, y, 1.0);
        Ray3f::new(near, far - near, Some(0.0), None)
    }

    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn describe(&self) -> String {
        format!("PerspectiveCamera: {}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perspective_camera_center_ray() {
        let origin = Vector3f::new(0.0, 0.0, 0.0);
        let target = Vector3f::new(0.0, 0.0, -1.0);
        let up = Vector3f::new(0.0, 1.0, 0.0);
        let cam = PerspectiveCamera::new(origin, target, up, std::f32::consts::FRAC_PI_2, 4, 4).unwrap();

        let ray = cam.sample_ray(&Vector2f::new(0.5, 0.5));
        let dir = ray.dir();
        assert!(dir.x.abs() < 1e-4);
        assert!(dir.y.abs() < 1e-4);
        assert!((dir.z + 1.0).abs() < 1e-4);
        assert!(ray.origin().norm() < 1e-2);
    }

    #[test]
    fn test_perspective_camera_corners() {
        let cam = PerspectiveCamera::new(Vector3f::new(0.0, 0.0, 2.0), Vector3f::zeros(),
                                         Vector3f::new(0.0, 1.0, 0.0),
                                         std::f32::consts::FRAC_PI_2, 8, 8).unwrap();
        // top left of the film looks up and to the left at 45 degrees on each axis
        let dir = cam.sample_ray(&Vector2f::new(0.0, 0.0)).dir();
        let expected = Vector3f::new(-1.0, 1.0, -1.0).normalize();
        assert!((dir - expected).norm() < 1e-3);
    }
}
