// Copyright @yucwang 2023

use crate::math::constants::{ Vector3f };

/// Orthonormal basis whose `z` axis is a given direction.
#[derive(Debug, Copy, Clone)]
pub struct Frame {
    pub x: Vector3f,
    pub y: Vector3f,
    pub z: Vector3f
}

impl Default for Frame {
    fn default() -> Self {
        Frame {
            x: Vector3f::new(1.0, 0.0, 0.0),
            y: Vector3f::new(0.0, 1.0, 0.0),
            z: Vector3f::new(0.0, 0.0, 1.0)
        }
    }
}

impl Frame {
    /// Builds the basis around a unit direction. The helper axis switches from
    /// +z to +x when the direction is almost parallel to z.
    pub fn from_direction(dir: &Vector3f) -> Frame {
        let other = if dir.z.abs() >= 0.999 {
            Vector3f::new(1.0, 0.0, 0.0)
        } else {
            Vector3f::new(0.0, 0.0, 1.0)
        };
        let x = other.cross(dir).normalize();
        let y = dir.cross(&x).normalize();
        Frame { x, y, z: *dir }
    }

    pub fn to_local(&self, v: &Vector3f) -> Vector3f {
        Vector3f::new(v.dot(&self.x), v.dot(&self.y), v.dot(&self.z))
    }

    pub fn from_local(&self, v: &Vector3f) -> Vector3f {
        v.x * self.x + v.y * self.y + v.z * self.z
    }
}
