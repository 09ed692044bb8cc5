// Copyright 2020 @TwoCookingMice

use super::constants::{ Float, Vector3f };
use super::ray::{ Ray3f };

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AABB {
    pub p_min: Vector3f,
    pub p_max: Vector3f
}

impl AABB {
    pub fn new(p_min: Vector3f, p_max: Vector3f) -> Self {
        let mut min = Vector3f::zeros();
        let mut max = Vector3f::zeros();
        for idx in 0..3 {
            min[idx] = p_min[idx].min(p_max[idx]);
            max[idx] = p_max[idx].max(p_min[idx]);
        }
        Self { p_min: min, p_max: max }
    }

    pub fn center(&self) -> Vector3f {
        0.5f32 * self.p_min + 0.5f32 * self.p_max
    }

    pub fn diagonal(&self) -> Vector3f {
        self.p_max - self.p_min
    }

    pub fn contains(&self, p: &Vector3f) -> bool {
        (0..3).all(|idx| p[idx] >= self.p_min[idx] && p[idx] <= self.p_max[idx])
    }

    /// Maps a world position into [0, 1]^3 over the box.
    pub fn to_unit(&self, p: &Vector3f) -> Vector3f {
        (p - self.p_min).component_div(&self.diagonal())
    }

    /// Slab clipping of the ray `origin + t * dir` against the box.
    ///
    /// Returns the entry and exit distances with the entry clamped to zero, so a
    /// ray starting inside the box reports `(0, t_exit)`. Misses, and boxes
    /// lying entirely behind the origin, return `None`.
    pub fn clip(&self, origin: &Vector3f, dir: &Vector3f) -> Option<(Float, Float)> {
        let mut t_min: Float = 0.0;
        let mut t_max: Float = std::f32::MAX;

        for idx in 0..3 {
            let d = dir[idx];
            if d.abs() < 1e-12 {
                if origin[idx] < self.p_min[idx] || origin[idx] > self.p_max[idx] {
                    return None;
                }
                continue;
            }

            let inv = 1.0 / d;
            let mut t0 = (self.p_min[idx] - origin[idx]) * inv;
            let mut t1 = (self.p_max[idx] - origin[idx]) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }

            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_max < t_min {
                return None;
            }
        }

        Some((t_min, t_max))
    }

    pub fn ray_intersect_range(&self, ray: &Ray3f) -> Option<(Float, Float)> {
        let (t0, t1) = self.clip(&ray.origin(), &ray.dir())?;
        let t0 = t0.max(ray.min_t);
        let t1 = t1.min(ray.max_t);
        if t1 < t0 {
            None
        } else {
            Some((t0, t1))
        }
    }
}

/* Test for AABB */
