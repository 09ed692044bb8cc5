// Copyright @yucwang 2026

use crate::core::rng::RandomStream;
use crate::math::constants::{Float, Vector2f, Vector3f, INV_FOUR_PI, PI};
use crate::math::frame::Frame;
use crate::math::warp::{sample_uniform_sphere, sample_uniform_sphere_pdf};

/// Below this anisotropy the phase function is treated as isotropic.
const ISOTROPIC_THRESHOLD: Float = 0.001;

#[derive(Debug, Copy, Clone)]
pub struct HenyeyGreenstein {
    g: Float,
}

impl HenyeyGreenstein {
    pub fn new(g: Float) -> Self {
        Self { g }
    }

    pub fn g(&self) -> Float {
        self.g
    }

    /// Phase function value for the cosine between the incoming travel
    /// direction and the outgoing direction.
    pub fn eval(&self, cos_theta: Float) -> Float {
        if self.g.abs() < ISOTROPIC_THRESHOLD {
            return sample_uniform_sphere_pdf();
        }
        let g2 = self.g * self.g;
        let denom = 1.0 + g2 - 2.0 * self.g * cos_theta;
        INV_FOUR_PI * (1.0 - g2) / (denom * denom.sqrt())
    }

    /// Samples a new travel direction around `dir`, proportional to `eval`.
    pub fn sample(&self, dir: &Vector3f, rng: &mut RandomStream) -> Vector3f {
        let u = rng.next_2d();
        self.sample_with(dir, &u)
    }

    pub fn sample_with(&self, dir: &Vector3f, u: &Vector2f) -> Vector3f {
        if self.g.abs() < ISOTROPIC_THRESHOLD {
            return sample_uniform_sphere(u);
        }

        let g = self.g;
        let t = (1.0 - g * g) / (1.0 - g + 2.0 * g * u.x);
        let cos_theta = ((0.5 / g) * (1.0 + g * g - t * t)).max(-1.0).min(1.0);
        let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
        let phi = 2.0 * PI * u.y;
        let (sin_phi, cos_phi) = phi.sin_cos();

        let frame = Frame::from_direction(dir);
        let local = Vector3f::new(sin_theta * sin_phi, sin_theta * cos_phi, cos_theta);
        frame.from_local(&local).normalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cos_histogram(g: Float, dir: Vector3f, reference: Vector3f, seed: u32) -> Vec<f64> {
        let bins = 16;
        let n = 200000;
        let phase = HenyeyGreenstein::new(g);
        let mut rng = RandomStream::new(seed);
        let mut hist = vec![0.0f64; bins];
        for _ in 0..n {
            let w = phase.sample(&dir, &mut rng);
            let c = w.dot(&reference).max(-1.0).min(0.99999);
            let bin = (((c + 1.0) * 0.5) * bins as Float) as usize;
            hist[bin.min(bins - 1)] += 1.0 / n as f64;
        }
        hist
    }

    #[test]
    fn test_mean_cosine_equals_g() {
        let dir = Vector3f::new(0.3, -0.2, 0.9).normalize();
        for g in [-0.6 as Float, 0.0, 0.3, 0.875].iter() {
            let phase = HenyeyGreenstein::new(*g);
            let mut rng = RandomStream::new(99);
            let n = 100000;
            let mut sum = 0.0f64;
            for _ in 0..n {
                let w = phase.sample(&dir, &mut rng);
                assert!((w.norm() - 1.0).abs() < 1e-4);
                sum += w.dot(&dir) as f64;
            }
            assert!((sum / n as f64 - *g as f64).abs() < 0.01, "g {} mean {}", g, sum / n as f64);
        }
    }

    #[test]
    fn test_symmetry_under_negation() {
        let d = Vector3f::new(0.1, 0.7, -0.4).normalize();
        let g = 0.6;
        let a = cos_histogram(g, d, d, 3);
        let b = cos_histogram(-g, -d, d, 4);
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 0.01, "{} vs {}", x, y);
        }
    }

    #[test]
    fn test_pole_directions() {
        let phase = HenyeyGreenstein::new(0.9);
        let mut rng = RandomStream::new(5);
        for dir in [Vector3f::new(0.0, 0.0, 1.0), Vector3f::new(0.0, 0.0, -1.0)].iter() {
            for _ in 0..100 {
                let w = phase.sample(dir, &mut rng);
                assert!(w.iter().all(|v| v.is_finite()));
            }
        }
    }

    #[test]
    fn test_eval_normalized() {
        let phase = HenyeyGreenstein::new(0.5);
        let n = 4000;
        let mut integral = 0.0;
        for i in 0..n {
            let c = -1.0 + 2.0 * (i as Float + 0.5) / n as Float;
            integral += phase.eval(c) * 2.0 * PI * (2.0 / n as Float);
        }
        assert!((integral - 1.0).abs() < 1e-3);
    }
}
