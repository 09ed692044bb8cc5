// Copyright @yucwang 2026

use crate::math::constants::{Float, Vector2f};

/// Hybrid Tausworthe generator: three Tausworthe components xor-ed with a
/// 32-bit LCG. The whole state is four words, so every path owns one.
#[derive(Debug, Clone)]
pub struct RandomStream {
    z1: u32,
    z2: u32,
    z3: u32,
    z4: u32,
}

#[inline]
fn taus_step(z: u32, s1: u32, s2: u32, s3: u32, m: u32) -> u32 {
    let b = ((z << s1) ^ z) >> s2;
    ((z & m) << s3) ^ b
}

#[inline]
fn lcg_step(z: u32) -> u32 {
    z.wrapping_mul(1664525).wrapping_add(1013904223)
}

/// Integer hash used to derive decorrelated stream seeds.
#[inline]
fn pcg_hash(v: u32) -> u32 {
    let state = v.wrapping_mul(747796405).wrapping_add(2891336453);
    let word = ((state >> ((state >> 28) + 4)) ^ state).wrapping_mul(277803737);
    (word >> 22) ^ word
}

impl RandomStream {
    pub fn new(seed: u32) -> Self {
        // Tausworthe components need seeds above 1, 7 and 15.
        let taus_seed = if seed < 128 { seed + 128 } else { seed };
        let mut rng = Self {
            z1: taus_seed,
            z2: taus_seed,
            z3: taus_seed,
            z4: seed,
        };
        for _ in 0..(23 + seed % 13) {
            rng.next_u32();
        }
        rng
    }

    /// Stream for one path. The custom offset is added to the derived seed and
    /// does nothing else.
    pub fn for_path(pixel_index: u32, sample: u32, frame: u32, seed_offset: u32) -> Self {
        let seed = pcg_hash(pixel_index ^ pcg_hash(sample ^ pcg_hash(frame)));
        Self::new(seed.wrapping_add(seed_offset))
    }

    pub fn next_u32(&mut self) -> u32 {
        self.z1 = taus_step(self.z1, 13, 19, 12, 4294967294);
        self.z2 = taus_step(self.z2, 2, 25, 4, 4294967288);
        self.z3 = taus_step(self.z3, 3, 11, 17, 4294967280);
        self.z4 = lcg_step(self.z4);
        self.z1 ^ self.z2 ^ self.z3 ^ self.z4
    }

    /// Uniform float in [0, 1).
    pub fn next_float(&mut self) -> Float {
        (self.next_u32() >> 8) as Float * (1.0 / 16777216.0)
    }

    pub fn next_2d(&mut self) -> Vector2f {
        let u = self.next_float();
        let v = self.next_float();
        Vector2f::new(u, v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = RandomStream::for_path(1234, 5, 6, 0);
        let mut b = RandomStream::for_path(1234, 5, 6, 0);
        for _ in 0..1000 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn test_streams_differ() {
        let mut a = RandomStream::for_path(10, 0, 0, 0);
        let mut b = RandomStream::for_path(11, 0, 0, 0);
        let mut c = RandomStream::for_path(10, 1, 0, 0);
        let mut d = RandomStream::for_path(10, 0, 0, 268435456);
        let va: Vec<u32> = (0..8).map(|_| a.next_u32()).collect();
        let vb: Vec<u32> = (0..8).map(|_| b.next_u32()).collect();
        let vc: Vec<u32> = (0..8).map(|_| c.next_u32()).collect();
        let vd: Vec<u32> = (0..8).map(|_| d.next_u32()).collect();
        assert_ne!(va, vb);
        assert_ne!(va, vc);
        assert_ne!(va, vd);
    }

    #[test]
    fn test_floats_in_unit_interval() {
        for seed in [0u32, 1, 2, 127, 128, u32::MAX].iter() {
            let mut rng = RandomStream::new(*seed);
            let mut sum = 0.0f64;
            let n = 20000;
            for _ in 0..n {
                let v = rng.next_float();
                assert!(v >= 0.0 && v < 1.0);
                sum += v as f64;
            }
            assert!((sum / n as f64 - 0.5).abs() < 0.02, "seed {} mean {}", seed, sum / n as f64);
        }
    }
}
