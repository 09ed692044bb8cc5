// Copyright @yucwang 2026

use crate::core::error::ConfigError;
use crate::core::rng::RandomStream;
use crate::math::aabb::AABB;
use crate::math::constants::{Float, Vector3f};
use crate::volumes::{resolve_index, BorderMode, GridInterpolation};

pub const BRICK_SIZE: usize = 8;
const EMPTY_BRICK: u32 = u32::MAX;

/// Brick-sparse storage: all-zero 8^3 bricks are not stored.
#[derive(Debug, Clone)]
pub struct SparseBricks {
    brick_dims: [usize; 3],
    table: Vec<u32>,
    bricks: Vec<Float>,
}

impl SparseBricks {
    fn from_dense(dims: [usize; 3], data: &[Float]) -> Self {
        let brick_dims = [
            (dims[0] + BRICK_SIZE - 1) / BRICK_SIZE,
            (dims[1] + BRICK_SIZE - 1) / BRICK_SIZE,
            (dims[2] + BRICK_SIZE - 1) / BRICK_SIZE,
        ];
        let brick_volume = BRICK_SIZE * BRICK_SIZE * BRICK_SIZE;
        let mut table = vec![EMPTY_BRICK; brick_dims[0] * brick_dims[1] * brick_dims[2]];
        let mut bricks = Vec::new();
        let mut scratch = vec![0.0 as Float; brick_volume];

        for bz in 0..brick_dims[2] {
            for by in 0..brick_dims[1] {
                for bx in 0..brick_dims[0] {
                    let mut non_zero = false;
                    for lz in 0..BRICK_SIZE {
                        for ly in 0..BRICK_SIZE {
                            for lx in 0..BRICK_SIZE {
                                let (x, y, z) = (bx * BRICK_SIZE + lx, by * BRICK_SIZE + ly, bz * BRICK_SIZE + lz);
                                let v = if x < dims[0] && y < dims[1] && z < dims[2] {
                                    data[x + (y + z * dims[1]) * dims[0]]
                                } else {
                                    0.0
                                };
                                non_zero |= v != 0.0;
                                scratch[lx + (ly + lz * BRICK_SIZE) * BRICK_SIZE] = v;
                            }
                        }
                    }
                    if non_zero {
                        table[bx + (by + bz * brick_dims[1]) * brick_dims[0]] = (bricks.len() / brick_volume) as u32;
                        bricks.extend_from_slice(&scratch);
                    }
                }
            }
        }

        Self { brick_dims, table, bricks }
    }

    fn fetch(&self, x: usize, y: usize, z: usize) -> Float {
        let (bx, by, bz) = (x / BRICK_SIZE, y / BRICK_SIZE, z / BRICK_SIZE);
        let slot = self.table[bx + (by + bz * self.brick_dims[1]) * self.brick_dims[0]];
        if slot == EMPTY_BRICK {
            return 0.0;
        }
        let (lx, ly, lz) = (x % BRICK_SIZE, y % BRICK_SIZE, z % BRICK_SIZE);
        let base = slot as usize * BRICK_SIZE * BRICK_SIZE * BRICK_SIZE;
        self.bricks[base + lx + (ly + lz * BRICK_SIZE) * BRICK_SIZE]
    }

    pub fn stored_bricks(&self) -> usize {
        self.bricks.len() / (BRICK_SIZE * BRICK_SIZE * BRICK_SIZE)
    }
}

#[derive(Debug, Clone)]
pub enum DensityStorage {
    Dense(Vec<Float>),
    Sparse(SparseBricks),
}

/// Read-only scalar density grid centred at the origin.
///
/// Voxel `i` covers `[i, i + 1)` in voxel space. The domain box spans
/// `±0.25 * dims / max(dims)` so the longest axis is half a unit long.
#[derive(Debug, Clone)]
pub struct DensityField {
    dims: [usize; 3],
    storage: DensityStorage,
    bbox: AABB,
    max_density: Float,
}

impl DensityField {
    pub fn new(dims: [usize; 3], data: Vec<Float>) -> Result<Self, ConfigError> {
        let expected = dims[0]
            .checked_mul(dims[1])
            .and_then(|v| v.checked_mul(dims[2]))
            .unwrap_or(0);
        if expected == 0 {
            return Err(ConfigError::EmptyDensityField);
        }
        if data.len() != expected {
            return Err(ConfigError::DensityDataMismatch { expected, actual: data.len() });
        }

        let max_dim = dims[0].max(dims[1]).max(dims[2]) as Float;
        let box_max = Vector3f::new(dims[0] as Float, dims[1] as Float, dims[2] as Float) * (0.25 / max_dim);
        let max_density = data.iter().cloned().fold(0.0, Float::max);

        Ok(Self {
            dims,
            storage: DensityStorage::Dense(data),
            bbox: AABB::new(-box_max, box_max),
            max_density,
        })
    }

    pub fn from_fn<F>(dims: [usize; 3], f: F) -> Result<Self, ConfigError>
        where F: Fn(usize, usize, usize) -> Float {
        let mut data = Vec::with_capacity(dims[0] * dims[1] * dims[2]);
        for z in 0..dims[2] {
            for y in 0..dims[1] {
                for x in 0..dims[0] {
                    data.push(f(x, y, z));
                }
            }
        }
        Self::new(dims, data)
    }

    /// Rescales values so the maximum becomes one. All-zero fields are left alone.
    pub fn normalized(mut self) -> Self {
        if self.max_density <= 0.0 || self.max_density == 1.0 {
            return self;
        }
        let inv = 1.0 / self.max_density;
        match &mut self.storage {
            DensityStorage::Dense(data) => data.iter_mut().for_each(|v| *v *= inv),
            DensityStorage::Sparse(sparse) => sparse.bricks.iter_mut().for_each(|v| *v *= inv),
        }
        self.max_density = 1.0;
        self
    }

    pub fn to_sparse(&self) -> Self {
        let storage = match &self.storage {
            DensityStorage::Dense(data) => DensityStorage::Sparse(SparseBricks::from_dense(self.dims, data)),
            DensityStorage::Sparse(sparse) => DensityStorage::Sparse(sparse.clone()),
        };
        Self {
            dims: self.dims,
            storage,
            bbox: self.bbox,
            max_density: self.max_density,
        }
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn bbox(&self) -> &AABB {
        &self.bbox
    }

    pub fn max_density(&self) -> Float {
        self.max_density
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self.storage, DensityStorage::Sparse(_))
    }

    pub fn storage(&self) -> &DensityStorage {
        &self.storage
    }

    /// Voxel value at an in-range index.
    pub fn value(&self, x: usize, y: usize, z: usize) -> Float {
        match &self.storage {
            DensityStorage::Dense(data) => data[x + (y + z * self.dims[1]) * self.dims[0]],
            DensityStorage::Sparse(sparse) => sparse.fetch(x, y, z),
        }
    }

    /// Voxel value at a possibly out-of-range index under a border mode.
    pub fn fetch(&self, x: isize, y: isize, z: isize, border: BorderMode) -> Float {
        let x = resolve_index(x, self.dims[0], border);
        let y = resolve_index(y, self.dims[1], border);
        let z = resolve_index(z, self.dims[2], border);
        match (x, y, z) {
            (Some(x), Some(y), Some(z)) => self.value(x, y, z),
            _ => 0.0,
        }
    }

    /// Converts a world position to continuous voxel coordinates.
    pub fn to_voxel(&self, p: &Vector3f) -> Vector3f {
        let unit = self.bbox.to_unit(p);
        Vector3f::new(
            unit.x * self.dims[0] as Float,
            unit.y * self.dims[1] as Float,
            unit.z * self.dims[2] as Float,
        )
    }

    /// World units to voxel units per axis.
    pub fn voxel_scale(&self) -> Vector3f {
        let diag = self.bbox.diagonal();
        Vector3f::new(
            self.dims[0] as Float / diag.x,
            self.dims[1] as Float / diag.y,
            self.dims[2] as Float / diag.z,
        )
    }

    /// Density at a world position. Stochastic lookups consume three variates.
    pub fn lookup(&self, p: &Vector3f, interpolation: GridInterpolation,
                  border: BorderMode, rng: &mut RandomStream) -> Float {
        let v = self.to_voxel(p);
        match interpolation {
            GridInterpolation::Nearest => self.lookup_nearest(&v),
            GridInterpolation::Stochastic => {
                let jitter = Vector3f::new(rng.next_float(), rng.next_float(), rng.next_float());
                self.lookup_stochastic(&v, &jitter, border)
            }
            GridInterpolation::Trilinear => self.lookup_trilinear(&v, border),
        }
    }

    pub fn lookup_nearest(&self, v: &Vector3f) -> Float {
        let x = (v.x.floor() as isize).clamp(0, self.dims[0] as isize - 1) as usize;
        let y = (v.y.floor() as isize).clamp(0, self.dims[1] as isize - 1) as usize;
        let z = (v.z.floor() as isize).clamp(0, self.dims[2] as isize - 1) as usize;
        self.value(x, y, z)
    }

    /// `jitter` holds three uniform variates in [0, 1).
    pub fn lookup_stochastic(&self, v: &Vector3f, jitter: &Vector3f, border: BorderMode) -> Float {
        let p = v + jitter - Vector3f::new(0.5, 0.5, 0.5);
        self.fetch(p.x.floor() as isize, p.y.floor() as isize, p.z.floor() as isize, border)
    }

    pub fn lookup_trilinear(&self, v: &Vector3f, border: BorderMode) -> Float {
        let p = v - Vector3f::new(0.5, 0.5, 0.5);
        let x0 = p.x.floor();
        let y0 = p.y.floor();
        let z0 = p.z.floor();
        let tx = p.x - x0;
        let ty = p.y - y0;
        let tz = p.z - z0;
        let (x0, y0, z0) = (x0 as isize, y0 as isize, z0 as isize);

        let c000 = self.fetch(x0, y0, z0, border);
        let c100 = self.fetch(x0 + 1, y0, z0, border);
        let c010 = self.fetch(x0, y0 + 1, z0, border);
        let c110 = self.fetch(x0 + 1, y0 + 1, z0, border);
        let c001 = self.fetch(x0, y0, z0 + 1, border);
        let c101 = self.fetch(x0 + 1, y0, z0 + 1, border);
        let c011 = self.fetch(x0, y0 + 1, z0 + 1, border);
        let c111 = self.fetch(x0 + 1, y0 + 1, z0 + 1, border);

        let c00 = c000 * (1.0 - tx) + c100 * tx;
        let c10 = c010 * (1.0 - tx) + c110 * tx;
        let c01 = c001 * (1.0 - tx) + c101 * tx;
        let c11 = c011 * (1.0 - tx) + c111 * tx;

        let c0 = c00 * (1.0 - ty) + c10 * ty;
        let c1 = c01 * (1.0 - ty) + c11 * ty;

        c0 * (1.0 - tz) + c1 * tz
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(dims: [usize; 3]) -> DensityField {
        DensityField::from_fn(dims, |x, y, z| {
            if (x + y + z) % 3 == 0 { 0.0 } else { (x * 7 + y * 3 + z) as Float / 100.0 }
        }).unwrap()
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(DensityField::new([0, 4, 4], Vec::new()), Err(ConfigError::EmptyDensityField)));
        assert!(matches!(DensityField::new([2, 2, 2], vec![0.0; 7]),
                         Err(ConfigError::DensityDataMismatch { expected: 8, actual: 7 })));
    }

    #[test]
    fn test_domain_box() {
        let field = DensityField::new([16, 8, 4], vec![0.0; 16 * 8 * 4]).unwrap();
        let bbox = field.bbox();
        assert!((bbox.p_max - Vector3f::new(0.25, 0.125, 0.0625)).norm() < 1e-6);
        assert!((bbox.p_min + bbox.p_max).norm() < 1e-6);
        let v = field.to_voxel(&bbox.p_max);
        assert!((v - Vector3f::new(16.0, 8.0, 4.0)).norm() < 1e-4);
    }

    #[test]
    fn test_sparse_matches_dense() {
        let dims = [19, 9, 13];
        let mut dense = ramp(dims);
        // carve out an empty brick so the sparse table has holes
        if let DensityStorage::Dense(data) = &mut dense.storage {
            for z in 0..8 {
                for y in 0..8 {
                    for x in 8..16 {
                        data[x + (y + z * dims[1]) * dims[0]] = 0.0;
                    }
                }
            }
        }
        let sparse = dense.to_sparse();
        assert!(sparse.is_sparse());
        if let DensityStorage::Sparse(bricks) = sparse.storage() {
            assert!(bricks.stored_bricks() < 3 * 2 * 2);
        }
        for z in 0..dims[2] {
            for y in 0..dims[1] {
                for x in 0..dims[0] {
                    assert_eq!(dense.value(x, y, z), sparse.value(x, y, z));
                }
            }
        }
        assert_eq!(dense.max_density(), sparse.max_density());
    }

    #[test]
    fn test_interpolation_at_voxel_centres() {
        let field = ramp([6, 5, 4]);
        let centre = Vector3f::new(2.5, 1.5, 3.5);
        let expected = field.value(2, 1, 3);
        assert_eq!(field.lookup_nearest(&centre), expected);
        assert!((field.lookup_trilinear(&centre, BorderMode::ClampToZero) - expected).abs() < 1e-6);
        // a jitter of one half lands on the centre voxel
        let half = Vector3f::new(0.5, 0.5, 0.5);
        assert_eq!(field.lookup_stochastic(&centre, &half, BorderMode::ClampToZero), expected);
    }

    #[test]
    fn test_border_modes() {
        let field = DensityField::new([2, 2, 2], vec![1.0; 8]).unwrap();
        let corner = Vector3f::new(0.0, 0.0, 0.0);
        let zero = field.lookup_trilinear(&corner, BorderMode::ClampToZero);
        let edge = field.lookup_trilinear(&corner, BorderMode::ClampToEdge);
        assert!((zero - 0.125).abs() < 1e-6);
        assert!((edge - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_stochastic_matches_trilinear_in_expectation() {
        let field = ramp([5, 5, 5]);
        let mut rng = RandomStream::new(17);
        let v = Vector3f::new(1.3, 2.8, 0.6);
        let n = 200000;
        let mut sum = 0.0f64;
        for _ in 0..n {
            let jitter = Vector3f::new(rng.next_float(), rng.next_float(), rng.next_float());
            sum += field.lookup_stochastic(&v, &jitter, BorderMode::ClampToZero) as f64;
        }
        let tri = field.lookup_trilinear(&v, BorderMode::ClampToZero) as f64;
        assert!((sum / n as f64 - tri).abs() < 3e-3);
    }

    #[test]
    fn test_normalize() {
        let field = DensityField::new([2, 1, 1], vec![0.5, 2.0]).unwrap().normalized();
        assert_eq!(field.max_density(), 1.0);
        assert!((field.value(0, 0, 0) - 0.25).abs() < 1e-6);
    }
}
