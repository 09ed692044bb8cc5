// Copyright @yucwang 2026

use std::str::FromStr;

use rayon::prelude::*;

use crate::core::error::{try_reserve, ConfigError, RenderError};
use crate::math::aabb::AABB;
use crate::math::constants::{Float, Vector3f, DENSITY_EPSILON, SQRT_3};
use crate::volumes::density_field::DensityField;
use crate::volumes::{BorderMode, GridInterpolation};

/// Lower bound of the residual majorant.
const MIN_RESIDUAL_BOUND: Float = 0.1;
/// Base of the control extinction heuristic.
const CONTROL_GAMMA: Float = 2.0;

/// How a requested super voxel size is adapted to the grid dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockSizePolicy {
    /// Halve until the size divides every grid dimension.
    HalveUntilDivisible,
    /// Only shrink when the size exceeds a grid dimension, otherwise keep it
    /// and let the last block on an axis hang over the grid edge.
    HalveWhenOversized,
}

impl Default for BlockSizePolicy {
    fn default() -> Self {
        BlockSizePolicy::HalveUntilDivisible
    }
}

impl FromStr for BlockSizePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "halve-until-divisible" | "divisible" => Ok(BlockSizePolicy::HalveUntilDivisible),
            "halve-when-oversized" | "oversized" => Ok(BlockSizePolicy::HalveWhenOversized),
            _ => Err(ConfigError::UnknownName { kind: "block size policy", name: s.to_string() }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MajorantKind {
    Decomposition,
    ResidualRatio,
}

/// Everything that invalidates a scanned grid when it changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GridOptions {
    pub block_size: usize,
    pub policy: BlockSizePolicy,
    pub interpolation: GridInterpolation,
    pub border: BorderMode,
}

fn divides_all(dims: &[usize; 3], size: usize) -> bool {
    dims.iter().all(|n| n % size == 0)
}

pub fn resolve_block_size(dims: [usize; 3], requested: usize,
                          policy: BlockSizePolicy) -> Result<usize, ConfigError> {
    if requested == 0 {
        return Err(ConfigError::InvalidBlockSize(requested));
    }

    let mut size = requested;
    let must_shrink = match policy {
        BlockSizePolicy::HalveUntilDivisible => !divides_all(&dims, size),
        BlockSizePolicy::HalveWhenOversized => dims.iter().any(|&n| n < size),
    };
    if must_shrink {
        loop {
            size = (size / 2).max(1);
            if size == 1 || divides_all(&dims, size) {
                break;
            }
        }
    }
    Ok(size)
}

/// Density statistics of one super voxel, halo included.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlockStats {
    pub min: Float,
    pub max: Float,
    pub avg: Float,
}

impl BlockStats {
    pub fn is_occupied(&self) -> bool {
        self.max >= DENSITY_EPSILON
    }
}

#[derive(Clone, Debug)]
pub struct SuperVoxelLayout {
    block_size: usize,
    grid_dims: [usize; 3],
    bbox: AABB,
    voxel_scale: Vector3f,
}

impl SuperVoxelLayout {
    fn new(field: &DensityField, block_size: usize) -> Self {
        let dims = field.dims();
        Self {
            block_size,
            grid_dims: [
                (dims[0] + block_size - 1) / block_size,
                (dims[1] + block_size - 1) / block_size,
                (dims[2] + block_size - 1) / block_size,
            ],
            bbox: *field.bbox(),
            voxel_scale: field.voxel_scale(),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn grid_dims(&self) -> [usize; 3] {
        self.grid_dims
    }

    pub fn num_blocks(&self) -> usize {
        self.grid_dims[0] * self.grid_dims[1] * self.grid_dims[2]
    }

    fn block_coords(&self, index: usize) -> [usize; 3] {
        let x = index % self.grid_dims[0];
        let y = (index / self.grid_dims[0]) % self.grid_dims[1];
        let z = index / (self.grid_dims[0] * self.grid_dims[1]);
        [x, y, z]
    }

    fn block_index(&self, cell: [usize; 3]) -> usize {
        cell[0] + (cell[1] + cell[2] * self.grid_dims[1]) * self.grid_dims[0]
    }

    /// Block containing a point given in voxel coordinates.
    pub fn block_of_voxel(&self, v: &Vector3f) -> usize {
        let s = self.block_size as Float;
        let mut cell = [0usize; 3];
        for axis in 0..3 {
            let c = (v[axis] / s).floor() as isize;
            cell[axis] = c.clamp(0, self.grid_dims[axis] as isize - 1) as usize;
        }
        self.block_index(cell)
    }

    /// Walks the blocks along `origin + t * dir` for `t` in `[0, t_max]`,
    /// spending the optical depth `tau` at the per-block `rate`.
    ///
    /// Returns the collision distance and its block, or `None` when the depth
    /// is not used up before `t_max`. Blocks with a rate below the density
    /// epsilon never collide.
    pub fn sample_free_flight<F>(&self, origin: &Vector3f, dir: &Vector3f, t_max: Float,
                                 mut tau: Float, rate: F) -> Option<(Float, usize)>
        where F: Fn(usize) -> Float {
        let v0 = (origin - self.bbox.p_min).component_mul(&self.voxel_scale);
        let dv = dir.component_mul(&self.voxel_scale);
        let s = self.block_size as Float;

        let mut cell = [0isize; 3];
        let mut step = [0isize; 3];
        let mut t_next = [Float::INFINITY; 3];
        let mut t_delta = [Float::INFINITY; 3];
        for axis in 0..3 {
            let c = (v0[axis] / s).floor() as isize;
            cell[axis] = c.clamp(0, self.grid_dims[axis] as isize - 1);
            if dv[axis] > 0.0 {
                step[axis] = 1;
                t_next[axis] = ((cell[axis] + 1) as Float * s - v0[axis]) / dv[axis];
                t_delta[axis] = s / dv[axis];
            } else if dv[axis] < 0.0 {
                step[axis] = -1;
                t_next[axis] = (cell[axis] as Float * s - v0[axis]) / dv[axis];
                t_delta[axis] = -s / dv[axis];
            }
        }

        let mut t: Float = 0.0;
        loop {
            let block = self.block_index([cell[0] as usize, cell[1] as usize, cell[2] as usize]);
            let axis = if t_next[0] <= t_next[1] && t_next[0] <= t_next[2] {
                0
            } else if t_next[1] <= t_next[2] {
                1
            } else {
                2
            };
            let t_end = t_next[axis].min(t_max).max(t);

            let r = rate(block);
            if r >= DENSITY_EPSILON {
                let depth = (t_end - t) * r;
                if tau <= depth {
                    return Some((t + tau / r, block));
                }
                tau -= depth;
            }

            if t_end >= t_max {
                return None;
            }
            t = t_end;
            cell[axis] += step[axis];
            if cell[axis] < 0 || cell[axis] >= self.grid_dims[axis] as isize {
                return None;
            }
            t_next[axis] += t_delta[axis];
        }
    }
}

/// Raw per-block statistics. Expensive to produce, reused across extinction changes.
#[derive(Clone, Debug)]
pub struct SuperVoxelScan {
    layout: SuperVoxelLayout,
    options: GridOptions,
    stats: Vec<BlockStats>,
}

impl SuperVoxelScan {
    pub fn layout(&self) -> &SuperVoxelLayout {
        &self.layout
    }

    pub fn options(&self) -> &GridOptions {
        &self.options
    }

    pub fn stats(&self) -> &[BlockStats] {
        &self.stats
    }
}

pub fn scan(field: &DensityField, options: &GridOptions) -> Result<SuperVoxelScan, RenderError> {
    let block_size = resolve_block_size(field.dims(), options.block_size, options.policy)?;
    let layout = SuperVoxelLayout::new(field, block_size);
    let num_blocks = layout.num_blocks();

    let mut stats = Vec::new();
    try_reserve(&mut stats, num_blocks, "super voxel statistics")?;
    stats.par_extend((0..num_blocks).into_par_iter()
        .map(|index| scan_block(field, &layout, options, index)));

    log::debug!("Scanned {} super voxels of size {} (requested {}).",
                num_blocks, block_size, options.block_size);
    Ok(SuperVoxelScan { layout, options: *options, stats })
}

fn scan_block(field: &DensityField, layout: &SuperVoxelLayout,
              options: &GridOptions, index: usize) -> BlockStats {
    let dims = field.dims();
    let size = layout.block_size;
    let cell = layout.block_coords(index);
    let halo: isize = if options.interpolation == GridInterpolation::Nearest { 0 } else { 1 };
    let clamp_to_zero = options.border.is_clamp_to_zero();

    let lo = |axis: usize| (cell[axis] * size) as isize - halo;
    let hi = |axis: usize| ((cell[axis] + 1) * size) as isize + halo;

    let mut min = Float::INFINITY;
    let mut max: Float = 0.0;
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for z in lo(2)..hi(2) {
        for y in lo(1)..hi(1) {
            for x in lo(0)..hi(0) {
                let in_range = x >= 0 && y >= 0 && z >= 0
                    && (x as usize) < dims[0] && (y as usize) < dims[1] && (z as usize) < dims[2];
                let v = if in_range {
                    field.value(x as usize, y as usize, z as usize)
                } else if clamp_to_zero {
                    0.0
                } else {
                    continue;
                };
                min = min.min(v);
                max = max.max(v);
                sum += v as f64;
                count += 1;
            }
        }
    }

    if count == 0 {
        return BlockStats { min: 0.0, max: 0.0, avg: 0.0 };
    }

    // A zero-bordered sampler blends zeros into blocks hanging over the edge.
    if clamp_to_zero {
        for axis in 0..3 {
            if dims[axis] % size != 0 && cell[axis] + 1 == layout.grid_dims[axis] {
                min = 0.0;
            }
        }
    }

    BlockStats { min, max, avg: (sum / count as f64) as Float }
}

/// Per-block density bounds for decomposition tracking.
#[derive(Clone, Debug)]
pub struct DecompositionGrid {
    scan: SuperVoxelScan,
}

impl DecompositionGrid {
    pub fn new(scan: SuperVoxelScan) -> Self {
        Self { scan }
    }

    pub fn scan(&self) -> &SuperVoxelScan {
        &self.scan
    }

    pub fn layout(&self) -> &SuperVoxelLayout {
        &self.scan.layout
    }

    /// `(densityMin, densityMax)` of a block.
    pub fn bounds(&self, block: usize) -> (Float, Float) {
        let s = &self.scan.stats[block];
        (s.min, s.max)
    }

    pub fn is_occupied(&self, block: usize) -> bool {
        self.scan.stats[block].is_occupied()
    }
}

/// Control and residual extinction per block for residual ratio tracking.
#[derive(Clone, Debug)]
pub struct ResidualRatioGrid {
    scan: SuperVoxelScan,
    extinction: Vector3f,
    mu_c: Vec<Vector3f>,
    mu_r_bar: Vec<Vector3f>,
}

/// Control extinction and residual bound for one channel of one block.
pub fn residual_coefficients(stats: &BlockStats, extinction: Float, block_size: usize) -> (Float, Float) {
    let mu_min = stats.min * extinction;
    let mu_max = stats.max * extinction;
    let mu_avg = stats.avg * extinction;
    let mu_r_bar = (mu_max - mu_min).max(MIN_RESIDUAL_BOUND);
    let d = SQRT_3 * block_size as Float;
    let mu_c = mu_min + mu_r_bar * CONTROL_GAMMA.powf(1.0 / (d * mu_r_bar) - 1.0);
    (mu_c.max(mu_min).min(mu_avg), mu_r_bar)
}

impl ResidualRatioGrid {
    pub fn new(scan: SuperVoxelScan, extinction: Vector3f) -> Self {
        let mut grid = Self { scan, extinction, mu_c: Vec::new(), mu_r_bar: Vec::new() };
        grid.set_extinction(extinction);
        grid
    }

    /// Refreshes the derived coefficients from the cached statistics.
    pub fn set_extinction(&mut self, extinction: Vector3f) {
        let block_size = self.scan.layout.block_size;
        let (mu_c, mu_r_bar): (Vec<Vector3f>, Vec<Vector3f>) = self.scan.stats.iter()
            .map(|stats| {
                let mut c = Vector3f::zeros();
                let mut r = Vector3f::zeros();
                for channel in 0..3 {
                    let (mc, mr) = residual_coefficients(stats, extinction[channel], block_size);
                    c[channel] = mc;
                    r[channel] = mr;
                }
                (c, r)
            })
            .unzip();
        self.extinction = extinction;
        self.mu_c = mu_c;
        self.mu_r_bar = mu_r_bar;
    }

    pub fn scan(&self) -> &SuperVoxelScan {
        &self.scan
    }

    pub fn layout(&self) -> &SuperVoxelLayout {
        &self.scan.layout
    }

    pub fn extinction(&self) -> Vector3f {
        self.extinction
    }

    pub fn mu_c(&self, block: usize, channel: usize) -> Float {
        self.mu_c[block][channel]
    }

    pub fn mu_r_bar(&self, block: usize, channel: usize) -> Float {
        self.mu_r_bar[block][channel]
    }

    /// Lowest extinction any lookup inside the block can return.
    pub fn mu_min(&self, block: usize, channel: usize) -> Float {
        self.scan.stats[block].min * self.extinction[channel]
    }

    pub fn is_occupied(&self, block: usize) -> bool {
        self.scan.stats[block].is_occupied()
    }
}

#[derive(Clone, Debug)]
pub enum MajorantGrid {
    Decomposition(DecompositionGrid),
    ResidualRatio(ResidualRatioGrid),
}

impl MajorantGrid {
    pub fn build(field: &DensityField, options: &GridOptions, kind: MajorantKind,
                 extinction: Vector3f) -> Result<Self, RenderError> {
        let scan = scan(field, options)?;
        log::info!("Built {:?} majorant grid: {:?} blocks of size {}.",
                   kind, scan.layout.grid_dims, scan.layout.block_size);
        Ok(match kind {
            MajorantKind::Decomposition => MajorantGrid::Decomposition(DecompositionGrid::new(scan)),
            MajorantKind::ResidualRatio => MajorantGrid::ResidualRatio(ResidualRatioGrid::new(scan, extinction)),
        })
    }

    pub fn kind(&self) -> MajorantKind {
        match self {
            MajorantGrid::Decomposition(_) => MajorantKind::Decomposition,
            MajorantGrid::ResidualRatio(_) => MajorantKind::ResidualRatio,
        }
    }

    pub fn scan(&self) -> &SuperVoxelScan {
        match self {
            MajorantGrid::Decomposition(grid) => grid.scan(),
            MajorantGrid::ResidualRatio(grid) => grid.scan(),
        }
    }

    /// Only the residual ratio grid depends on extinction.
    pub fn set_extinction(&mut self, extinction: Vector3f) {
        if let MajorantGrid::ResidualRatio(grid) = self {
            grid.set_extinction(extinction);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volumes::procedural::cloud_block;

    fn options(block_size: usize, interpolation: GridInterpolation, border: BorderMode,
               policy: BlockSizePolicy) -> GridOptions {
        GridOptions { block_size, policy, interpolation, border }
    }

    #[test]
    fn test_block_size_resolution() {
        let div = BlockSizePolicy::HalveUntilDivisible;
        let over = BlockSizePolicy::HalveWhenOversized;
        assert_eq!(resolve_block_size([12, 8, 4], 8, div).unwrap(), 4);
        assert_eq!(resolve_block_size([6, 6, 6], 8, div).unwrap(), 2);
        assert_eq!(resolve_block_size([7, 5, 3], 8, div).unwrap(), 1);
        assert_eq!(resolve_block_size([20, 20, 20], 8, div).unwrap(), 4);
        assert_eq!(resolve_block_size([20, 20, 20], 8, over).unwrap(), 8);
        assert_eq!(resolve_block_size([6, 6, 6], 8, over).unwrap(), 2);
        assert!(matches!(resolve_block_size([8, 8, 8], 0, div), Err(ConfigError::InvalidBlockSize(0))));
    }

    #[test]
    fn test_overhanging_block_min_is_zero() {
        let field = cloud_block(10, 8, 8, 1.0, false).unwrap();
        let zero = scan(&field, &options(8, GridInterpolation::Nearest, BorderMode::ClampToZero,
                                         BlockSizePolicy::HalveWhenOversized)).unwrap();
        assert_eq!(zero.layout().grid_dims(), [2, 1, 1]);
        assert_eq!(zero.stats()[0].min, 1.0);
        assert_eq!(zero.stats()[1].min, 0.0);
        assert_eq!(zero.stats()[1].max, 1.0);

        let edge = scan(&field, &options(8, GridInterpolation::Nearest, BorderMode::ClampToEdge,
                                         BlockSizePolicy::HalveWhenOversized)).unwrap();
        assert_eq!(edge.stats()[1].min, 1.0);
        assert_eq!(edge.stats()[1].avg, 1.0);
    }

    #[test]
    fn test_halo_reaches_zero_border() {
        let field = cloud_block(8, 8, 8, 1.0, false).unwrap();
        let nearest = scan(&field, &options(4, GridInterpolation::Nearest, BorderMode::ClampToZero,
                                            BlockSizePolicy::HalveUntilDivisible)).unwrap();
        assert!(nearest.stats().iter().all(|s| s.min == 1.0));
        let trilinear = scan(&field, &options(4, GridInterpolation::Trilinear, BorderMode::ClampToZero,
                                              BlockSizePolicy::HalveUntilDivisible)).unwrap();
        assert!(trilinear.stats().iter().all(|s| s.min == 0.0 && s.max == 1.0));
        let avg = trilinear.stats()[0].avg;
        // 6^3 samples, 5^3 of them inside the grid
        assert!((avg - 125.0 / 216.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_field_is_unoccupied() {
        let field = cloud_block(8, 8, 8, 0.0, false).unwrap();
        let grid = MajorantGrid::build(&field, &options(4, GridInterpolation::Stochastic,
                                                        BorderMode::ClampToZero,
                                                        BlockSizePolicy::HalveUntilDivisible),
                                       MajorantKind::ResidualRatio, Vector3f::new(8.0, 8.0, 8.0)).unwrap();
        if let MajorantGrid::ResidualRatio(grid) = grid {
            for block in 0..grid.layout().num_blocks() {
                assert!(!grid.is_occupied(block));
                assert_eq!(grid.mu_c(block, 0), 0.0);
            }
        } else {
            panic!("wrong grid kind");
        }
    }

    #[test]
    fn test_residual_coefficients() {
        let stats = BlockStats { min: 0.2, max: 0.6, avg: 0.3 };
        let (mu_c, mu_r_bar) = residual_coefficients(&stats, 10.0, 4);
        assert!((mu_r_bar - 4.0).abs() < 1e-5);
        let d = SQRT_3 * 4.0;
        let raw = 2.0 + 4.0 * (2.0 as Float).powf(1.0 / (d * 4.0) - 1.0);
        assert!((mu_c - raw.max(2.0).min(3.0)).abs() < 1e-5);

        // a tiny residual saturates the exponent and clamps to the average
        let flat = BlockStats { min: 0.5, max: 0.5, avg: 0.5 };
        let (mu_c, mu_r_bar) = residual_coefficients(&flat, 1e-3, 1);
        assert!((mu_r_bar - 0.1).abs() < 1e-7);
        assert!(mu_c.is_finite());
        assert!((mu_c - 0.5e-3).abs() < 1e-7);
    }

    #[test]
    fn test_residual_majorant_bounds_every_block() {
        let rng = fastrand::Rng::with_seed(21);
        let extinction = [1024.0, 64.0, 0.5];
        for _ in 0..8 {
            let dims = [rng.usize(1..14), rng.usize(1..14), rng.usize(1..14)];
            let field = DensityField::from_fn(dims, |_, _, _| if rng.bool() { 0.0 } else { rng.f32() }).unwrap();
            let opts = options(4, GridInterpolation::Stochastic, BorderMode::ClampToZero,
                               BlockSizePolicy::HalveWhenOversized);
            let grid = MajorantGrid::build(&field, &opts, MajorantKind::ResidualRatio,
                                           Vector3f::new(extinction[0], extinction[1], extinction[2])).unwrap();
            let grid = match grid {
                MajorantGrid::ResidualRatio(grid) => grid,
                _ => panic!("wrong grid kind"),
            };
            for block in 0..grid.layout().num_blocks() {
                let max = grid.scan().stats()[block].max;
                for channel in 0..3 {
                    // control collisions below mu_min need no lookup, and the
                    // combined rate must bound every reachable extinction
                    assert!(grid.mu_min(block, channel) <= grid.mu_c(block, channel));
                    let total = grid.mu_c(block, channel) + grid.mu_r_bar(block, channel);
                    assert!(total >= max * extinction[channel] * (1.0 - 1e-5));
                }
            }
        }
    }

    #[test]
    fn test_set_extinction_matches_fresh_build() {
        let field = DensityField::from_fn([12, 12, 12], |x, y, z| ((x * y + z) % 7) as Float / 7.0).unwrap();
        let opts = options(4, GridInterpolation::Trilinear, BorderMode::ClampToZero,
                           BlockSizePolicy::HalveUntilDivisible);
        let mut updated = MajorantGrid::build(&field, &opts, MajorantKind::ResidualRatio,
                                              Vector3f::new(1.0, 1.0, 1.0)).unwrap();
        let before = updated.scan().stats().to_vec();
        updated.set_extinction(Vector3f::new(16.0, 8.0, 4.0));
        let fresh = MajorantGrid::build(&field, &opts, MajorantKind::ResidualRatio,
                                        Vector3f::new(16.0, 8.0, 4.0)).unwrap();
        assert_eq!(updated.scan().stats(), &before[..]);
        match (&updated, &fresh) {
            (MajorantGrid::ResidualRatio(a), MajorantGrid::ResidualRatio(b)) => {
                for block in 0..a.layout().num_blocks() {
                    for channel in 0..3 {
                        assert_eq!(a.mu_c(block, channel), b.mu_c(block, channel));
                        assert_eq!(a.mu_r_bar(block, channel), b.mu_r_bar(block, channel));
                    }
                }
            }
            _ => panic!("wrong grid kind"),
        }
    }

    #[test]
    fn test_scan_independent_of_thread_count() {
        let field = DensityField::from_fn([16, 12, 8], |x, y, z| ((x * 13 + y * 7 + z * 3) % 11) as Float / 10.0).unwrap();
        let opts = options(4, GridInterpolation::Stochastic, BorderMode::ClampToZero,
                           BlockSizePolicy::HalveUntilDivisible);
        let run = |threads: usize| {
            rayon::ThreadPoolBuilder::new().num_threads(threads).build().unwrap()
                .install(|| scan(&field, &opts).unwrap().stats().to_vec())
        };
        assert_eq!(run(1), run(4));
    }

    #[test]
    fn test_majorant_is_conservative() {
        let mut rd = fastrand::Rng::with_seed(2024);
        let interpolations = [GridInterpolation::Nearest, GridInterpolation::Stochastic, GridInterpolation::Trilinear];
        let borders = [BorderMode::ClampToZero, BorderMode::ClampToEdge];
        let policies = [BlockSizePolicy::HalveUntilDivisible, BlockSizePolicy::HalveWhenOversized];
        let sizes = [1usize, 2, 3, 4, 8, 16];

        for _ in 0..60 {
            let dims = [rd.usize(1..14), rd.usize(1..14), rd.usize(1..14)];
            let sparse_chance = rd.f32();
            let data: Vec<Float> = (0..dims[0] * dims[1] * dims[2])
                .map(|_| if rd.f32() < sparse_chance { 0.0 } else { rd.f32() })
                .collect();
            let field = DensityField::new(dims, data).unwrap();

            for interpolation in interpolations.iter() {
                for border in borders.iter() {
                    let policy = policies[rd.usize(0..2)];
                    let opts = options(sizes[rd.usize(0..sizes.len())], *interpolation, *border, policy);
                    let scanned = scan(&field, &opts).unwrap();
                    let layout = scanned.layout();
                    for _ in 0..200 {
                        let v = Vector3f::new(rd.f32() * dims[0] as Float,
                                              rd.f32() * dims[1] as Float,
                                              rd.f32() * dims[2] as Float);
                        let value = match interpolation {
                            GridInterpolation::Nearest => field.lookup_nearest(&v),
                            GridInterpolation::Trilinear => field.lookup_trilinear(&v, *border),
                            GridInterpolation::Stochastic => {
                                let jitter = Vector3f::new(rd.f32(), rd.f32(), rd.f32());
                                field.lookup_stochastic(&v, &jitter, *border)
                            }
                        };
                        let stats = scanned.stats()[layout.block_of_voxel(&v)];
                        assert!(value >= stats.min - 1e-6 && value <= stats.max + 1e-6,
                                "{:?} {:?} dims {:?} size {}: {} outside [{}, {}]",
                                interpolation, border, dims, layout.block_size(), value, stats.min, stats.max);
                    }
                }
            }
        }
    }

    #[test]
    fn test_free_flight_walk() {
        let field = cloud_block(16, 8, 8, 1.0, false).unwrap();
        let scanned = scan(&field, &options(8, GridInterpolation::Nearest, BorderMode::ClampToZero,
                                            BlockSizePolicy::HalveUntilDivisible)).unwrap();
        let layout = scanned.layout();
        assert_eq!(layout.grid_dims(), [2, 1, 1]);

        // the box spans x in [-0.25, 0.25]; block 0 covers the negative half
        let origin = Vector3f::new(-0.25, 0.0, 0.0);
        let dir = Vector3f::new(1.0, 0.0, 0.0);
        let rates = |block: usize| if block == 0 { 2.0 } else { 6.0 };

        let (t, block) = layout.sample_free_flight(&origin, &dir, 0.5, 0.1, rates).unwrap();
        assert_eq!(block, 0);
        assert!((t - 0.05).abs() < 1e-5);

        // 0.5 depth in the first block, then 0.1 / 6 into the second
        let (t, block) = layout.sample_free_flight(&origin, &dir, 0.5, 0.6, rates).unwrap();
        assert_eq!(block, 1);
        assert!((t - (0.25 + 0.1 / 6.0)).abs() < 1e-5);

        assert!(layout.sample_free_flight(&origin, &dir, 0.5, 3.0, rates).is_none());

        // empty first block is skipped entirely
        let (t, block) = layout.sample_free_flight(&origin, &dir, 0.5, 0.6,
                                                   |b| if b == 0 { 0.0 } else { 6.0 }).unwrap();
        assert_eq!(block, 1);
        assert!((t - 0.35).abs() < 1e-5);
    }
}
