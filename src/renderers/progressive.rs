// Copyright @yucwang 2026

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

use indicatif::{ProgressBar, ProgressStyle};

use crate::core::environment::Environment;
use crate::core::error::RenderError;
use crate::core::rng::RandomStream;
use crate::core::sensor::Sensor;
use crate::core::settings::RenderSettings;
use crate::integrators::trajectory::{trace_trajectories, TrajectoryRecorder};
use crate::integrators::volpath::{NoopObserver, TransportScene, VolumetricPathTracer};
use crate::integrators::{CollisionPolicy, TrackingMode};
use crate::math::bitmap::Bitmap;
use crate::math::constants::{Float, Vector2f, Vector3f};
use crate::renderers::accumulator::{FrameAccumulator, FrameBuffer};
use crate::volumes::density_field::DensityField;
use crate::volumes::super_voxel_grid::{GridOptions, MajorantGrid, MajorantKind};
use crate::volumes::{BorderMode, GridInterpolation};

const TILE_SIZE: usize = 32;

type TileResult = Result<(usize, usize, FrameBuffer), RenderError>;

/// A render session. Owns the medium, its majorant grid and the accumulated
/// image, and keeps them consistent when parameters change.
pub struct ProgressiveRenderer {
    settings: RenderSettings,
    field: DensityField,
    grid: Option<MajorantGrid>,
    grid_key: Option<(GridOptions, MajorantKind)>,
    camera: Box<dyn Sensor>,
    environment: Box<dyn Environment>,
    accumulator: FrameAccumulator,
    frame_index: u32,
}

impl ProgressiveRenderer {
    pub fn new(settings: RenderSettings,
               field: DensityField,
               camera: Box<dyn Sensor>,
               environment: Box<dyn Environment>) -> Result<Self, RenderError> {
        settings.validate()?;
        let accumulator = FrameAccumulator::new(settings.width, settings.height, &settings.features.kinds())?;
        let mut renderer = Self {
            settings,
            field,
            grid: None,
            grid_key: None,
            camera,
            environment,
            accumulator,
            frame_index: 0,
        };
        renderer.sync_grid()?;
        log::info!("Render session: {}, {}, {:?} tracking.",
                   renderer.camera.describe(), renderer.environment.describe(), renderer.settings.tracking_mode);
        Ok(renderer)
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn density_field(&self) -> &DensityField {
        &self.field
    }

    pub fn majorant_grid(&self) -> Option<&MajorantGrid> {
        self.grid.as_ref()
    }

    pub fn accumulator(&self) -> &FrameAccumulator {
        &self.accumulator
    }

    pub fn sample_count(&self) -> u64 {
        self.accumulator.sample_count()
    }

    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    pub fn is_converged(&self) -> bool {
        self.accumulator.sample_count() >= self.settings.target_samples as u64
    }

    pub fn image(&self) -> Bitmap {
        self.accumulator.image()
    }

    /// Drops the accumulated image. The next frame starts from sample zero.
    pub fn reset(&mut self) {
        self.accumulator.reset();
        self.frame_index = 0;
    }

    /// Applies a settings change. Invalid settings leave the session untouched.
    /// The majorant grid is rebuilt only when its options or kind change, an
    /// extinction change only recomputes the derived residual coefficients.
    pub fn update_settings<F: FnOnce(&mut RenderSettings)>(&mut self, f: F) -> Result<(), RenderError> {
        let mut settings = self.settings.clone();
        f(&mut settings);
        settings.validate()?;

        let film_changed = settings.width != self.settings.width
            || settings.height != self.settings.height
            || settings.features != self.settings.features;
        let accumulator = if film_changed {
            Some(FrameAccumulator::new(settings.width, settings.height, &settings.features.kinds())?)
        } else {
            None
        };
        let previous = std::mem::replace(&mut self.settings, settings);
        if let Err(e) = self.sync_grid() {
            self.settings = previous;
            return Err(e);
        }
        if let Some(accumulator) = accumulator {
            self.accumulator = accumulator;
        }
        self.reset();
        Ok(())
    }

    pub fn set_tracking_mode(&mut self, mode: TrackingMode) -> Result<(), RenderError> {
        self.update_settings(|s| s.tracking_mode = mode)
    }

    pub fn set_collision_policy(&mut self, policy: CollisionPolicy) -> Result<(), RenderError> {
        self.update_settings(|s| s.collision_policy = policy)
    }

    pub fn set_interpolation(&mut self, interpolation: GridInterpolation) -> Result<(), RenderError> {
        self.update_settings(|s| s.interpolation = interpolation)
    }

    pub fn set_border(&mut self, border: BorderMode) -> Result<(), RenderError> {
        self.update_settings(|s| s.border = border)
    }

    pub fn set_block_size(&mut self, block_size: usize) -> Result<(), RenderError> {
        self.update_settings(|s| s.block_size = block_size)
    }

    pub fn set_extinction(&mut self, scale: Float, base: Vector3f) -> Result<(), RenderError> {
        self.update_settings(|s| {
            s.extinction_scale = scale;
            s.extinction_base = base;
        })
    }

    pub fn set_albedo(&mut self, albedo: Vector3f) -> Result<(), RenderError> {
        self.update_settings(|s| s.albedo = albedo)
    }

    pub fn set_phase_g(&mut self, g: Float) -> Result<(), RenderError> {
        self.update_settings(|s| s.phase_g = g)
    }

    pub fn set_seed_offset(&mut self, seed_offset: u32) -> Result<(), RenderError> {
        self.update_settings(|s| s.seed_offset = seed_offset)
    }

    /// Replaces the medium data. The grid is always rescanned, and a failed
    /// scan keeps the previous field, grid and image.
    pub fn set_density_field(&mut self, field: DensityField) -> Result<(), RenderError> {
        let (grid, grid_key) = match self.settings.tracking_mode.majorant_kind() {
            Some(kind) => {
                let key = (self.settings.grid_options(), kind);
                let grid = MajorantGrid::build(&field, &key.0, kind, self.settings.extinction())?;
                (Some(grid), Some(key))
            }
            None => (None, None),
        };
        self.field = field;
        self.grid = grid;
        self.grid_key = grid_key;
        self.reset();
        Ok(())
    }

    /// Moves the camera. A camera with a different film size reallocates the
    /// accumulator.
    pub fn set_camera(&mut self, camera: Box<dyn Sensor>) -> Result<(), RenderError> {
        let (width, height) = (camera.width(), camera.height());
        if width != self.settings.width || height != self.settings.height {
            self.update_settings(|s| {
                s.width = width;
                s.height = height;
            })?;
        }
        self.camera = camera;
        self.reset();
        Ok(())
    }

    pub fn set_environment(&mut self, environment: Box<dyn Environment>) {
        self.environment = environment;
        self.reset();
    }

    fn sync_grid(&mut self) -> Result<(), RenderError> {
        let kind = match self.settings.tracking_mode.majorant_kind() {
            Some(kind) => kind,
            None => {
                self.grid = None;
                self.grid_key = None;
                return Ok(());
            }
        };
        let key = (self.settings.grid_options(), kind);
        let extinction = self.settings.extinction();

        if self.grid_key == Some(key) {
            if let Some(grid) = self.grid.as_mut() {
                grid.set_extinction(extinction);
                return Ok(());
            }
        }

        log::debug!("Rebuilding {:?} majorant grid for {:?}.", kind, key.0);
        let grid = MajorantGrid::build(&self.field, &key.0, kind, extinction)?;
        self.grid = Some(grid);
        self.grid_key = Some(key);
        Ok(())
    }

    fn tracer(&self) -> VolumetricPathTracer {
        VolumetricPathTracer::new(self.settings.tracking_mode,
                                  self.settings.collision_policy,
                                  self.settings.medium_params())
    }

    fn thread_count(&self) -> usize {
        self.settings.threads
            .unwrap_or_else(|| thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
            .max(1)
    }

    /// Renders one frame of up to `samples_per_frame` samples per pixel and
    /// folds it into the accumulator. Returns the number of samples added.
    pub fn render_frame(&mut self) -> Result<u32, RenderError> {
        let remaining = (self.settings.target_samples as u64).saturating_sub(self.accumulator.sample_count());
        if remaining == 0 {
            return Ok(0);
        }
        let spp = (self.settings.samples_per_frame as u64).min(remaining) as u32;
        let (width, height) = (self.settings.width, self.settings.height);
        let kinds = self.settings.features.kinds();
        let mut frame = FrameBuffer::new(width, height, &kinds)?;

        let tracer = self.tracer();
        let scene = TransportScene {
            field: &self.field,
            grid: self.grid.as_ref(),
            environment: self.environment.as_ref(),
        };
        let camera: &dyn Sensor = self.camera.as_ref();
        let first_sample = self.accumulator.sample_count() as u32;
        let frame_index = self.frame_index;
        let seed_offset = self.settings.seed_offset;
        let inv_spp = 1.0 / spp as Float;

        let tiles_x = (width + TILE_SIZE - 1) / TILE_SIZE;
        let tiles_y = (height + TILE_SIZE - 1) / TILE_SIZE;
        let total_tiles = tiles_x * tiles_y;
        let next_tile = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel::<TileResult>();
        let mut failure: Option<RenderError> = None;

        thread::scope(|scope| {
            for _ in 0..self.thread_count() {
                let tx = tx.clone();
                let next_tile = &next_tile;
                let tracer = &tracer;
                let scene = &scene;
                let kinds = &kinds;
                scope.spawn(move || {
                    loop {
                        let tile_index = next_tile.fetch_add(1, Ordering::Relaxed);
                        if tile_index >= total_tiles {
                            break;
                        }

                        let x0 = (tile_index % tiles_x) * TILE_SIZE;
                        let y0 = (tile_index / tiles_x) * TILE_SIZE;
                        let x1 = (x0 + TILE_SIZE).min(width);
                        let y1 = (y0 + TILE_SIZE).min(height);

                        let result = FrameBuffer::new(x1 - x0, y1 - y0, kinds).map(|mut tile| {
                            for y in y0..y1 {
                                for x in x0..x1 {
                                    let pixel_index = (x + y * width) as u32;
                                    let local = (x - x0) + (y - y0) * (x1 - x0);
                                    for s in 0..spp {
                                        let mut rng = RandomStream::for_path(pixel_index, first_sample + s,
                                                                             frame_index, seed_offset);
                                        let jitter = rng.next_2d();
                                        let film = Vector2f::new((x as Float + jitter.x) / width as Float,
                                                                 (y as Float + jitter.y) / height as Float);
                                        let ray = camera.sample_ray(&film);
                                        let sample = tracer.trace(scene, &ray, &mut rng, &mut NoopObserver);
                                        tile.add_path(local, &sample, inv_spp);
                                    }
                                }
                            }
                            (x0, y0, tile)
                        });
                        if tx.send(result).is_err() {
                            break;
                        }
                    }
                });
            }

            drop(tx);
            for result in rx.iter() {
                match result {
                    Ok((x0, y0, tile)) => frame.blit(&tile, x0, y0),
                    Err(e) => {
                        failure.get_or_insert(e);
                    }
                }
            }
        });

        if let Some(e) = failure {
            return Err(e);
        }
        self.accumulator.accumulate(&frame, spp);
        self.frame_index += 1;
        log::debug!("Frame {} done, {} samples per pixel accumulated.", self.frame_index, self.sample_count());
        Ok(spp)
    }

    /// Renders frames until the target sample count is reached.
    pub fn render(&mut self) -> Result<Bitmap, RenderError> {
        let target = self.settings.target_samples as u64;
        let progress = ProgressBar::new(target);
        progress.set_style(
            ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} samples")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        progress.set_position(self.sample_count().min(target));

        while !self.is_converged() {
            let added = self.render_frame()?;
            progress.inc(added as u64);
        }
        progress.finish_and_clear();
        log::info!("Rendered {} samples per pixel in {} frames.", self.sample_count(), self.frame_index);
        Ok(self.image())
    }

    /// Records `num_paths` random walks through the centre of pixel `(x, y)`.
    pub fn trace_pixel_trajectories(&self, x: usize, y: usize, num_paths: u32) -> TrajectoryRecorder {
        let film = Vector2f::new((x as Float + 0.5) / self.settings.width as Float,
                                 (y as Float + 0.5) / self.settings.height as Float);
        let ray = self.camera.sample_ray(&film);
        let scene = TransportScene {
            field: &self.field,
            grid: self.grid.as_ref(),
            environment: self.environment.as_ref(),
        };
        trace_trajectories(&self.tracer(), &scene, &ray, num_paths, self.settings.seed_offset)
    }
}
