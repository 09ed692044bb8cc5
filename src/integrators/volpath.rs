// Copyright @yucwang 2026

use crate::core::environment::Environment;
use crate::core::phase::HenyeyGreenstein;
use crate::core::rng::RandomStream;
use crate::integrators::{CollisionPolicy, TrackingMode};
use crate::math::constants::{Float, Vector3f, DENSITY_EPSILON, LOG_CLAMP};
use crate::math::ray::Ray3f;
use crate::volumes::density_field::DensityField;
use crate::volumes::super_voxel_grid::{DecompositionGrid, MajorantGrid, ResidualRatioGrid};
use crate::volumes::{BorderMode, GridInterpolation};

/// Optical properties of the medium filling the density field.
#[derive(Debug, Clone, Copy)]
pub struct MediumParams {
    /// Per-channel extinction for a density of one.
    pub extinction: Vector3f,
    pub albedo: Vector3f,
    pub phase: HenyeyGreenstein,
    pub interpolation: GridInterpolation,
    pub border: BorderMode,
}

impl MediumParams {
    pub fn is_grey(&self) -> bool {
        self.extinction.x == self.extinction.y && self.extinction.x == self.extinction.z
            && self.albedo.x == self.albedo.y && self.albedo.x == self.albedo.z
    }
}

/// Shared read-only data of one render dispatch.
pub struct TransportScene<'a> {
    pub field: &'a DensityField,
    pub grid: Option<&'a MajorantGrid>,
    pub environment: &'a dyn Environment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Absorbed,
    ExitedDomain,
}

#[derive(Debug, Clone)]
pub struct PathSample {
    pub radiance: Vector3f,
    pub termination: Termination,
    pub exit_direction: Option<Vector3f>,
    /// Position and outgoing direction of the first scattering event.
    pub first_scatter: Option<(Vector3f, Vector3f)>,
    /// Depth of the first real collision along the camera ray, relative to
    /// the clipped segment. One when the ray leaves without colliding.
    pub primary_depth: Float,
    /// Same along the first scattered ray.
    pub scatter_depth: Option<Float>,
    pub scatter_count: u32,
}

/// Hooks into the random walk. The render kernel uses `NoopObserver`.
pub trait PathObserver {
    fn on_vertex(&mut self, _position: &Vector3f, _weights: &Vector3f) {}
    fn on_terminate(&mut self, _position: &Vector3f, _exit_direction: Option<&Vector3f>) {}
}

pub struct NoopObserver;

impl PathObserver for NoopObserver {}

struct PathState {
    position: Vector3f,
    direction: Vector3f,
    remaining: Float,
    /// Channel that drives the scalar modes; `None` for spectral tracking.
    channel: Option<usize>,
    weights: Vector3f,
    segment: u32,
    segment_length: Float,
    segment_traveled: Float,
}

enum Strategy<'a> {
    Delta { majorant: Float },
    Spectral { majorant: Float },
    Ratio { majorant: Float },
    Decomposition(&'a DecompositionGrid),
    ResidualRatio(&'a ResidualRatioGrid),
}

enum Collision {
    Absorb,
    Scatter,
    Null,
}

pub struct VolumetricPathTracer {
    mode: TrackingMode,
    policy: CollisionPolicy,
    medium: MediumParams,
}

impl VolumetricPathTracer {
    pub fn new(mode: TrackingMode, policy: CollisionPolicy, medium: MediumParams) -> Self {
        Self { mode, policy, medium }
    }

    pub fn mode(&self) -> TrackingMode {
        self.mode
    }

    pub fn medium(&self) -> &MediumParams {
        &self.medium
    }

    fn strategy<'a>(&self, scene: &TransportScene<'a>, channel: Option<usize>) -> Strategy<'a> {
        let peak = scene.field.max_density().max(1.0);
        let extinction = match channel {
            Some(c) => self.medium.extinction[c],
            None => self.medium.extinction.max(),
        };
        match (self.mode, scene.grid) {
            (TrackingMode::Decomposition, Some(MajorantGrid::Decomposition(grid))) => Strategy::Decomposition(grid),
            (TrackingMode::ResidualRatio, Some(MajorantGrid::ResidualRatio(grid))) => Strategy::ResidualRatio(grid),
            (mode, _) if mode.is_spectral() => Strategy::Spectral { majorant: extinction * peak },
            (TrackingMode::Ratio, _) => Strategy::Ratio { majorant: extinction * peak },
            (mode, _) => {
                if !matches!(mode, TrackingMode::Delta | TrackingMode::NextEvent) {
                    log::warn!("{:?} tracking without a matching majorant grid, using delta tracking.", mode);
                }
                Strategy::Delta { majorant: extinction * peak }
            }
        }
    }

    /// Traces one camera ray through the medium and returns its radiance sample.
    pub fn trace<O: PathObserver>(&self, scene: &TransportScene, ray: &Ray3f,
                                  rng: &mut RandomStream, observer: &mut O) -> PathSample {
        let mut sample = PathSample {
            radiance: Vector3f::zeros(),
            termination: Termination::ExitedDomain,
            exit_direction: None,
            first_scatter: None,
            primary_depth: 1.0,
            scatter_depth: None,
            scatter_count: 0,
        };

        let (t_enter, t_exit) = match scene.field.bbox().clip(&ray.origin(), &ray.dir()) {
            Some(range) => range,
            None => {
                let dir = ray.dir();
                sample.radiance = scene.environment.radiance(&dir);
                sample.exit_direction = Some(dir);
                observer.on_terminate(&ray.origin(), Some(&dir));
                return sample;
            }
        };

        // Chromatic media in scalar modes track one channel per path and
        // scale it by the channel count.
        let (channel, weights) = if self.mode.is_spectral() {
            (None, Vector3f::new(1.0, 1.0, 1.0))
        } else if self.medium.is_grey() {
            (Some(0), Vector3f::new(1.0, 1.0, 1.0))
        } else {
            let c = ((rng.next_float() * 3.0) as usize).min(2);
            let mut w = Vector3f::zeros();
            w[c] = 3.0;
            (Some(c), w)
        };

        let strategy = self.strategy(scene, channel);
        let shadow_majorant = match strategy {
            Strategy::Delta { majorant } | Strategy::Spectral { majorant } if self.mode.uses_next_event() => {
                Some(majorant)
            }
            _ => None,
        };
        let mut state = PathState {
            position: ray.at(t_enter),
            direction: ray.dir(),
            remaining: t_exit - t_enter,
            channel,
            weights,
            segment: 0,
            segment_length: t_exit - t_enter,
            segment_traveled: 0.0,
        };
        observer.on_vertex(&state.position, &state.weights);

        loop {
            let collision = match self.advance(&strategy, &state, rng) {
                Some(collision) => collision,
                None => {
                    state.position += state.direction * state.remaining;
                    self.record_depth(&mut sample, &state, None);
                    // after a scattering event the light was already sampled explicitly
                    let environment = if shadow_majorant.is_some() && sample.scatter_count > 0 {
                        scene.environment.background(&state.direction)
                    } else {
                        scene.environment.radiance(&state.direction)
                    };
                    sample.radiance += state.weights.component_mul(&environment);
                    sample.exit_direction = Some(state.direction);
                    sample.termination = Termination::ExitedDomain;
                    observer.on_terminate(&state.position, Some(&state.direction));
                    break;
                }
            };

            let (t, block) = collision;
            state.position += state.direction * t;
            state.remaining -= t;
            state.segment_traveled += t;

            let event = match self.classify(&strategy, scene, &mut state, block, rng) {
                // a zero weight can never contribute again
                _ if state.weights == Vector3f::zeros() => Collision::Absorb,
                event => event,
            };
            match event {
                Collision::Null => {}
                Collision::Absorb => {
                    self.record_depth(&mut sample, &state, Some(state.segment_traveled));
                    sample.termination = Termination::Absorbed;
                    observer.on_terminate(&state.position, None);
                    break;
                }
                Collision::Scatter => {
                    self.record_depth(&mut sample, &state, Some(state.segment_traveled));
                    if let Some(majorant) = shadow_majorant {
                        sample.radiance += self.estimate_light(scene, majorant, &state, rng);
                    }
                    let direction = self.medium.phase.sample(&state.direction, rng);
                    if sample.first_scatter.is_none() {
                        sample.first_scatter = Some((state.position, direction));
                    }
                    sample.scatter_count += 1;
                    state.direction = direction;
                    let remaining = scene.field.bbox().clip(&state.position, &direction)
                        .map(|(t0, t1)| (t1 - t0).max(0.0))
                        .unwrap_or(0.0);
                    state.remaining = remaining;
                    state.segment += 1;
                    state.segment_length = remaining;
                    state.segment_traveled = 0.0;
                    observer.on_vertex(&state.position, &state.weights);
                }
            }
        }

        if !sample.radiance.iter().all(|v| v.is_finite()) {
            sample.radiance = Vector3f::zeros();
            sample.termination = Termination::Absorbed;
        }
        sample
    }

    /// Depth features of the first real collision on the first two segments.
    fn record_depth(&self, sample: &mut PathSample, state: &PathState, traveled: Option<Float>) {
        let depth = match traveled {
            Some(t) if state.segment_length > 0.0 => (t / state.segment_length).min(1.0),
            Some(_) => 0.0,
            None => 1.0,
        };
        match state.segment {
            0 if sample.scatter_count == 0 => sample.primary_depth = depth,
            1 if sample.scatter_depth.is_none() => sample.scatter_depth = Some(depth),
            _ => {}
        }
    }

    /// Light arriving at a scattering vertex from the environment's explicit
    /// light, attenuated along a ratio tracked shadow ray.
    fn estimate_light(&self, scene: &TransportScene, majorant: Float, state: &PathState,
                      rng: &mut RandomStream) -> Vector3f {
        let u = rng.next_2d();
        let light = match scene.environment.sample_light(&u) {
            Some(light) if light.pdf > 0.0 => light,
            _ => return Vector3f::zeros(),
        };
        let phase = self.medium.phase.eval(state.direction.dot(&light.direction));
        let transmittance = self.shadow_transmittance(scene, majorant, &state.position,
                                                      &light.direction, state.channel, rng);
        state.weights.component_mul(&transmittance).component_mul(&light.radiance) * (phase / light.pdf)
    }

    /// Ratio tracking estimate of the transmittance from `origin` to the
    /// domain boundary. Scalar modes only attenuate their tracked channel.
    fn shadow_transmittance(&self, scene: &TransportScene, majorant: Float, origin: &Vector3f,
                            direction: &Vector3f, channel: Option<usize>,
                            rng: &mut RandomStream) -> Vector3f {
        let mut transmittance = Vector3f::repeat(1.0);
        let mut remaining = match scene.field.bbox().clip(origin, direction) {
            Some((t0, t1)) => (t1 - t0).max(0.0),
            None => return transmittance,
        };
        if majorant < DENSITY_EPSILON {
            return transmittance;
        }

        let mut position = *origin;
        loop {
            let tau = -(1.0 - rng.next_float()).max(LOG_CLAMP).ln();
            let t = tau / majorant;
            if t >= remaining {
                return transmittance;
            }
            position += direction * t;
            remaining -= t;

            let density = self.density(scene, &position, rng);
            match channel {
                Some(c) => {
                    let survive = (1.0 - density * self.medium.extinction[c] / majorant).max(0.0);
                    transmittance *= survive;
                }
                None => {
                    for c in 0..3 {
                        transmittance[c] *= (1.0 - density * self.medium.extinction[c] / majorant).max(0.0);
                    }
                }
            }
            if transmittance == Vector3f::zeros() {
                return transmittance;
            }
        }
    }

    /// Samples the distance to the next tentative collision, or `None` when
    /// the path leaves the domain first.
    fn advance(&self, strategy: &Strategy, state: &PathState,
               rng: &mut RandomStream) -> Option<(Float, Option<usize>)> {
        let tau = -(1.0 - rng.next_float()).max(LOG_CLAMP).ln();
        let channel = state.channel.unwrap_or(0);
        match *strategy {
            Strategy::Delta { majorant } | Strategy::Spectral { majorant } | Strategy::Ratio { majorant } => {
                if majorant < DENSITY_EPSILON {
                    return None;
                }
                let t = tau / majorant;
                if t >= state.remaining {
                    None
                } else {
                    Some((t, None))
                }
            }
            Strategy::Decomposition(grid) => {
                let extinction = self.medium.extinction[channel];
                grid.layout().sample_free_flight(&state.position, &state.direction, state.remaining, tau, |block| {
                    if grid.is_occupied(block) { grid.bounds(block).1 * extinction } else { 0.0 }
                }).map(|(t, block)| (t, Some(block)))
            }
            Strategy::ResidualRatio(grid) => {
                grid.layout().sample_free_flight(&state.position, &state.direction, state.remaining, tau, |block| {
                    if grid.is_occupied(block) {
                        grid.mu_c(block, channel) + grid.mu_r_bar(block, channel)
                    } else {
                        0.0
                    }
                }).map(|(t, block)| (t, Some(block)))
            }
        }
    }

    fn density(&self, scene: &TransportScene, position: &Vector3f, rng: &mut RandomStream) -> Float {
        scene.field.lookup(position, self.medium.interpolation, self.medium.border, rng)
    }

    fn classify(&self, strategy: &Strategy, scene: &TransportScene, state: &mut PathState,
                block: Option<usize>, rng: &mut RandomStream) -> Collision {
        let channel = state.channel.unwrap_or(0);
        let albedo = self.medium.albedo[channel];
        let extinction = self.medium.extinction[channel];

        match *strategy {
            Strategy::Delta { majorant } => {
                let mu_t = self.density(scene, &state.position, rng) * extinction;
                let mu_a = mu_t * (1.0 - albedo);
                let xi = rng.next_float();
                if xi < mu_a / majorant {
                    Collision::Absorb
                } else if xi < mu_t / majorant {
                    Collision::Scatter
                } else {
                    Collision::Null
                }
            }
            Strategy::Spectral { majorant } => {
                let density = self.density(scene, &state.position, rng);
                self.classify_spectral(majorant, density, state, rng)
            }
            Strategy::Ratio { majorant } => {
                let mu_t = self.density(scene, &state.position, rng) * extinction;
                let mu_s = mu_t * albedo;
                let mu_a = mu_t - mu_s;
                let survive = (majorant - mu_a).max(0.0);
                state.weights *= survive / majorant;
                if survive <= 0.0 {
                    return Collision::Absorb;
                }
                if rng.next_float() < mu_s / survive {
                    Collision::Scatter
                } else {
                    Collision::Null
                }
            }
            Strategy::Decomposition(grid) => {
                let (density_min, density_max) = match block {
                    Some(b) => grid.bounds(b),
                    None => return Collision::Null,
                };
                let mu_min = density_min * extinction;
                let mu_max = density_max * extinction;
                if rng.next_float() * mu_max < mu_min {
                    // control component, homogeneous inside the block
                    return if rng.next_float() < albedo { Collision::Scatter } else { Collision::Absorb };
                }
                let residual = (self.density(scene, &state.position, rng) * extinction - mu_min).max(0.0);
                let residual_bound = mu_max - mu_min;
                let xi = rng.next_float() * residual_bound;
                if xi < residual * (1.0 - albedo) {
                    Collision::Absorb
                } else if xi < residual {
                    Collision::Scatter
                } else {
                    Collision::Null
                }
            }
            Strategy::ResidualRatio(grid) => {
                let b = match block {
                    Some(b) => b,
                    None => return Collision::Null,
                };
                let mu_c = grid.mu_c(b, channel);
                let mu_r_bar = grid.mu_r_bar(b, channel);
                let xi = rng.next_float() * (mu_c + mu_r_bar);
                if xi < mu_c {
                    // Control collision. Below the block minimum it is real
                    // everywhere; above it the medium may be thinner than mu_c.
                    let real = xi < grid.mu_min(b, channel)
                        || xi < self.density(scene, &state.position, rng) * extinction;
                    if !real {
                        return Collision::Null;
                    }
                    return if rng.next_float() < albedo { Collision::Scatter } else { Collision::Absorb };
                }
                // Residual collision: absorption is ratio tracked, scattering sampled.
                let mu_t = self.density(scene, &state.position, rng) * extinction;
                let residual = (mu_t - mu_c).max(0.0).min(mu_r_bar);
                let survive = mu_r_bar - residual * (1.0 - albedo);
                state.weights *= survive / mu_r_bar;
                if rng.next_float() * survive < residual * albedo {
                    Collision::Scatter
                } else {
                    Collision::Null
                }
            }
        }
    }

    fn classify_spectral(&self, majorant: Float, density: Float, state: &mut PathState,
                         rng: &mut RandomStream) -> Collision {
        let mu_t = self.medium.extinction * density;
        let mu_s = mu_t.component_mul(&self.medium.albedo);
        let mu_a = mu_t - mu_s;
        let mu_n = Vector3f::repeat(majorant) - mu_t;

        let (p_a, p_s, p_n) = match self.policy {
            CollisionPolicy::MaxBased => (mu_a.max(), mu_s.max(), mu_n.abs().max()),
            CollisionPolicy::AvgBased => (mu_a.mean(), mu_s.mean(), mu_n.abs().mean()),
            CollisionPolicy::PathHistoryAvgBased => (
                state.weights.component_mul(&mu_a).abs().mean(),
                state.weights.component_mul(&mu_s).abs().mean(),
                state.weights.component_mul(&mu_n).abs().mean(),
            ),
        };
        let total = p_a + p_s + p_n;
        if total <= 0.0 {
            return Collision::Absorb;
        }
        let (p_a, p_s, p_n) = (p_a / total, p_s / total, p_n / total);

        let xi = rng.next_float();
        if xi < p_a {
            Collision::Absorb
        } else if xi < p_a + p_s || p_n <= 0.0 {
            state.weights = state.weights.component_mul(&mu_s) / (majorant * p_s);
            Collision::Scatter
        } else {
            state.weights = state.weights.component_mul(&mu_n) / (majorant * p_n);
            Collision::Null
        }
    }
}
