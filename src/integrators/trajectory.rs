// Copyright @yucwang 2026

use image::{Rgb, RgbImage};

use crate::core::rng::RandomStream;
use crate::integrators::volpath::{PathObserver, TransportScene, VolumetricPathTracer};
use crate::math::constants::{Float, Vector3f};
use crate::math::ray::Ray3f;
use crate::math::warp::direction_to_equirect;

/// Polyline of one random walk with the mean path weight at each vertex.
#[derive(Debug, Clone, Default)]
pub struct Trajectory {
    pub positions: Vec<Vector3f>,
    pub attributes: Vec<Float>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct TrajectoryRecorder {
    current: Trajectory,
    pub trajectories: Vec<Trajectory>,
    pub exit_directions: Vec<Vector3f>,
}

impl TrajectoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PathObserver for TrajectoryRecorder {
    fn on_vertex(&mut self, position: &Vector3f, weights: &Vector3f) {
        self.current.positions.push(*position);
        self.current.attributes.push(weights.mean());
    }

    fn on_terminate(&mut self, position: &Vector3f, exit_direction: Option<&Vector3f>) {
        let attribute = self.current.attributes.last().cloned().unwrap_or(1.0);
        self.current.positions.push(*position);
        self.current.attributes.push(attribute);
        if let Some(dir) = exit_direction {
            self.exit_directions.push(*dir);
        }
        self.trajectories.push(std::mem::take(&mut self.current));
    }
}

/// Runs `num_paths` walks along the same camera ray on the calling thread.
pub fn trace_trajectories(tracer: &VolumetricPathTracer, scene: &TransportScene, ray: &Ray3f,
                          num_paths: u32, seed_offset: u32) -> TrajectoryRecorder {
    let mut recorder = TrajectoryRecorder::new();
    for path in 0..num_paths {
        let mut rng = RandomStream::for_path(0, path, 0, seed_offset);
        tracer.trace(scene, ray, &mut rng, &mut recorder);
    }
    log::info!("Recorded {} trajectories, {} left the domain.",
               recorder.trajectories.len(), recorder.exit_directions.len());
    recorder
}

fn heat_color(t: Float) -> Rgb<u8> {
    let t = t.max(0.0).min(1.0);
    let (r, g, b) = if t < 0.5 {
        let s = t * 2.0;
        (0.0, s, 1.0 - s)
    } else {
        let s = (t - 0.5) * 2.0;
        (s, 1.0 - s, 0.0)
    };
    Rgb([(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8])
}

/// Latitude-longitude histogram of exit directions, coloured blue to green
/// to red by relative count.
pub fn exit_direction_heatmap(directions: &[Vector3f], width: u32, height: u32) -> RgbImage {
    if width == 0 || height == 0 {
        return RgbImage::new(width, height);
    }
    let mut counts = vec![0u32; (width * height) as usize];
    for dir in directions {
        let uv = direction_to_equirect(dir);
        let x = ((uv.x * width as Float) as u32).min(width - 1);
        let y = ((uv.y * height as Float) as u32).min(height - 1);
        counts[(x + y * width) as usize] += 1;
    }
    let max_count = counts.iter().cloned().max().unwrap_or(0).max(1) as Float;

    RgbImage::from_fn(width, height, |x, y| {
        heat_color(counts[(x + y * width) as usize] as Float / max_count)
    })
}
