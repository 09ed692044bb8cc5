// Copyright @yucwang 2026

use crate::core::error::{try_reserve, ConfigError, RenderError};
use crate::integrators::volpath::PathSample;
use crate::math::bitmap::Bitmap;
use crate::math::constants::{Float, Vector3f};

/// Auxiliary per-pixel outputs consumed by a denoiser.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FeatureKind {
    /// Position of the first scattering event.
    FirstX,
    /// Direction leaving the first scattering event.
    FirstW,
    /// Power moments of the first collision depth along the camera ray.
    PrimaryDepthMoments(usize),
    /// Power moments of the first collision depth along the first scattered ray.
    ScatterDepthMoments(usize),
}

impl FeatureKind {
    pub fn channels(&self) -> usize {
        match self {
            FeatureKind::FirstX | FeatureKind::FirstW => 3,
            FeatureKind::PrimaryDepthMoments(n) | FeatureKind::ScatterDepthMoments(n) => *n,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FeatureKind::FirstX => "first_x",
            FeatureKind::FirstW => "first_w",
            FeatureKind::PrimaryDepthMoments(_) => "primary_depth_moments",
            FeatureKind::ScatterDepthMoments(_) => "scatter_depth_moments",
        }
    }

    fn write(&self, sample: &PathSample, out: &mut [Float], weight: Float) {
        match self {
            FeatureKind::FirstX | FeatureKind::FirstW => {
                if let Some((position, direction)) = sample.first_scatter {
                    let v = if *self == FeatureKind::FirstX { position } else { direction };
                    for c in 0..3 {
                        out[c] += v[c] * weight;
                    }
                }
            }
            FeatureKind::PrimaryDepthMoments(n) => write_moments(sample.primary_depth, &mut out[..*n], weight),
            FeatureKind::ScatterDepthMoments(n) => {
                write_moments(sample.scatter_depth.unwrap_or(1.0), &mut out[..*n], weight)
            }
        }
    }
}

fn write_moments(depth: Float, out: &mut [Float], weight: Float) {
    let mut power = depth;
    for slot in out.iter_mut() {
        *slot += power * weight;
        power *= depth;
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeatureSet {
    pub first_x: bool,
    pub first_w: bool,
    pub primary_moments: Option<usize>,
    pub scatter_moments: Option<usize>,
}

impl FeatureSet {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for n in self.primary_moments.iter().chain(self.scatter_moments.iter()) {
            if !matches!(n, 4 | 6 | 8) {
                return Err(ConfigError::InvalidMomentCount(*n));
            }
        }
        Ok(())
    }

    pub fn kinds(&self) -> Vec<FeatureKind> {
        let mut kinds = Vec::new();
        if self.first_x {
            kinds.push(FeatureKind::FirstX);
        }
        if self.first_w {
            kinds.push(FeatureKind::FirstW);
        }
        if let Some(n) = self.primary_moments {
            kinds.push(FeatureKind::PrimaryDepthMoments(n));
        }
        if let Some(n) = self.scatter_moments {
            kinds.push(FeatureKind::ScatterDepthMoments(n));
        }
        kinds
    }
}

/// One feature image, `kind.channels()` values per pixel.
#[derive(Clone, Debug)]
pub struct FeatureLayer {
    pub kind: FeatureKind,
    pub data: Vec<Float>,
}

fn allocate<T: Clone>(len: usize, value: T, what: &'static str) -> Result<Vec<T>, RenderError> {
    let mut buffer = Vec::new();
    try_reserve(&mut buffer, len, what)?;
    buffer.resize(len, value);
    Ok(buffer)
}

fn allocate_layers(pixels: usize, kinds: &[FeatureKind]) -> Result<Vec<FeatureLayer>, RenderError> {
    kinds.iter()
        .map(|kind| -> Result<FeatureLayer, RenderError> {
            Ok(FeatureLayer {
                kind: *kind,
                data: allocate(pixels * kind.channels(), 0.0, "feature buffer")?,
            })
        })
        .collect()
}

/// Result of one dispatch: per-pixel means over the frame's samples.
#[derive(Clone, Debug)]
pub struct FrameBuffer {
    width: usize,
    height: usize,
    pub radiance: Vec<Vector3f>,
    pub features: Vec<FeatureLayer>,
}

impl FrameBuffer {
    pub fn new(width: usize, height: usize, kinds: &[FeatureKind]) -> Result<Self, RenderError> {
        let pixels = width * height;
        Ok(Self {
            width,
            height,
            radiance: allocate(pixels, Vector3f::zeros(), "frame buffer")?,
            features: allocate_layers(pixels, kinds)?,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Adds one path with the given weight, normally one over the frame's samples.
    pub fn add_path(&mut self, pixel: usize, sample: &PathSample, weight: Float) {
        self.radiance[pixel] += sample.radiance * weight;
        for layer in self.features.iter_mut() {
            let channels = layer.kind.channels();
            layer.kind.write(sample, &mut layer.data[pixel * channels..(pixel + 1) * channels], weight);
        }
    }

    /// Copies a tile rendered into its own buffer to `(x0, y0)`.
    pub fn blit(&mut self, tile: &FrameBuffer, x0: usize, y0: usize) {
        for y in 0..tile.height {
            for x in 0..tile.width {
                let src = x + y * tile.width;
                let dst = (x0 + x) + (y0 + y) * self.width;
                self.radiance[dst] = tile.radiance[src];
                for (layer, tile_layer) in self.features.iter_mut().zip(tile.features.iter()) {
                    let channels = layer.kind.channels();
                    layer.data[dst * channels..(dst + 1) * channels]
                        .copy_from_slice(&tile_layer.data[src * channels..(src + 1) * channels]);
                }
            }
        }
    }
}

/// Progressive running mean of frames.
#[derive(Clone, Debug)]
pub struct FrameAccumulator {
    width: usize,
    height: usize,
    samples: u64,
    mean: Vec<Vector3f>,
    features: Vec<FeatureLayer>,
}

impl FrameAccumulator {
    pub fn new(width: usize, height: usize, kinds: &[FeatureKind]) -> Result<Self, RenderError> {
        let pixels = width * height;
        Ok(Self {
            width,
            height,
            samples: 0,
            mean: allocate(pixels, Vector3f::zeros(), "accumulation buffer")?,
            features: allocate_layers(pixels, kinds)?,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Samples per pixel folded in so far.
    pub fn sample_count(&self) -> u64 {
        self.samples
    }

    /// Folds in a frame holding the mean of `samples_per_pixel` samples.
    pub fn accumulate(&mut self, frame: &FrameBuffer, samples_per_pixel: u32) {
        if samples_per_pixel == 0 {
            return;
        }
        let k = samples_per_pixel as f64;
        let t = (k / (self.samples as f64 + k)) as Float;
        for (mean, value) in self.mean.iter_mut().zip(frame.radiance.iter()) {
            *mean += (value - *mean) * t;
        }
        for (layer, frame_layer) in self.features.iter_mut().zip(frame.features.iter()) {
            for (mean, value) in layer.data.iter_mut().zip(frame_layer.data.iter()) {
                *mean += (value - *mean) * t;
            }
        }
        self.samples += samples_per_pixel as u64;
    }

    /// Combines an independently accumulated group of samples.
    pub fn merge(&mut self, other: &FrameAccumulator) {
        if other.samples == 0 {
            return;
        }
        let t = (other.samples as f64 / (self.samples + other.samples) as f64) as Float;
        for (mean, value) in self.mean.iter_mut().zip(other.mean.iter()) {
            *mean += (value - *mean) * t;
        }
        for (layer, other_layer) in self.features.iter_mut().zip(other.features.iter()) {
            for (mean, value) in layer.data.iter_mut().zip(other_layer.data.iter()) {
                *mean += (value - *mean) * t;
            }
        }
        self.samples += other.samples;
    }

    pub fn reset(&mut self) {
        self.samples = 0;
        self.mean.iter_mut().for_each(|v| *v = Vector3f::zeros());
        for layer in self.features.iter_mut() {
            layer.data.iter_mut().for_each(|v| *v = 0.0);
        }
    }

    pub fn image(&self) -> Bitmap {
        Bitmap::from_pixels(self.width, self.height, self.mean.clone())
    }

    pub fn feature(&self, kind: FeatureKind) -> Option<&[Float]> {
        self.features.iter().find(|layer| layer.kind == kind).map(|layer| &layer.data[..])
    }

    pub fn features(&self) -> &[FeatureLayer] {
        &self.features
    }
}
