// Copyright @yucwang 2026

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::core::environment::{ConstantEnvironment, Environment, EnvironmentMap, SkyEnvironment};
use crate::core::error::RenderError;
use crate::core::settings::RenderSettings;
use crate::io::xyz_loader::load_xyz_from_file;
use crate::math::constants::{Float, Vector3f};
use crate::sensors::perspective::PerspectiveCamera;
use crate::volumes::density_field::DensityField;
use crate::volumes::procedural::{cloud_block, soft_sphere};

#[derive(Debug, Clone, PartialEq)]
pub struct CameraDescription {
    pub origin: Vector3f,
    pub target: Vector3f,
    pub up: Vector3f,
    pub fov_degrees: Float,
}

impl Default for CameraDescription {
    fn default() -> Self {
        Self {
            origin: Vector3f::new(0.0, 0.0, 0.8),
            target: Vector3f::zeros(),
            up: Vector3f::new(0.0, 1.0, 0.0),
            fov_degrees: 45.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnvironmentDescription {
    Constant(Vector3f),
    Sky { sun_direction: Vector3f, sun_color: Vector3f, sun_intensity: Float },
    Map { path: PathBuf, scale: Float },
}

impl Default for EnvironmentDescription {
    fn default() -> Self {
        EnvironmentDescription::Sky {
            sun_direction: Vector3f::new(0.5826, 0.7660, 0.2717),
            sun_color: Vector3f::new(1.0, 0.961538462, 0.884615385),
            sun_intensity: 2.6,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VolumeSource {
    Xyz(PathBuf),
    CloudBlock { dims: [usize; 3], value: Float, empty_boundary_layer: bool },
    SoftSphere(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VolumeDescription {
    pub source: VolumeSource,
    pub sparse: bool,
}

/// A parsed `<render>` file: validated settings plus what is needed to build
/// the density field, camera and environment.
#[derive(Debug, Clone)]
pub struct RenderDescription {
    pub settings: RenderSettings,
    pub camera: CameraDescription,
    pub environment: EnvironmentDescription,
    pub volume: VolumeDescription,
}

impl RenderDescription {
    pub fn build_camera(&self) -> Result<PerspectiveCamera, RenderError> {
        PerspectiveCamera::new(self.camera.origin,
                               self.camera.target,
                               self.camera.up,
                               self.camera.fov_degrees.to_radians(),
                               self.settings.width,
                               self.settings.height)
            .ok_or_else(|| RenderError::Parse("degenerate camera frame".to_string()))
    }

    pub fn build_environment(&self) -> Result<Box<dyn Environment>, RenderError> {
        Ok(match &self.environment {
            EnvironmentDescription::Constant(radiance) => Box::new(ConstantEnvironment::new(*radiance)),
            EnvironmentDescription::Sky { sun_direction, sun_color, sun_intensity } => {
                Box::new(SkyEnvironment::new(*sun_direction, *sun_color, *sun_intensity))
            }
            EnvironmentDescription::Map { path, scale } => Box::new(EnvironmentMap::from_exr(path, *scale)?),
        })
    }

    pub fn load_density_field(&self) -> Result<DensityField, RenderError> {
        let field = match &self.volume.source {
            VolumeSource::Xyz(path) => load_xyz_from_file(path)?,
            VolumeSource::CloudBlock { dims, value, empty_boundary_layer } => {
                cloud_block(dims[0], dims[1], dims[2], *value, *empty_boundary_layer)?
            }
            VolumeSource::SoftSphere(resolution) => soft_sphere(*resolution)?,
        };
        Ok(if self.volume.sparse { field.to_sparse() } else { field })
    }
}

pub fn load_render_description<P: AsRef<Path>>(path: P) -> Result<RenderDescription, RenderError> {
    let path = path.as_ref();
    let xml = fs::read_to_string(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    parse_render_description(&xml, base_dir)
}

pub fn parse_render_description(xml: &str, base_dir: &Path) -> Result<RenderDescription, RenderError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();

    let mut seen_root = false;
    let mut settings = RenderSettings::default();
    let mut camera = CameraDescription::default();
    let mut environment = EnvironmentDescription::default();
    let mut volume: Option<VolumeDescription> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let attrs = attributes(&e);
                match e.name().as_ref() {
                    b"render" => seen_root = true,
                    b"integrator" => {
                        if let Some(v) = attrs.get("mode") {
                            settings.tracking_mode = FromStr::from_str(v)?;
                        }
                        if let Some(v) = attrs.get("policy") {
                            settings.collision_policy = FromStr::from_str(v)?;
                        }
                        if let Some(v) = attrs.get("seed_offset") {
                            settings.seed_offset = parse_u32(v)?;
                        }
                    }
                    b"medium" => {
                        if let Some(v) = attrs.get("extinction_scale") {
                            settings.extinction_scale = parse_float(v)?;
                        }
                        if let Some(v) = attrs.get("extinction") {
                            settings.extinction_base = parse_vec3(v)?;
                        }
                        if let Some(v) = attrs.get("albedo") {
                            settings.albedo = parse_vec3(v)?;
                        }
                        if let Some(v) = attrs.get("g") {
                            settings.phase_g = parse_float(v)?;
                        }
                    }
                    b"grid" => {
                        if let Some(v) = attrs.get("block_size") {
                            settings.block_size = parse_usize(v)?;
                        }
                        if let Some(v) = attrs.get("policy") {
                            settings.block_policy = FromStr::from_str(v)?;
                        }
                        if let Some(v) = attrs.get("interpolation") {
                            settings.interpolation = FromStr::from_str(v)?;
                        }
                        if let Some(v) = attrs.get("border") {
                            settings.border = FromStr::from_str(v)?;
                        }
                    }
                    b"film" => {
                        if let Some(v) = attrs.get("width") {
                            settings.width = parse_usize(v)?;
                        }
                        if let Some(v) = attrs.get("height") {
                            settings.height = parse_usize(v)?;
                        }
                        if let Some(v) = attrs.get("target_samples") {
                            settings.target_samples = parse_u32(v)?;
                        }
                        if let Some(v) = attrs.get("samples_per_frame") {
                            settings.samples_per_frame = parse_u32(v)?;
                        }
                        if let Some(v) = attrs.get("threads") {
                            settings.threads = Some(parse_usize(v)?);
                        }
                    }
                    b"features" => {
                        if let Some(v) = attrs.get("first_x") {
                            settings.features.first_x = parse_bool(v)?;
                        }
                        if let Some(v) = attrs.get("first_w") {
                            settings.features.first_w = parse_bool(v)?;
                        }
                        if let Some(v) = attrs.get("primary_moments") {
                            settings.features.primary_moments = Some(parse_usize(v)?);
                        }
                        if let Some(v) = attrs.get("scatter_moments") {
                            settings.features.scatter_moments = Some(parse_usize(v)?);
                        }
                    }
                    b"camera" => {
                        if let Some(v) = attrs.get("origin") {
                            camera.origin = parse_vec3(v)?;
                        }
                        if let Some(v) = attrs.get("target") {
                            camera.target = parse_vec3(v)?;
                        }
                        if let Some(v) = attrs.get("up") {
                            camera.up = parse_vec3(v)?;
                        }
                        if let Some(v) = attrs.get("fov") {
                            camera.fov_degrees = parse_float(v)?;
                        }
                    }
                    b"environment" => environment = parse_environment(&attrs, base_dir)?,
                    b"volume" => volume = Some(parse_volume(&attrs, base_dir)?),
                    _ => {}
                }
            }
            Ok(_) => {}
            Err(e) => return Err(RenderError::Parse(format!("xml error at {}: {}", reader.buffer_position(), e))),
        }
        buf.clear();
    }

    if !seen_root {
        return Err(RenderError::MissingField("render"));
    }
    let volume = volume.ok_or(RenderError::MissingField("volume"))?;
    settings.validate()?;
    log::info!("Loaded render settings: {:?} tracking, {}x{}, {} samples.",
               settings.tracking_mode, settings.width, settings.height, settings.target_samples);

    Ok(RenderDescription { settings, camera, environment, volume })
}

fn parse_environment(attrs: &HashMap<String, String>, base_dir: &Path) -> Result<EnvironmentDescription, RenderError> {
    let kind = attrs.get("type").map(|s| s.as_str()).unwrap_or("sky");
    match kind {
        "constant" => {
            let radiance = attrs.get("radiance").map(|v| parse_vec3(v)).transpose()?;
            Ok(EnvironmentDescription::Constant(radiance.unwrap_or_else(|| Vector3f::repeat(1.0))))
        }
        "sky" => {
            let mut sky = EnvironmentDescription::default();
            if let EnvironmentDescription::Sky { sun_direction, sun_color, sun_intensity } = &mut sky {
                if let Some(v) = attrs.get("sun_direction") {
                    *sun_direction = parse_vec3(v)?;
                }
                if let Some(v) = attrs.get("sun_color") {
                    *sun_color = parse_vec3(v)?;
                }
                if let Some(v) = attrs.get("sun_intensity") {
                    *sun_intensity = parse_float(v)?;
                }
            }
            Ok(sky)
        }
        "envmap" => {
            let filename = attrs.get("filename").ok_or(RenderError::MissingField("filename"))?;
            let scale = attrs.get("scale").map(|v| parse_float(v)).transpose()?.unwrap_or(1.0);
            Ok(EnvironmentDescription::Map { path: base_dir.join(filename), scale })
        }
        other => Err(RenderError::Parse(format!("unsupported environment: {}", other))),
    }
}

fn parse_volume(attrs: &HashMap<String, String>, base_dir: &Path) -> Result<VolumeDescription, RenderError> {
    let sparse = attrs.get("sparse").map(|v| parse_bool(v)).transpose()?.unwrap_or(false);
    let kind = attrs.get("type").ok_or(RenderError::MissingField("type"))?;
    let source = match kind.as_str() {
        "xyz" => {
            let filename = attrs.get("filename").ok_or(RenderError::MissingField("filename"))?;
            VolumeSource::Xyz(base_dir.join(filename))
        }
        "block" => {
            let resolution = attrs.get("resolution").map(|v| parse_usize(v)).transpose()?.unwrap_or(32);
            VolumeSource::CloudBlock {
                dims: [resolution; 3],
                value: attrs.get("value").map(|v| parse_float(v)).transpose()?.unwrap_or(1.0),
                empty_boundary_layer: attrs.get("empty_boundary").map(|v| parse_bool(v)).transpose()?.unwrap_or(false),
            }
        }
        "sphere" => {
            let resolution = attrs.get("resolution").map(|v| parse_usize(v)).transpose()?.unwrap_or(64);
            VolumeSource::SoftSphere(resolution)
        }
        other => return Err(RenderError::Parse(format!("unsupported volume: {}", other))),
    };
    Ok(VolumeDescription { source, sparse })
}

fn attributes(e: &BytesStart) -> HashMap<String, String> {
    e.attributes()
        .flatten()
        .map(|attr| (String::from_utf8_lossy(attr.key.as_ref()).to_string(),
                     attr.unescape_value().unwrap_or_default().to_string()))
        .collect()
}

fn parse_float(value: &str) -> Result<Float, RenderError> {
    value.trim().parse::<Float>().map_err(|_| RenderError::Parse(format!("invalid float: {}", value)))
}

fn parse_u32(value: &str) -> Result<u32, RenderError> {
    value.trim().parse::<u32>().map_err(|_| RenderError::Parse(format!("invalid integer: {}", value)))
}

fn parse_usize(value: &str) -> Result<usize, RenderError> {
    value.trim().parse::<usize>().map_err(|_| RenderError::Parse(format!("invalid integer: {}", value)))
}

fn parse_bool(value: &str) -> Result<bool, RenderError> {
    match value.trim() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(RenderError::Parse(format!("invalid boolean: {}", value))),
    }
}

fn parse_vec3(value: &str) -> Result<Vector3f, RenderError> {
    let mut parts = value.split(',').map(|s| s.trim()).filter(|s| !s.is_empty());
    let x = parts.next().ok_or_else(|| RenderError::Parse("invalid vec3".to_string()))?;
    let y = parts.next().ok_or_else(|| RenderError::Parse("invalid vec3".to_string()))?;
    let z = parts.next().ok_or_else(|| RenderError::Parse("invalid vec3".to_string()))?;
    Ok(Vector3f::new(parse_float(x)?, parse_float(y)?, parse_float(z)?))
}
