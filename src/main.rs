// Copyright 2020 TwoCookingMice

use cumulus::core::error::RenderError;
use cumulus::core::settings_loader::load_render_description;
use cumulus::integrators::TrackingMode;
use cumulus::io::{exr_utils, png_utils};
use cumulus::renderers::progressive::ProgressiveRenderer;

use std::env;
use std::path::Path;
use std::str::FromStr;

struct Options {
    input_path: String,
    output_path: String,
    spp_override: Option<u32>,
    seed_offset: Option<u32>,
    mode: Option<TrackingMode>,
    png_path: Option<String>,
}

fn parse_value<T: FromStr>(args: &[String], i: usize, name: &'static str) -> Result<T, RenderError> {
    let value = args.get(i).ok_or(RenderError::MissingField(name))?;
    value.parse::<T>()
        .map_err(|_| RenderError::Parse(format!("invalid value for {}: {}", name, value)))
}

fn parse_args(args: &[String]) -> Result<Options, RenderError> {
    let mut options = Options {
        input_path: args[1].clone(),
        output_path: args[2].clone(),
        spp_override: None,
        seed_offset: None,
        mode: None,
        png_path: None,
    };

    let mut i = 3;
    while i < args.len() {
        match args[i].as_str() {
            "--spp" => {
                i += 1;
                options.spp_override = Some(parse_value(args, i, "spp")?);
            }
            "--seed-offset" => {
                i += 1;
                options.seed_offset = Some(parse_value(args, i, "seed-offset")?);
            }
            "--mode" => {
                i += 1;
                let name = args.get(i).ok_or(RenderError::MissingField("mode"))?;
                options.mode = Some(name.parse::<TrackingMode>()?);
            }
            "--png" => {
                i += 1;
                options.png_path = args.get(i).cloned();
            }
            other => log::warn!("Ignoring unknown argument: {}.", other),
        }
        i += 1;
    }
    Ok(options)
}

fn run(options: Options) -> Result<(), RenderError> {
    let description = load_render_description(&options.input_path)?;
    let mut settings = description.settings.clone();
    if let Some(spp) = options.spp_override {
        settings.target_samples = spp;
    }
    if let Some(offset) = options.seed_offset {
        settings.seed_offset = offset;
    }
    if let Some(mode) = options.mode {
        settings.tracking_mode = mode;
    }

    let field = description.load_density_field()?;
    let camera = description.build_camera()?;
    let environment = description.build_environment()?;
    let mut renderer = ProgressiveRenderer::new(settings, field, Box::new(camera), environment)?;
    let image = renderer.render()?;

    exr_utils::write_exr_to_file(&image, &options.output_path)?;
    if let Some(png_path) = options.png_path.as_ref() {
        png_utils::write_png_preview(&image, 1.0, png_path)?;
    }

    let output = Path::new(&options.output_path);
    let stem = output.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
    for layer in renderer.accumulator().features() {
        let path = output.with_file_name(format!("{}_{}.exr", stem, layer.kind.name()));
        exr_utils::write_feature_exr(&layer.data, layer.kind.channels(), image.width(), image.height(),
                                     layer.kind.name(), &path)?;
    }
    Ok(())
}

fn main() {
    env::set_var("RUST_LOG", "info");
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <settings.xml> <output.exr> [--spp N] [--seed-offset N] [--mode NAME] [--png PATH]", args[0]);
        std::process::exit(1);
    }

    let result = parse_args(&args).and_then(run);
    if let Err(e) = result {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Vec<String> {
        let mut args = vec!["cumulus".to_string(), "in.xml".to_string(), "out.exr".to_string()];
        args.extend(extra.iter().map(|s| s.to_string()));
        args
    }

    #[test]
    fn test_numeric_options() {
        let options = parse_args(&args(&["--spp", "16", "--seed-offset", "7", "--mode", "next-event"])).unwrap();
        assert_eq!(options.spp_override, Some(16));
        assert_eq!(options.seed_offset, Some(7));
        assert_eq!(options.mode, Some(TrackingMode::NextEvent));
    }

    #[test]
    fn test_malformed_numbers_are_reported() {
        assert!(matches!(parse_args(&args(&["--spp", "abc"])), Err(RenderError::Parse(_))));
        assert!(matches!(parse_args(&args(&["--seed-offset", "-3"])), Err(RenderError::Parse(_))));
        assert!(matches!(parse_args(&args(&["--spp"])), Err(RenderError::MissingField("spp"))));
    }
}
