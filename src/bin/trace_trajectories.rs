use cumulus::core::settings_loader::load_render_description;
use cumulus::integrators::trajectory::exit_direction_heatmap;
use cumulus::io::png_utils;
use cumulus::renderers::progressive::ProgressiveRenderer;
use std::env;

fn parse_coordinate(value: &str, axis: &str) -> Result<usize, String> {
    value.parse::<usize>().map_err(|_| format!("Invalid pixel {} coordinate: {}", axis, value))
}

fn main() {
    env::set_var("RUST_LOG", "info");
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        eprintln!("Usage: {} <settings.xml> <x> <y> [--paths N] [--heatmap PATH] [--verbose]", args[0]);
        std::process::exit(1);
    }

    let settings_path = &args[1];
    let (x, y) = match (parse_coordinate(&args[2], "x"), parse_coordinate(&args[3], "y")) {
        (Ok(x), Ok(y)) => (x, y),
        (Err(e), _) | (_, Err(e)) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let mut num_paths: u32 = 64;
    let mut heatmap_path: Option<String> = None;
    let mut verbose = false;

    let mut i = 4;
    while i < args.len() {
        match args[i].as_str() {
            "--paths" => {
                i += 1;
                num_paths = args.get(i).and_then(|v| v.parse::<u32>().ok()).unwrap_or(num_paths);
            }
            "--heatmap" => {
                i += 1;
                heatmap_path = args.get(i).cloned();
            }
            "--verbose" => verbose = true,
            _ => {}
        }
        i += 1;
    }

    let description = load_render_description(settings_path)
        .unwrap_or_else(|e| panic!("failed to load settings: {}", e));
    let (width, height) = (description.settings.width, description.settings.height);
    if x >= width || y >= height {
        eprintln!("Pixel out of bounds: ({}, {}) for size {}x{}", x, y, width, height);
        std::process::exit(2);
    }

    let field = description.load_density_field()
        .unwrap_or_else(|e| panic!("failed to load density field: {}", e));
    let camera = description.build_camera()
        .unwrap_or_else(|e| panic!("failed to build camera: {}", e));
    let environment = description.build_environment()
        .unwrap_or_else(|e| panic!("failed to build environment: {}", e));
    let renderer = ProgressiveRenderer::new(description.settings.clone(), field, Box::new(camera), environment)
        .unwrap_or_else(|e| panic!("failed to set up renderer: {}", e));

    let recorder = renderer.trace_pixel_trajectories(x, y, num_paths);
    println!("trace_trajectories: settings={} pixel=({}, {}) mode={:?} paths={}",
             settings_path, x, y, renderer.settings().tracking_mode, num_paths);

    for (index, trajectory) in recorder.trajectories.iter().enumerate() {
        let last = trajectory.positions.last();
        println!("path {}: {} vertices, final weight {:.6}, end=({:.5}, {:.5}, {:.5})",
                 index,
                 trajectory.len(),
                 trajectory.attributes.last().cloned().unwrap_or(0.0),
                 last.map_or(0.0, |p| p.x), last.map_or(0.0, |p| p.y), last.map_or(0.0, |p| p.z));
        if verbose {
            for (p, w) in trajectory.positions.iter().zip(trajectory.attributes.iter()) {
                println!("    p=({:.5}, {:.5}, {:.5}) w={:.6}", p.x, p.y, p.z, w);
            }
        }
    }
    println!("exited: {} of {}", recorder.exit_directions.len(), recorder.trajectories.len());

    if let Some(path) = heatmap_path {
        let heatmap = exit_direction_heatmap(&recorder.exit_directions, 256, 128);
        png_utils::write_rgb_png(&heatmap, &path)
            .unwrap_or_else(|e| panic!("failed to write heatmap: {}", e));
    }
}
