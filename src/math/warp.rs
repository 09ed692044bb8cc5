// Copyright @yucwang 2023

use super::constants::{ INV_FOUR_PI, INV_PI, PI, Float, Vector2f, Vector3f };

pub fn sample_uniform_sphere(u: &Vector2f) -> Vector3f {
    let z: Float = 1.0 - 2.0 * u.x;
    let r: Float = (1.0 - z * z).max(0.0).sqrt();
    let phi: Float = 2.0 * PI * u.y;

    Vector3f::new(r * phi.cos(), r * phi.sin(), z)
}

pub fn sample_uniform_sphere_pdf() -> Float {
    INV_FOUR_PI
}

/// Direction in the cone of half-angle `acos(cos_max)` around +z.
pub fn sample_uniform_cone(u: &Vector2f, cos_max: Float) -> Vector3f {
    let z: Float = 1.0 - u.x * (1.0 - cos_max);
    let r: Float = (1.0 - z * z).max(0.0).sqrt();
    let phi: Float = 2.0 * PI * u.y;

    Vector3f::new(r * phi.cos(), r * phi.sin(), z)
}

pub fn sample_uniform_cone_pdf(cos_max: Float) -> Float {
    1.0 / (2.0 * PI * (1.0 - cos_max))
}

/// Latitude-longitude coordinates of a unit direction, y up.
/// `u` follows the azimuth, `v` runs from the +y pole (0) to the -y pole (1).
pub fn direction_to_equirect(d: &Vector3f) -> Vector2f {
    let mut phi = d.z.atan2(d.x);
    if phi < 0.0 {
        phi += 2.0 * PI;
    }
    let theta = d.y.max(-1.0).min(1.0).acos();

    Vector2f::new(phi * 0.5 * INV_PI, theta * INV_PI)
}

pub fn equirect_to_direction(uv: &Vector2f) -> Vector3f {
    let phi = uv.x * 2.0 * PI;
    let theta = uv.y * PI;
    let (sin_theta, cos_theta) = theta.sin_cos();

    Vector3f::new(sin_theta * phi.cos(), cos_theta, sin_theta * phi.sin())
}
