/* Copyright 2020 @Yuchen Wong */

pub type Float = f32;

pub type Vector2f = nalgebra::Vector2<Float>;
pub type Vector3f = nalgebra::Vector3<Float>;
pub type Vector4f = nalgebra::Vector4<Float>;
pub type Matrix4f = nalgebra::Matrix4<Float>;

pub const PI: Float = 3.14159265359;
pub const INV_PI: Float = 0.31830988618;
pub const INV_FOUR_PI: Float = 0.07957747155;
pub const SQRT_3: Float = 1.73205080757;

/// Densities below this are treated as empty space.
pub const DENSITY_EPSILON: Float = 1e-5;
/// Lower bound for the argument of the free-flight logarithm.
pub const LOG_CLAMP: Float = 1e-11;
