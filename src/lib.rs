// Copyright @yucwang 2021

pub mod core;
pub mod math;
pub mod io;
pub mod sensors;
pub mod integrators;
pub mod renderers;
pub mod volumes;
