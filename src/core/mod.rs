// Copyright @yucwang 2021

pub mod environment;
pub mod error;
pub mod phase;
pub mod rng;
pub mod sensor;
pub mod settings;
pub mod settings_loader;
