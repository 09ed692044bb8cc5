// Copyright @yucwang 2021

pub mod accumulator;
pub mod progressive;
