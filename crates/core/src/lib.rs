#![deny(warnings)]

pub mod config;
pub mod emotion;
pub mod face;
pub mod frame;
pub mod overlay;
pub mod pipeline;
pub mod preprocess;
pub mod sampler;
pub mod sink;
pub mod source;
