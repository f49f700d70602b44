pub mod args;
pub mod collector;
pub mod host;
pub mod kernel;
pub mod mock;
pub mod platform;
pub mod process;
pub mod sampler;
pub mod snapshot;
