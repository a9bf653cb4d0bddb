//! Command-line entry points for the nextblog binary.

mod app;
mod args;

pub use app::*;
pub use args::*;
