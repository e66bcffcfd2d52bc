pub mod assets;
pub mod classifier;
pub mod completion;
pub mod config;
pub mod providers;
pub mod resolver;
pub mod rewriter;
pub mod studio;
pub mod transparency;

mod transport;

#[cfg(test)]
mod test_support;

pub use config::StudioConfig;
pub use studio::{PreparedRequest, Studio, StudioResponse};
