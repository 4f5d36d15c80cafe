pub mod config;
pub mod dirs;
pub mod errors;
pub mod ids;
pub mod progress;
pub mod types;

pub use errors::FexError;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
