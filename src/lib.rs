pub mod client;
pub mod commands;
pub mod config;
pub mod envelope;
pub mod error;
pub mod iced_ui;
pub mod lifecycle;
pub mod logging;
pub mod panels;
pub mod shell;
pub mod stream;

pub use error::PlaygroundError;

pub type Result<T> = std::result::Result<T, PlaygroundError>;

pub const GIT_SHA: &str = env!("MORK_PLAYGROUND_GIT_SHA");
