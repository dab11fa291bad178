//! Platform paths and process helpers shared by the Zapret Controller crates.

mod commands;
mod paths;

pub use commands::{HideWindow, script_launch_command};
pub use paths::{AppPaths, AppPathsError};
