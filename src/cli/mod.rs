pub mod cli;
pub mod settings;

pub use cli::{CommandArgs, Commands, LogCategory};
pub use settings::Settings;
