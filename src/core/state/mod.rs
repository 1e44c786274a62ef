pub mod app_state;
pub mod settings;

pub use app_state::Launcher;
pub use settings::{default_data_dir, LauncherSettings};
