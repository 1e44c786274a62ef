pub mod store;

pub use store::{ModEntry, ModToggleStore, DEFAULT_MOD_EXTENSIONS, DISABLED_SUFFIX};
