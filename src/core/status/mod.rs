pub mod poller;
pub mod store;

pub use poller::{PollerConfig, StatusPoller};
pub use store::{read_status, GameState, GameStatus, StatusReport};
