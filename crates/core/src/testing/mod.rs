//! Test doubles for the crate's collaborator traits.

mod mock_launcher;
mod mock_prober;

pub use mock_launcher::{MockBehavior, MockLauncher};
pub use mock_prober::MockProber;
