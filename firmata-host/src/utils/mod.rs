#[cfg(any(test, feature = "mocks"))]
pub use serial_test;
pub use tokio;
pub use tokio::time::sleep;

pub mod events;
pub mod helpers;
pub mod task;
