//! Mock implementations for testing.

mod provider;
pub use provider::{Event, Page, Provider};
