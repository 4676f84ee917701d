//! Privacy Module
pub mod group;
pub mod guard;

// Re-export main types
pub use group::{resolve, PrivacyGroup};
pub use guard::read_guarded;
