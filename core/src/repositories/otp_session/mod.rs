pub mod r#trait {
    pub use super::trait_::*;
}
#[path = "trait.rs"]
mod trait_;
pub mod memory;

pub use memory::InMemoryOtpSessionRepository;
pub use r#trait::{ExpiryFilter, OtpSessionRepository, SessionFilter};

#[cfg(test)]
mod tests;
