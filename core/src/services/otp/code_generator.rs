//! Passcode generation

use rand::{rngs::OsRng, Rng};

use crate::domain::entities::otp_session::CODE_LENGTH;

/// Source of fresh passcodes
pub trait CodeGenerator: Send + Sync {
    /// A new [`CODE_LENGTH`]-digit code, zero-padded
    fn generate(&self) -> String;
}

/// Draws every digit independently and uniformly from the OS CSPRNG
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCodeGenerator;

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> String {
        let mut rng = OsRng;
        (0..CODE_LENGTH)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect()
    }
}
