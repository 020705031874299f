//! Fixed-width numeric access codes.

use rand::Rng;

use crate::config::MAX_CODE_LENGTH;
use crate::{RelayError, Result};

/// Draws and formats access codes of a fixed width.
#[derive(Debug, Clone)]
pub struct CodeGenerator {
    length: u32,
    space: u64,
    max_attempts: u32,
}

impl CodeGenerator {
    /// Create a generator for codes of `length` digits.
    ///
    /// `max_attempts` bounds the random draws a caller should make before
    /// falling back to [`probe_order`](Self::probe_order).
    pub fn new(length: u32, max_attempts: u32) -> Result<Self> {
        if length == 0 || length > MAX_CODE_LENGTH {
            return Err(RelayError::Config(format!(
                "code length must be between 1 and {MAX_CODE_LENGTH}, got {length}"
            )));
        }

        Ok(Self {
            length,
            space: 10u64.pow(length),
            max_attempts,
        })
    }

    /// Number of digits per code.
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Number of distinct codes (`10^length`).
    pub fn space(&self) -> u64 {
        self.space
    }

    /// Random draws before the linear fallback.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Draw a uniformly random code.
    pub fn random(&self) -> String {
        self.format(rand::rng().random_range(0..self.space))
    }

    /// Every code exactly once, starting from a random position.
    pub fn probe_order(&self) -> impl Iterator<Item = String> + '_ {
        let start = rand::rng().random_range(0..self.space);
        (0..self.space).map(move |offset| self.format((start + offset) % self.space))
    }

    /// Format `value` as a zero-padded code.
    pub fn format(&self, value: u64) -> String {
        format!("{:0width$}", value, width = self.length as usize)
    }

    /// Whether `code` has the shape this generator produces.
    pub fn is_well_formed(&self, code: &str) -> bool {
        code.len() == self.length as usize && code.bytes().all(|b| b.is_ascii_digit())
    }
}
