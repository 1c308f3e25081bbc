//! Offline-capable identifier generation.
//!
//! Patient codes are decided entirely on the client so an examination
//! recorded right after an offline registration can already reference the
//! patient. Format: `<prefix><YYYYMMDD><two base-62 characters>`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::NaiveDate;
use rand::Rng;

use crate::error::{Error, Result};
use crate::models::PatientCode;
use crate::util::unix_millis_now;

pub const DEFAULT_CODE_PREFIX: &str = "pasien";
pub const CODE_SUFFIX_LEN: usize = 2;
pub const MAX_CODE_ATTEMPTS: usize = 10;

const BASE62: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Generates patient codes for one prefix
#[derive(Debug, Clone)]
pub struct CodeGenerator {
    prefix: String,
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_CODE_PREFIX)
    }
}

impl CodeGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The part shared by every code generated on `date`.
    pub fn day_prefix(&self, date: NaiveDate) -> String {
        format!("{}{}", self.prefix, date.format("%Y%m%d"))
    }

    /// Produce one candidate without any collision check.
    pub fn candidate(&self, date: NaiveDate, rng: &mut impl Rng) -> String {
        let mut code = self.day_prefix(date);
        for _ in 0..CODE_SUFFIX_LEN {
            code.push(char::from(BASE62[rng.gen_range(0..BASE62.len())]));
        }
        code
    }

    /// Draw candidates until one is absent from `existing`.
    ///
    /// Fails with [`Error::CodeExhausted`] after [`MAX_CODE_ATTEMPTS`]
    /// collisions; an existing code is never reused.
    pub fn generate(
        &self,
        date: NaiveDate,
        existing: &HashSet<String>,
        rng: &mut impl Rng,
    ) -> Result<PatientCode> {
        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let candidate = self.candidate(date, rng);
            if !existing.contains(&candidate) {
                if attempt > 1 {
                    tracing::debug!("Patient code resolved after {attempt} attempts");
                }
                return PatientCode::parse(&candidate);
            }
        }

        tracing::warn!(
            "Patient code generation exhausted {MAX_CODE_ATTEMPTS} attempts for {}",
            self.day_prefix(date)
        );
        Err(Error::CodeExhausted {
            attempts: MAX_CODE_ATTEMPTS,
        })
    }
}

/// Ephemeral local ids: current Unix milliseconds, strictly increasing
/// within the process.
#[derive(Debug, Default)]
pub struct EphemeralIds {
    last: AtomicI64,
}

impl EphemeralIds {
    pub const fn new() -> Self {
        Self {
            last: AtomicI64::new(0),
        }
    }

    pub fn next(&self) -> i64 {
        self.next_at(unix_millis_now())
    }

    /// Next id given the current time; never repeats or goes backwards.
    pub fn next_at(&self, now_ms: i64) -> i64 {
        let mut previous = self.last.load(Ordering::SeqCst);
        loop {
            let next = now_ms.max(previous + 1);
            match self
                .last
                .compare_exchange(previous, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => previous = actual,
            }
        }
    }
}
