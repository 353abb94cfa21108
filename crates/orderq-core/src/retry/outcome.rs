use std::fmt;

/// Classified result of one submission attempt.
///
/// This is a plain value, not an error: an ambiguous timeout and a hard
/// failure are both normal control flow for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Downstream confirmed the order exists (new or duplicate).
    Created,
    /// The call neither confirmed nor denied creation.
    AmbiguousTimeout,
    /// Downstream definitely did not create the order on this attempt.
    HardFailure,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Created => "created",
            Outcome::AmbiguousTimeout => "ambiguous_timeout",
            Outcome::HardFailure => "hard_failure",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
