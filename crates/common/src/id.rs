//! Identifier generation.

use ulid::Ulid;

/// Generates identifiers for submissions, ideas, products, reports and users.
///
/// Ids are lowercase ULIDs, so rows sort by creation time.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdGenerator;

impl IdGenerator {
    /// Create a new ID generator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Generate a new entity id.
    #[must_use]
    pub fn generate(&self) -> String {
        Ulid::new().to_string().to_lowercase()
    }
}
