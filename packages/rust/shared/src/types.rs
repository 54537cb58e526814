//! Record types flowing through the harvest pipeline.

use std::fmt;

use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying a single harvest run (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A leaderboard entry as scraped from a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedRecord {
    /// In-game display name.
    pub display_name: String,
    /// Discriminator tag, without the leading `#`.
    pub discriminator_tag: String,
    /// Linked streaming handle (last path segment of the profile link).
    pub external_handle: String,
}

impl CollectedRecord {
    /// Attach a resolved account identifier, consuming the collected record.
    pub fn enrich(self, identifier: impl Into<String>) -> EnrichedRecord {
        EnrichedRecord {
            display_name: self.display_name,
            discriminator_tag: self.discriminator_tag,
            external_handle: self.external_handle,
            identifier: identifier.into(),
        }
    }
}

impl fmt::Display for CollectedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.display_name, self.discriminator_tag)
    }
}

/// A collected record augmented with its stable account identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedRecord {
    pub display_name: String,
    pub discriminator_tag: String,
    pub external_handle: String,
    /// Stable account key; primary key of the store.
    pub identifier: String,
}

impl fmt::Display for EnrichedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{} ({})",
            self.display_name, self.discriminator_tag, self.identifier
        )
    }
}
