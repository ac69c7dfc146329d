//! Loading protocol classification.
//!
//! Maps any descriptor to exactly one [`ProtocolKind`]. The function is
//! total and pure: an unrecognized shape classifies as
//! [`ProtocolKind::Unknown`] (handled downstream by the default
//! single-tile strategy), never as an error. The kind is a closed enum
//! so every consumer match is checked for exhaustiveness.

use serde::{Deserialize, Serialize};

use crate::descriptor::TileDescriptor;

/// The loading protocol a descriptor speaks. Immutable once classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    /// Legacy content-hash protocol. The only kind safe on headless
    /// hosts.
    V0,
    /// Shared-requirement protocol: dependencies come from a separately
    /// fetched requirement manifest.
    V1,
    /// Linked protocol: a `link` URL plus an inline dependency list
    /// with optional remote assets.
    V2,
    /// A bundle of nested descriptors, fetched and expanded
    /// recursively.
    Bundle,
    /// Unrecognized shape; loaded best-effort via the default
    /// single-tile strategy.
    Unknown,
}

/// What kind of host the descriptors are classified for.
///
/// Linked evaluation (v1/v2/bundle) needs an interactive host that can
/// resolve the tile's bundle in place; a headless host falls through to
/// the legacy and unknown kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKind {
    Interactive,
    Headless,
}

impl HostKind {
    #[must_use]
    fn is_interactive(self) -> bool {
        matches!(self, Self::Interactive)
    }
}

/// Classify a descriptor into its loading protocol kind.
///
/// Rules are evaluated in order, first match wins; the host gate is
/// checked before shape predicates so an ambiguous descriptor resolves
/// deterministically. Never fails: the fallthrough is
/// [`ProtocolKind::Unknown`].
#[must_use]
pub fn classify(descriptor: &TileDescriptor, host: HostKind) -> ProtocolKind {
    let v2_spec = descriptor.spec.as_deref() == Some("v2");

    if host.is_interactive() && descriptor.link.is_some() && v2_spec {
        ProtocolKind::V2
    } else if host.is_interactive() && descriptor.require_ref.is_some() && !v2_spec {
        ProtocolKind::V1
    } else if host.is_interactive() && descriptor.bundle {
        ProtocolKind::Bundle
    } else if descriptor.hash.is_some() {
        ProtocolKind::V0
    } else {
        ProtocolKind::Unknown
    }
}
