//! Resolved token model: tokens, metadata, snapshots and provenance.

pub mod metadata;
pub mod snapshot;
pub mod token;

pub use metadata::{Deprecation, TokenMetadata};
pub use snapshot::{Provenance, ResolutionInfo, SnapshotId, TokenSnapshot};
pub use token::{Token, TokenType};
