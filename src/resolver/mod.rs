//! Scrobble track identity resolution: normalize input metadata into a
//! deterministic key, then cascade through embedded MBID, ISRC, acoustic
//! fingerprint, and feature-flagged text search.

pub mod cache;
pub mod cascade;
pub mod normalize;

pub use cache::ResolverCache;
pub use cascade::{ResolveInput, ResolveResult, ResolverError, TrackResolver};
