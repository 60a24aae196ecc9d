//! Regex-based pattern matching over module source text.
//!
//! Patterns are compiled up front so malformed expressions surface when a
//! patch is built, never in the middle of a module load.

pub mod canonical;
pub mod errors;
pub mod pattern;

pub use canonical::{canonicalize, IDENTIFIER};
pub use errors::MatcherError;
pub use pattern::{PatternMatch, PatternMatcher};
