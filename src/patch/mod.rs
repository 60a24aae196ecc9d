//! Find/replace patches over module source text.

pub mod applicator;
pub mod errors;
pub mod schema;

pub use applicator::{
    apply_patch, apply_patches, find_applied, patch_module, PatchApplication, PatchOutcome, PatchReport,
    PatchRun, PendingPatch,
};
pub use errors::PatchError;
pub use schema::{Find, Patch, PatchPredicate, Replace, ReplaceFn, Replacement};
