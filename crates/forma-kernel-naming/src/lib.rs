#![warn(missing_docs)]

//! Persistent naming for the forma core.
//!
//! Three pieces cooperate to keep face and edge references stable across
//! rebuilds:
//!
//! - **Operation history** ([`history`]) records which sketch entity produced
//!   which face at sweep time and carries that origin through every boolean.
//!   History is the identity backbone; fingerprints are tie-breakers.
//! - **Persistent references** ([`stref`], [`canonical`]) encode a
//!   version-tagged record as canonical JSON inside a `stref:v1:` string so
//!   independent agents produce byte-identical references.
//! - **The reference index and resolver** ([`index`], [`resolve`]) snapshot
//!   one stref per tessellated face/edge each rebuild and match incoming
//!   references against that snapshot with scored fallbacks.

pub mod canonical;
pub mod fingerprint;
pub mod history;
pub mod index;
pub mod resolve;
pub mod stref;

pub use history::{
    merge_through_boolean, BooleanFaceRecord, FaceOrigin, FaceRole, OperationHistory, SweepKind,
};
pub use index::{build_body_references, BodyNamingInputs, BodyReferenceSet, ReferenceIndex};
pub use resolve::{resolve, resolve_many, Candidate, RefInput, Resolution};
pub use stref::{
    Fingerprint, LocalSelector, PersistentRef, RefSet, RefType, SelectorValue, StrefError,
};
