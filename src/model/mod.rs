//! Domain model shared by every subsystem: definitions, environments and
//! revisions.

mod definition;
mod environment;
mod revision;

pub use definition::{Allocation, Payload, Range, TestBucket, TestDefinition, TestType};
pub use environment::Environment;
pub use revision::{short_revision, EnvironmentVersion, Revision, RevisionDefinition, UNKNOWN_REVISION};
