//! Compiled ACL structures consumed from the ACL compiler.
//!
//! The compiler hands the resource manager a compiled image: ACLs keyed by
//! number, each holding compiled rules keyed by rule number. The manager
//! reads each rule's resource needs (police/count), writes its per-bank
//! slot assignments, and (during compaction) rewrites slot references
//! inside surviving rules so their action tables stay consistent with the
//! hardware after a relocation.

pub mod rule;
pub mod types;

pub use rule::{CompiledAcl, CompiledAcls, CompiledRule};
pub use types::{AclId, RuleId, RuleRef};
