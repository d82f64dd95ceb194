//! polmgr - Policer/counter bank resource manager.
//!
//! This crate is the control-plane resource manager for a switch ASIC's
//! rate-policing and counting engine. The engine exposes a small fixed
//! number of banks, each a fixed array of slots; a slot holds either a
//! rate-policer configuration or a frame/byte counter. Compiled ACL rules
//! request policer and counter resources; this crate picks banks, assigns
//! slots, keeps each bank's shared configuration consistent across its
//! occupants, and compacts a bank's slot space live when rules are deleted,
//! preserving every surviving counter's cumulative value across physical
//! relocation.
//!
//! # Architecture
//!
//! ```text
//! [ACL compiler] ──per rule──> PolicerBankOrch
//!                                  │
//!                                  ├──> bank selection (fixed/strict/balanced)
//!                                  ├──> slot allocation (two regions, one array)
//!                                  ├──> compaction (swap-to-fill, live rewrite)
//!                                  └──> PolicerHal (register access layer)
//! ```
//!
//! # Key Components
//!
//! - [`policer::PolicerBankOrch`]: the owning orchestrator
//! - [`acl`]: compiled rule/ACL structures consumed from the compiler
//! - [`report::ErrorReport`]: failure-annotation sink for the compiler
//!
//! # Concurrency
//!
//! Single-threaded per switch instance: callers hold an external per-switch
//! exclusivity guarantee, so no operation here takes a lock or suspends.

pub mod acl;
pub mod policer;
pub mod report;
