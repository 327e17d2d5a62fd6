//! Flow log / snapshot format version.
//!
//! The only module-scope global state in this crate, per design: a version
//! tuple stamped into every flow snapshot so readers can detect format drift.

pub const IVERSION: (u16, u16, u16) = (1, 0, 0);
