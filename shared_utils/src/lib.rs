//! Helpers shared by the workspace crates: environment lookups and the
//! paginated fetch loop used by both the record provider and the directory
//! client.

pub mod env;
pub mod paging;
