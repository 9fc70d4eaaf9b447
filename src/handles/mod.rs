//! Per-partition sub-store handles
//!
//! Each owned partition has its documents in a sub-store named
//! `partition<id>`. Handles are opened on first use and cached in two pools,
//! one for writes and one for reads, both guarded by a single mutex.

mod errors;
mod registry;

pub use errors::{HandleError, HandleResult};
pub use registry::{partition_kvs_name, HandleRegistry};
