//! B+Tree algorithms: descent, binary search, leaf/internal splits,
//! promotion of median keys, root growth, and leaf sibling chain
//! maintenance.

mod engine;

pub use engine::BTreeEngine;
