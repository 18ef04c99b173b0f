// Data models
// Field catalog descriptors and the runtime value representation.

pub mod catalog;
pub mod value;
