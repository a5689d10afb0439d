//! Semantic representation of the parts of a class being rewritten

mod method;

pub use method::*;
