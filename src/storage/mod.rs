//! Row sources for lists
//!
//! Production sources wrap the console's transport; the in-memory source
//! serves demos and tests.

pub mod in_memory;

pub use in_memory::InMemorySource;
