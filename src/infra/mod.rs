//! Infrastructure adapters for the collaborator interfaces.

pub mod tier;

pub use tier::InMemoryTierDirectory;
