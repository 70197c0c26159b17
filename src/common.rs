//! Common definitions that are shared between different parts of the compiler.

// Use sorted sets and maps for consistent output
pub use std::collections::{BTreeMap as Map, BTreeSet as Set};

/// Identifiers and assembly labels.
pub type Id = internment::Intern<String>;

/// Intern a string as an [Id].
pub fn id(s: impl Into<String>) -> Id {
    Id::new(s.into())
}

/// Abort on an internal consistency violation.
///
/// These indicate a broken front-end contract or a bug in the compiler
/// itself; they are never recovered and never expected on valid input.
#[macro_export]
macro_rules! ice {
    ($($fmt:expr),+) => {
        panic!("wacc internal error: {}", format!($($fmt),+))
    };
}
