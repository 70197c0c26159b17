//! The middle of the compiler: the symbol environment shared by the
//! backends' lowering passes.

pub mod frame;

pub use frame::Env;
