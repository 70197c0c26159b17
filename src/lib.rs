//! The WACC code-generation core as a library.  See the `src/bin` directory
//! for the executable driver using this library.
//!
//! The core consumes a typed, semantically valid [front::ast::Program] (the
//! lexer, parser and semantic analyser live upstream) and renders assembly
//! for two targets: 32-bit ARM ([back::arm]) and the JVM via Jasmin text
//! ([back::jvm]).

pub mod common;
pub mod front;
pub mod middle;
pub mod back;
pub mod driver;
pub mod samples;
