//! Generic utility primitives with zero domain knowledge.
//!
//! - `parser` - `.env` line parsing
//! - `shell` - Shell escaping, quoting and terminal colour
//! - `template` - `{{placeholder}}` rendering

pub mod parser;
pub mod shell;
pub mod template;
