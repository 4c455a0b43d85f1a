//! Input parsers: Go coverage profiles and Go source files.

pub mod gocover;
pub mod golang;
