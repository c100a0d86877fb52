//! EMS export parsing: line-level record dispatch and file assembly.

mod assembler;
pub mod dates;
mod line;
pub mod vocab;

pub use assembler::EmsParser;
pub use line::{apply_line, RecordTag, DELIMITER};
