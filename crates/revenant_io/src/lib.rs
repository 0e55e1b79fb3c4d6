//! I/O adapters for the Revenant forensic tool: the memory-mapped image
//! reader shared by all decoders, and atomic export targets.

mod image;
mod output;

pub use image::ImageFile;
pub use output::OutputTarget;
