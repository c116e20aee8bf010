pub mod filter;
pub mod walk;

pub use filter::NoiseFilter;
pub use walk::{extension_of, walk, FileDescriptor};
