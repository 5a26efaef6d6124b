pub mod walk;

pub use walk::{list_directory, Exclusions};
