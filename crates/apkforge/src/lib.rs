pub mod apktool;
pub mod brand;
pub mod bundle;
pub mod config;
pub mod error;
pub mod inject;
pub mod pipeline;
pub mod sign;
pub mod tool;
pub mod workspace;

pub use error::{Error, Result};
