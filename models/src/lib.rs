pub mod content;

pub use content::{content_model, CONTENT};
