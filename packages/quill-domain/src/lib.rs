pub mod store;

pub use store::{Document, DocumentStore, Reference};
