pub mod upload;

pub use upload::{IngestError, UploadGate, ValidationPolicy};
