pub mod config;
pub mod errors;
pub mod types;

pub use config::{Compression, EncoderConfig};
pub use errors::{CaptureError, EncoderError};
pub use types::*;
