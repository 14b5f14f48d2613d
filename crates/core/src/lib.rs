#![deny(warnings)]

pub mod audio;
pub mod chunk;
pub mod config;
pub mod decode;
pub mod emotion;
pub mod error;
pub mod pipeline;
pub mod timeline;

pub use error::{AnalysisError, ErrorKind, ErrorReport};
pub use pipeline::{AnalysisReport, Analyzer, CancelSignal};
