//! Wire side of the FoxTelemetry agent.
//!
//! - `encoder`: builds the deterministic JSON batch body
//! - `transport`: gzip + HTTPS POST, classifying every result into a
//!   [`FlushOutcome`] instead of an error

pub mod encoder;
mod error;
pub mod transport;

pub use encoder::{encode_batch, AccountIds};
pub use error::{IngestError, IngestResult};
pub use transport::{
    classify_status, gzip, BatchTransport, FlushOutcome, IngestTransport, TransportConfig,
    DEFAULT_TIMEOUT, INGEST_KEY_HEADER,
};
