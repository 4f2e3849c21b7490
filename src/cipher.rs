//! Payload encryption boundary.
//!
//! No cipher ships with sluice. Embedders that enable encryption register
//! an implementation with [`crate::pipeline::PipelineBuilder::cipher`];
//! the engine applies it to every record after the transformer chain and
//! before fan-out.

use crate::error::CipherError;
use crate::record::Record;

pub trait PayloadCipher: Send + Sync {
    /// Produce the encrypted form of `record` that destinations receive.
    fn encrypt(&self, record: &Record) -> Result<Record, CipherError>;
}

impl<F> PayloadCipher for F
where
    F: Fn(&Record) -> Result<Record, CipherError> + Send + Sync,
{
    fn encrypt(&self, record: &Record) -> Result<Record, CipherError> {
        self(record)
    }
}
