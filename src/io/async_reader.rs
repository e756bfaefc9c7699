//! Asynchronous CSV command reader
//!
//! Streams `LedgerCommand`s out of a command file in batches so memory stays
//! flat regardless of input size.
//!
//! ```text
//! CSV bytes → AsyncReader → Vec<LedgerCommand> per batch
//!                  ↓
//!           csv_format module
//!           (CommandRecord, convert_command_record)
//! ```
//!
//! Malformed rows are logged and skipped; they never abort the stream.

use csv_async::AsyncReaderBuilder;
use futures::io::AsyncRead;
use futures::stream::StreamExt;

use crate::io::csv_format::{convert_command_record, CommandRecord, LedgerCommand};
use crate::types::LedgerError;

/// Batch reader over a command CSV
pub struct AsyncReader<R: AsyncRead + Unpin> {
    csv_reader: csv_async::AsyncDeserializer<R>,
}

impl<R: AsyncRead + Unpin + Send + 'static> AsyncReader<R> {
    pub fn new(reader: R) -> Self {
        let csv_reader = AsyncReaderBuilder::new()
            .flexible(true)
            .trim(csv_async::Trim::All)
            .create_deserializer(reader);

        Self { csv_reader }
    }

    /// Read up to `batch_size` valid commands
    ///
    /// Returns an empty vector once the input is exhausted.
    pub async fn read_batch(&mut self, batch_size: usize) -> Vec<LedgerCommand> {
        let mut batch = Vec::with_capacity(batch_size.min(1024));
        let mut records = self.csv_reader.deserialize::<CommandRecord>();

        while batch.len() < batch_size {
            match records.next().await {
                Some(Ok(record)) => match convert_command_record(record) {
                    Ok(command) => batch.push(command),
                    Err(e) => log::warn!("Skipping command: {}", e),
                },
                Some(Err(e)) => {
                    let error = LedgerError::ParseError {
                        line: e.position().map(|pos| pos.line()),
                        message: e.to_string(),
                    };
                    log::warn!("Skipping row: {}", error);
                }
                None => break,
            }
        }

        batch
    }
}
