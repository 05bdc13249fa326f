use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use csv::{Writer, WriterBuilder};
use thiserror::Error;

use crate::reconcile::{ReconciledRow, CSV_HEADER};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Destination for reconciled rows. Each row must be durable once
/// `write_row` returns, so a crash never loses rows already reported.
pub trait RowSink {
    fn write_row(&mut self, row: &ReconciledRow) -> Result<(), SinkError>;

    fn flush(&mut self) -> Result<(), SinkError>;
}

type Opener<W> = Box<dyn FnOnce() -> io::Result<W> + Send>;

/// Writes the fixed sale header, then one record per row, flushing after each.
///
/// The destination is only opened on the first `write_row` or `flush`, so a
/// run that fails before producing output leaves an existing file untouched.
pub struct CsvRowSink<W: Write> {
    opener: Option<Opener<W>>,
    writer: Option<Writer<W>>,
    placeholder: String,
}

impl CsvRowSink<File> {
    /// Truncates or creates `path` once the first row (or final flush) arrives.
    pub fn create(path: &Path, placeholder: impl Into<String>) -> Self {
        let path = path.to_path_buf();
        Self::with_opener(Box::new(move || File::create(path)), placeholder)
    }
}

impl<W: Write + Send + 'static> CsvRowSink<W> {
    #[cfg(test)]
    pub fn new(inner: W, placeholder: impl Into<String>) -> Self {
        Self::with_opener(Box::new(move || Ok(inner)), placeholder)
    }
}

impl<W: Write> CsvRowSink<W> {
    fn with_opener(opener: Opener<W>, placeholder: impl Into<String>) -> Self {
        Self {
            opener: Some(opener),
            writer: None,
            placeholder: placeholder.into(),
        }
    }

    fn writer(&mut self) -> Result<&mut Writer<W>, SinkError> {
        if let Some(opener) = self.opener.take() {
            let mut writer = WriterBuilder::new()
                .has_headers(false)
                .from_writer(opener()?);
            writer.write_record(CSV_HEADER)?;
            writer.flush()?;
            self.writer = Some(writer);
        }
        self.writer.as_mut().ok_or_else(not_opened)
    }

    #[cfg(test)]
    pub fn into_inner(mut self) -> Result<W, SinkError> {
        self.writer()?;
        let writer = self.writer.take().ok_or_else(not_opened)?;
        writer.into_inner().map_err(|e| SinkError::Io(e.into_error()))
    }
}

fn not_opened() -> SinkError {
    SinkError::Io(io::Error::new(
        io::ErrorKind::NotFound,
        "output could not be opened",
    ))
}

impl<W: Write> RowSink for CsvRowSink<W> {
    fn write_row(&mut self, row: &ReconciledRow) -> Result<(), SinkError> {
        let record = row.to_record(&self.placeholder);
        let writer = self.writer()?;
        writer.write_record(record)?;
        writer.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer()?.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::ListingColumns;
    use crate::testing::block_timestamp;

    fn row(player_name: &str) -> ReconciledRow {
        ReconciledRow {
            date: block_timestamp(0),
            listing: Some(ListingColumns {
                set_id: 3,
                set_name: "Genesis".to_string(),
                play_id: 7,
                serial_number: 11,
                player_name: player_name.to_string(),
            }),
            price: "50.00000000".to_string(),
        }
    }

    #[test]
    fn test_header_written_without_rows() {
        let sink = CsvRowSink::new(Vec::new(), "N/A");
        let out = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        assert_eq!(out, "Date,setID,setName,playID,serialNumber,playerName,price\n");
    }

    #[test]
    fn test_rows_are_quoted_when_needed() {
        let mut sink = CsvRowSink::new(Vec::new(), "N/A");
        sink.write_row(&row("Jane Doe")).unwrap();
        sink.write_row(&row("O'Neal, Shaquille")).unwrap();

        let out = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[1],
            "2021-03-05 18:34:12 UTC,3,Genesis,7,11,Jane Doe,50.00000000"
        );
        assert_eq!(
            lines[2],
            "2021-03-05 18:34:12 UTC,3,Genesis,7,11,\"O'Neal, Shaquille\",50.00000000"
        );
    }

    #[test]
    fn test_rows_visible_on_disk_before_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.csv");

        let mut sink = CsvRowSink::create(&path, "N/A");
        sink.write_row(&row("Jane Doe")).unwrap();

        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert_eq!(on_disk.lines().count(), 2);
        drop(sink);
    }

    #[test]
    fn test_existing_file_untouched_until_first_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.csv");
        std::fs::write(&path, "previous export\n").unwrap();

        let mut sink = CsvRowSink::create(&path, "N/A");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "previous export\n");

        sink.flush().unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "Date,setID,setName,playID,serialNumber,playerName,price\n"
        );
    }

    #[test]
    fn test_unopenable_path_fails_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("result.csv");

        let mut sink = CsvRowSink::create(&path, "N/A");
        assert!(matches!(sink.write_row(&row("Jane Doe")), Err(SinkError::Io(_))));
        assert!(matches!(sink.flush(), Err(SinkError::Io(_))));
    }
}
