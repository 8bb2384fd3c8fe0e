//! File-backed record source.
//!
//! Reads a headerless CSV file, one record per line:
//!
//! ```text
//! first_name,last_name,document,birth_date,number
//! Santiago Lionel,Lorca,30904465,1999-03-17,2201
//! ```
//!
//! Blank lines are skipped. Fields are split on `,` without quoting.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

use super::RecordSource;
use crate::models::Record;
use crate::{AppError, Result};

const FIELD_COUNT: usize = 5;

/// Lazily reads records from a CSV file.
#[derive(Debug)]
pub struct CsvRecordSource {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_no: usize,
    finished: bool,
}

impl CsvRecordSource {
    /// Open `path` for reading.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Source` if the file cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .await
            .map_err(|err| AppError::Source(format!("cannot open {}: {err}", path.display())))?;

        Ok(Self {
            path,
            lines: BufReader::new(file).lines(),
            line_no: 0,
            finished: false,
        })
    }

    async fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            let line = self.lines.next_line().await.map_err(|err| {
                AppError::Source(format!("read {} failed: {err}", self.path.display()))
            })?;
            let Some(line) = line else {
                self.finished = true;
                return Ok(None);
            };
            self.line_no += 1;

            if line.trim().is_empty() {
                continue;
            }
            return parse_line(&line)
                .map(Some)
                .map_err(|err| with_line(err, self.line_no));
        }
    }
}

impl RecordSource for CsvRecordSource {
    fn read_batch(
        &mut self,
        max: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Record>>> + Send + '_>> {
        Box::pin(async move {
            let mut records = Vec::with_capacity(max);
            while records.len() < max && !self.finished {
                match self.next_record().await? {
                    Some(record) => records.push(record),
                    None => break,
                }
            }
            Ok(records)
        })
    }

    fn is_exhausted(&self) -> bool {
        self.finished
    }
}

/// Parse one CSV row into a [`Record`].
///
/// # Errors
///
/// Returns `AppError::Source` for a wrong field count or unparsable numbers,
/// `AppError::InvalidRecord` for a bad birth date.
pub fn parse_line(line: &str) -> Result<Record> {
    let fields: Vec<&str> = line.trim_end_matches('\r').split(',').collect();
    let [first_name, last_name, document, birth_date, number] = fields[..] else {
        return Err(AppError::Source(format!(
            "expected {FIELD_COUNT} fields, found {}",
            fields.len()
        )));
    };

    let document: u32 = document
        .trim()
        .parse()
        .map_err(|err| AppError::Source(format!("document '{document}': {err}")))?;
    let number: u16 = number
        .trim()
        .parse()
        .map_err(|err| AppError::Source(format!("number '{number}': {err}")))?;

    Record::new(first_name, last_name, document, birth_date.trim(), number)
}

fn with_line(err: AppError, line_no: usize) -> AppError {
    match err {
        AppError::Source(msg) => AppError::Source(format!("line {line_no}: {msg}")),
        AppError::InvalidRecord(msg) => AppError::InvalidRecord(format!("line {line_no}: {msg}")),
        other => other,
    }
}
