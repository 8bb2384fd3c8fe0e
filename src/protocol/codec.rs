//! Binary framing for records and batches.
//!
//! A record is encoded as:
//!
//! | Field       | Size     | Encoding                        |
//! |-------------|----------|---------------------------------|
//! | first name  | 1 + n B  | length prefix, raw bytes        |
//! | last name   | 1 + n B  | length prefix, raw bytes        |
//! | document    | 4 B      | big-endian `u32`                |
//! | birth date  | 10 B     | ASCII `YYYY-MM-DD`              |
//! | number      | 2 B      | big-endian `u16`                |
//!
//! A batch is a 2-byte big-endian record count and a 1-byte agency id
//! followed by the encoded records. The batch is cut into frames of at most
//! [`MAX_FRAME_BYTES`]; the header is written once, at the start of the
//! first frame, and the count always covers the whole batch. A receiver
//! therefore reads the concatenated frames as a single batch message.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::Decoder;

use crate::models::record::BIRTH_DATE_LEN;
use crate::models::{Batch, Record};
use crate::{AppError, Result};

/// Upper bound on the byte length of one frame.
pub const MAX_FRAME_BYTES: usize = 8000;

/// Longest name a one-byte length prefix can describe.
pub const MAX_NAME_BYTES: usize = 255;

/// Width of the birth date field.
pub const BIRTH_DATE_BYTES: usize = BIRTH_DATE_LEN;

/// Batch header: record count (2 B) and agency id (1 B).
pub const BATCH_HEADER_BYTES: usize = 3;

/// Control byte sent once the winner set has been consumed.
pub const FINISH_BYTE: u8 = 2;

/// Fixed-width tail of a record: document, birth date, number.
const RECORD_TAIL_BYTES: usize = 4 + BIRTH_DATE_BYTES + 2;

/// Encode a single record.
///
/// # Errors
///
/// Returns `AppError::FieldTooLong` if either name exceeds
/// [`MAX_NAME_BYTES`]; nothing is emitted in that case.
pub fn encode_record(record: &Record) -> Result<Bytes> {
    let (first_len, first) = checked_name("first_name", record.first_name())?;
    let (last_len, last) = checked_name("last_name", record.last_name())?;

    let mut buf = BytesMut::with_capacity(2 + first.len() + last.len() + RECORD_TAIL_BYTES);
    buf.put_u8(first_len);
    buf.put_slice(first);
    buf.put_u8(last_len);
    buf.put_slice(last);
    buf.put_u32(record.document());
    buf.put_slice(record.birth_date().as_bytes());
    buf.put_u16(record.number());
    Ok(buf.freeze())
}

/// Encode a batch into frames of at most [`MAX_FRAME_BYTES`].
///
/// # Errors
///
/// Returns `AppError::FieldTooLong` if any record fails to encode or the
/// record count does not fit the 2-byte count field.
pub fn encode_batch(batch: &Batch) -> Result<Vec<Bytes>> {
    encode_batch_with_limit(batch, MAX_FRAME_BYTES)
}

/// Encode a batch with an explicit per-frame byte cap.
///
/// Records are appended greedily; a frame is sealed when the next record
/// would push it past `max_frame`. A record is never split, so a single
/// record larger than the cap travels alone in an oversized frame.
///
/// # Errors
///
/// See [`encode_batch`].
pub fn encode_batch_with_limit(batch: &Batch, max_frame: usize) -> Result<Vec<Bytes>> {
    let count = u16::try_from(batch.len()).map_err(|_| {
        AppError::FieldTooLong(format!(
            "batch holds {} records, count field allows {}",
            batch.len(),
            u16::MAX
        ))
    })?;

    // Encode everything up front so a bad record leaves no partial output.
    let encoded = batch
        .records()
        .iter()
        .map(encode_record)
        .collect::<Result<Vec<_>>>()?;

    let mut frames = Vec::new();
    let mut current = BytesMut::with_capacity(max_frame.min(MAX_FRAME_BYTES));
    current.put_u16(count);
    current.put_u8(batch.agency());

    for record in encoded {
        if !current.is_empty() && current.len() + record.len() > max_frame {
            frames.push(current.split().freeze());
        }
        current.extend_from_slice(&record);
    }

    if !current.is_empty() {
        frames.push(current.freeze());
    }

    Ok(frames)
}

/// Decode one record from the front of `src`.
///
/// Returns `Ok(None)` when `src` does not yet hold a complete record,
/// otherwise the record and the number of bytes it occupied.
///
/// # Errors
///
/// Returns `AppError::InvalidRecord` if a name is not UTF-8 or the birth
/// date is malformed.
pub fn decode_record(src: &[u8]) -> Result<Option<(Record, usize)>> {
    let mut cursor = src;

    let Some(first_name) = take_name(&mut cursor)? else {
        return Ok(None);
    };
    let Some(last_name) = take_name(&mut cursor)? else {
        return Ok(None);
    };
    if cursor.remaining() < RECORD_TAIL_BYTES {
        return Ok(None);
    }

    let document = cursor.get_u32();
    let birth_date = std::str::from_utf8(&cursor[..BIRTH_DATE_BYTES])
        .map_err(|err| AppError::InvalidRecord(format!("birth date is not utf-8: {err}")))?
        .to_owned();
    cursor.advance(BIRTH_DATE_BYTES);
    let number = cursor.get_u16();

    let record = Record::new(first_name, last_name, document, birth_date, number)?;
    Ok(Some((record, src.len() - cursor.len())))
}

/// Decode a complete batch message (header plus every record).
///
/// `src` is the concatenation of all frames produced for one batch.
///
/// # Errors
///
/// Returns `AppError::InvalidRecord` if `src` is truncated, carries
/// trailing bytes, or contains a malformed record.
pub fn decode_batch(src: &[u8]) -> Result<Batch> {
    let mut buf = BytesMut::from(src);
    let batch = BatchDecoder::new()
        .decode(&mut buf)?
        .ok_or_else(|| AppError::InvalidRecord("truncated batch".into()))?;
    if !buf.is_empty() {
        return Err(AppError::InvalidRecord(format!(
            "{} trailing bytes after batch",
            buf.len()
        )));
    }
    Ok(batch)
}

/// Streaming decoder for batch messages, as read by an aggregator.
///
/// Use with [`tokio_util::codec::FramedRead`]. Frame boundaries are not
/// visible on the stream; the decoder reads the header, then exactly as many
/// records as the header announces.
#[derive(Debug, Default)]
pub struct BatchDecoder {
    pending: Option<PendingBatch>,
}

#[derive(Debug)]
struct PendingBatch {
    agency: u8,
    expected: usize,
    records: Vec<Record>,
}

impl BatchDecoder {
    /// Create a decoder awaiting a batch header.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for BatchDecoder {
    type Item = Batch;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if self.pending.is_none() {
            if src.len() < BATCH_HEADER_BYTES {
                return Ok(None);
            }
            let expected = usize::from(src.get_u16());
            let agency = src.get_u8();
            self.pending = Some(PendingBatch {
                agency,
                expected,
                records: Vec::with_capacity(expected),
            });
        }

        let Some(pending) = self.pending.as_mut() else {
            return Ok(None);
        };

        while pending.records.len() < pending.expected {
            match decode_record(src)? {
                Some((record, used)) => {
                    src.advance(used);
                    pending.records.push(record);
                }
                None => return Ok(None),
            }
        }

        Ok(self
            .pending
            .take()
            .map(|done| Batch::new(done.agency, done.records)))
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// Length prefix and bytes of a name, rejecting names over [`MAX_NAME_BYTES`].
fn checked_name<'a>(field: &str, name: &'a str) -> Result<(u8, &'a [u8])> {
    let bytes = name.as_bytes();
    let len = u8::try_from(bytes.len()).map_err(|_| {
        AppError::FieldTooLong(format!(
            "{field} is {} bytes, limit is {MAX_NAME_BYTES}",
            bytes.len()
        ))
    })?;
    Ok((len, bytes))
}

fn take_name(cursor: &mut &[u8]) -> Result<Option<String>> {
    let Some(&len) = cursor.first() else {
        return Ok(None);
    };
    let len = usize::from(len);
    if cursor.len() < 1 + len {
        return Ok(None);
    }
    let name = std::str::from_utf8(&cursor[1..=len])
        .map_err(|err| AppError::InvalidRecord(format!("name is not utf-8: {err}")))?
        .to_owned();
    cursor.advance(1 + len);
    Ok(Some(name))
}
