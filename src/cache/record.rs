//! The three metric-family record shapes and their binary wire codec
//! (§3, §6). Every multi-byte integer is written and read with
//! `to_le_bytes`/`from_le_bytes`, which is itself the whole endianness
//! normalization story: those conversions are no-ops on little-endian hosts
//! and swap bytes on big-endian ones, so the bytes landing on disk are
//! always canonical little-endian without any explicit `#[cfg(target_endian
//! = ...)]` branching.

use std::io::{self, Cursor, Read};

use crate::types::MetricValue;

const TAG_INT64: u8 = 0;
const TAG_DOUBLE: u8 = 1;
const TAG_STR: u8 = 2;
const TAG_BOOL: u8 = 3;
const TAG_ARRAY: u8 = 4;

const MAYBE_NONE: u8 = 0;
const MAYBE_SOME: u8 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct IndividualRecord {
    pub event_id: Vec<u8>,
    pub timestamp: i64,
    pub aux: Option<MetricValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRecord {
    pub event_id: Vec<u8>,
    pub count: i64,
    pub timestamp: i64,
    pub aux: Option<MetricValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SequenceRecord {
    pub event_id: Vec<u8>,
    pub events: Vec<(i64, Option<MetricValue>)>,
}

#[derive(Debug)]
pub struct DecodeError(pub String);

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn unexpected_eof() -> DecodeError {
    DecodeError("unexpected end of record".to_string())
}

fn read_exact_vec(cursor: &mut Cursor<&[u8]>, len: usize) -> Result<Vec<u8>, DecodeError> {
    let mut buf = vec![0u8; len];
    cursor.read_exact(&mut buf).map_err(|_| unexpected_eof())?;
    Ok(buf)
}

fn read_u8(cursor: &mut Cursor<&[u8]>) -> Result<u8, DecodeError> {
    let mut buf = [0u8; 1];
    cursor.read_exact(&mut buf).map_err(|_| unexpected_eof())?;
    Ok(buf[0])
}

fn read_i64(cursor: &mut Cursor<&[u8]>) -> Result<i64, DecodeError> {
    let mut buf = [0u8; 8];
    cursor.read_exact(&mut buf).map_err(|_| unexpected_eof())?;
    Ok(i64::from_le_bytes(buf))
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32, DecodeError> {
    let mut buf = [0u8; 4];
    cursor.read_exact(&mut buf).map_err(|_| unexpected_eof())?;
    Ok(u32::from_le_bytes(buf))
}

fn write_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

fn read_bytes(cursor: &mut Cursor<&[u8]>) -> Result<Vec<u8>, DecodeError> {
    let len = read_u32(cursor)? as usize;
    read_exact_vec(cursor, len)
}

fn encode_value(buf: &mut Vec<u8>, value: &MetricValue) {
    match value {
        MetricValue::Int64(n) => {
            buf.push(TAG_INT64);
            buf.extend_from_slice(&n.to_le_bytes());
        }
        MetricValue::Double(d) => {
            buf.push(TAG_DOUBLE);
            buf.extend_from_slice(&d.to_le_bytes());
        }
        MetricValue::Str(s) => {
            buf.push(TAG_STR);
            write_bytes(buf, s.as_bytes());
        }
        MetricValue::Bool(b) => {
            buf.push(TAG_BOOL);
            buf.push(*b as u8);
        }
        MetricValue::Array(items) => {
            buf.push(TAG_ARRAY);
            buf.extend_from_slice(&(items.len() as u32).to_le_bytes());
            for item in items {
                encode_value(buf, item);
            }
        }
    }
}

fn decode_value(cursor: &mut Cursor<&[u8]>) -> Result<MetricValue, DecodeError> {
    match read_u8(cursor)? {
        TAG_INT64 => Ok(MetricValue::Int64(read_i64(cursor)?)),
        TAG_DOUBLE => {
            let mut buf = [0u8; 8];
            cursor.read_exact(&mut buf).map_err(|_| unexpected_eof())?;
            Ok(MetricValue::Double(f64::from_le_bytes(buf)))
        }
        TAG_STR => {
            let bytes = read_bytes(cursor)?;
            String::from_utf8(bytes)
                .map(MetricValue::Str)
                .map_err(|e| DecodeError(format!("invalid utf-8 in string value: {e}")))
        }
        TAG_BOOL => Ok(MetricValue::Bool(read_u8(cursor)? != 0)),
        TAG_ARRAY => {
            let len = read_u32(cursor)? as usize;
            let mut items = Vec::with_capacity(len);
            for _ in 0..len {
                items.push(decode_value(cursor)?);
            }
            Ok(MetricValue::Array(items))
        }
        other => Err(DecodeError(format!("unknown value tag {other}"))),
    }
}

fn encode_maybe(buf: &mut Vec<u8>, value: &Option<MetricValue>) {
    match value {
        None => buf.push(MAYBE_NONE),
        Some(v) => {
            buf.push(MAYBE_SOME);
            encode_value(buf, v);
        }
    }
}

fn decode_maybe(cursor: &mut Cursor<&[u8]>) -> Result<Option<MetricValue>, DecodeError> {
    match read_u8(cursor)? {
        MAYBE_NONE => Ok(None),
        MAYBE_SOME => Ok(Some(decode_value(cursor)?)),
        other => Err(DecodeError(format!("unknown maybe-variant tag {other}"))),
    }
}

pub fn encode_individual(record: &IndividualRecord) -> Vec<u8> {
    let mut buf = Vec::new();
    write_bytes(&mut buf, &record.event_id);
    buf.extend_from_slice(&record.timestamp.to_le_bytes());
    encode_maybe(&mut buf, &record.aux);
    buf
}

pub fn decode_individual(bytes: &[u8]) -> Result<IndividualRecord, DecodeError> {
    let mut cursor = Cursor::new(bytes);
    let event_id = read_bytes(&mut cursor)?;
    let timestamp = read_i64(&mut cursor)?;
    let aux = decode_maybe(&mut cursor)?;
    Ok(IndividualRecord {
        event_id,
        timestamp,
        aux,
    })
}

pub fn encode_aggregate(record: &AggregateRecord) -> Vec<u8> {
    let mut buf = Vec::new();
    write_bytes(&mut buf, &record.event_id);
    buf.extend_from_slice(&record.count.to_le_bytes());
    buf.extend_from_slice(&record.timestamp.to_le_bytes());
    encode_maybe(&mut buf, &record.aux);
    buf
}

pub fn decode_aggregate(bytes: &[u8]) -> Result<AggregateRecord, DecodeError> {
    let mut cursor = Cursor::new(bytes);
    let event_id = read_bytes(&mut cursor)?;
    let count = read_i64(&mut cursor)?;
    let timestamp = read_i64(&mut cursor)?;
    let aux = decode_maybe(&mut cursor)?;
    Ok(AggregateRecord {
        event_id,
        count,
        timestamp,
        aux,
    })
}

pub fn encode_sequence(record: &SequenceRecord) -> Vec<u8> {
    let mut buf = Vec::new();
    write_bytes(&mut buf, &record.event_id);
    buf.extend_from_slice(&(record.events.len() as u32).to_le_bytes());
    for (timestamp, aux) in &record.events {
        buf.extend_from_slice(&timestamp.to_le_bytes());
        encode_maybe(&mut buf, aux);
    }
    buf
}

pub fn decode_sequence(bytes: &[u8]) -> Result<SequenceRecord, DecodeError> {
    let mut cursor = Cursor::new(bytes);
    let event_id = read_bytes(&mut cursor)?;
    let count = read_u32(&mut cursor)? as usize;
    let mut events = Vec::with_capacity(count);
    for _ in 0..count {
        let timestamp = read_i64(&mut cursor)?;
        let aux = decode_maybe(&mut cursor)?;
        events.push((timestamp, aux));
    }
    Ok(SequenceRecord { event_id, events })
}

/// Write a length-prefixed record: an 8-byte little-endian length followed
/// by `bytes`, matching the outer framing scheme the teacher's own
/// write-ahead log uses for its manifest entries.
pub fn write_framed_record<W: io::Write>(writer: &mut W, bytes: &[u8]) -> io::Result<()> {
    writer.write_all(&(bytes.len() as u64).to_le_bytes())?;
    writer.write_all(bytes)
}

/// Read one length-prefixed record. Returns `Ok(None)` at a clean
/// end-of-file between records (no more records). A short read on the
/// payload after a length prefix was read is an error: it means a crash
/// left a truncated trailing record, and per §5 that partial record is
/// lost rather than silently accepted.
pub fn read_framed_record<R: io::Read>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 8];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u64::from_le_bytes(len_buf) as usize;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(Some(payload))
}

/// The number of bytes a framed record of `payload_len` bytes occupies on
/// disk, including its length prefix.
pub fn framed_record_size(payload_len: usize) -> u64 {
    8 + payload_len as u64
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn individual_record_roundtrips() {
        let record = IndividualRecord {
            event_id: vec![1, 2, 3, 4],
            timestamp: 1234,
            aux: Some(MetricValue::Str("hi".to_string())),
        };
        let bytes = encode_individual(&record);
        assert_eq!(decode_individual(&bytes).unwrap(), record);
    }

    #[test]
    fn aggregate_record_roundtrips_with_no_aux() {
        let record = AggregateRecord {
            event_id: vec![9, 9],
            count: 10,
            timestamp: -5,
            aux: None,
        };
        let bytes = encode_aggregate(&record);
        assert_eq!(decode_aggregate(&bytes).unwrap(), record);
    }

    #[test]
    fn sequence_record_roundtrips() {
        let record = SequenceRecord {
            event_id: vec![0xAA],
            events: vec![
                (1, None),
                (2, Some(MetricValue::Bool(true))),
                (3, Some(MetricValue::Double(1.5))),
            ],
        };
        let bytes = encode_sequence(&record);
        assert_eq!(decode_sequence(&bytes).unwrap(), record);
    }

    #[test]
    fn int64_payload_is_little_endian_on_disk() {
        let record = IndividualRecord {
            event_id: vec![],
            timestamp: 0x0102030405060708,
            aux: None,
        };
        let bytes = encode_individual(&record);
        // event_id length (u32 LE, zero) then the 8-byte timestamp
        let ts_bytes = &bytes[4..12];
        assert_eq!(ts_bytes, &[0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn framed_record_roundtrips_through_a_buffer() {
        let mut buf = Vec::new();
        write_framed_record(&mut buf, b"hello").unwrap();
        write_framed_record(&mut buf, b"world!").unwrap();

        let mut cursor = Cursor::new(buf.as_slice());
        assert_eq!(
            read_framed_record(&mut cursor).unwrap(),
            Some(b"hello".to_vec())
        );
        assert_eq!(
            read_framed_record(&mut cursor).unwrap(),
            Some(b"world!".to_vec())
        );
        assert_eq!(read_framed_record(&mut cursor).unwrap(), None);
    }

    #[test]
    fn truncated_trailing_record_is_an_error() {
        let mut buf = Vec::new();
        write_framed_record(&mut buf, b"hello").unwrap();
        buf.truncate(buf.len() - 2); // chop two bytes off the payload
        let mut cursor = Cursor::new(buf.as_slice());
        assert!(read_framed_record(&mut cursor).is_err());
    }
}
