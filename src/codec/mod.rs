//! Binary record codec for candle batches.
//!
//! ## File layout
//!
//! Every vault file is a 64-byte header followed by a dense array of
//! 96-byte records, all little-endian:
//!
//! ```text
//! Magic (4 bytes):            "HVLT"
//! Version (2 bytes):          u16, currently 1
//! Flags (2 bytes):            bit 0 = compressed payload marker
//! Record count (8 bytes):     i64, >= 0
//! First open_time (8 bytes):  i64 ticks since the Unix epoch
//! Last close_time (8 bytes):  i64 ticks since the Unix epoch
//! Interval (4 bytes):         i32 seconds (0 = tick, -1 = custom)
//! Reserved (28 bytes):        written as zero, ignored on read
//! ```
//!
//! Each record is two i64 tick instants followed by five 16-byte decimals
//! (`open`, `high`, `low`, `close`, `volume`). A decimal is stored as
//! `Decimal::serialize`'s four little-endian 32-bit words: the flags word
//! carrying scale and sign, then the 96-bit mantissa. Round-trip identity
//! is the contract; the codec never rescales or normalizes.

pub mod pool;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::candle::Candle;
use crate::error::{Result, VaultError};
use crate::interval::Interval;
use crate::ticks;
use pool::{BufferPool, PooledBuf};

/// File magic, `HVLT`.
pub const MAGIC: [u8; 4] = *b"HVLT";

/// Current format version.
pub const VERSION: u16 = 1;

/// Header size in bytes.
pub const HEADER_SIZE: usize = 64;

/// Record size in bytes.
pub const RECORD_SIZE: usize = 96;

/// Header flag bit marking a compressed payload.
pub const FLAG_COMPRESSED: u16 = 0x0001;

/// Decoded file header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub version: u16,
    pub flags: u16,
    pub record_count: i64,
    pub first_ticks: i64,
    pub last_ticks: i64,
    pub interval_seconds: i32,
}

impl Header {
    fn for_candles(candles: &[Candle], interval: Interval, compressed: bool) -> Self {
        Self {
            version: VERSION,
            flags: if compressed { FLAG_COMPRESSED } else { 0 },
            record_count: candles.len() as i64,
            first_ticks: candles.first().map_or(0, |c| ticks::to_ticks(c.open_time)),
            last_ticks: candles.last().map_or(0, |c| ticks::to_ticks(c.close_time)),
            interval_seconds: interval.storage_seconds(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    pub fn interval(&self) -> Interval {
        Interval::from_storage_seconds(self.interval_seconds)
    }

    pub fn marked_compressed(&self) -> bool {
        self.flags & FLAG_COMPRESSED != 0
    }

    /// First candle's open time; `None` for an empty file.
    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        (!self.is_empty()).then(|| ticks::from_ticks(self.first_ticks))
    }

    /// Last candle's close time; `None` for an empty file.
    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        (!self.is_empty()).then(|| ticks::from_ticks(self.last_ticks))
    }

    fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&MAGIC);
        out[4..6].copy_from_slice(&self.version.to_le_bytes());
        out[6..8].copy_from_slice(&self.flags.to_le_bytes());
        out[8..16].copy_from_slice(&self.record_count.to_le_bytes());
        out[16..24].copy_from_slice(&self.first_ticks.to_le_bytes());
        out[24..32].copy_from_slice(&self.last_ticks.to_le_bytes());
        out[32..36].copy_from_slice(&self.interval_seconds.to_le_bytes());
        // Bytes 36..64 stay reserved zeroes.
        out
    }

    fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(VaultError::Truncated {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }
        if bytes[0..4] != MAGIC {
            return Err(VaultError::BadMagic);
        }
        let version = u16::from_le_bytes(slice_to_array(&bytes[4..6]));
        if version > VERSION {
            return Err(VaultError::UnsupportedVersion(version));
        }
        let record_count = i64::from_le_bytes(slice_to_array(&bytes[8..16]));
        if record_count < 0 {
            return Err(VaultError::NegativeCount(record_count));
        }
        Ok(Self {
            version,
            flags: u16::from_le_bytes(slice_to_array(&bytes[6..8])),
            record_count,
            first_ticks: i64::from_le_bytes(slice_to_array(&bytes[16..24])),
            last_ticks: i64::from_le_bytes(slice_to_array(&bytes[24..32])),
            interval_seconds: i32::from_le_bytes(slice_to_array(&bytes[32..36])),
        })
    }
}

fn slice_to_array<const N: usize>(slice: &[u8]) -> [u8; N] {
    slice.try_into().expect("fixed-offset header slice")
}

fn record_bytes(candle: &Candle) -> [u8; RECORD_SIZE] {
    let mut out = [0u8; RECORD_SIZE];
    out[0..8].copy_from_slice(&ticks::to_ticks(candle.open_time).to_le_bytes());
    out[8..16].copy_from_slice(&ticks::to_ticks(candle.close_time).to_le_bytes());
    out[16..32].copy_from_slice(&candle.open.serialize());
    out[32..48].copy_from_slice(&candle.high.serialize());
    out[48..64].copy_from_slice(&candle.low.serialize());
    out[64..80].copy_from_slice(&candle.close.serialize());
    out[80..96].copy_from_slice(&candle.volume.serialize());
    out
}

fn parse_record(bytes: &[u8]) -> Candle {
    Candle {
        open_time: ticks::from_ticks(i64::from_le_bytes(slice_to_array(&bytes[0..8]))),
        close_time: ticks::from_ticks(i64::from_le_bytes(slice_to_array(&bytes[8..16]))),
        open: Decimal::deserialize(slice_to_array(&bytes[16..32])),
        high: Decimal::deserialize(slice_to_array(&bytes[32..48])),
        low: Decimal::deserialize(slice_to_array(&bytes[48..64])),
        close: Decimal::deserialize(slice_to_array(&bytes[64..80])),
        volume: Decimal::deserialize(slice_to_array(&bytes[80..96])),
    }
}

/// Encode candles in input order into a pooled buffer.
///
/// No sorting and no monotonicity validation: the buffer holds exactly what
/// the caller handed in. The buffer returns to the pool when dropped.
pub fn encode(candles: &[Candle], interval: Interval, compressed: bool) -> PooledBuf {
    let mut buf = BufferPool::global().get(HEADER_SIZE + candles.len() * RECORD_SIZE);
    let out = buf.vec_mut();
    out.extend_from_slice(&Header::for_candles(candles, interval, compressed).to_bytes());
    for candle in candles {
        out.extend_from_slice(&record_bytes(candle));
    }
    buf
}

/// Encode a header-only file: 64 bytes, zero count, zero timestamps.
pub fn encode_empty(interval: Interval, compressed: bool) -> PooledBuf {
    encode(&[], interval, compressed)
}

/// Decode a full buffer into candles plus its header.
pub fn decode(bytes: &[u8]) -> Result<(Vec<Candle>, Header)> {
    let header = Header::parse(bytes)?;
    let count = header.record_count as usize;
    let required = HEADER_SIZE + count * RECORD_SIZE;
    if bytes.len() < required {
        return Err(VaultError::Truncated {
            expected: required,
            actual: bytes.len(),
        });
    }
    let mut candles = Vec::with_capacity(count);
    for idx in 0..count {
        let offset = HEADER_SIZE + idx * RECORD_SIZE;
        candles.push(parse_record(&bytes[offset..offset + RECORD_SIZE]));
    }
    Ok((candles, header))
}

/// Decode only the 64-byte header. Validation matches `decode`; the record
/// payload is never touched, so callers can hand in just the file prefix.
pub fn decode_header(bytes: &[u8]) -> Result<Header> {
    Header::parse(bytes)
}

/// Write header then records to a stream, in that order, with no other
/// buffering assumptions.
pub async fn encode_to_stream<W: AsyncWrite + Unpin>(
    writer: &mut W,
    candles: &[Candle],
    interval: Interval,
    compressed: bool,
) -> Result<()> {
    let header = Header::for_candles(candles, interval, compressed);
    writer.write_all(&header.to_bytes()).await?;
    for candle in candles {
        writer.write_all(&record_bytes(candle)).await?;
    }
    writer.flush().await?;
    Ok(())
}

/// Read header then exactly `record_count * RECORD_SIZE` bytes of records
/// from a stream.
pub async fn decode_from_stream<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<(Vec<Candle>, Header)> {
    let mut header_bytes = [0u8; HEADER_SIZE];
    read_exact_or_truncated(reader, &mut header_bytes, HEADER_SIZE).await?;
    let header = Header::parse(&header_bytes)?;

    let count = header.record_count as usize;
    let mut candles = Vec::with_capacity(count);
    let mut record = [0u8; RECORD_SIZE];
    for _ in 0..count {
        read_exact_or_truncated(reader, &mut record, HEADER_SIZE + count * RECORD_SIZE).await?;
        candles.push(parse_record(&record));
    }
    Ok((candles, header))
}

async fn read_exact_or_truncated<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
    expected_total: usize,
) -> Result<()> {
    reader.read_exact(buf).await.map_err(|err| {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            VaultError::Truncated {
                expected: expected_total,
                actual: 0,
            }
        } else {
            VaultError::Io(err)
        }
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn sample_candles() -> Vec<Candle> {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        (0..3)
            .map(|i| {
                Candle::aligned(
                    t0 + chrono::Duration::hours(i),
                    Interval::H1,
                    dec!(100.5) + Decimal::from(i),
                    dec!(101.25),
                    dec!(99.875),
                    dec!(100.0001),
                    dec!(1234.56789),
                )
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_round_trip_preserves_every_field() {
        let candles = sample_candles();
        let buf = encode(&candles, Interval::H1, false);
        let (decoded, header) = decode(&buf).unwrap();

        assert_eq!(decoded, candles);
        assert_eq!(header.version, VERSION);
        assert_eq!(header.record_count, 3);
        assert_eq!(header.first_timestamp().unwrap(), candles[0].open_time);
        assert_eq!(header.last_timestamp().unwrap(), candles[2].close_time);
        assert_eq!(header.interval(), Interval::H1);
        assert_eq!(&buf[0..4], b"HVLT");
    }

    #[test]
    fn test_full_precision_decimals_survive() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let candle = Candle::aligned(
            t0,
            Interval::H1,
            dec!(0.12345678901234567890),
            dec!(9999999999.999999999999999999),
            dec!(0.0000000000000000000000000001),
            dec!(1234567890.123456789012345678),
            dec!(99999999999999999999999999.99),
        )
        .unwrap();

        let buf = encode(&[candle], Interval::H1, true);
        let (decoded, _) = decode(&buf).unwrap();
        let got = decoded[0];

        assert_eq!(got, candle);
        // Scale must survive byte-exactly, not just numeric equality.
        assert_eq!(got.open.scale(), candle.open.scale());
        assert_eq!(got.low.scale(), candle.low.scale());
        assert_eq!(got.volume.scale(), candle.volume.scale());
    }

    #[test]
    fn test_empty_encode_is_header_only() {
        let buf = encode_empty(Interval::M5, false);
        assert_eq!(buf.len(), HEADER_SIZE);

        let (candles, header) = decode(&buf).unwrap();
        assert!(candles.is_empty());
        assert_eq!(header.record_count, 0);
        assert_eq!(header.first_ticks, 0);
        assert_eq!(header.last_ticks, 0);
        assert_eq!(header.first_timestamp(), None);
    }

    #[test]
    fn test_compressed_flag_round_trips() {
        let buf = encode(&sample_candles(), Interval::H1, true);
        let (_, header) = decode(&buf).unwrap();
        assert!(header.marked_compressed());

        let buf = encode(&sample_candles(), Interval::H1, false);
        let (_, header) = decode(&buf).unwrap();
        assert!(!header.marked_compressed());
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = encode_empty(Interval::M1, false).into_vec();
        bytes[0] = b'X';
        assert!(matches!(decode(&bytes), Err(VaultError::BadMagic)));
    }

    #[test]
    fn test_short_input_rejected() {
        let err = decode(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, VaultError::Truncated { actual: 10, .. }));
    }

    #[test]
    fn test_future_version_rejected() {
        let mut bytes = encode_empty(Interval::M1, false).into_vec();
        bytes[4..6].copy_from_slice(&2u16.to_le_bytes());
        assert!(matches!(
            decode(&bytes),
            Err(VaultError::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn test_negative_count_rejected() {
        let mut bytes = encode_empty(Interval::M1, false).into_vec();
        bytes[8..16].copy_from_slice(&(-1i64).to_le_bytes());
        assert!(matches!(decode(&bytes), Err(VaultError::NegativeCount(-1))));
    }

    #[test]
    fn test_truncated_record_payload_rejected() {
        let buf = encode(&sample_candles(), Interval::H1, false);
        let short = &buf[..buf.len() - 1];
        assert!(matches!(decode(short), Err(VaultError::Truncated { .. })));
    }

    #[test]
    fn test_header_only_decode_ignores_payload() {
        let candles = sample_candles();
        let buf = encode(&candles, Interval::H1, false);
        let header = decode_header(&buf[..HEADER_SIZE]).unwrap();
        assert_eq!(header.record_count, candles.len() as i64);
    }

    #[tokio::test]
    async fn test_stream_round_trip() {
        let candles = sample_candles();
        let mut wire = Vec::new();
        encode_to_stream(&mut wire, &candles, Interval::H1, false)
            .await
            .unwrap();
        assert_eq!(wire.len(), HEADER_SIZE + candles.len() * RECORD_SIZE);

        let (decoded, header) = decode_from_stream(&mut wire.as_slice()).await.unwrap();
        assert_eq!(decoded, candles);
        assert_eq!(header.record_count, candles.len() as i64);
    }

    #[tokio::test]
    async fn test_stream_decode_truncated() {
        let candles = sample_candles();
        let mut wire = Vec::new();
        encode_to_stream(&mut wire, &candles, Interval::H1, false)
            .await
            .unwrap();
        wire.truncate(wire.len() - 10);

        let err = decode_from_stream(&mut wire.as_slice()).await.unwrap_err();
        assert!(matches!(err, VaultError::Truncated { .. }));
    }
}
