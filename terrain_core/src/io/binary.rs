//! Fixed-width little-endian point-cloud encoding.
//!
//! A file is a `u64` point count followed by one record per point:
//!
//! | layout      | id    | x, y, z                     | bytes |
//! |-------------|-------|-----------------------------|-------|
//! | `Full`      | `u64` | `f64`                       | 32    |
//! | `Quantized` | `u32` | `i16`, `round(value * 100)` | 10    |

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};

use crate::error::{Result, TerrainError};
use crate::store::{Centimetric, CoordinateCodec, PointStore, TerrainPoint};

const HEADER_LEN: usize = 8;

/// Record layout of an encoded point cloud.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordLayout {
    #[default]
    Full,
    Quantized,
}

impl RecordLayout {
    /// Bytes per encoded point.
    pub fn record_size(self) -> usize {
        match self {
            RecordLayout::Full => 32,
            RecordLayout::Quantized => 10,
        }
    }

    /// Encoded size of `count` points, header included.
    pub fn encoded_len(self, count: usize) -> Option<usize> {
        count.checked_mul(self.record_size())?.checked_add(HEADER_LEN)
    }
}

fn push_record(buf: &mut Vec<u8>, point: &TerrainPoint, layout: RecordLayout) -> Result<()> {
    match layout {
        RecordLayout::Full => {
            buf.extend_from_slice(&point.id().to_le_bytes());
            for v in point.coords() {
                buf.extend_from_slice(&v.to_le_bytes());
            }
        }
        RecordLayout::Quantized => {
            let id = u32::try_from(point.id()).map_err(|_| {
                TerrainError::invalid_point(point.id(), "id does not fit the quantized layout")
            })?;
            buf.extend_from_slice(&id.to_le_bytes());
            for v in point.coords() {
                buf.extend_from_slice(&Centimetric::quantize(point.id(), v)?.to_le_bytes());
            }
        }
    }
    Ok(())
}

fn parse_record(record: &[u8], layout: RecordLayout) -> Result<TerrainPoint> {
    let mut fields = [0f64; 3];
    let id = match layout {
        RecordLayout::Full => {
            for (i, field) in fields.iter_mut().enumerate() {
                let at = 8 + i * 8;
                *field = f64::from_le_bytes(le_bytes(&record[at..at + 8]));
            }
            u64::from_le_bytes(le_bytes(&record[..8]))
        }
        RecordLayout::Quantized => {
            for (i, field) in fields.iter_mut().enumerate() {
                let at = 4 + i * 2;
                *field = Centimetric::dequantize(i16::from_le_bytes(le_bytes(&record[at..at + 2])));
            }
            u32::from_le_bytes(le_bytes(&record[..4])) as u64
        }
    };
    TerrainPoint::new(id, fields[0], fields[1], fields[2])
}

fn le_bytes<const N: usize>(slice: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    out
}

fn parse_body<C: CoordinateCodec>(
    count: usize,
    body: &[u8],
    layout: RecordLayout,
) -> Result<PointStore<C>> {
    let points = body
        .chunks_exact(layout.record_size())
        .map(|record| parse_record(record, layout))
        .collect::<Result<Vec<_>>>()?;
    let mut store = PointStore::with_capacity(count);
    store.add_batch(points)?;
    Ok(store)
}

fn declared_count(header: [u8; HEADER_LEN]) -> Result<usize> {
    let count = u64::from_le_bytes(header);
    usize::try_from(count)
        .map_err(|_| TerrainError::Format(format!("point count {count} is too large")))
}

/// Encodes every point of `store` in position order.
pub fn encode<C: CoordinateCodec>(store: &PointStore<C>, layout: RecordLayout) -> Result<Vec<u8>> {
    let len = layout
        .encoded_len(store.len())
        .ok_or_else(|| TerrainError::Format("point cloud too large to encode".into()))?;
    let mut buf = Vec::with_capacity(len);
    buf.extend_from_slice(&(store.len() as u64).to_le_bytes());
    for point in store.iter() {
        push_record(&mut buf, &point, layout)?;
    }
    Ok(buf)
}

/// Decodes a buffer produced by [`encode`] with the same layout.
///
/// The buffer length must match the declared count exactly. Ids must be
/// unique and coordinates valid for the target store.
pub fn decode<C: CoordinateCodec>(bytes: &[u8], layout: RecordLayout) -> Result<PointStore<C>> {
    if bytes.len() < HEADER_LEN {
        return Err(TerrainError::Format(format!(
            "{} bytes is shorter than the header",
            bytes.len()
        )));
    }
    let count = declared_count(le_bytes(&bytes[..HEADER_LEN]))?;
    match layout.encoded_len(count) {
        Some(expected) if expected == bytes.len() => {}
        _ => {
            return Err(TerrainError::Format(format!(
                "{} points of {} bytes do not fit {} bytes of data",
                count,
                layout.record_size(),
                bytes.len()
            )))
        }
    }
    parse_body(count, &bytes[HEADER_LEN..], layout)
}

/// Streams the encoding of `store` into `writer`.
pub fn write_points<W: Write, C: CoordinateCodec>(
    writer: &mut W,
    store: &PointStore<C>,
    layout: RecordLayout,
) -> Result<()> {
    writer.write_all(&encode(store, layout)?)?;
    writer.flush()?;
    Ok(())
}

/// Reads one encoded point cloud from `reader`. Trailing data after the last
/// record is left unread.
pub fn read_points<R: Read, C: CoordinateCodec>(
    reader: &mut R,
    layout: RecordLayout,
) -> Result<PointStore<C>> {
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header)?;
    let count = declared_count(header)?;
    let body_len = count
        .checked_mul(layout.record_size())
        .ok_or_else(|| TerrainError::Format(format!("point count {count} is too large")))?;
    let mut body = Vec::new();
    reader.by_ref().take(body_len as u64).read_to_end(&mut body)?;
    if body.len() != body_len {
        return Err(TerrainError::Format(format!(
            "expected {} bytes of records, found {}",
            body_len,
            body.len()
        )));
    }
    parse_body(count, &body, layout)
}

pub fn save_binary<C: CoordinateCodec>(
    path: &str,
    store: &PointStore<C>,
    layout: RecordLayout,
) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_points(&mut writer, store, layout)?;
    log::debug!("wrote {} points to {}", store.len(), path);
    Ok(())
}

pub fn load_binary<C: CoordinateCodec>(path: &str, layout: RecordLayout) -> Result<PointStore<C>> {
    let mut reader = BufReader::new(File::open(path)?);
    let store = read_points(&mut reader, layout)?;
    log::debug!("read {} points from {}", store.len(), path);
    Ok(store)
}
