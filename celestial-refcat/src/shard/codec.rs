//! Binary shard file format.
//!
//! All integers and floats are little-endian.
//!
//! ```text
//! magic            4 bytes  "RSHD"
//! format_version   u32
//! depth            u8
//! cell             u64
//! reference_epoch  f64      MJD, NaN when unknown
//! column_count     u16
//! columns          column_count × (u16 length, UTF-8 bytes)
//! record_count     u64
//! records          record_count × record
//! ```
//!
//! Each record is `id: i64, ra: f64, dec: f64, flags: u8`, followed by the
//! optional fields selected by `flags` in flag order, then one `f64` per
//! flux column.

use std::fs::File;
use std::io::{BufWriter, Cursor, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use memmap2::Mmap;

use super::{ProperMotion, Shard, ShardRecord};
use crate::epoch::Epoch;
use crate::error::{RefcatError, RefcatResult};

const SHARD_MAGIC: &[u8; 4] = b"RSHD";

const FLAG_RA_ERR: u8 = 1 << 0;
const FLAG_DEC_ERR: u8 = 1 << 1;
const FLAG_PROPER_MOTION: u8 = 1 << 2;
const FLAG_PM_RA_ERR: u8 = 1 << 3;
const FLAG_PM_DEC_ERR: u8 = 1 << 4;
const FLAG_EPOCH: u8 = 1 << 5;

pub fn encode_shard<W: Write>(shard: &Shard, mut w: W) -> std::io::Result<()> {
    w.write_all(SHARD_MAGIC)?;
    w.write_u32::<LittleEndian>(shard.format_version)?;
    w.write_u8(shard.depth)?;
    w.write_u64::<LittleEndian>(shard.cell)?;
    w.write_f64::<LittleEndian>(shard.reference_epoch.map_or(f64::NAN, |e| e.mjd()))?;

    w.write_u16::<LittleEndian>(shard.flux_columns.len() as u16)?;
    for name in &shard.flux_columns {
        w.write_u16::<LittleEndian>(name.len() as u16)?;
        w.write_all(name.as_bytes())?;
    }

    w.write_u64::<LittleEndian>(shard.records.len() as u64)?;
    for record in &shard.records {
        write_record(&mut w, record)?;
    }
    w.flush()
}

fn write_record<W: Write>(w: &mut W, record: &ShardRecord) -> std::io::Result<()> {
    w.write_i64::<LittleEndian>(record.id)?;
    w.write_f64::<LittleEndian>(record.ra)?;
    w.write_f64::<LittleEndian>(record.dec)?;
    w.write_u8(record_flags(record))?;

    for value in [record.ra_err, record.dec_err].into_iter().flatten() {
        w.write_f64::<LittleEndian>(value)?;
    }
    if let Some(pm) = &record.proper_motion {
        w.write_f64::<LittleEndian>(pm.pm_ra)?;
        w.write_f64::<LittleEndian>(pm.pm_dec)?;
        for value in [pm.pm_ra_err, pm.pm_dec_err].into_iter().flatten() {
            w.write_f64::<LittleEndian>(value)?;
        }
    }
    if let Some(epoch) = record.epoch {
        w.write_f64::<LittleEndian>(epoch.mjd())?;
    }
    for &flux in &record.fluxes {
        w.write_f64::<LittleEndian>(flux)?;
    }
    Ok(())
}

fn record_flags(record: &ShardRecord) -> u8 {
    let mut flags = 0;
    if record.ra_err.is_some() {
        flags |= FLAG_RA_ERR;
    }
    if record.dec_err.is_some() {
        flags |= FLAG_DEC_ERR;
    }
    if let Some(pm) = &record.proper_motion {
        flags |= FLAG_PROPER_MOTION;
        if pm.pm_ra_err.is_some() {
            flags |= FLAG_PM_RA_ERR;
        }
        if pm.pm_dec_err.is_some() {
            flags |= FLAG_PM_DEC_ERR;
        }
    }
    if record.epoch.is_some() {
        flags |= FLAG_EPOCH;
    }
    flags
}

/// Decode a complete shard and check it with [`Shard::validate`].
pub fn decode_shard(bytes: &[u8]) -> RefcatResult<Shard> {
    let mut cursor = Cursor::new(bytes);
    let shard = read_shard(&mut cursor).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => RefcatError::shard_format("truncated shard data"),
        _ => RefcatError::shard_format(e.to_string()),
    })?;
    if (cursor.position() as usize) != bytes.len() {
        return Err(RefcatError::shard_format(format!(
            "{} trailing bytes after last record",
            bytes.len() - cursor.position() as usize
        )));
    }
    shard.validate()?;
    Ok(shard)
}

fn read_shard(r: &mut Cursor<&[u8]>) -> std::io::Result<Shard> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != SHARD_MAGIC {
        return Err(invalid_data(format!("invalid shard magic: {:?}", magic)));
    }
    let format_version = r.read_u32::<LittleEndian>()?;
    let depth = r.read_u8()?;
    let cell = r.read_u64::<LittleEndian>()?;
    let epoch_mjd = r.read_f64::<LittleEndian>()?;
    let reference_epoch = (!epoch_mjd.is_nan()).then(|| Epoch::from_mjd(epoch_mjd));

    let column_count = r.read_u16::<LittleEndian>()? as usize;
    let mut flux_columns = Vec::with_capacity(column_count);
    for _ in 0..column_count {
        let len = r.read_u16::<LittleEndian>()? as usize;
        let mut buf = vec![0u8; len];
        r.read_exact(&mut buf)?;
        let name = String::from_utf8(buf).map_err(|e| invalid_data(e.to_string()))?;
        flux_columns.push(name);
    }

    let record_count = r.read_u64::<LittleEndian>()?;
    let remaining = r.get_ref().len() as u64 - r.position();
    // Smallest possible record: id, ra, dec, flags and the flux row.
    let min_record = 25 + 8 * column_count as u64;
    if record_count.saturating_mul(min_record) > remaining {
        return Err(invalid_data(format!(
            "record count {} exceeds remaining {} bytes",
            record_count, remaining
        )));
    }

    let mut records = Vec::with_capacity(record_count as usize);
    for _ in 0..record_count {
        records.push(read_record(r, column_count)?);
    }

    Ok(Shard {
        cell,
        depth,
        format_version,
        reference_epoch,
        flux_columns,
        records,
    })
}

fn read_record(r: &mut Cursor<&[u8]>, column_count: usize) -> std::io::Result<ShardRecord> {
    let id = r.read_i64::<LittleEndian>()?;
    let ra = r.read_f64::<LittleEndian>()?;
    let dec = r.read_f64::<LittleEndian>()?;
    let flags = r.read_u8()?;

    let mut optional = |flag: u8| -> std::io::Result<Option<f64>> {
        if flags & flag != 0 {
            Ok(Some(r.read_f64::<LittleEndian>()?))
        } else {
            Ok(None)
        }
    };
    let ra_err = optional(FLAG_RA_ERR)?;
    let dec_err = optional(FLAG_DEC_ERR)?;
    let proper_motion = if flags & FLAG_PROPER_MOTION != 0 {
        let pm_ra = r.read_f64::<LittleEndian>()?;
        let pm_dec = r.read_f64::<LittleEndian>()?;
        let pm_ra_err = if flags & FLAG_PM_RA_ERR != 0 {
            Some(r.read_f64::<LittleEndian>()?)
        } else {
            None
        };
        let pm_dec_err = if flags & FLAG_PM_DEC_ERR != 0 {
            Some(r.read_f64::<LittleEndian>()?)
        } else {
            None
        };
        Some(ProperMotion {
            pm_ra,
            pm_dec,
            pm_ra_err,
            pm_dec_err,
        })
    } else {
        None
    };
    let epoch = if flags & FLAG_EPOCH != 0 {
        Some(Epoch::from_mjd(r.read_f64::<LittleEndian>()?))
    } else {
        None
    };

    let mut fluxes = Vec::with_capacity(column_count);
    for _ in 0..column_count {
        fluxes.push(r.read_f64::<LittleEndian>()?);
    }

    Ok(ShardRecord {
        id,
        ra,
        dec,
        ra_err,
        dec_err,
        proper_motion,
        epoch,
        fluxes,
    })
}

fn invalid_data(message: String) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message)
}

pub fn write_shard_file(shard: &Shard, path: impl AsRef<Path>) -> RefcatResult<()> {
    let path = path.as_ref();
    if shard.flux_columns.len() > u16::MAX as usize
        || shard.flux_columns.iter().any(|c| c.len() > u16::MAX as usize)
    {
        return Err(RefcatError::shard_format("too many or too long flux column names"));
    }
    let file = File::create(path).map_err(|e| RefcatError::io(path, e))?;
    encode_shard(shard, BufWriter::new(file)).map_err(|e| RefcatError::io(path, e))
}

/// Memory-map and decode a shard file.
pub fn read_shard_file(path: impl AsRef<Path>) -> RefcatResult<Shard> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| RefcatError::io(path, e))?;
    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| RefcatError::io(path, e))?;
    decode_shard(&mmap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shard::CURRENT_FORMAT_VERSION;

    fn sample_shard() -> Shard {
        let mut shard = Shard::new(5, 1, vec!["a_flux".into(), "a_fluxErr".into()]);
        shard.reference_epoch = Some(Epoch::from_mjd(58000.0));
        shard.records.push(ShardRecord {
            id: 25,
            ra: 12.5,
            dec: -3.25,
            ra_err: Some(1.5),
            dec_err: Some(2.5),
            proper_motion: Some(ProperMotion {
                pm_ra: 2121.32,
                pm_dec: -2121.32,
                pm_ra_err: Some(0.2),
                pm_dec_err: None,
            }),
            epoch: Some(Epoch::from_mjd(57000.0)),
            fluxes: vec![1234.5, f64::NAN],
        });
        shard.records.push(ShardRecord {
            id: -7,
            ra: 13.0,
            dec: -3.0,
            ra_err: None,
            dec_err: None,
            proper_motion: None,
            epoch: None,
            fluxes: vec![1.0, 0.1],
        });
        shard
    }

    fn encode(shard: &Shard) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_shard(shard, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_decode_preserves_optional_fields() {
        let shard = sample_shard();
        let decoded = decode_shard(&encode(&shard)).unwrap();
        assert_eq!(decoded.cell, 5);
        assert_eq!(decoded.format_version, CURRENT_FORMAT_VERSION);
        assert_eq!(decoded.reference_epoch, Some(Epoch::from_mjd(58000.0)));
        assert_eq!(decoded.records[0].proper_motion, shard.records[0].proper_motion);
        assert_eq!(decoded.records[0].epoch, shard.records[0].epoch);
        assert!(decoded.records[0].fluxes[1].is_nan());
        assert_eq!(decoded.records[1], shard.records[1]);
    }

    #[test]
    fn test_unknown_reference_epoch() {
        let mut shard = sample_shard();
        shard.reference_epoch = None;
        let decoded = decode_shard(&encode(&shard)).unwrap();
        assert_eq!(decoded.reference_epoch, None);
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut bytes = encode(&sample_shard());
        bytes[0] = b'X';
        let err = decode_shard(&bytes).unwrap_err();
        assert!(err.to_string().contains("magic"), "{err}");
    }

    #[test]
    fn test_rejects_truncation() {
        let bytes = encode(&sample_shard());
        let err = decode_shard(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, RefcatError::ShardFormat { .. }));
    }

    #[test]
    fn test_rejects_trailing_bytes() {
        let mut bytes = encode(&sample_shard());
        bytes.push(0);
        assert!(decode_shard(&bytes).is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("5.shard");
        let shard = sample_shard();
        write_shard_file(&shard, &path).unwrap();
        let loaded = read_shard_file(&path).unwrap();
        assert_eq!(loaded.records.len(), 2);
        assert_eq!(loaded.records[1], shard.records[1]);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_shard_file(dir.path().join("nope.shard")).unwrap_err();
        assert!(matches!(err, RefcatError::Io { .. }));
    }
}
