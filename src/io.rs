// Detector serialization: a JSON descriptor per detector for the scalar
// metadata, with the Mean / SecondMoment arrays in flat little-endian
// binary blobs next to it. Complex bins are stored as (re, im) pairs.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use num_complex::Complex64;

use crate::detectors::{DetectorData, DetectorOutput};
use crate::error::DatabaseError;

/// Write a detector's descriptor and binary blobs into `dir`, named after
/// the detector: `<name>.json`, `<name>.bin`, and `<name>_2.bin` when a
/// second moment was tallied.
pub fn write_detector(dir: impl AsRef<Path>, output: &DetectorOutput) -> Result<(), DatabaseError> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    let descriptor = File::create(dir.join(format!("{}.json", output.name)))?;
    serde_json::to_writer_pretty(BufWriter::new(descriptor), output)?;
    write_blob(dir.join(format!("{}.bin", output.name)), &output.data)?;
    if let Some(sm) = &output.second_moment {
        write_blob(dir.join(format!("{}_2.bin", output.name)), sm)?;
    }
    Ok(())
}

/// Read a detector back from `dir`. Yields arrays identical to what was
/// written, with shapes recovered from the descriptor.
pub fn read_detector(dir: impl AsRef<Path>, name: &str) -> Result<DetectorOutput, DatabaseError> {
    let dir = dir.as_ref();
    let descriptor = File::open(dir.join(format!("{name}.json")))?;
    let mut output: DetectorOutput = serde_json::from_reader(BufReader::new(descriptor))?;
    let len: usize = output.shape.iter().product();
    let complex = output.kind.is_complex();
    output.data = read_blob(dir.join(format!("{name}.bin")), len, complex)?;
    output.second_moment = if output.has_second_moment {
        Some(read_blob(dir.join(format!("{name}_2.bin")), len, complex)?)
    } else {
        None
    };
    Ok(output)
}

fn write_blob(path: impl AsRef<Path>, data: &DetectorData) -> Result<(), DatabaseError> {
    let mut writer = BufWriter::new(File::create(path)?);
    match data {
        DetectorData::Real(values) => {
            for v in values {
                writer.write_f64::<LittleEndian>(*v)?;
            }
        }
        DetectorData::Complex(values) => {
            for v in values {
                writer.write_f64::<LittleEndian>(v.re)?;
                writer.write_f64::<LittleEndian>(v.im)?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}

fn read_blob(path: impl AsRef<Path>, len: usize, complex: bool) -> Result<DetectorData, DatabaseError> {
    let path = path.as_ref();
    let expected_bytes = len as u64 * 8 * if complex { 2 } else { 1 };
    let actual_bytes = std::fs::metadata(path)?.len();
    if actual_bytes != expected_bytes {
        return Err(DatabaseError::Truncated {
            path: path.display().to_string(),
            expected: expected_bytes,
            actual: actual_bytes,
        });
    }
    let mut reader = BufReader::new(File::open(path)?);
    if complex {
        let mut values = Vec::with_capacity(len);
        for _ in 0..len {
            let re = reader.read_f64::<LittleEndian>()?;
            let im = reader.read_f64::<LittleEndian>()?;
            values.push(Complex64::new(re, im));
        }
        Ok(DetectorData::Complex(values))
    } else {
        let mut values = Vec::with_capacity(len);
        for _ in 0..len {
            values.push(reader.read_f64::<LittleEndian>()?);
        }
        Ok(DetectorData::Real(values))
    }
}
