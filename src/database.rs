// Persisted photon databases: two correlated little-endian binary streams
// per capture boundary, one of terminal photon records and one of
// per-region collision info. Records are fixed-size so the pMC engine can
// stream N records sequentially without loading either file into memory.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::debug;

use crate::error::DatabaseError;
use crate::photon::{PhotonDataPoint, PhotonState, PhotonStatus, SubRegionInfo};

const PHOTON_MAGIC: u32 = 0x544D_4350; // "TMCP"
const COLLISION_MAGIC: u32 = 0x544D_4343; // "TMCC"
const FORMAT_VERSION: u16 = 1;
const HEADER_LEN: u64 = 4 + 2 + 2;
/// position + direction + weight as f64, state as u8
const PHOTON_RECORD_LEN: u64 = 7 * 8 + 1;

/// Terminal state of one photon, as persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotonRecord {
    pub position: [f64; 3],
    pub direction: [f64; 3],
    pub weight: f64,
    pub state: PhotonState,
}

impl PhotonRecord {
    pub fn from_terminal_point(dp: &PhotonDataPoint) -> Self {
        Self {
            position: dp.position,
            direction: dp.direction,
            weight: dp.weight,
            state: dp.status.state,
        }
    }

    /// Rebuild a data point for re-tallying. The crossing marker is not
    /// persisted; surface detectors gate on the state alone.
    pub fn to_data_point(&self, sub_region_info: Vec<SubRegionInfo>) -> PhotonDataPoint {
        PhotonDataPoint {
            position: self.position,
            direction: self.direction,
            weight: self.weight,
            status: PhotonStatus { state: self.state, crossing: None },
            sub_region_info,
        }
    }
}

/// Append-only writer for terminal photon records.
pub struct PhotonDatabaseWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    count: u64,
}

impl PhotonDatabaseWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let path = path.as_ref().to_path_buf();
        let mut writer = BufWriter::new(File::create(&path)?);
        writer.write_u32::<LittleEndian>(PHOTON_MAGIC)?;
        writer.write_u16::<LittleEndian>(FORMAT_VERSION)?;
        writer.write_u16::<LittleEndian>(0)?; // photon records carry no region count
        Ok(Self { writer, path, count: 0 })
    }

    pub fn append(&mut self, record: &PhotonRecord) -> Result<(), DatabaseError> {
        for v in record.position.iter().chain(record.direction.iter()) {
            self.writer.write_f64::<LittleEndian>(*v)?;
        }
        self.writer.write_f64::<LittleEndian>(record.weight)?;
        self.writer.write_u8(record.state.to_u8())?;
        self.count += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<u64, DatabaseError> {
        self.writer.flush()?;
        debug!(path = %self.path.display(), records = self.count, "photon database written");
        Ok(self.count)
    }
}

/// Streaming reader for terminal photon records.
#[derive(Debug)]
pub struct PhotonDatabaseReader {
    reader: BufReader<File>,
    path: PathBuf,
    count: u64,
    read: u64,
}

impl PhotonDatabaseReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let magic = reader.read_u32::<LittleEndian>()?;
        if magic != PHOTON_MAGIC {
            return Err(DatabaseError::BadHeader {
                path: path.display().to_string(),
                reason: format!("bad magic 0x{magic:08x}"),
            });
        }
        let version = reader.read_u16::<LittleEndian>()?;
        if version != FORMAT_VERSION {
            return Err(DatabaseError::BadHeader {
                path: path.display().to_string(),
                reason: format!("unsupported version {version}"),
            });
        }
        let _ = reader.read_u16::<LittleEndian>()?;
        let payload = len - HEADER_LEN;
        if payload % PHOTON_RECORD_LEN != 0 {
            return Err(DatabaseError::Truncated {
                path: path.display().to_string(),
                expected: payload / PHOTON_RECORD_LEN + 1,
                actual: payload / PHOTON_RECORD_LEN,
            });
        }
        let count = payload / PHOTON_RECORD_LEN;
        Ok(Self { reader, path, count, read: 0 })
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn read_next(&mut self) -> Result<Option<PhotonRecord>, DatabaseError> {
        if self.read == self.count {
            return Ok(None);
        }
        let mut values = [0.0f64; 7];
        for v in &mut values {
            *v = self.reader.read_f64::<LittleEndian>()?;
        }
        let state_tag = self.reader.read_u8()?;
        let state = PhotonState::from_u8(state_tag).ok_or_else(|| DatabaseError::BadHeader {
            path: self.path.display().to_string(),
            reason: format!("unknown photon state tag {state_tag}"),
        })?;
        self.read += 1;
        Ok(Some(PhotonRecord {
            position: [values[0], values[1], values[2]],
            direction: [values[3], values[4], values[5]],
            weight: values[6],
            state,
        }))
    }
}

/// Append-only writer for per-region collision info records.
pub struct CollisionInfoDatabaseWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    num_regions: usize,
    count: u64,
}

impl CollisionInfoDatabaseWriter {
    pub fn create(path: impl AsRef<Path>, num_regions: usize) -> Result<Self, DatabaseError> {
        let path = path.as_ref().to_path_buf();
        let mut writer = BufWriter::new(File::create(&path)?);
        writer.write_u32::<LittleEndian>(COLLISION_MAGIC)?;
        writer.write_u16::<LittleEndian>(FORMAT_VERSION)?;
        writer.write_u16::<LittleEndian>(num_regions as u16)?;
        Ok(Self { writer, path, num_regions, count: 0 })
    }

    pub fn append(&mut self, info: &[SubRegionInfo]) -> Result<(), DatabaseError> {
        debug_assert_eq!(info.len(), self.num_regions);
        for sub in info {
            self.writer.write_f64::<LittleEndian>(sub.path_length)?;
            self.writer.write_u64::<LittleEndian>(sub.collision_count)?;
        }
        self.count += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<u64, DatabaseError> {
        self.writer.flush()?;
        debug!(path = %self.path.display(), records = self.count, "collision database written");
        Ok(self.count)
    }
}

/// Streaming reader for collision info records.
#[derive(Debug)]
pub struct CollisionInfoDatabaseReader {
    reader: BufReader<File>,
    num_regions: usize,
    count: u64,
    read: u64,
}

impl CollisionInfoDatabaseReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let magic = reader.read_u32::<LittleEndian>()?;
        if magic != COLLISION_MAGIC {
            return Err(DatabaseError::BadHeader {
                path: path.display().to_string(),
                reason: format!("bad magic 0x{magic:08x}"),
            });
        }
        let version = reader.read_u16::<LittleEndian>()?;
        if version != FORMAT_VERSION {
            return Err(DatabaseError::BadHeader {
                path: path.display().to_string(),
                reason: format!("unsupported version {version}"),
            });
        }
        let num_regions = reader.read_u16::<LittleEndian>()? as usize;
        let record_len = 16 * num_regions as u64;
        let payload = len - HEADER_LEN;
        if payload % record_len != 0 {
            return Err(DatabaseError::Truncated {
                path: path.display().to_string(),
                expected: payload / record_len + 1,
                actual: payload / record_len,
            });
        }
        Ok(Self { reader, num_regions, count: payload / record_len, read: 0 })
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn num_regions(&self) -> usize {
        self.num_regions
    }

    pub fn read_next(&mut self) -> Result<Option<Vec<SubRegionInfo>>, DatabaseError> {
        if self.read == self.count {
            return Ok(None);
        }
        let mut info = Vec::with_capacity(self.num_regions);
        for _ in 0..self.num_regions {
            let path_length = self.reader.read_f64::<LittleEndian>()?;
            let collision_count = self.reader.read_u64::<LittleEndian>()?;
            info.push(SubRegionInfo { path_length, collision_count });
        }
        self.read += 1;
        Ok(Some(info))
    }
}

/// The paired photon/collision streams a pMC post-processing run consumes
/// in lockstep.
#[derive(Debug)]
pub struct PmcDatabase {
    photons: PhotonDatabaseReader,
    collisions: CollisionInfoDatabaseReader,
}

impl PmcDatabase {
    pub fn from_files(
        photon_path: impl AsRef<Path>,
        collision_path: impl AsRef<Path>,
    ) -> Result<Self, DatabaseError> {
        let photons = PhotonDatabaseReader::open(photon_path)?;
        let collisions = CollisionInfoDatabaseReader::open(collision_path)?;
        if photons.count() != collisions.count() {
            return Err(DatabaseError::Mismatched {
                photons: photons.count(),
                collisions: collisions.count(),
            });
        }
        Ok(Self { photons, collisions })
    }

    pub fn count(&self) -> u64 {
        self.photons.count()
    }

    pub fn num_regions(&self) -> usize {
        self.collisions.num_regions()
    }

    pub fn read_next(&mut self) -> Result<Option<(PhotonRecord, Vec<SubRegionInfo>)>, DatabaseError> {
        match (self.photons.read_next()?, self.collisions.read_next()?) {
            (Some(photon), Some(info)) => Ok(Some((photon, info))),
            (None, None) => Ok(None),
            // counts were validated at open; reaching here means a file
            // changed underneath us
            _ => Err(DatabaseError::Mismatched {
                photons: self.photons.count(),
                collisions: self.collisions.count(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Seek;

    fn record(weight: f64) -> PhotonRecord {
        PhotonRecord {
            position: [1.0, 2.0, 0.0],
            direction: [0.0, 0.0, -1.0],
            weight,
            state: PhotonState::ExitedTop,
        }
    }

    #[test]
    fn test_photon_database_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photons.bin");
        let mut writer = PhotonDatabaseWriter::create(&path).unwrap();
        writer.append(&record(0.9)).unwrap();
        writer.append(&record(0.5)).unwrap();
        assert_eq!(writer.finish().unwrap(), 2);

        let mut reader = PhotonDatabaseReader::open(&path).unwrap();
        assert_eq!(reader.count(), 2);
        assert_eq!(reader.read_next().unwrap().unwrap(), record(0.9));
        assert_eq!(reader.read_next().unwrap().unwrap(), record(0.5));
        assert!(reader.read_next().unwrap().is_none());
    }

    #[test]
    fn test_collision_database_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collisions.bin");
        let info = vec![
            SubRegionInfo::default(),
            SubRegionInfo { path_length: 12.5, collision_count: 17 },
            SubRegionInfo::default(),
        ];
        let mut writer = CollisionInfoDatabaseWriter::create(&path, 3).unwrap();
        writer.append(&info).unwrap();
        writer.finish().unwrap();

        let mut reader = CollisionInfoDatabaseReader::open(&path).unwrap();
        assert_eq!(reader.num_regions(), 3);
        assert_eq!(reader.read_next().unwrap().unwrap(), info);
        assert!(reader.read_next().unwrap().is_none());
    }

    #[test]
    fn test_truncated_stream_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photons.bin");
        let mut writer = PhotonDatabaseWriter::create(&path).unwrap();
        writer.append(&record(0.9)).unwrap();
        writer.finish().unwrap();
        // chop off the last byte
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        let len = file.metadata().unwrap().len();
        file.set_len(len - 1).unwrap();
        drop(file);
        let err = PhotonDatabaseReader::open(&path).unwrap_err();
        assert!(matches!(err, DatabaseError::Truncated { .. }));
    }

    #[test]
    fn test_bad_magic_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photons.bin");
        let mut writer = PhotonDatabaseWriter::create(&path).unwrap();
        writer.append(&record(0.9)).unwrap();
        writer.finish().unwrap();
        let mut file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.rewind().unwrap();
        file.write_all(&[0xde, 0xad, 0xbe, 0xef]).unwrap();
        drop(file);
        let err = PhotonDatabaseReader::open(&path).unwrap_err();
        assert!(matches!(err, DatabaseError::BadHeader { .. }));
    }

    #[test]
    fn test_pmc_database_pairs_streams() {
        let dir = tempfile::tempdir().unwrap();
        let photon_path = dir.path().join("photons.bin");
        let collision_path = dir.path().join("collisions.bin");
        let mut pw = PhotonDatabaseWriter::create(&photon_path).unwrap();
        let mut cw = CollisionInfoDatabaseWriter::create(&collision_path, 2).unwrap();
        pw.append(&record(1.0)).unwrap();
        cw.append(&[SubRegionInfo::default(), SubRegionInfo { path_length: 3.0, collision_count: 2 }])
            .unwrap();
        pw.finish().unwrap();
        cw.finish().unwrap();

        let mut db = PmcDatabase::from_files(&photon_path, &collision_path).unwrap();
        assert_eq!(db.count(), 1);
        let (photon, info) = db.read_next().unwrap().unwrap();
        assert_eq!(photon.weight, 1.0);
        assert_eq!(info[1].collision_count, 2);
        assert!(db.read_next().unwrap().is_none());
    }

    #[test]
    fn test_mismatched_record_counts_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let photon_path = dir.path().join("photons.bin");
        let collision_path = dir.path().join("collisions.bin");
        let mut pw = PhotonDatabaseWriter::create(&photon_path).unwrap();
        let mut cw = CollisionInfoDatabaseWriter::create(&collision_path, 1).unwrap();
        pw.append(&record(1.0)).unwrap();
        pw.append(&record(0.5)).unwrap();
        cw.append(&[SubRegionInfo::default()]).unwrap();
        pw.finish().unwrap();
        cw.finish().unwrap();
        let err = PmcDatabase::from_files(&photon_path, &collision_path).unwrap_err();
        assert!(matches!(err, DatabaseError::Mismatched { .. }));
    }
}
