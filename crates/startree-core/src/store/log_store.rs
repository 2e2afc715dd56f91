//! Append-only log record store.
//!
//! Each leaf owns one log file; every added record is appended as a
//! CRC32-protected JSON entry. Only the distinct-key index lives in memory and
//! is rebuilt by replaying the log on `open()`.
//!
//! # Entry Format
//!
//! ```text
//! [marker=1: 1B] [len: 4B LE] [crc32: 4B LE] [payload: len bytes]
//! ```
//!
//! A torn entry at the end of the log (crash during append) is truncated on
//! replay. A checksum mismatch anywhere is reported as corruption.
//!
//! # Files
//!
//! - `<root_dir>/<leaf uuid>/records.log`

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;

use super::{LeafContext, RecordStore, RecordStoreFactory};
use crate::error::{Error, Result};
use crate::record::StarTreeRecord;

/// Marker byte opening every record entry.
pub(crate) const RECORD_MARKER: u8 = 1;

/// Name of the log file inside a leaf directory.
pub(crate) const LOG_FILE_NAME: &str = "records.log";

/// Entry header: marker(1) + len(4) + crc(4).
const HEADER_LEN: u64 = 9;

/// Simple CRC32 implementation (IEEE 802.3 polynomial).
#[inline]
#[allow(clippy::cast_possible_truncation)] // Table index always 0-255
pub(crate) fn crc32_hash(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let idx = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[idx];
    }
    !crc
}

/// Outcome of reading one entry.
enum Entry {
    Record(StarTreeRecord, u64),
    End,
    Torn,
}

/// Append-only log record store.
#[derive(Debug)]
pub struct LogRecordStore {
    /// Leaf directory
    dir: PathBuf,
    /// Log file inside `dir`
    log_path: PathBuf,
    dimension_names: Vec<String>,
    /// Append handle, present while open
    writer: Option<BufWriter<File>>,
    /// Distinct dimension keys seen
    keys: FxHashSet<Vec<String>>,
    record_count: u64,
}

impl LogRecordStore {
    /// Creates a store for a leaf directory. Nothing is touched until `open()`.
    #[must_use]
    pub fn new<P: AsRef<Path>>(dir: P, dimension_names: Vec<String>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let log_path = dir.join(LOG_FILE_NAME);
        Self {
            dir,
            log_path,
            dimension_names,
            writer: None,
            keys: FxHashSet::default(),
            record_count: 0,
        }
    }

    /// Path of the log file.
    #[must_use]
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>> {
        match self.writer.as_mut() {
            Some(writer) => Ok(writer),
            None => Err(Error::StoreNotOpen(self.log_path.display().to_string())),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.writer.is_none() {
            return Err(Error::StoreNotOpen(self.log_path.display().to_string()));
        }
        Ok(())
    }

    /// Reads one entry starting at the reader's position.
    fn read_entry<R: Read>(reader: &mut R, offset: u64) -> Result<Entry> {
        let mut marker = [0u8; 1];
        match reader.read_exact(&mut marker) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(Entry::End),
            Err(e) => return Err(e.into()),
        }
        if marker[0] != RECORD_MARKER {
            return Err(Error::Corruption(format!(
                "unknown marker {:#04X} at offset {offset}",
                marker[0]
            )));
        }

        let mut len_bytes = [0u8; 4];
        let mut crc_bytes = [0u8; 4];
        if read_or_torn(reader, &mut len_bytes)? || read_or_torn(reader, &mut crc_bytes)? {
            return Ok(Entry::Torn);
        }
        let len = u32::from_le_bytes(len_bytes);
        let stored_crc = u32::from_le_bytes(crc_bytes);

        let mut payload = vec![0u8; len as usize];
        if read_or_torn(reader, &mut payload)? {
            return Ok(Entry::Torn);
        }

        let computed_crc = crc32_hash(&payload);
        if stored_crc != computed_crc {
            return Err(Error::Corruption(format!(
                "CRC32 mismatch at offset {offset}: expected {stored_crc:#010X}, got {computed_crc:#010X}"
            )));
        }

        let record = serde_json::from_slice(&payload)?;
        Ok(Entry::Record(record, HEADER_LEN + u64::from(len)))
    }

    /// Visits every entry of the log; returns the offset after the last complete entry.
    fn scan<F>(&self, mut visit: F) -> Result<(u64, bool)>
    where
        F: FnMut(StarTreeRecord),
    {
        let file = match File::open(&self.log_path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((0, false)),
            Err(e) => return Err(e.into()),
        };
        let mut reader = BufReader::new(file);
        let mut offset = 0u64;
        loop {
            match Self::read_entry(&mut reader, offset)? {
                Entry::Record(record, size) => {
                    visit(record);
                    offset += size;
                }
                Entry::End => return Ok((offset, false)),
                Entry::Torn => return Ok((offset, true)),
            }
        }
    }
}

/// Fills `buf`; returns `true` if the log ended first.
fn read_or_torn<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(false),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(true),
        Err(e) => Err(e.into()),
    }
}

impl RecordStore for LogRecordStore {
    fn open(&mut self) -> Result<()> {
        if self.writer.is_some() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir)?;

        let mut keys = FxHashSet::default();
        let mut record_count = 0u64;
        let names = &self.dimension_names;
        let (valid_len, torn) = self.scan(|record| {
            keys.insert(record.dimension_key(names));
            record_count += 1;
        })?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        if torn {
            tracing::warn!(
                path = %self.log_path.display(),
                valid_len,
                "Truncating torn entry at end of record log"
            );
            file.set_len(valid_len)?;
        }

        self.keys = keys;
        self.record_count = record_count;
        self.writer = Some(BufWriter::new(file));
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    fn add(&mut self, record: &StarTreeRecord) -> Result<()> {
        let payload = serde_json::to_vec(record)?;
        let len = u32::try_from(payload.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "Record too large"))?;
        let crc = crc32_hash(&payload);

        let writer = self.writer()?;
        writer.write_all(&[RECORD_MARKER])?;
        writer.write_all(&len.to_le_bytes())?;
        writer.write_all(&crc.to_le_bytes())?;
        writer.write_all(&payload)?;
        // Flush so scans through a fresh handle see the entry
        writer.flush()?;

        self.keys.insert(record.dimension_key(&self.dimension_names));
        self.record_count += 1;
        Ok(())
    }

    fn entry_count(&self) -> usize {
        self.keys.len()
    }

    fn record_count(&self) -> u64 {
        self.record_count
    }

    fn records(&self) -> Result<Vec<StarTreeRecord>> {
        self.ensure_open()?;
        let mut records = Vec::new();
        self.scan(|record| records.push(record))?;
        Ok(records)
    }

    fn clear(&mut self) -> Result<()> {
        let writer = self.writer()?;
        writer.flush()?;
        writer.get_ref().set_len(0)?;
        self.keys.clear();
        self.record_count = 0;
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        self.writer = None;
        self.keys.clear();
        self.record_count = 0;
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Factory placing one [`LogRecordStore`] per leaf under a root directory.
#[derive(Debug, Clone)]
pub struct LogRecordStoreFactory {
    root_dir: PathBuf,
}

impl LogRecordStoreFactory {
    /// Creates a factory rooted at `root_dir`.
    #[must_use]
    pub fn new<P: Into<PathBuf>>(root_dir: P) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Root directory of all leaf logs.
    #[must_use]
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }
}

impl RecordStoreFactory for LogRecordStoreFactory {
    fn id(&self) -> &'static str {
        "log"
    }

    fn create_store(&self, context: &LeafContext<'_>) -> Result<Box<dyn RecordStore>> {
        let dir = self.root_dir.join(context.node_id.to_string());
        tracing::debug!(
            path = %dir.display(),
            depth = context.path.len(),
            "Creating log record store"
        );
        Ok(Box::new(LogRecordStore::new(
            dir,
            context.dimension_names().to_vec(),
        )))
    }
}
