//! Append-only event log.
//!
//! Every mutation is a checksummed frame appended at the end of the file:
//!
//! ```text
//! magic(4) version(1) kind(1) payload_len(4) payload(N) crc32(4)
//! ```
//!
//! `Put` frames carry a MessagePack-encoded event, `Remove` frames carry the
//! id being removed. Nothing is ever rewritten in place except by `rewrite`.

use crate::error::{Result, StoreError};
use crate::types::Event;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Magic bytes for event log frames.
const LOG_MAGIC: &[u8; 4] = b"EVT\0";

/// Current log format version.
const LOG_VERSION: u8 = 1;

/// Fixed frame header: magic + version + kind + payload length.
const FRAME_HEADER_SIZE: u64 = 4 + 1 + 1 + 4;

/// Trailing checksum size.
const FRAME_TRAILER_SIZE: u64 = 4;

const FRAME_PUT: u8 = 0;
const FRAME_REMOVE: u8 = 1;

/// A decoded log frame.
#[derive(Clone, Debug, PartialEq)]
pub enum LogFrame {
    Put(Event),
    Remove(String),
}

/// A frame together with the offset it was read from.
#[derive(Clone, Debug)]
pub struct LogEntry {
    pub offset: u64,
    pub frame: LogFrame,
}

enum ReadOutcome {
    Frame(LogFrame, u64),
    Eof,
    Torn,
}

/// Append-only event log.
pub struct EventLog {
    path: PathBuf,

    /// Log file handle, shared by appends and random reads.
    file: Mutex<File>,

    /// Current file size (next append offset).
    file_size: Mutex<u64>,

    /// Appends since last fsync.
    writes_since_sync: Mutex<u64>,

    /// Fsync every N appends.
    sync_interval: u64,
}

impl EventLog {
    /// Default sync interval.
    pub const DEFAULT_SYNC_INTERVAL: u64 = 100;

    /// Open or create a log with the default sync interval.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_sync_interval(path, Self::DEFAULT_SYNC_INTERVAL)
    }

    /// Open or create a log.
    ///
    /// `sync_interval` of 0 or 1 fsyncs after every append.
    pub fn open_with_sync_interval(path: impl AsRef<Path>, sync_interval: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        let file_size = file.metadata()?.len();

        Ok(Self {
            path,
            file: Mutex::new(file),
            file_size: Mutex::new(file_size),
            writes_since_sync: Mutex::new(0),
            sync_interval: sync_interval.max(1),
        })
    }

    /// Read every frame from the start of the log.
    ///
    /// A torn trailing frame (a crash in the middle of an append) is cut off
    /// and the file truncated to the last complete frame. Damage anywhere
    /// else is reported as corruption.
    pub fn replay(&self) -> Result<Vec<LogEntry>> {
        let mut file = self.file.lock();
        let end = file.metadata()?.len();
        file.seek(SeekFrom::Start(0))?;

        let mut entries = Vec::new();
        let mut offset = 0u64;
        {
            let mut reader = BufReader::new(&mut *file);
            loop {
                match read_frame(&mut reader, end - offset)? {
                    ReadOutcome::Frame(frame, len) => {
                        entries.push(LogEntry { offset, frame });
                        offset += len;
                    }
                    ReadOutcome::Eof => break,
                    ReadOutcome::Torn => {
                        warn!(
                            path = %self.path.display(),
                            offset,
                            dropped_bytes = end - offset,
                            "truncating torn frame at end of event log"
                        );
                        break;
                    }
                }
            }
        }

        if offset < end {
            file.set_len(offset)?;
            file.sync_all()?;
        }
        *self.file_size.lock() = offset;

        Ok(entries)
    }

    /// Append an event, returning the frame offset.
    pub fn append_put(&self, event: &Event) -> Result<u64> {
        let payload = rmp_serde::to_vec(event)?;
        self.append_frame(FRAME_PUT, &payload)
    }

    /// Append a removal tombstone for `id`.
    pub fn append_remove(&self, id: &str) -> Result<u64> {
        let payload = rmp_serde::to_vec(id)?;
        self.append_frame(FRAME_REMOVE, &payload)
    }

    fn append_frame(&self, kind: u8, payload: &[u8]) -> Result<u64> {
        let buf = encode_frame(kind, payload)?;

        let mut file = self.file.lock();
        let mut size = self.file_size.lock();
        let offset = *size;

        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&buf)?;
        *size = offset + buf.len() as u64;

        let mut writes = self.writes_since_sync.lock();
        *writes += 1;
        if *writes >= self.sync_interval {
            file.sync_data()?;
            *writes = 0;
        }

        Ok(offset)
    }

    /// Read the event stored in the `Put` frame at `offset`.
    pub fn read_at(&self, offset: u64) -> Result<Event> {
        let mut file = self.file.lock();
        let available = self.file_size.lock().saturating_sub(offset);
        file.seek(SeekFrom::Start(offset))?;

        match read_frame(&mut *file, available)? {
            ReadOutcome::Frame(LogFrame::Put(event), _) => Ok(event),
            ReadOutcome::Frame(LogFrame::Remove(_), _) => Err(StoreError::Corruption(format!(
                "expected event frame at offset {offset}, found tombstone"
            ))),
            ReadOutcome::Eof | ReadOutcome::Torn => Err(StoreError::Corruption(format!(
                "no complete frame at offset {offset}"
            ))),
        }
    }

    /// Replace the whole log with `events`, in the given order.
    ///
    /// The new log is written next to the old one and renamed over it, so a
    /// crash leaves either the old or the new log intact. Returns the new
    /// offset of each event, index-aligned with `events`.
    pub fn rewrite<'a, I>(&self, events: I) -> Result<Vec<u64>>
    where
        I: IntoIterator<Item = &'a Event>,
    {
        let tmp_path = self.path.with_extension("log.compact");
        let mut offsets = Vec::new();
        let mut written = 0u64;
        {
            let mut tmp = File::create(&tmp_path)?;
            for event in events {
                let payload = rmp_serde::to_vec(event)?;
                let buf = encode_frame(FRAME_PUT, &payload)?;
                tmp.write_all(&buf)?;
                offsets.push(written);
                written += buf.len() as u64;
            }
            tmp.sync_all()?;
        }

        let mut file = self.file.lock();
        fs::rename(&tmp_path, &self.path)?;
        *file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        *self.file_size.lock() = written;
        *self.writes_since_sync.lock() = 0;

        Ok(offsets)
    }

    /// Force pending appends to disk.
    pub fn sync(&self) -> Result<()> {
        let file = self.file.lock();
        file.sync_all()?;
        *self.writes_since_sync.lock() = 0;
        Ok(())
    }

    /// Current file size.
    pub fn size(&self) -> u64 {
        *self.file_size.lock()
    }
}

fn encode_frame(kind: u8, payload: &[u8]) -> Result<Vec<u8>> {
    let len = u32::try_from(payload.len())
        .map_err(|_| StoreError::Serialization("event exceeds 4GiB frame limit".into()))?;

    let mut buf = Vec::with_capacity(payload.len() + (FRAME_HEADER_SIZE + FRAME_TRAILER_SIZE) as usize);
    buf.extend_from_slice(LOG_MAGIC);
    buf.push(LOG_VERSION);
    buf.push(kind);
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(payload);
    buf.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
    Ok(buf)
}

/// Read until `buf` is full or the reader runs dry; returns bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Read one frame. `available` is the number of bytes between the frame
/// start and the end of the file; a length field pointing past it is treated
/// as a torn frame before anything is allocated for the payload.
fn read_frame<R: Read>(reader: &mut R, available: u64) -> Result<ReadOutcome> {
    let mut header = [0u8; FRAME_HEADER_SIZE as usize];
    match read_full(reader, &mut header)? {
        0 => return Ok(ReadOutcome::Eof),
        n if n < header.len() => return Ok(ReadOutcome::Torn),
        _ => {}
    }

    if &header[0..4] != LOG_MAGIC {
        return Err(StoreError::InvalidFormat("Invalid event frame magic".into()));
    }
    if header[4] != LOG_VERSION {
        return Err(StoreError::InvalidFormat(format!(
            "Unsupported log version: {}",
            header[4]
        )));
    }
    let kind = header[5];
    let len = u32::from_le_bytes([header[6], header[7], header[8], header[9]]) as usize;
    if len as u64 > available.saturating_sub(FRAME_HEADER_SIZE + FRAME_TRAILER_SIZE) {
        return Ok(ReadOutcome::Torn);
    }

    let mut payload = vec![0u8; len];
    if read_full(reader, &mut payload)? < len {
        return Ok(ReadOutcome::Torn);
    }

    let mut checksum = [0u8; 4];
    if read_full(reader, &mut checksum)? < checksum.len() {
        return Ok(ReadOutcome::Torn);
    }
    let stored = u32::from_le_bytes(checksum);
    let computed = crc32fast::hash(&payload);
    if stored != computed {
        return Err(StoreError::ChecksumMismatch {
            expected: stored,
            got: computed,
        });
    }

    let frame = match kind {
        FRAME_PUT => LogFrame::Put(rmp_serde::from_slice(&payload)?),
        FRAME_REMOVE => LogFrame::Remove(rmp_serde::from_slice(&payload)?),
        other => {
            return Err(StoreError::InvalidFormat(format!(
                "Unknown frame kind: {other}"
            )))
        }
    };

    Ok(ReadOutcome::Frame(
        frame,
        FRAME_HEADER_SIZE + len as u64 + FRAME_TRAILER_SIZE,
    ))
}
