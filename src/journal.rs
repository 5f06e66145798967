//! Append-only event journal behind [`crate::store::InMemoryStore`].
//!
//! Entry layout: `[u32 le: payload len][bincode Event][u32 le: crc32(payload)]`.
//! Replay keeps every entry before the first torn one; a torn tail is what a
//! crash in the middle of an append leaves behind.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::model::Event;

/// Largest payload a frame may carry. Replay reads a longer prefix as corruption,
/// so `frame` refuses to write one.
const MAX_ENTRY_BYTES: usize = 1 << 20;

fn frame(event: &Event) -> io::Result<Vec<u8>> {
    let payload = bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if payload.len() > MAX_ENTRY_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("journal entry of {} bytes exceeds {MAX_ENTRY_BYTES}", payload.len()),
        ));
    }
    let mut buf = Vec::with_capacity(payload.len() + 8);
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&payload);
    buf.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    Ok(buf)
}

enum Frame {
    Event(Event),
    Torn(&'static str),
    End,
}

/// Fill `buf` completely. `Ok(false)` on a clean or partial EOF.
fn fill(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

fn next_frame(reader: &mut impl Read) -> io::Result<Frame> {
    let mut word = [0u8; 4];
    if !fill(reader, &mut word)? {
        return Ok(Frame::End);
    }
    let len = u32::from_le_bytes(word) as usize;
    if len > MAX_ENTRY_BYTES {
        return Ok(Frame::Torn("oversized length prefix"));
    }

    let mut payload = vec![0u8; len];
    if !fill(reader, &mut payload)? {
        return Ok(Frame::Torn("short payload"));
    }
    if !fill(reader, &mut word)? {
        return Ok(Frame::Torn("missing checksum"));
    }
    if u32::from_le_bytes(word) != crc32fast::hash(&payload) {
        return Ok(Frame::Torn("checksum mismatch"));
    }
    Ok(match bincode::deserialize::<Event>(&payload) {
        Ok(event) => Frame::Event(event),
        Err(_) => Frame::Torn("undecodable payload"),
    })
}

pub struct Journal {
    out: BufWriter<File>,
    path: PathBuf,
    appended: u64,
}

impl Journal {
    /// Open `path` for appending, creating it if missing.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            out: BufWriter::new(file),
            path: path.to_path_buf(),
            appended: 0,
        })
    }

    /// Durable once this returns.
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.out.write_all(&frame(event)?)?;
        self.out.flush()?;
        self.out.get_ref().sync_all()?;
        self.appended += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appended
    }

    /// Swap the journal for `snapshot`, the events that rebuild current state.
    /// The snapshot is synced under a sibling name before the rename.
    pub fn compact(&mut self, snapshot: &[Event]) -> io::Result<()> {
        let staging = self.path.with_extension("compacting");
        {
            let mut out = BufWriter::new(File::create(&staging)?);
            for event in snapshot {
                out.write_all(&frame(event)?)?;
            }
            out.flush()?;
            out.get_ref().sync_all()?;
        }
        fs::rename(&staging, &self.path)?;

        *self = Self::open(&self.path.clone())?;
        Ok(())
    }

    /// Every intact event at `path`; a missing file is an empty journal.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();
        loop {
            match next_frame(&mut reader)? {
                Frame::Event(event) => events.push(event),
                Frame::End => break,
                Frame::Torn(why) => {
                    warn!(
                        "journal {}: discarding tail after {} events ({why})",
                        path.display(),
                        events.len()
                    );
                    break;
                }
            }
        }
        Ok(events)
    }
}
