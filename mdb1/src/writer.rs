//! Archive packing: directory in, archive out.
//!
//! Packing is deterministic for a given source tree and mode: files are
//! keyed and sorted, the trie fixes the slot order, compression jobs run
//! on worker threads but their results are collated strictly in slot
//! order before anything hits the payload region. The archive is written
//! to a temporary sibling and renamed into place on success.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

use tracing::{debug, info, warn};

use mvgl_compress::Method;
use mvgl_crypto::XorWriter;

use crate::dialect::Dialect;
use crate::error::{Mdb1Error, Result};
use crate::format::{
    write_data_entry, write_header, write_name_entry, write_tree_entry, DataEntry, Header,
    RawTreeEntry,
};
use crate::key::ArchiveKey;
use crate::pool::worker_count;
use crate::tree::{generate_tree, INVALID};

/// Payload compression policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressMode {
    /// Store everything raw.
    None,
    /// Compress when it pays off, as vanilla archives do.
    Normal,
    /// Additionally deduplicate payloads by checksum of the raw bytes.
    Advanced,
}

/// One finished compression job.
#[derive(Default)]
struct CompressedFile {
    original_size: u64,
    crc: u32,
    data: Vec<u8>,
}

enum Sink {
    Plain(BufWriter<File>),
    Obfuscated(XorWriter<BufWriter<File>>),
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Sink::Plain(inner) => inner.write(buf),
            Sink::Obfuscated(inner) => inner.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Sink::Plain(inner) => inner.flush(),
            Sink::Obfuscated(inner) => inner.flush(),
        }
    }
}

impl Seek for Sink {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Sink::Plain(inner) => inner.seek(pos),
            Sink::Obfuscated(inner) => inner.seek(pos),
        }
    }
}

/// Pack the directory `source` into an archive at `target`.
pub fn pack_archive(
    source: &Path,
    target: &Path,
    dialect: Dialect,
    mode: CompressMode,
) -> Result<()> {
    if !source.is_dir() {
        return Err(Mdb1Error::InvalidInput(format!(
            "source is not a directory: {}",
            source.display()
        )));
    }
    if target.exists() && !target.is_file() {
        return Err(Mdb1Error::InvalidInput(format!(
            "target exists and is not a file: {}",
            target.display()
        )));
    }

    let mut files = Vec::new();
    collect_files(source, &mut files)?;

    let mut keyed = Vec::with_capacity(files.len());
    for path in files {
        let rel = path
            .strip_prefix(source)
            .map_err(|_| Mdb1Error::InvalidInput(format!("path escapes source: {path:?}")))?;
        keyed.push((ArchiveKey::from_rel_path(rel, dialect.key_len)?, path));
    }
    keyed.sort_by(|a, b| a.0.cmp(&b.0));

    for pair in keyed.windows(2) {
        if pair[0].0 == pair[1].0 {
            return Err(Mdb1Error::InvalidInput(format!(
                "paths collide after key padding: {} and {}",
                pair[0].1.display(),
                pair[1].1.display()
            )));
        }
    }

    let (keys, paths): (Vec<ArchiveKey>, Vec<PathBuf>) = keyed.into_iter().unzip();

    info!(
        "packing {} files from {} as {}",
        keys.len(),
        source.display(),
        dialect.name
    );

    let nodes = generate_tree(&keys)?;

    let count = keys.len() as u64 + 1;
    if count >= dialect.sentinel() {
        return Err(Mdb1Error::InvalidInput(format!(
            "{} files exceed the dialect's index width",
            keys.len()
        )));
    }

    let data_start = dialect.header_len()
        + count * dialect.tree_entry_len()
        + count * dialect.name_entry_len()
        + (count - 1) * dialect.data_entry_len();

    // (slot, file) jobs in slot order; workers pull off an atomic cursor.
    let jobs: Vec<(usize, &Path)> = nodes
        .iter()
        .enumerate()
        .skip(1)
        .filter_map(|(slot, node)| node.key_id.map(|k| (slot, paths[k].as_path())))
        .collect();

    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;
    let temp = tempfile::NamedTempFile::new_in(&parent)?;

    let mut sink = {
        let buffered = BufWriter::new(temp.as_file().try_clone()?);
        if dialect.obfuscated {
            Sink::Obfuscated(XorWriter::new(buffered)?)
        } else {
            Sink::Plain(buffered)
        }
    };

    let cursor = AtomicUsize::new(0);
    let workers = worker_count(16).min(jobs.len().max(1));
    let (tx, rx) = mpsc::channel::<(usize, CompressedFile)>();

    thread::scope(|scope| -> Result<()> {
        for _ in 0..workers {
            let tx = tx.clone();
            let jobs = &jobs;
            let cursor = &cursor;
            scope.spawn(move || loop {
                let i = cursor.fetch_add(1, Ordering::Relaxed);
                let Some(&(slot, path)) = jobs.get(i) else {
                    break;
                };
                let result = compress_job(path, dialect.compressor, mode);
                if tx.send((slot, result)).is_err() {
                    break;
                }
            });
        }
        drop(tx);

        // Collate strictly in slot order; results arriving early wait in
        // the pending map.
        let mut pending: HashMap<usize, CompressedFile> = HashMap::new();
        let mut tree_entries = vec![RawTreeEntry {
            compare_bit: INVALID,
            data_id: INVALID,
            left: 0,
            right: 1,
        }];
        let mut name_entries = vec![ArchiveKey::empty(dialect.key_len)];
        let mut data_entries: Vec<DataEntry> = Vec::new();
        let mut dedup: HashMap<u32, u64> = HashMap::new();
        let mut offset = 0u64;

        for (slot, node) in nodes.iter().enumerate().skip(1) {
            let Some(key_id) = node.key_id else { continue };

            let result = match pending.remove(&slot) {
                Some(r) => r,
                None => loop {
                    let (done_slot, r) = rx.recv().map_err(|_| {
                        Mdb1Error::Io(io::Error::other("compression worker disappeared"))
                    })?;
                    if done_slot == slot {
                        break r;
                    }
                    pending.insert(done_slot, r);
                },
            };

            let reused = if mode == CompressMode::Advanced {
                dedup.get(&result.crc).copied()
            } else {
                None
            };

            let data_id = match reused {
                Some(id) => {
                    debug!("payload for slot {slot} deduplicated onto entry {id}");
                    id
                }
                None => {
                    let id = data_entries.len() as u64;
                    dedup.insert(result.crc, id);
                    data_entries.push(DataEntry {
                        offset,
                        full_size: result.original_size,
                        compressed_size: result.data.len() as u64,
                    });
                    sink.seek(SeekFrom::Start(data_start + offset))?;
                    sink.write_all(&result.data)?;
                    offset += result.data.len() as u64;
                    id
                }
            };

            tree_entries.push(RawTreeEntry {
                compare_bit: node.compare_bit,
                data_id,
                left: node.left,
                right: node.right,
            });
            name_entries.push(keys[key_id].clone());
        }

        let header = Header {
            file_entry_count: tree_entries.len() as u64,
            file_name_count: name_entries.len() as u64,
            data_entry_count: data_entries.len() as u64,
            data_start,
            total_size: data_start + offset,
        };

        sink.seek(SeekFrom::Start(0))?;
        write_header(&mut sink, &dialect, &header)?;
        for entry in &tree_entries {
            write_tree_entry(&mut sink, &dialect, entry)?;
        }
        for name in &name_entries {
            write_name_entry(&mut sink, &dialect, name)?;
        }
        for entry in &data_entries {
            write_data_entry(&mut sink, &dialect, entry)?;
        }
        sink.flush()?;
        Ok(())
    })?;

    drop(sink);
    temp.persist(target).map_err(|e| Mdb1Error::Io(e.error))?;
    info!("packed archive written to {}", target.display());
    Ok(())
}

/// Read and (maybe) compress one file. Read failures degrade to an empty
/// payload so a batch never dies on a single unreadable file.
fn compress_job(path: &Path, method: Method, mode: CompressMode) -> CompressedFile {
    let raw = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("failed to read {}: {e}", path.display());
            return CompressedFile::default();
        }
    };

    let crc = if mode == CompressMode::Advanced {
        crc32fast::hash(&raw)
    } else {
        0
    };
    let original_size = raw.len() as u64;

    if raw.is_empty() || mode == CompressMode::None || method.is_compressed(&raw) {
        return CompressedFile {
            original_size,
            crc,
            data: raw,
        };
    }

    let data = match method.compress(&raw) {
        // A candidate that saves less than the bookkeeping costs stays raw.
        Ok(candidate) if candidate.len() + 4 < raw.len() => candidate,
        Ok(_) => raw,
        Err(e) => {
            warn!("compression failed for {}, storing raw: {e}", path.display());
            raw
        }
    };

    CompressedFile {
        original_size,
        crc,
        data,
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(&entry.path(), out)?;
        } else if file_type.is_file() {
            out.push(entry.path());
        }
    }
    Ok(())
}
