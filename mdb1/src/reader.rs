//! Archive reading: index parsing, trie lookup, extraction.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use byteorder::{LittleEndian, ReadBytesExt};
use memmap2::Mmap;
use tracing::{debug, warn};

use mvgl_crypto::{xor_into, XorReader};

use crate::dialect::Dialect;
use crate::error::{Mdb1Error, Result};
use crate::format::{
    read_data_entry, read_header, read_name_entry, read_tree_entry, DataEntry, Header,
    RawTreeEntry, MDB1_MAGIC, MDB1_MAGIC_OBFUSCATED,
};
use crate::key::ArchiveKey;
use crate::pool::{worker_count, writer_permits, Semaphore};
use crate::tree::INVALID;

/// Streaming copy granularity for large uncompressed payloads.
const COPY_CHUNK: usize = 1 << 20;

/// Options for batch extraction.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Decompress payloads (otherwise raw compressed bytes are written).
    pub decompress: bool,
    /// Worker thread cap for the memory-mapped path.
    pub threads: usize,
    /// Skip memory mapping and stream the archive sequentially.
    pub sequential: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            decompress: true,
            threads: 16,
            sequential: false,
        }
    }
}

/// Outcome of a batch extraction. Per-file failures are logged and
/// skipped; the batch keeps going.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractSummary {
    pub written: usize,
    pub failed: usize,
}

/// The underlying archive stream, unscrambled on the fly when the
/// dialect calls for it.
enum Source {
    Plain(BufReader<File>),
    Obfuscated(XorReader<BufReader<File>>),
}

impl Read for Source {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Source::Plain(inner) => inner.read(buf),
            Source::Obfuscated(inner) => inner.read(buf),
        }
    }
}

impl Seek for Source {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Source::Plain(inner) => inner.seek(pos),
            Source::Obfuscated(inner) => inner.seek(pos),
        }
    }
}

/// A parsed archive index. The index is built once at open and read-only
/// afterwards; extraction re-opens the file (or maps it) per operation.
pub struct ArchiveReader {
    path: PathBuf,
    dialect: Dialect,
    obfuscated: bool,
    file_len: u64,
    header: Header,
    tree: Vec<RawTreeEntry>,
    names: Vec<ArchiveKey>,
    data: Vec<DataEntry>,
}

impl ArchiveReader {
    /// Open an archive and parse its index.
    pub fn open(path: &Path, dialect: Dialect) -> Result<Self> {
        if !path.is_file() {
            return Err(Mdb1Error::InvalidInput(format!(
                "source is not a file: {}",
                path.display()
            )));
        }

        let mut file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let raw_magic = file.read_u32::<LittleEndian>()?;
        let obfuscated = match raw_magic {
            MDB1_MAGIC => false,
            MDB1_MAGIC_OBFUSCATED => true,
            other => return Err(Mdb1Error::BadMagic(other)),
        };
        file.seek(SeekFrom::Start(0))?;

        debug!(
            "opening archive {} ({} bytes, dialect {}, obfuscated: {obfuscated})",
            path.display(),
            file_len,
            dialect.name
        );

        let mut source = wrap_source(file, obfuscated)?;
        let header = read_header(&mut source, &dialect)?;

        if header.file_entry_count != header.file_name_count {
            return Err(Mdb1Error::CorruptIndex(format!(
                "entry count {} disagrees with name count {}",
                header.file_entry_count, header.file_name_count
            )));
        }

        let tables_end = dialect.header_len()
            + header.file_entry_count * dialect.tree_entry_len()
            + header.file_name_count * dialect.name_entry_len()
            + header.data_entry_count * dialect.data_entry_len();
        if header.data_start < tables_end || header.data_start > file_len {
            return Err(Mdb1Error::CorruptIndex(format!(
                "data start {:#x} outside [{tables_end:#x}, {file_len:#x}]",
                header.data_start
            )));
        }

        let mut tree = Vec::with_capacity(header.file_entry_count as usize);
        for _ in 0..header.file_entry_count {
            tree.push(read_tree_entry(&mut source, &dialect)?);
        }
        let mut names = Vec::with_capacity(header.file_name_count as usize);
        for _ in 0..header.file_name_count {
            names.push(read_name_entry(&mut source, &dialect)?);
        }
        let mut data = Vec::with_capacity(header.data_entry_count as usize);
        for _ in 0..header.data_entry_count {
            data.push(read_data_entry(&mut source, &dialect)?);
        }

        for (slot, entry) in tree.iter().enumerate() {
            if entry.data_id != INVALID && entry.data_id >= header.data_entry_count {
                return Err(Mdb1Error::CorruptIndex(format!(
                    "slot {slot} references data entry {} of {}",
                    entry.data_id, header.data_entry_count
                )));
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            dialect,
            obfuscated,
            file_len,
            header,
            tree,
            names,
            data,
        })
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Number of payload blobs (smaller than the file count when packing
    /// deduplicated).
    pub fn data_entry_count(&self) -> usize {
        self.data.len()
    }

    /// Number of indexed files.
    pub fn file_count(&self) -> usize {
        self.tree
            .iter()
            .filter(|t| t.compare_bit != INVALID && t.data_id != INVALID)
            .count()
    }

    /// Logical paths of all indexed files.
    pub fn file_names(&self) -> Vec<String> {
        self.payload_entries()
            .into_iter()
            .map(|e| e.name)
            .collect()
    }

    /// Locate a file by logical path, e.g. `data/text/intro.mbe`.
    pub fn find(&self, logical: &str) -> Result<DataEntry> {
        let probe = ArchiveKey::from_path_str(logical, self.dialect.key_len)?;
        let slot = self
            .traverse(&probe)
            .ok_or_else(|| Mdb1Error::NotFound(logical.to_string()))?;
        let data_id = self.tree[slot].data_id;
        if data_id == INVALID {
            return Err(Mdb1Error::NotFound(logical.to_string()));
        }
        Ok(self.data[data_id as usize])
    }

    /// Trie walk: descend by compare bits until an edge stops making
    /// progress, then confirm the key at the landing slot.
    fn traverse(&self, probe: &ArchiveKey) -> Option<usize> {
        if self.tree.len() < 2 {
            return None;
        }

        let mut cur = 1usize;
        for _ in 0..=self.tree.len() {
            let node = self.tree.get(cur)?;
            let next = if probe.bit(node.compare_bit) {
                node.right
            } else {
                node.left
            } as usize;
            let next_node = self.tree.get(next)?;

            if next_node.compare_bit == INVALID || next_node.compare_bit <= node.compare_bit {
                return (self.names.get(next)? == probe).then_some(next);
            }
            cur = next;
        }

        None
    }

    /// Extract a single file by logical path, streaming.
    pub fn extract_file(&self, logical: &str, output: &Path, decompress: bool) -> Result<()> {
        let entry = self.find(logical)?;
        let mut source = wrap_source(File::open(&self.path)?, self.obfuscated)?;
        self.extract_streaming_one(&mut source, &entry, logical, output, decompress)
    }

    /// Extract every file into `output`, recreating the directory layout.
    pub fn extract_all(&self, output: &Path, options: &ExtractOptions) -> Result<ExtractSummary> {
        if output.exists() && !output.is_dir() {
            return Err(Mdb1Error::InvalidInput(format!(
                "target exists and is not a directory: {}",
                output.display()
            )));
        }
        fs::create_dir_all(output)?;

        let entries = self.payload_entries();
        if entries.is_empty() {
            return Ok(ExtractSummary::default());
        }

        if !options.sequential {
            if let Some(map) = self.try_map() {
                return Ok(self.extract_all_mapped(&map, &entries, output, options));
            }
        }
        self.extract_all_streaming(&entries, output, options)
    }

    /// All extractable entries, ascending by payload offset so streaming
    /// stays sequential.
    fn payload_entries(&self) -> Vec<PayloadEntry> {
        let mut entries: Vec<PayloadEntry> = self
            .tree
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, t)| t.compare_bit != INVALID && t.data_id != INVALID)
            .map(|(slot, t)| PayloadEntry {
                name: self.names[slot].to_path_string(),
                data: self.data[t.data_id as usize],
            })
            .collect();
        entries.sort_by_key(|e| e.data.offset);
        entries
    }

    fn try_map(&self) -> Option<Mmap> {
        let file = File::open(&self.path).ok()?;
        match unsafe { Mmap::map(&file) } {
            Ok(map) => Some(map),
            Err(e) => {
                debug!("memory map unavailable, streaming instead: {e}");
                None
            }
        }
    }

    fn extract_all_streaming(
        &self,
        entries: &[PayloadEntry],
        output: &Path,
        options: &ExtractOptions,
    ) -> Result<ExtractSummary> {
        let mut source = wrap_source(File::open(&self.path)?, self.obfuscated)?;
        let mut summary = ExtractSummary::default();

        for entry in entries {
            let target = output.join(&entry.name);
            match self.extract_streaming_one(
                &mut source,
                &entry.data,
                &entry.name,
                &target,
                options.decompress,
            ) {
                Ok(()) => summary.written += 1,
                Err(e) => {
                    warn!("skipping {}: {e}", entry.name);
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    fn extract_streaming_one(
        &self,
        source: &mut Source,
        entry: &DataEntry,
        name: &str,
        output: &Path,
        decompress: bool,
    ) -> Result<()> {
        self.check_bounds(entry, name)?;
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }

        source.seek(SeekFrom::Start(self.header.data_start + entry.offset))?;
        let mut out = BufWriter::new(File::create(output)?);

        if entry.compressed_size == entry.full_size || !decompress {
            let len = if decompress {
                entry.full_size
            } else {
                entry.compressed_size
            };
            io::copy(&mut source.by_ref().take(len), &mut out)?;
        } else {
            let mut buf = vec![0u8; entry.compressed_size as usize];
            source.read_exact(&mut buf)?;
            let data = self
                .dialect
                .compressor
                .decompress(&buf, entry.full_size as usize)
                .map_err(|e| Mdb1Error::CorruptPayload {
                    name: name.to_string(),
                    detail: e.to_string(),
                })?;
            out.write_all(&data)?;
        }

        out.flush()?;
        Ok(())
    }

    fn extract_all_mapped(
        &self,
        map: &Mmap,
        entries: &[PayloadEntry],
        output: &Path,
        options: &ExtractOptions,
    ) -> ExtractSummary {
        let cursor = AtomicUsize::new(0);
        let semaphore = Semaphore::new(writer_permits());
        let workers = worker_count(options.threads);

        debug!(
            "mapped extraction: {} entries, {workers} workers",
            entries.len()
        );

        let mut summary = ExtractSummary::default();
        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(workers);
            for _ in 0..workers {
                handles.push(scope.spawn(|| {
                    // Scratch buffers live for the worker, not the job.
                    let mut compressed = Vec::new();
                    let mut plain = vec![0u8; COPY_CHUNK];
                    let mut written = 0usize;
                    let mut failures = Vec::new();

                    loop {
                        let i = cursor.fetch_add(1, Ordering::Relaxed);
                        let Some(entry) = entries.get(i) else { break };

                        let target = output.join(&entry.name);
                        let result = self.extract_mapped_one(
                            map,
                            &entry.data,
                            &entry.name,
                            &target,
                            options.decompress,
                            &semaphore,
                            &mut compressed,
                            &mut plain,
                        );
                        match result {
                            Ok(()) => written += 1,
                            Err(e) => failures.push((entry.name.clone(), e)),
                        }
                    }
                    (written, failures)
                }));
            }

            for handle in handles {
                match handle.join() {
                    Ok((written, failures)) => {
                        summary.written += written;
                        summary.failed += failures.len();
                        for (name, e) in failures {
                            warn!("skipping {name}: {e}");
                        }
                    }
                    Err(_) => {
                        warn!("extraction worker panicked");
                        summary.failed += 1;
                    }
                }
            }
        });
        summary
    }

    #[allow(clippy::too_many_arguments)]
    fn extract_mapped_one(
        &self,
        map: &Mmap,
        entry: &DataEntry,
        name: &str,
        output: &Path,
        decompress: bool,
        semaphore: &Semaphore,
        compressed: &mut Vec<u8>,
        plain: &mut [u8],
    ) -> Result<()> {
        self.check_bounds(entry, name)?;
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }

        let abs = self.header.data_start + entry.offset;

        if entry.compressed_size == entry.full_size || !decompress {
            let len = if decompress {
                entry.full_size
            } else {
                entry.compressed_size
            } as usize;
            let src = &map[abs as usize..abs as usize + len];

            let _permit = semaphore.acquire();
            let mut out = BufWriter::new(File::create(output)?);
            if self.obfuscated {
                let mut done = 0usize;
                while done < len {
                    let n = (len - done).min(plain.len());
                    xor_into(&src[done..done + n], &mut plain[..n], abs + done as u64);
                    out.write_all(&plain[..n])?;
                    done += n;
                }
            } else {
                out.write_all(src)?;
            }
            out.flush()?;
            return Ok(());
        }

        let len = entry.compressed_size as usize;
        let src = &map[abs as usize..abs as usize + len];
        compressed.resize(len, 0);
        if self.obfuscated {
            xor_into(src, compressed, abs);
        } else {
            compressed.copy_from_slice(src);
        }

        let data = self
            .dialect
            .compressor
            .decompress(compressed, entry.full_size as usize)
            .map_err(|e| Mdb1Error::CorruptPayload {
                name: name.to_string(),
                detail: e.to_string(),
            })?;

        let _permit = semaphore.acquire();
        let mut out = BufWriter::new(File::create(output)?);
        out.write_all(&data)?;
        out.flush()?;
        Ok(())
    }

    fn check_bounds(&self, entry: &DataEntry, name: &str) -> Result<()> {
        let end = self
            .header
            .data_start
            .checked_add(entry.offset)
            .and_then(|start| start.checked_add(entry.compressed_size));
        match end {
            Some(end) if end <= self.file_len => Ok(()),
            _ => Err(Mdb1Error::CorruptIndex(format!(
                "payload for {name} extends past end of archive"
            ))),
        }
    }
}

struct PayloadEntry {
    name: String,
    data: DataEntry,
}

fn wrap_source(file: File, obfuscated: bool) -> Result<Source> {
    let buffered = BufReader::new(file);
    if obfuscated {
        Ok(Source::Obfuscated(XorReader::new(buffered)?))
    } else {
        Ok(Source::Plain(buffered))
    }
}
