//! AFS2 audio-bank container.
//!
//! A flat concatenation format: a 16-byte header, a table of u16 track
//! ids, a table of `n + 1` u32 end-offsets, then the track payloads, each
//! aligned to the header's block size. Extraction names tracks by index
//! (`000000.hca`, `000001.hca`, ...).

pub mod error;

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::debug;

pub use error::{Afs2Error, Result};

/// Magic, `AFS2`.
pub const AFS2_MAGIC: u32 = 0x3253_4641;

const PACK_FLAGS: u32 = 0x0002_0402;
const PACK_BLOCK_SIZE: u32 = 0x20;

/// Extract every track of the bank at `source` into `target`.
pub fn extract_afs2(source: &Path, target: &Path) -> Result<()> {
    if !source.is_file() {
        return Err(Afs2Error::InvalidInput(format!(
            "source is not a file: {}",
            source.display()
        )));
    }
    if target.exists() && !target.is_dir() {
        return Err(Afs2Error::InvalidInput(format!(
            "target exists and is not a directory: {}",
            target.display()
        )));
    }

    let mut input = BufReader::new(File::open(source)?);

    let magic = input.read_u32::<LittleEndian>()?;
    if magic != AFS2_MAGIC {
        return Err(Afs2Error::BadMagic(magic));
    }
    let _flags = input.read_u32::<LittleEndian>()?;
    let num_files = input.read_u32::<LittleEndian>()?;
    let block_size = u64::from(input.read_u32::<LittleEndian>()?);
    if block_size == 0 {
        return Err(Afs2Error::Corrupt("zero block size".into()));
    }

    debug!(
        "{}: {num_files} tracks, block size {block_size:#x}",
        source.display()
    );

    let mut ids = Vec::with_capacity(num_files as usize);
    for _ in 0..num_files {
        ids.push(input.read_u16::<LittleEndian>()?);
    }
    let mut offsets = Vec::with_capacity(num_files as usize + 1);
    for _ in 0..=num_files {
        offsets.push(u64::from(input.read_u32::<LittleEndian>()?));
    }

    let mut pos = input.stream_position()?;
    if pos < block_size {
        pos = input.seek(SeekFrom::Start(block_size))?;
    }
    if pos != offsets[0] {
        return Err(Afs2Error::Corrupt(format!(
            "header ends at {pos:#x}, first offset says {:#x}",
            offsets[0]
        )));
    }

    fs::create_dir_all(target)?;

    for i in 0..num_files as usize {
        let start = pos.div_ceil(block_size) * block_size;
        input.seek(SeekFrom::Start(start))?;

        let end = offsets[i + 1];
        if end < start {
            return Err(Afs2Error::Corrupt(format!(
                "track {i} has end {end:#x} before start {start:#x}"
            )));
        }

        let path = target.join(format!("{i:06x}.hca"));
        let mut output = BufWriter::new(File::create(&path)?);
        let copied = std::io::copy(&mut (&mut input).take(end - start), &mut output)?;
        if copied != end - start {
            return Err(Afs2Error::Corrupt(format!("track {i} is truncated")));
        }
        output.flush()?;

        pos = end;
    }

    Ok(())
}

/// Pack the files under `source` (sorted by name) into a bank at `target`.
pub fn pack_afs2(source: &Path, target: &Path) -> Result<()> {
    if !source.is_dir() {
        return Err(Afs2Error::InvalidInput(format!(
            "source is not a directory: {}",
            source.display()
        )));
    }
    if target.exists() && !target.is_file() {
        return Err(Afs2Error::InvalidInput(format!(
            "target exists and is not a file: {}",
            target.display()
        )));
    }
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut files: Vec<PathBuf> = fs::read_dir(source)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();

    let count = u32::try_from(files.len())
        .map_err(|_| Afs2Error::InvalidInput("too many tracks".into()))?;

    let mut output = BufWriter::new(File::create(target)?);
    output.write_u32::<LittleEndian>(AFS2_MAGIC)?;
    output.write_u32::<LittleEndian>(PACK_FLAGS)?;
    output.write_u32::<LittleEndian>(count)?;
    output.write_u32::<LittleEndian>(PACK_BLOCK_SIZE)?;

    let block_size = u64::from(PACK_BLOCK_SIZE);
    let mut offsets = vec![0u64; files.len() + 1];
    offsets[0] = (0x10 + u64::from(count) * 6 + 4).max(block_size);

    for (i, path) in files.iter().enumerate() {
        let start = offsets[i].div_ceil(block_size) * block_size;
        output.seek(SeekFrom::Start(start))?;

        let mut input = BufReader::new(File::open(path)?);
        std::io::copy(&mut input, &mut output)?;
        offsets[i + 1] = output.stream_position()?;
    }

    output.seek(SeekFrom::Start(0x10))?;
    for i in 0..files.len() {
        output.write_u16::<LittleEndian>(i as u16)?;
    }
    for offset in &offsets {
        let narrow = u32::try_from(*offset)
            .map_err(|_| Afs2Error::InvalidInput("bank exceeds 4 GiB".into()))?;
        output.write_u32::<LittleEndian>(narrow)?;
    }
    output.flush()?;

    debug!("packed {count} tracks into {}", target.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_then_extract_round_trips() {
        let workdir = tempfile::tempdir().unwrap();
        let source = workdir.path().join("tracks");
        fs::create_dir_all(&source).unwrap();

        let contents: Vec<Vec<u8>> = vec![
            b"first track data".to_vec(),
            vec![0xAB; 100],
            b"x".to_vec(),
        ];
        for (i, data) in contents.iter().enumerate() {
            fs::write(source.join(format!("{i:06x}.hca")), data).unwrap();
        }

        let bank = workdir.path().join("bank.awb");
        pack_afs2(&source, &bank).unwrap();

        let raw = fs::read(&bank).unwrap();
        assert_eq!(u32::from_le_bytes(raw[..4].try_into().unwrap()), AFS2_MAGIC);

        let out = workdir.path().join("out");
        extract_afs2(&bank, &out).unwrap();

        for (i, data) in contents.iter().enumerate() {
            let extracted = fs::read(out.join(format!("{i:06x}.hca"))).unwrap();
            assert_eq!(&extracted, data, "track {i}");
        }
    }

    #[test]
    fn payloads_start_on_block_boundaries() {
        let workdir = tempfile::tempdir().unwrap();
        let source = workdir.path().join("tracks");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("a.hca"), b"odd length payload!").unwrap();
        fs::write(source.join("b.hca"), b"second").unwrap();

        let bank = workdir.path().join("bank.awb");
        pack_afs2(&source, &bank).unwrap();

        let raw = fs::read(&bank).unwrap();
        // First payload at the aligned header end.
        let header_end = (0x10 + 2 * 6 + 4u32).max(0x20) as usize;
        let aligned = header_end.div_ceil(0x20) * 0x20;
        assert_eq!(&raw[aligned..aligned + 4], b"odd ");
    }

    #[test]
    fn rejects_non_bank_files() {
        let workdir = tempfile::tempdir().unwrap();
        let bogus = workdir.path().join("bogus.awb");
        fs::write(&bogus, b"EXPAnot an audio bank").unwrap();
        assert!(matches!(
            extract_afs2(&bogus, &workdir.path().join("out")),
            Err(Afs2Error::BadMagic(_))
        ));
    }
}
