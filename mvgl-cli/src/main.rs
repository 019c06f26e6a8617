use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn, Level};

use expa::{export_csv, import_csv, read_table_file, write_table_file, SchemaRegistry};
use mdb1::{pack_archive, ArchiveReader, CompressMode, ExtractOptions};
use mvgl_crypto::XorWriter;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(
    name = "mvgl",
    about = "Pack and unpack MVGL game archives, MBE table files and AFS2 audio banks",
    version
)]
struct Cli {
    /// Game dialect the files belong to
    #[arg(short, long, value_enum)]
    game: Game,

    /// Set the logging level
    #[arg(short, long, value_enum, default_value = "info")]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Game {
    Dscs,
    DscsConsole,
    Dsts,
    Thl,
}

impl Game {
    fn archive_dialect(self) -> mdb1::Dialect {
        match self {
            Game::Dscs => mdb1::DSCS,
            Game::DscsConsole => mdb1::DSCS_CONSOLE,
            Game::Dsts => mdb1::DSTS,
            Game::Thl => mdb1::THL,
        }
    }

    fn table_variant(self) -> expa::TableVariant {
        match self {
            Game::Dscs | Game::DscsConsole => expa::variant::DSCS,
            Game::Dsts => expa::variant::DSTS,
            Game::Thl => expa::variant::THL,
        }
    }

    /// File and save crypt only exist for the 32-bit PC family.
    fn supports_crypt(self) -> bool {
        matches!(self, Game::Dscs | Game::DscsConsole)
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Compress {
    None,
    Normal,
    Advanced,
}

impl From<Compress> for CompressMode {
    fn from(mode: Compress) -> Self {
        match mode {
            Compress::None => CompressMode::None,
            Compress::Normal => CompressMode::Normal,
            Compress::Advanced => CompressMode::Advanced,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Pack a folder into an archive
    #[command(alias = "pack-mvgl")]
    Pack {
        source: PathBuf,
        target: PathBuf,
        /// normal: as vanilla files; none: store raw; advanced: dedup, slower
        #[arg(long, value_enum, default_value = "normal")]
        compress: Compress,
    },

    /// Extract an archive into a folder
    #[command(alias = "unpack-mvgl", alias = "extract")]
    Unpack {
        source: PathBuf,
        target: PathBuf,
        /// Write payloads without decompressing them
        #[arg(long)]
        raw: bool,
        /// Stream sequentially instead of memory-mapping
        #[arg(long)]
        sequential: bool,
        /// Worker thread cap
        #[arg(long, default_value_t = 16)]
        threads: usize,
    },

    /// Extract a single file from an archive
    #[command(alias = "unpack-mvgl-file", alias = "extract-file")]
    UnpackFile {
        source: PathBuf,
        target: PathBuf,
        /// Logical path inside the archive, e.g. data/message.mbe
        #[arg(long)]
        file: String,
    },

    /// Build a table file from a folder of CSV files
    PackMbe { source: PathBuf, target: PathBuf },

    /// Export a table file to CSV
    #[command(alias = "extract-mbe")]
    UnpackMbe { source: PathBuf, target: PathBuf },

    /// Build table files from a folder of CSV folders
    PackMbeDir { source: PathBuf, target: PathBuf },

    /// Export a folder of table files to CSV
    #[command(alias = "extract-mbe-dir")]
    UnpackMbeDir { source: PathBuf, target: PathBuf },

    /// Pack a folder of tracks into an audio bank
    PackAfs2 { source: PathBuf, target: PathBuf },

    /// Extract an audio bank
    #[command(alias = "extract-afs2")]
    UnpackAfs2 { source: PathBuf, target: PathBuf },

    /// Scramble a loose file with the archive pad
    #[command(alias = "crypt")]
    Encrypt { source: PathBuf, target: PathBuf },

    /// Unscramble a loose file
    Decrypt { source: PathBuf, target: PathBuf },

    /// Encrypt a PC save file
    EncryptSave { source: PathBuf, target: PathBuf },

    /// Decrypt a PC save file
    DecryptSave { source: PathBuf, target: PathBuf },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(Level::from(cli.log_level))
        .with_target(false)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> CliResult<()> {
    let game = cli.game;

    match cli.command {
        Commands::Pack {
            source,
            target,
            compress,
        } => {
            pack_archive(&source, &target, game.archive_dialect(), compress.into())?;
        }

        Commands::Unpack {
            source,
            target,
            raw,
            sequential,
            threads,
        } => {
            let reader = ArchiveReader::open(&source, game.archive_dialect())?;
            let options = ExtractOptions {
                decompress: !raw,
                threads,
                sequential,
            };
            let summary = reader.extract_all(&target, &options)?;
            info!(
                "extracted {} files ({} skipped)",
                summary.written, summary.failed
            );
        }

        Commands::UnpackFile {
            source,
            target,
            file,
        } => {
            let reader = ArchiveReader::open(&source, game.archive_dialect())?;
            reader.extract_file(&file, &target, true)?;
        }

        Commands::PackMbe { source, target } => pack_mbe(game, &source, &target)?,

        Commands::UnpackMbe { source, target } => unpack_mbe(game, &source, &target)?,

        Commands::PackMbeDir { source, target } => {
            require_dir(&source)?;
            fs::create_dir_all(&target)?;
            for dir in sorted_entries(&source, |p| p.is_dir())? {
                let Some(name) = dir.file_name() else { continue };
                if let Err(e) = pack_mbe(game, &dir, &target.join(name)) {
                    warn!("skipping {}: {e}", dir.display());
                }
            }
        }

        Commands::UnpackMbeDir { source, target } => {
            require_dir(&source)?;
            fs::create_dir_all(&target)?;
            for file in sorted_entries(&source, |p| p.is_file())? {
                if let Err(e) = unpack_mbe(game, &file, &target) {
                    warn!("skipping {}: {e}", file.display());
                }
            }
        }

        Commands::PackAfs2 { source, target } => {
            require_crypt_support(game, "audio banks")?;
            afs2::pack_afs2(&source, &target)?;
        }

        Commands::UnpackAfs2 { source, target } => {
            require_crypt_support(game, "audio banks")?;
            afs2::extract_afs2(&source, &target)?;
        }

        Commands::Encrypt { source, target } | Commands::Decrypt { source, target } => {
            require_crypt_support(game, "file crypt")?;
            crypt_file(&source, &target)?;
        }

        Commands::EncryptSave { source, target } => {
            require_crypt_support(game, "save crypt")?;
            let plain = fs::read(&source)?;
            fs::write(&target, mvgl_crypto::encrypt_save(&plain))?;
        }

        Commands::DecryptSave { source, target } => {
            require_crypt_support(game, "save crypt")?;
            let cipher = fs::read(&source)?;
            fs::write(&target, mvgl_crypto::decrypt_save(&cipher)?)?;
        }
    }

    Ok(())
}

fn pack_mbe(game: Game, source: &Path, target: &Path) -> CliResult<()> {
    let variant = game.table_variant();
    let registry = SchemaRegistry::new(variant.schema_dir);
    let file = import_csv(source, &registry)?;
    write_table_file(&file, target, &variant)?;
    info!("wrote {}", target.display());
    Ok(())
}

fn unpack_mbe(game: Game, source: &Path, target: &Path) -> CliResult<()> {
    let variant = game.table_variant();
    let registry = SchemaRegistry::new(variant.schema_dir);
    let file = read_table_file(source, &variant, &registry)?;

    let name = source
        .file_name()
        .ok_or_else(|| format!("source has no file name: {}", source.display()))?;
    export_csv(&file, &target.join(name))?;
    info!("exported {}", source.display());
    Ok(())
}

/// The whole-file XOR is its own inverse, so encrypt and decrypt share
/// this.
fn crypt_file(source: &Path, target: &Path) -> CliResult<()> {
    if !source.is_file() {
        return Err(format!("source is not a file: {}", source.display()).into());
    }
    if source.canonicalize().ok() == target.canonicalize().ok() {
        return Err("source and target must be different files".into());
    }

    let mut input = BufReader::new(File::open(source)?);
    let mut output = XorWriter::new(BufWriter::new(File::create(target)?))?;
    std::io::copy(&mut input, &mut output)?;
    output.flush()?;
    Ok(())
}

fn require_crypt_support(game: Game, what: &str) -> CliResult<()> {
    if game.supports_crypt() {
        Ok(())
    } else {
        Err(format!("{what} are not supported for {game:?}").into())
    }
}

fn require_dir(path: &Path) -> CliResult<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(format!("source is not a directory: {}", path.display()).into())
    }
}

fn sorted_entries(dir: &Path, keep: fn(&Path) -> bool) -> CliResult<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| keep(path))
        .collect();
    entries.sort();
    Ok(entries)
}
