//! mapcanon - Convert legacy binary tile maps into a canonical JSON corpus
//!
//! This tool decodes `.map` files, checks the resulting corpus for
//! consistency, answers graphic usage queries and packs the corpus into a
//! single deterministic archive.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use mapcanon_core::{
    convert_directory, ArchiveConfig, Archiver, BatchConfig, Corpus, CorpusLayout, CrossMapIndex,
    Decoder, DecoderConfig, FileOutcome, FormatVersion, ObjectDatabase, TileCatalog, Validator,
    ValidatorConfig,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Convert, validate, index and archive legacy binary tile maps
#[derive(Parser, Debug)]
#[command(name = "mapcanon")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a directory of binary maps into canonical JSON
    Convert(ConvertArgs),
    /// Check a canonical corpus for consistency
    Validate(ValidateArgs),
    /// Look up where graphics are used across the corpus
    Index(IndexArgs),
    /// Pack a canonical corpus into one archive
    Pack(PackArgs),
    /// Verify and extract an archive
    Unpack(UnpackArgs),
    /// Check that binary maps survive decode, encode, decode unchanged
    Roundtrip(RoundtripArgs),
}

/// Report format
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum OutputFormat {
    /// One line per item
    #[default]
    Text,
    /// Pretty-printed JSON on stdout
    Json,
}

#[derive(Args, Debug)]
struct CatalogArgs {
    /// Tile-type catalog (JSON)
    #[arg(long, env = "MAPCANON_TILES")]
    tiles: PathBuf,

    /// Object catalog (binary); categories resolve to "unknown" without it
    #[arg(long, env = "MAPCANON_OBJECTS")]
    objects: Option<PathBuf>,

    /// Declared layout of the source files
    #[arg(id = "format_version", long = "format-version", default_value = "v1", value_parser = parse_version)]
    version: FormatVersion,

    /// Fail on stored blocking bits that disagree with the tile catalog
    #[arg(long)]
    strict: bool,
}

#[derive(Args, Debug)]
struct LayoutArgs {
    /// Smallest map id of the corpus
    #[arg(long, default_value = "1")]
    first_id: u16,

    /// Largest map id of the corpus
    #[arg(long, default_value = "290")]
    last_id: u16,
}

impl LayoutArgs {
    fn layout(&self) -> Result<CorpusLayout> {
        if self.first_id == 0 || self.first_id > self.last_id {
            bail!("Invalid id range {}..={}", self.first_id, self.last_id);
        }
        Ok(CorpusLayout::with_range(self.first_id, self.last_id))
    }
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Directory of binary map files
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory for the canonical JSON corpus
    #[arg(short, long)]
    output: PathBuf,

    #[command(flatten)]
    catalogs: CatalogArgs,

    /// Extension of source files
    #[arg(long, default_value = "map")]
    extension: String,

    /// Worker threads (0 = one per core)
    #[arg(long, default_value = "0")]
    threads: usize,

    /// Dry run - decode and report without writing files
    #[arg(long)]
    dry_run: bool,

    /// Report format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    /// Canonical corpus directory
    #[arg(short, long)]
    corpus: PathBuf,

    /// Object catalog (binary)
    #[arg(long, env = "MAPCANON_OBJECTS")]
    objects: PathBuf,

    #[command(flatten)]
    layout: LayoutArgs,

    /// Load whatever complete pairs exist instead of failing on gaps
    #[arg(long)]
    allow_incomplete: bool,

    /// Chebyshev distance within which a reciprocal transition may land
    #[arg(long, default_value = "1")]
    tolerance: u16,

    /// Smallest walkable area a spawn must reach
    #[arg(long, default_value = "2")]
    min_spawn_area: usize,

    /// Worker threads (0 = one per core)
    #[arg(long, default_value = "0")]
    threads: usize,

    /// Report format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Args, Debug)]
struct IndexArgs {
    /// Canonical corpus directory
    #[arg(short, long)]
    corpus: PathBuf,

    /// Graphic indices to look up; lists every indexed graphic when empty
    grh: Vec<u32>,

    /// Report format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Args, Debug)]
struct PackArgs {
    /// Canonical corpus directory
    #[arg(short, long)]
    corpus: PathBuf,

    /// Archive file to write
    #[arg(short, long)]
    archive: PathBuf,

    /// Deflate level (0-9)
    #[arg(long, default_value = "6")]
    level: u32,

    /// Refuse to pack anything but a complete corpus
    #[arg(long)]
    require_layout: bool,

    #[command(flatten)]
    layout: LayoutArgs,
}

#[derive(Args, Debug)]
struct UnpackArgs {
    /// Archive file to read
    #[arg(short, long)]
    archive: PathBuf,

    /// Directory to create; must be absent or empty
    #[arg(short, long, required_unless_present = "verify_only")]
    output: Option<PathBuf>,

    /// Only verify checksums and list the entries
    #[arg(long)]
    verify_only: bool,
}

#[derive(Args, Debug)]
struct RoundtripArgs {
    /// Binary map files to check
    #[arg(required = true)]
    files: Vec<PathBuf>,

    #[command(flatten)]
    catalogs: CatalogArgs,
}

fn parse_version(s: &str) -> std::result::Result<FormatVersion, String> {
    s.parse().map_err(|e: mapcanon_core::DecodeError| e.to_string())
}

/// Short content hash for log lines (first 8 chars of blake3)
fn short_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex()[..8].to_string()
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .init();

    match &cli.command {
        Command::Convert(args) => run_convert(args),
        Command::Validate(args) => run_validate(args),
        Command::Index(args) => run_index(args),
        Command::Pack(args) => run_pack(args),
        Command::Unpack(args) => run_unpack(args),
        Command::Roundtrip(args) => run_roundtrip(args),
    }
}

struct Catalogs {
    tiles: TileCatalog,
    objects: Option<ObjectDatabase>,
}

impl Catalogs {
    fn load(args: &CatalogArgs) -> Result<Self> {
        let tiles = TileCatalog::load(&args.tiles)
            .with_context(|| format!("Failed to load tile catalog: {}", args.tiles.display()))?;
        let objects = match &args.objects {
            Some(path) => Some(load_objects(path)?),
            None => None,
        };
        Ok(Self { tiles, objects })
    }

    fn decoder(&self, args: &CatalogArgs) -> Decoder<'_> {
        let decoder = Decoder::new(&self.tiles)
            .with_config(DecoderConfig::new().strict_flags(args.strict));
        match &self.objects {
            Some(objects) => decoder.with_objects(objects),
            None => decoder,
        }
    }
}

fn load_objects(path: &Path) -> Result<ObjectDatabase> {
    let objects = ObjectDatabase::load(path)
        .with_context(|| format!("Failed to load object catalog: {}", path.display()))?;
    info!("Loaded {} catalog entries from {}", objects.len(), path.display());
    Ok(objects)
}

fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        bail!("Directory does not exist: {}", path.display());
    }
    if !path.is_dir() {
        bail!("Path is not a directory: {}", path.display());
    }
    Ok(())
}

fn load_corpus(dir: &Path, layout: &CorpusLayout, require_complete: bool) -> Result<Corpus> {
    ensure_dir(dir)?;
    match Corpus::load_dir(dir, layout, require_complete) {
        Ok(corpus) => Ok(corpus),
        Err(mapcanon_core::Error::CorpusIncomplete { problems }) => {
            for problem in problems.iter().take(20) {
                warn!("{}", problem);
            }
            bail!(
                "Corpus in {} is incomplete ({} problem(s)); pass --allow-incomplete to load it anyway",
                dir.display(),
                problems.len()
            )
        }
        Err(e) => Err(e).with_context(|| format!("Failed to load corpus: {}", dir.display())),
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_convert(args: &ConvertArgs) -> Result<()> {
    ensure_dir(&args.input)?;
    let catalogs = Catalogs::load(&args.catalogs)?;
    let decoder = catalogs.decoder(&args.catalogs);
    let config = BatchConfig::new()
        .version(args.catalogs.version)
        .threads(args.threads)
        .extension(args.extension.clone())
        .dry_run(args.dry_run);

    let (report, corpus) = convert_directory(&args.input, &args.output, &decoder, &config)
        .with_context(|| format!("Failed to convert {}", args.input.display()))?;

    match args.format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => {
            for result in &report.results {
                match &result.outcome {
                    FileOutcome::Converted { map_id, warnings } => println!(
                        "ok     {} -> map {} ({} warning(s))",
                        result.path.display(),
                        map_id,
                        warnings.len()
                    ),
                    FileOutcome::Failed { error } => {
                        println!("failed {}: {}", result.path.display(), error)
                    }
                }
            }
        }
    }

    let missing = corpus.missing_ids(&CorpusLayout::new());
    if !missing.is_empty() {
        info!("{} id(s) of the stock layout were not produced", missing.len());
    }

    let failed = report.failed().count();
    if failed > 0 {
        bail!("{} of {} file(s) failed to convert", failed, report.results.len());
    }
    Ok(())
}

fn run_validate(args: &ValidateArgs) -> Result<()> {
    let layout = args.layout.layout()?;
    let objects = load_objects(&args.objects)?;
    let corpus = load_corpus(&args.corpus, &layout, !args.allow_incomplete)?;

    let config = ValidatorConfig::new()
        .transition_tolerance(args.tolerance)
        .min_spawn_area(args.min_spawn_area)
        .map_ids(layout.ids())
        .threads(args.threads);
    let report = Validator::new(&objects)
        .with_config(config)
        .validate_corpus(&corpus);

    match args.format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => {
            for finding in &report.findings {
                println!("{}", finding);
            }
            println!(
                "{} map(s): {} error(s), {} warning(s)",
                corpus.len(),
                report.error_count(),
                report.warning_count()
            );
        }
    }

    if report.has_errors() {
        bail!("Validation found {} error(s)", report.error_count());
    }
    Ok(())
}

fn run_index(args: &IndexArgs) -> Result<()> {
    let corpus = load_corpus(&args.corpus, &CorpusLayout::new(), false)?;
    let index = CrossMapIndex::build(&corpus);

    if args.grh.is_empty() {
        let graphics: Vec<u32> = index.graphics()?.collect();
        match args.format {
            OutputFormat::Json => print_json(&graphics)?,
            OutputFormat::Text => {
                for grh in graphics {
                    println!("{}\t{}", grh, index.query(grh)?.len());
                }
            }
        }
        return Ok(());
    }

    for &grh in &args.grh {
        let occurrences = index.query(grh)?;
        debug!("Graphic {}: {} occurrence(s)", grh, occurrences.len());
        match args.format {
            OutputFormat::Json => print_json(&serde_json::json!({
                "grh": grh,
                "occurrences": occurrences,
            }))?,
            OutputFormat::Text => {
                for o in occurrences {
                    println!("{}\tmap {}\t{}\t{}", grh, o.map_id, o.coord(), o.plane.as_str());
                }
            }
        }
    }
    Ok(())
}

fn run_pack(args: &PackArgs) -> Result<()> {
    ensure_dir(&args.corpus)?;
    let mut config = ArchiveConfig::new().level(args.level);
    if args.require_layout {
        config = config.require_layout(args.layout.layout()?);
    }

    let digest = Archiver::new()
        .with_config(config)
        .write_archive(&args.corpus, &args.archive)
        .with_context(|| format!("Failed to pack {}", args.corpus.display()))?;
    println!("Wrote {} (blake3 {})", args.archive.display(), digest);
    Ok(())
}

fn run_unpack(args: &UnpackArgs) -> Result<()> {
    let archiver = Archiver::new();

    if args.verify_only {
        let blob = fs::read(&args.archive)
            .with_context(|| format!("Failed to read archive: {}", args.archive.display()))?;
        let count = archiver.verify(&blob)?;
        for entry in archiver.manifest(&blob)? {
            println!("{:>10} {:>10} {:08x} {}", entry.size, entry.compressed, entry.crc32, entry.path);
        }
        println!("{} file(s) verified ({})", count, short_hash(&blob));
        return Ok(());
    }

    let Some(output) = &args.output else {
        bail!("--output is required unless --verify-only is given");
    };
    let count = archiver
        .read_archive(&args.archive, output)
        .with_context(|| format!("Failed to unpack {}", args.archive.display()))?;
    println!("Extracted {} file(s) into {}", count, output.display());
    Ok(())
}

fn run_roundtrip(args: &RoundtripArgs) -> Result<()> {
    let catalogs = Catalogs::load(&args.catalogs)?;
    let decoder = catalogs.decoder(&args.catalogs);

    let mut unfaithful = 0;
    for path in &args.files {
        let data =
            fs::read(path).with_context(|| format!("Failed to read input file: {}", path.display()))?;
        match decoder.roundtrip(&data, args.catalogs.version) {
            Ok(check) if check.is_faithful() => println!(
                "ok     {} map {} ({} -> {} bytes, {})",
                path.display(),
                check.map_id,
                check.original_len,
                check.encoded_len,
                short_hash(&data)
            ),
            Ok(check) => {
                unfaithful += 1;
                println!(
                    "differ {} map {}: {}",
                    path.display(),
                    check.map_id,
                    check.differences.join(", ")
                );
            }
            Err(e) => {
                unfaithful += 1;
                println!("failed {}: {}", path.display(), e);
            }
        }
    }

    if unfaithful > 0 {
        bail!("{} of {} file(s) did not round-trip", unfaithful, args.files.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapcanon_core::{encode, MapDocument};
    use tempfile::TempDir;

    #[test]
    fn test_short_hash() {
        let hash1 = short_hash(b"hello");
        let hash2 = short_hash(b"hello");
        let hash3 = short_hash(b"world");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 8);
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("v2").unwrap(), FormatVersion::V2);
        assert!(parse_version("v3").unwrap_err().contains("unsupported format version 3"));
        assert!(parse_version("latest").unwrap_err().contains("'latest'"));
    }

    #[test]
    fn test_layout_args() {
        let ok = LayoutArgs {
            first_id: 1,
            last_id: 4,
        };
        assert_eq!(ok.layout().unwrap().expected_files(), 8);
        let bad = LayoutArgs {
            first_id: 5,
            last_id: 4,
        };
        assert!(bad.layout().is_err());
    }

    #[test]
    fn test_convert_pack_unpack() {
        let root = TempDir::new().unwrap();
        let input = root.path().join("maps");
        fs::create_dir(&input).unwrap();
        for id in 1..=2 {
            let doc = MapDocument::new(id, format!("Map {}", id), 3, 3);
            fs::write(input.join(format!("mapa{}.map", id)), encode(&doc, FormatVersion::V1).unwrap())
                .unwrap();
        }
        let tiles = root.path().join("tiles.json");
        fs::write(&tiles, br#"[{"grh": 7, "kind": "wall"}]"#).unwrap();

        let corpus_dir = root.path().join("corpus");
        run_convert(&ConvertArgs {
            input,
            output: corpus_dir.clone(),
            catalogs: CatalogArgs {
                tiles,
                objects: None,
                version: FormatVersion::V1,
                strict: false,
            },
            extension: "map".into(),
            threads: 1,
            dry_run: false,
            format: OutputFormat::Text,
        })
        .unwrap();
        assert!(corpus_dir.join("resources_2.json").is_file());

        let archive = root.path().join("corpus.mcar");
        run_pack(&PackArgs {
            corpus: corpus_dir.clone(),
            archive: archive.clone(),
            level: 6,
            require_layout: true,
            layout: LayoutArgs {
                first_id: 1,
                last_id: 2,
            },
        })
        .unwrap();

        let restored = root.path().join("restored");
        run_unpack(&UnpackArgs {
            archive,
            output: Some(restored.clone()),
            verify_only: false,
        })
        .unwrap();
        assert_eq!(
            fs::read(corpus_dir.join("map_1.json")).unwrap(),
            fs::read(restored.join("map_1.json")).unwrap()
        );
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
