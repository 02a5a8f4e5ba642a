//! Costsheet CLI
//!
//! Usage:
//!   costsheet generate <MODEL> [--out DIR] [--catalog FILE] [--palette FILE]
//!   costsheet extract <DOCUMENT>
//!   costsheet revise <DOCUMENT> [--tag X] [--date DD/MM/YYYY]
//!   costsheet totals <DOCUMENT>
//!
//! Logging goes to stderr and is controlled with `RUST_LOG` (default `warn`).

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use costsheet::{
    calculate_totals, create_revision, extract_file, load_project, synthesize_to_file, Catalog,
    CatalogError, EngineError, Palette, SchemaVersion, SynthesisConfig,
};

#[derive(Parser)]
#[command(name = "costsheet")]
#[command(about = "Generate cost sheet documents and read them back")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a document from a JSON project model
    Generate {
        /// Project model (JSON)
        model: PathBuf,

        /// Output directory (defaults to the model's directory)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Block catalog (TOML)
        #[arg(short, long)]
        catalog: Option<PathBuf>,

        /// Branch tab-color palette (TOML)
        #[arg(short, long)]
        palette: Option<PathBuf>,

        /// Schema version to write
        #[arg(long, value_parser = parse_schema)]
        schema: Option<SchemaVersion>,

        /// Keep unused catalog blocks as hidden sheets
        #[arg(long)]
        keep_unused: bool,
    },

    /// Print the project model stored in a document as JSON
    Extract {
        document: PathBuf,
    },

    /// Write the next revision of a document alongside it
    Revise {
        document: PathBuf,

        /// Revision letter (defaults to the next one)
        #[arg(short, long)]
        tag: Option<String>,

        /// Revision date, DD/MM/YYYY (defaults to today)
        #[arg(short, long)]
        date: Option<String>,
    },

    /// Print per-system and grand totals of a document as JSON
    Totals {
        document: PathBuf,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli.command) {
        match &e {
            EngineError::Catalog(CatalogError::InvalidFormula {
                address,
                formula,
                source,
                ..
            }) => eprintln!("{}", source.format(formula, address)),
            _ => eprintln!("Error: {}", e),
        }
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<(), EngineError> {
    match command {
        Command::Generate {
            model,
            out,
            catalog,
            palette,
            schema,
            keep_unused,
        } => {
            let project = load_project(&model)?;
            let catalog = match catalog {
                Some(path) => Catalog::from_file(&path)?,
                None => Catalog::default(),
            };
            let palette = match palette {
                Some(path) => Palette::from_file(&path)?,
                None => Palette::default(),
            };
            let config = SynthesisConfig::new()
                .with_version(schema.unwrap_or(SchemaVersion::CURRENT))
                .with_palette(palette)
                .with_prune_unused(!keep_unused);
            let dir = out.unwrap_or_else(|| parent_dir(&model));
            let path = synthesize_to_file(&project, &catalog, &config, &dir)?;
            println!("{}", path.display());
        }
        Command::Extract { document } => {
            let extraction = extract_file(&document)?;
            for warning in &extraction.warnings {
                eprintln!("warning: {}", warning);
            }
            println!("{}", serde_json::to_string_pretty(&extraction.project)?);
        }
        Command::Revise { document, tag, date } => {
            let path = create_revision(&document, tag.as_deref(), date.as_deref())?;
            println!("{}", path.display());
        }
        Command::Totals { document } => {
            let extraction = extract_file(&document)?;
            let totals = calculate_totals(&extraction.project);
            println!("{}", serde_json::to_string_pretty(&totals)?);
        }
    }
    Ok(())
}

fn parse_schema(marker: &str) -> Result<SchemaVersion, String> {
    SchemaVersion::parse(marker).ok_or_else(|| format!("unknown schema version '{}'", marker))
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}
