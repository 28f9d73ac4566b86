mod lookup;
mod pack;
mod progress;

use std::{path::PathBuf, process::ExitCode};

use anyhow::Result;
use bytesize::ByteSize;
use clap::{Args, Parser, Subcommand, ValueEnum};
use karaoke_library::{DEFAULT_MAX_RESULTS, GroupingPolicy, SourceKind};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Empaqueta colecciones karaoke en lotes, grupos de archivos e índice de búsqueda.
#[derive(Parser, Debug)]
#[command(name = "karaoke-packer", version, about = "Pack karaoke collections into searchable archives")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Clasifica, empaqueta, agrupa e indexa una colección.
    Pack(PackArgs),
    /// Busca en el índice de una carpeta ya procesada.
    Search(SearchArgs),
    /// Saca los ficheros de una canción a disco.
    Extract(ExtractArgs),
}

#[derive(Args, Debug)]
pub struct PackArgs {
    /// Carpeta con la colección (o con `Data/SONG.DBF`).
    #[arg(env = "KARAOKE_INPUT_DIR")]
    pub input: Option<PathBuf>,

    /// Fichero TOML de configuración. Por defecto el `settings.toml` de la app.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub source: Option<SourceArg>,

    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Tamaño máximo de cada `karaoke_{g}.zip` (p. ej. `500MiB`).
    #[arg(short = 'l', long)]
    pub zip_size_limit: Option<ByteSize>,

    /// Deja los lotes sueltos, sin agrupar.
    #[arg(long)]
    pub no_group: bool,

    #[arg(long, value_enum)]
    pub grouping: Option<GroupingArg>,

    #[arg(long)]
    pub keep_batches: bool,

    #[arg(short, long)]
    pub workers: Option<usize>,

    #[arg(long)]
    pub chunk_size: Option<usize>,

    #[arg(long)]
    pub no_index_zip: bool,

    /// Sin barras de progreso.
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Carpeta de salida de un `pack`.
    #[arg(short, long, default_value = "processed_karaoke")]
    pub output: PathBuf,

    #[arg(short = 'n', long, default_value_t = DEFAULT_MAX_RESULTS)]
    pub max_results: usize,

    #[arg(long)]
    pub json: bool,

    #[arg(required = true, num_args = 1..)]
    pub query: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    #[arg(short, long, default_value = "processed_karaoke")]
    pub output: PathBuf,

    /// Carpeta donde dejar los ficheros.
    #[arg(short, long, default_value = ".")]
    pub dest: PathBuf,

    /// `originalIndex` de la canción.
    pub index: usize,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum SourceArg {
    Auto,
    Catalog,
    Directory,
}

impl From<SourceArg> for SourceKind {
    fn from(value: SourceArg) -> Self {
        match value {
            SourceArg::Auto => SourceKind::Auto,
            SourceArg::Catalog => SourceKind::Catalog,
            SourceArg::Directory => SourceKind::Directory,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum GroupingArg {
    SealBeforeAdd,
    SealAfterAdd,
}

impl From<GroupingArg> for GroupingPolicy {
    fn from(value: GroupingArg) -> Self {
        match value {
            GroupingArg::SealBeforeAdd => GroupingPolicy::SealBeforeAdd,
            GroupingArg::SealAfterAdd => GroupingPolicy::SealAfterAdd,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "karaoke_library=info,karaoke_packer=info,warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Pack(args) => pack::run(args).await,
        Command::Search(args) => lookup::search(args),
        Command::Extract(args) => lookup::extract(args),
    }
}
