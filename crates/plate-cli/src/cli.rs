use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "plate",
    about = "Platefile tile store: versioned tile pyramids with transactional writes",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Settings file with [plate] and [snapshot] tables. Defaults to
    /// ./plate.toml when present.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a new platefile directory
    Create(CreateArgs),
    /// Show platefile metadata
    Info(PlateArgs),
    /// Store a tile payload under an open transaction
    Write(WriteArgs),
    /// Read a tile payload to a file
    Read(ReadArgs),
    /// List the versions of one cell
    History(HistoryArgs),
    /// Show the transaction cursor and open transactions
    Cursor(PlateArgs),
    /// Drive the transaction lifecycle
    Txn(TxnArgs),
    /// Consolidate one pyramid level
    Snapshot(SnapshotArgs),
    /// Consolidate every level
    FullSnapshot(FullSnapshotArgs),
    /// List the platefiles under a directory
    List(ListArgs),
}

#[derive(Args)]
pub struct PlateArgs {
    /// Platefile directory
    pub plate: PathBuf,
}

#[derive(Args)]
pub struct CellArgs {
    pub col: u32,
    pub row: u32,
    pub level: u8,
}

#[derive(Args)]
pub struct CreateArgs {
    pub plate: PathBuf,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long, default_value = "")]
    pub description: String,
    #[arg(long, default_value = "256")]
    pub tile_size: u32,
    #[arg(long, default_value = "raw")]
    pub file_type: String,
    #[arg(long, default_value = "rgba8")]
    pub pixel_format: String,
    #[arg(long, default_value = "10")]
    pub levels: u8,
}

#[derive(Args)]
pub struct WriteArgs {
    pub plate: PathBuf,
    #[command(flatten)]
    pub cell: CellArgs,
    /// Open transaction to write under
    #[arg(short, long)]
    pub transaction: u64,
    /// File holding the payload
    #[arg(short, long)]
    pub input: PathBuf,
    /// Payload type; defaults to the platefile's file type
    #[arg(long)]
    pub payload_type: Option<String>,
}

#[derive(Args)]
pub struct ReadArgs {
    pub plate: PathBuf,
    #[command(flatten)]
    pub cell: CellArgs,
    /// Read as of this transaction; defaults to the cursor
    #[arg(short, long)]
    pub transaction: Option<u64>,
    /// Only accept a version written by exactly that transaction
    #[arg(long, requires = "transaction")]
    pub exact: bool,
    /// Output path without extension; the payload type is appended
    #[arg(short, long, default_value = "tile")]
    pub output: PathBuf,
}

#[derive(Args)]
pub struct HistoryArgs {
    pub plate: PathBuf,
    #[command(flatten)]
    pub cell: CellArgs,
    #[arg(long, default_value = "0")]
    pub start: u64,
    #[arg(long)]
    pub end: Option<u64>,
}

#[derive(Args)]
pub struct TxnArgs {
    #[command(subcommand)]
    pub action: TxnAction,
}

#[derive(Subcommand)]
pub enum TxnAction {
    /// Allocate a new transaction id
    Request {
        plate: PathBuf,
        #[arg(short, long)]
        description: String,
    },
    /// Mark the first-pass writes of a transaction as landed
    RootComplete { plate: PathBuf, id: u64 },
    /// Commit a transaction and advance the cursor
    Complete { plate: PathBuf, id: u64 },
}

#[derive(Args)]
pub struct SnapshotArgs {
    pub plate: PathBuf,
    pub level: u8,
    #[arg(long)]
    pub start: u64,
    #[arg(long)]
    pub end: u64,
    /// Open transaction the consolidated tiles are written under
    #[arg(long)]
    pub write: u64,
    /// Region as x,y,width,height at the target level; defaults to the
    /// whole level
    #[arg(long, value_delimiter = ',')]
    pub region: Option<Vec<u64>>,
}

#[derive(Args)]
pub struct FullSnapshotArgs {
    pub plate: PathBuf,
    #[arg(long)]
    pub start: u64,
    #[arg(long)]
    pub end: u64,
    /// Write under this open transaction instead of requesting and
    /// committing a new one
    #[arg(long)]
    pub write: Option<u64>,
    #[arg(short, long, default_value = "compaction")]
    pub description: String,
}

#[derive(Args)]
pub struct ListArgs {
    /// Directory holding `*.plate` platefiles
    #[arg(default_value = ".")]
    pub root: PathBuf,
}
