use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use plate_file::PlateFile;
use plate_index::{IndexHeader, IndexService};
use plate_snapshot::SnapshotManager;
use plate_types::{TileCell, TileHeader, TileRegion, TileVersion, TransactionId};
use serde::Serialize;
use tracing::debug;

use crate::cli::*;
use crate::settings::Settings;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::load(cli.config.as_deref())?;
    debug!(?settings, "settings loaded");
    let ctx = Session {
        settings,
        format: cli.format,
    };
    match cli.command {
        Command::Create(args) => cmd_create(&ctx, args),
        Command::Info(args) => cmd_info(&ctx, args),
        Command::Write(args) => cmd_write(&ctx, args),
        Command::Read(args) => cmd_read(&ctx, args),
        Command::History(args) => cmd_history(&ctx, args),
        Command::Cursor(args) => cmd_cursor(&ctx, args),
        Command::Txn(args) => cmd_txn(&ctx, args),
        Command::Snapshot(args) => cmd_snapshot(&ctx, args),
        Command::FullSnapshot(args) => cmd_full_snapshot(&ctx, args),
        Command::List(args) => cmd_list(&ctx, args),
    }
}

struct Session {
    settings: Settings,
    format: OutputFormat,
}

impl Session {
    fn open(&self, path: &std::path::Path) -> anyhow::Result<Arc<PlateFile>> {
        let plate = PlateFile::open(path, &self.settings.plate)
            .with_context(|| format!("opening platefile {}", path.display()))?;
        Ok(Arc::new(plate))
    }

    fn json(&self) -> bool {
        self.format == OutputFormat::Json
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cell(args: &CellArgs) -> anyhow::Result<TileCell> {
    Ok(TileCell::checked(args.col, args.row, args.level)?)
}

fn cmd_create(ctx: &Session, args: CreateArgs) -> anyhow::Result<()> {
    let name = match args.name {
        Some(name) => name,
        None => args
            .plate
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "platefile".into()),
    };
    let header = IndexHeader::new(name, args.tile_size, args.file_type, args.pixel_format, args.levels)
        .with_description(args.description);
    let plate = PlateFile::create(&args.plate, header, &ctx.settings.plate)?;
    if ctx.json() {
        return print_json(plate.header());
    }
    println!(
        "{} Created platefile {} in {}",
        "✓".green().bold(),
        plate.name().bold(),
        args.plate.display()
    );
    println!("  Id: {}", plate.platefile_id().to_string().cyan());
    println!(
        "  Levels: {}, tile size: {}, type: {}",
        plate.num_levels(),
        plate.default_tile_size(),
        plate.default_file_type().yellow()
    );
    Ok(())
}

fn cmd_info(ctx: &Session, args: PlateArgs) -> anyhow::Result<()> {
    let plate = ctx.open(&args.plate)?;
    let cursor = plate.transaction_cursor()?;
    let mut records = 0usize;
    plate.for_each_record(&mut |_, _| records += 1)?;

    if ctx.json() {
        #[derive(Serialize)]
        struct Info<'a> {
            header: &'a IndexHeader,
            cursor: TransactionId,
            records: usize,
        }
        return print_json(&Info {
            header: plate.header(),
            cursor,
            records,
        });
    }
    let header = plate.header();
    println!("Platefile {} ({})", header.name.bold(), header.platefile_id.to_string().cyan());
    if !header.description.is_empty() {
        println!("  {}", header.description);
    }
    println!("  Levels: {}", header.num_levels);
    println!("  Tile size: {}", header.tile_size);
    println!("  File type: {}", header.file_type.yellow());
    println!("  Pixel format: {}", header.pixel_format);
    println!("  Records: {}", records);
    println!("  Cursor: {}", cursor.to_string().green());
    Ok(())
}

fn cmd_write(ctx: &Session, args: WriteArgs) -> anyhow::Result<()> {
    let plate = ctx.open(&args.plate)?;
    let cell = cell(&args.cell)?;
    let payload = std::fs::read(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let tid = TransactionId::new(args.transaction);
    let header = match &args.payload_type {
        Some(payload_type) => plate.write_as(cell, tid, payload_type, &payload)?,
        None => plate.write(cell, tid, &payload)?,
    };
    if ctx.json() {
        return print_json(&header);
    }
    println!(
        "{} Wrote {} ({} bytes, {}) under transaction {}",
        "✓".green().bold(),
        cell.to_string().bold(),
        payload.len(),
        header.payload_type.yellow(),
        tid.to_string().cyan()
    );
    Ok(())
}

fn cmd_read(ctx: &Session, args: ReadArgs) -> anyhow::Result<()> {
    let plate = ctx.open(&args.plate)?;
    let cell = cell(&args.cell)?;
    let version = match args.transaction {
        Some(t) => TileVersion::at(TransactionId::new(t), args.exact),
        None => TileVersion::AtOrBefore(plate.transaction_cursor()?),
    };
    let header = plate.read_header(cell, version)?;
    let path = plate.read_to_file(cell, version, &args.output)?;
    if ctx.json() {
        return print_json(&header);
    }
    println!(
        "{} Read {} @ transaction {} -> {}",
        "✓".green().bold(),
        cell.to_string().bold(),
        header.transaction_id.to_string().cyan(),
        path.display()
    );
    Ok(())
}

fn cmd_history(ctx: &Session, args: HistoryArgs) -> anyhow::Result<()> {
    let plate = ctx.open(&args.plate)?;
    let cell = cell(&args.cell)?;
    let start = TransactionId::new(args.start);
    let end = args.end.map(TransactionId::new).unwrap_or(TransactionId::MAX);
    let headers: Vec<TileHeader> = plate_snapshot::history(&plate, cell, start, end, false)?;
    if ctx.json() {
        return print_json(&headers);
    }
    if headers.is_empty() {
        println!("No versions of {} in range.", cell.to_string().bold());
        return Ok(());
    }
    let cursor = plate.transaction_cursor()?;
    for header in &headers {
        let marker = if header.transaction_id <= cursor {
            "committed".green()
        } else {
            "pending".yellow()
        };
        println!(
            "{}  {}  {}",
            header.transaction_id.to_string().cyan().bold(),
            header.payload_type,
            marker
        );
    }
    Ok(())
}

fn cmd_cursor(ctx: &Session, args: PlateArgs) -> anyhow::Result<()> {
    let plate = ctx.open(&args.plate)?;
    let cursor = plate.transaction_cursor()?;
    let open = plate.open_transactions()?;
    if ctx.json() {
        #[derive(Serialize)]
        struct CursorReport<'a> {
            cursor: TransactionId,
            open: &'a [plate_types::Transaction],
        }
        return print_json(&CursorReport { cursor, open: &open });
    }
    println!("Cursor: {}", cursor.to_string().green().bold());
    for txn in &open {
        println!(
            "  {} {:?} {}  {}",
            "open".yellow(),
            txn.state,
            txn.id.to_string().cyan(),
            txn.description.dimmed()
        );
    }
    if let Some(blocker) = open.first() {
        if blocker.id.get() == cursor.get() + 1 {
            println!(
                "{} cursor is held back by transaction {}",
                "!".red().bold(),
                blocker.id.to_string().cyan()
            );
        }
    }
    Ok(())
}

fn cmd_txn(ctx: &Session, args: TxnArgs) -> anyhow::Result<()> {
    match args.action {
        TxnAction::Request { plate, description } => {
            let plate = ctx.open(&plate)?;
            let tid = plate.transaction_request(&description, &[])?;
            if ctx.json() {
                return print_json(&tid);
            }
            println!("{} Transaction {} requested", "✓".green().bold(), tid.to_string().cyan().bold());
        }
        TxnAction::RootComplete { plate, id } => {
            let plate = ctx.open(&plate)?;
            let tid = TransactionId::new(id);
            let Some(txn) = plate.transaction(tid)? else {
                bail!("transaction {id} was never issued");
            };
            let file_type = plate.default_file_type().to_string();
            let headers: Vec<TileHeader> = txn
                .cells
                .iter()
                .map(|cell| TileHeader::new(*cell, tid, file_type.clone()))
                .collect();
            plate.root_complete(tid, &headers)?;
            println!("{} Transaction {} root complete", "✓".green().bold(), tid.to_string().cyan());
        }
        TxnAction::Complete { plate, id } => {
            let plate = ctx.open(&plate)?;
            let tid = TransactionId::new(id);
            plate.transaction_complete(tid)?;
            let cursor = plate.transaction_cursor()?;
            println!(
                "{} Transaction {} committed; cursor at {}",
                "✓".green().bold(),
                tid.to_string().cyan(),
                cursor.to_string().green()
            );
        }
    }
    Ok(())
}

fn cmd_snapshot(ctx: &Session, args: SnapshotArgs) -> anyhow::Result<()> {
    let plate = ctx.open(&args.plate)?;
    let region = match args.region.as_deref() {
        Some([x, y, w, h]) => TileRegion::new(*x, *y, *w, *h),
        Some(_) => bail!("--region takes x,y,width,height"),
        None => TileRegion::full_level(args.level),
    };
    let manager = SnapshotManager::new(plate, ctx.settings.snapshot.clone())?;
    let updated = manager.snapshot(
        args.level,
        region,
        TransactionId::new(args.start),
        TransactionId::new(args.end),
        TransactionId::new(args.write),
    )?;
    if ctx.json() {
        return print_json(&updated);
    }
    println!(
        "{} Snapshot of {} @ level {}: {} tiles updated",
        "✓".green().bold(),
        region,
        args.level,
        updated.to_string().bold()
    );
    Ok(())
}

fn cmd_full_snapshot(ctx: &Session, args: FullSnapshotArgs) -> anyhow::Result<()> {
    let plate = ctx.open(&args.plate)?;
    let manager = SnapshotManager::new(plate, ctx.settings.snapshot.clone())?;
    let start = TransactionId::new(args.start);
    let end = TransactionId::new(args.end);
    let (write_tid, updated) = match args.write {
        Some(write) => {
            let write = TransactionId::new(write);
            (write, manager.full_snapshot(start, end, write)?)
        }
        None => {
            let report = manager.compact(start, end, &args.description)?;
            (report.transaction_id, report.tiles_updated)
        }
    };
    if ctx.json() {
        #[derive(Serialize)]
        struct FullReport {
            transaction_id: TransactionId,
            tiles_updated: usize,
        }
        return print_json(&FullReport {
            transaction_id: write_tid,
            tiles_updated: updated,
        });
    }
    println!(
        "{} Full snapshot [{}, {}] under transaction {}: {} tiles updated",
        "✓".green().bold(),
        start,
        end,
        write_tid.to_string().cyan(),
        updated.to_string().bold()
    );
    Ok(())
}

fn cmd_list(ctx: &Session, args: ListArgs) -> anyhow::Result<()> {
    let service = IndexService::open(&args.root, ctx.settings.plate.index.clone())
        .with_context(|| format!("scanning {}", args.root.display()))?;
    let headers = service.list()?;
    if ctx.json() {
        return print_json(&headers);
    }
    if headers.is_empty() {
        println!("No platefiles under {}.", args.root.display());
        return Ok(());
    }
    for header in &headers {
        println!(
            "{}  {}  {} levels  {}",
            header.platefile_id.to_string().cyan(),
            header.name.bold(),
            header.num_levels,
            header.file_type.yellow()
        );
    }
    Ok(())
}
