// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use picframe_cli::commands::{add, defrag, delete, extract, format, inspect, list, wipe};
use picframe_cli::session::{parse_u32, DumpArgs};

#[derive(Parser)]
#[command(name = "picframe")]
#[command(about = "Inspect and edit picture frame flash dumps", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the detected layout and free space.
    Inspect {
        #[command(flatten)]
        dump: DumpArgs,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List stored pictures
    List {
        #[command(flatten)]
        dump: DumpArgs,

        #[arg(long)]
        json: bool,
    },
    /// Copy one stored picture to a file
    Extract {
        #[command(flatten)]
        dump: DumpArgs,

        /// Directory index of the picture
        #[arg(long, short)]
        index: u32,

        /// Output file
        #[arg(long, short)]
        out: PathBuf,
    },
    /// Store an already encoded picture in the lowest free slot
    Add {
        #[command(flatten)]
        dump: DumpArgs,

        /// Encoded picture file
        #[arg(long, short)]
        file: PathBuf,

        /// Name stored in the table (st2205 only; defaults to the file name)
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        dry_run: bool,
    },
    /// Delete one picture
    Delete {
        #[command(flatten)]
        dump: DumpArgs,

        #[arg(long, short)]
        index: u32,

        #[arg(long)]
        dry_run: bool,
    },
    /// Delete every picture
    Wipe {
        #[command(flatten)]
        dump: DumpArgs,

        #[arg(long)]
        dry_run: bool,
    },
    /// Pack all pictures at the start of the heap
    Defrag {
        #[command(flatten)]
        dump: DumpArgs,

        #[arg(long)]
        dry_run: bool,
    },
    /// Create a blank, formatted dump
    Format {
        #[command(flatten)]
        dump: DumpArgs,

        /// Image size in bytes
        #[arg(long, value_parser = parse_u32, default_value = "0x80000")]
        size: u32,

        /// ST2205 frame that stores uncompressed RGB565 pictures
        #[arg(long)]
        rgb565: bool,

        /// ST2205 V1 layout (four table copies)
        #[arg(long)]
        st2205_v1: bool,
    },
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so JSON output stays clean.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "picframe_flash=info,picframe=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect { dump, json } => inspect::run(&dump, json),
        Commands::List { dump, json } => list::run(&dump, json),
        Commands::Extract { dump, index, out } => extract::run(&dump, index, &out),
        Commands::Add {
            dump,
            file,
            name,
            dry_run,
        } => add::run(&dump, &file, name, dry_run),
        Commands::Delete { dump, index, dry_run } => delete::run(&dump, index, dry_run),
        Commands::Wipe { dump, dry_run } => wipe::run(&dump, dry_run),
        Commands::Defrag { dump, dry_run } => defrag::run(&dump, dry_run),
        Commands::Format {
            dump,
            size,
            rgb565,
            st2205_v1,
        } => format::run(&dump, size, rgb565, st2205_v1),
    }
}
