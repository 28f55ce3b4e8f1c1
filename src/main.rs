use std::io::{Read, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use fxstore::ObjectStore;

#[derive(Parser)]
#[command(name = "fxstore", version = "1.0.0", about = "Fixed-block OID object store CLI")]
struct Cli {
    /// Path to the store file
    store: PathBuf,

    /// Open the store read-only
    #[arg(long, global = true)]
    read_only: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write bytes to an OID, creating or overwriting it
    Put {
        oid: i64,
        /// Read the payload from this file instead of stdin
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Read an OID's payload
    Get {
        oid: i64,
        /// Write the payload to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Remove an OID, returning its blocks to free space
    Delete { oid: i64 },
    /// Claim an OID with an empty payload
    Reserve { oid: i64 },
    /// Generate and reserve the next available OID
    NewOid,
    /// List every stored OID
    List,
    /// Show store-level statistics
    Info,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::try_init().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Put { oid, input } => {
            let store = ObjectStore::open(&cli.store, cli.read_only)?;
            let bytes = read_payload(input)?;
            let len = bytes.len();
            store.write(oid, &bytes)?;
            store.close()?;
            println!("wrote {len} bytes to OID {oid}");
        }

        Commands::Get { oid, output } => {
            let store = ObjectStore::open(&cli.store, true)?;
            match store.read(oid)? {
                Some(bytes) => write_payload(output, &bytes)?,
                None => {
                    eprintln!("OID {oid} not found");
                    std::process::exit(1);
                }
            }
        }

        Commands::Delete { oid } => {
            let store = ObjectStore::open(&cli.store, cli.read_only)?;
            let removed = store.delete(oid)?;
            store.close()?;
            match removed {
                Some(block) => println!(
                    "deleted OID {oid} ({} bytes across {} blocks)",
                    block.count_bytes,
                    block.block_count()
                ),
                None => println!("OID {oid} was not present"),
            }
        }

        Commands::Reserve { oid } => {
            let store = ObjectStore::open(&cli.store, cli.read_only)?;
            store.reserve(oid)?;
            store.close()?;
            println!("reserved OID {oid}");
        }

        Commands::NewOid => {
            let store = ObjectStore::open(&cli.store, cli.read_only)?;
            let oid = store.new_oid()?;
            store.close()?;
            println!("{oid}");
        }

        Commands::List => {
            let store = ObjectStore::open(&cli.store, true)?;
            println!("{:<20} {:>12} {:>8}", "OID", "bytes", "blocks");
            for (oid, count_bytes, block_count) in store.objects() {
                println!("{oid:<20} {count_bytes:>12} {block_count:>8}");
            }
        }

        Commands::Info => {
            let store = ObjectStore::open(&cli.store, true)?;
            let stats = store.stats()?;
            println!("── fxstore ──────────────────────────────");
            println!("  Path          {}", cli.store.display());
            println!("  File size     {} B", stats.file_len);
            println!("  Objects       {}", stats.object_count);
            println!("  Free blocks   {}", stats.free_block_count);
        }
    }

    Ok(())
}

fn read_payload(input: Option<PathBuf>) -> std::io::Result<Vec<u8>> {
    match input {
        Some(path) => std::fs::read(path),
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            Ok(buf)
        }
    }
}

fn write_payload(output: Option<PathBuf>, bytes: &[u8]) -> std::io::Result<()> {
    match output {
        Some(path) => std::fs::write(path, bytes),
        None => std::io::stdout().write_all(bytes),
    }
}
