use clap::{Parser, Subcommand};
use std::io;
use std::path::PathBuf;
use std::rc::Rc;

use blockarc::{Archive, LogObserver};

#[derive(Parser)]
#[command(name = "blockarc")]
#[command(about = "Fixed-block file archive tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new, empty archive
    Create { archive: PathBuf },
    /// Add a file to an archive
    Add {
        archive: PathBuf,
        file: PathBuf,
        /// Processor tag, e.g. "comp" for DEFLATE
        #[arg(short, long)]
        processor: Option<String>,
    },
    /// Extract a file from an archive
    Extract {
        archive: PathBuf,
        file: PathBuf,
        output: PathBuf,
    },
    /// Remove a file from an archive
    Remove { archive: PathBuf, file: PathBuf },
    /// List archived files
    List { archive: PathBuf },
    /// Dump every block header
    Dump { archive: PathBuf },
    /// Drop tombstoned blocks and renumber survivors
    Compact { archive: PathBuf },
    /// Show chain details for one archived file
    Info { archive: PathBuf, file: PathBuf },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();
    match &cli.command {
        Commands::Create { archive } => {
            let ar = Archive::create(archive)?;
            println!("Created {}", ar.path().display());
        }
        Commands::Add { archive, file, processor } => {
            let mut ar = open_observed(archive)?;
            ar.add(file, processor.as_deref())?;
            println!("Added {}", file.display());
        }
        Commands::Extract { archive, file, output } => {
            let mut ar = open_observed(archive)?;
            ar.extract(file, output)?;
            println!("Extracted {} to {}", file.display(), output.display());
        }
        Commands::Remove { archive, file } => {
            let mut ar = open_observed(archive)?;
            ar.remove(file)?;
            println!("Removed {}", file.display());
        }
        Commands::List { archive } => {
            let mut ar = open_observed(archive)?;
            let count = ar.list(&mut io::stdout())?;
            println!("{count} file(s)");
        }
        Commands::Dump { archive } => {
            let mut ar = open_observed(archive)?;
            let blocks = ar.debug_dump(&mut io::stdout())?;
            println!("{blocks} block(s)");
        }
        Commands::Compact { archive } => {
            let mut ar = open_observed(archive)?;
            let survivors = ar.compact()?;
            println!("Compacted to {survivors} block(s)");
        }
        Commands::Info { archive, file } => {
            let mut ar = open_observed(archive)?;
            let stat = ar.stat(file)?;
            println!("{:<12} {}", "name", stat.name);
            println!("{:<12} {}", "first block", stat.first_block);
            println!("{:<12} {}", "blocks", stat.block_count);
            println!("{:<12} {}", "bytes", stat.size);
            println!("{:<12} {}", "processed", stat.is_processed);
        }
    }
    Ok(())
}

fn open_observed(path: &PathBuf) -> Result<Archive, Box<dyn std::error::Error>> {
    let mut ar = Archive::open(path)?;
    ar.add_observer(Rc::new(LogObserver));
    Ok(ar)
}
