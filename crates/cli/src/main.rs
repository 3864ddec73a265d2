use clap::{Parser, Subcommand};
use depot_files::{FileReference, FileStorage, StorageConfig};
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "depot")]
#[command(about = "Depot file storage CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a file and print its reference
    Put {
        /// File to store
        path: PathBuf,
        /// Original filename to record (defaults to the file's name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Copy a stored file to a local path ("-" for stdout)
    Get {
        /// File reference
        reference: String,
        /// Output path
        out: PathBuf,
    },
    /// Check whether a stored file exists in any root
    Exists {
        /// File reference
        reference: String,
    },
    /// Print metadata for a stored file as JSON
    Info {
        /// File reference
        reference: String,
    },
    /// Delete a stored file from every root
    Rm {
        /// File reference
        reference: String,
    },
    /// List the configured storage roots
    Roots,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("depot_files=warn".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("Use 'depot --help' for commands");
        return Ok(());
    };

    let config = StorageConfig::from_lookup(|key| std::env::var(key).ok())?;
    let storage = FileStorage::new(&config)?;

    match command {
        Commands::Put { path, name } => {
            let name = name.or_else(|| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_owned)
            });
            let reference = storage.create_reference(name.as_deref());
            let mut file = fs::File::open(&path)?;
            match storage.save_stream(&reference, &mut file) {
                Ok(size) => println!("{} ({} bytes)", reference, size),
                Err(e) => eprintln!("Error storing {}: {}", path.display(), e),
            }
        }
        Commands::Get { reference, out } => {
            let reference: FileReference = reference.parse()?;
            match storage.open_stream(&reference) {
                Ok(mut stream) => {
                    if out.as_os_str() == "-" {
                        io::copy(&mut stream, &mut io::stdout().lock())?;
                    } else {
                        let size = io::copy(&mut stream, &mut fs::File::create(&out)?)?;
                        println!("Wrote {} bytes to {}", size, out.display());
                    }
                }
                Err(e) => eprintln!("Error reading {}: {}", reference, e),
            }
        }
        Commands::Exists { reference } => {
            let reference: FileReference = reference.parse()?;
            println!("{}", storage.file_exists(&reference));
        }
        Commands::Info { reference } => {
            let reference: FileReference = reference.parse()?;
            match storage.file_info(&reference) {
                Ok(info) => println!("{}", serde_json::to_string_pretty(&info)?),
                Err(e) => eprintln!("Error describing {}: {}", reference, e),
            }
        }
        Commands::Rm { reference } => {
            let reference: FileReference = reference.parse()?;
            match storage.remove_file(&reference) {
                Ok(()) => println!("Removed {}", reference),
                Err(e) => eprintln!("Error removing {}: {}", reference, e),
            }
        }
        Commands::Roots => {
            for (index, root) in storage.roots().iter().enumerate() {
                let role = if index == 0 { "primary" } else { "secondary" };
                println!("{} {} ({})", index, root.display(), role);
            }
        }
    }

    // Waits for queued replica copies before exiting.
    storage.shutdown();

    Ok(())
}
