//! remotestash - publish and fetch the latest stashed content on the LAN
//!
//! Subcommands:
//! - `remotestash serve` - Advertise this stash over mDNS and serve requests
//! - `remotestash push|pull|last|status` - One operation against a discovered
//!   instance, or against the local stash with `--local`
//! - `remotestash clear` - Empty the local stash
//! - `remotestash list` - Print every advertised instance until the timeout
//! - `remotestash generate-cert` - Provision a self-signed TLS pair

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stash::{Item, ItemInfo, Stash, StashConfig};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod advertise;
mod browse;
mod client;
mod serve;
mod tls;

#[derive(Parser)]
#[command(name = "remotestash")]
#[command(about = "Publish and fetch the latest stashed content on the local network")]
#[command(version)]
struct Cli {
    /// Require TLS peer verification for remote operations
    #[arg(long, global = true)]
    verify: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Advertise this stash and serve requests
    Serve {
        /// Instance name to advertise (default: "<owner> RemoteStash")
        #[arg(short, long)]
        name: Option<String>,

        /// Port to bind (default: OS-assigned)
        #[arg(short, long)]
        port: Option<u16>,

        /// Stash directory
        #[arg(long)]
        stash: Option<PathBuf>,
    },

    /// Push content to a stash
    Push {
        /// File to push (stdin when omitted)
        file: Option<PathBuf>,

        /// Content type (guessed when omitted)
        #[arg(short = 't', long = "type")]
        content_type: Option<String>,

        #[command(flatten)]
        target: Target,
    },

    /// Pop the latest item from a stash
    Pull {
        /// Write the payload here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,

        #[command(flatten)]
        target: Target,
    },

    /// Peek at the latest item without removing it
    Last {
        /// Write the payload here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,

        #[command(flatten)]
        target: Target,
    },

    /// Show item count and latest item summary
    Status {
        #[command(flatten)]
        target: Target,
    },

    /// Remove every item from the local stash
    Clear {
        /// Stash directory
        #[arg(long)]
        stash: Option<PathBuf>,
    },

    /// List advertised stash instances until the timeout
    List {
        /// Browse timeout in seconds
        #[arg(long, default_value = "5")]
        timeout: u64,
    },

    /// Generate a self-signed TLS certificate pair
    GenerateCert {
        /// Hostname to put in the certificate (default: this machine's)
        #[arg(long)]
        hostname: Option<String>,
    },
}

/// Where an operation runs: the local stash directly, or a discovered instance.
#[derive(clap::Args)]
struct Target {
    /// Operate on the local stash directly, skipping discovery
    #[arg(long)]
    local: bool,

    /// Only match instances whose advertised name contains this
    #[arg(short, long)]
    name: Option<String>,

    /// Discovery timeout in seconds
    #[arg(long, default_value = "5")]
    timeout: u64,

    /// Stash directory (local mode)
    #[arg(long)]
    stash: Option<PathBuf>,
}

impl Target {
    fn stash_config(&self) -> StashConfig {
        stash_config(self.stash.clone())
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

fn stash_config(dir: Option<PathBuf>) -> StashConfig {
    dir.map(StashConfig::with_location)
        .unwrap_or_else(StashConfig::from_env)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let verify = cli.verify;

    match cli.command {
        Commands::Serve { name, port, stash } => {
            let cert_paths = tls::TlsCertPaths::resolve()?;
            serve::run(serve::ServeConfig {
                name: name.unwrap_or_else(advertise::default_instance_name),
                port,
                stash: stash_config(stash),
                cert_paths,
            })
            .await?;
        }

        Commands::Push {
            file,
            content_type,
            target,
        } => {
            let (data, content_type) = read_input(file.as_deref(), content_type)?;
            if target.local {
                let mut info = ItemInfo::new(&content_type);
                if let Some(name) = file
                    .as_deref()
                    .and_then(Path::file_name)
                    .and_then(|n| n.to_str())
                {
                    info.file = Some(name.to_string());
                }
                Stash::open(target.stash_config())?.push(Item::from_bytes(data, info))?;
            } else {
                let service = discover(&target).await?;
                client::RemoteClient::connect(&service, verify)?
                    .push(&content_type, data)
                    .await?;
                println!("pushed to {}", service.name);
            }
        }

        Commands::Pull { out, target } => {
            let item = if target.local {
                Stash::open(target.stash_config())?.pull()?
            } else {
                let service = discover(&target).await?;
                client::RemoteClient::connect(&service, verify)?.pull().await?
            };
            write_output(item, out.as_deref())?;
        }

        Commands::Last { out, target } => {
            let item = if target.local {
                Stash::open(target.stash_config())?.last()
            } else {
                let service = discover(&target).await?;
                client::RemoteClient::connect(&service, verify)?.last().await?
            };
            write_output(item, out.as_deref())?;
        }

        Commands::Status { target } => {
            let status = if target.local {
                serde_json::to_value(Stash::open(target.stash_config())?.status())?
            } else {
                let service = discover(&target).await?;
                client::RemoteClient::connect(&service, verify)?.status().await?
            };
            println!("{}", serde_json::to_string_pretty(&status)?);
        }

        Commands::Clear { stash } => {
            Stash::open(stash_config(stash))?.clear()?;
        }

        Commands::List { timeout } => {
            browse::list_all(Duration::from_secs(timeout), |service| {
                println!("{}", service.name);
                println!("    host: {}", service.hostname);
                println!("    address: {}:{}", service.addr, service.port);
                if let Some(uuid) = &service.uuid {
                    println!("    uuid: {uuid}");
                }
            })
            .await?;
        }

        Commands::GenerateCert { hostname } => {
            let hostname = hostname
                .unwrap_or_else(|| gethostname::gethostname().to_string_lossy().into_owned());
            let paths = tls::TlsCertPaths::resolve()?;
            tls::generate_self_signed(&hostname, &paths)?;
            println!("wrote {}", paths.cert.display());
            println!("wrote {}", paths.key.display());
        }
    }

    Ok(())
}

async fn discover(target: &Target) -> Result<browse::Discovered> {
    browse::find_first(target.name.as_deref(), target.timeout())
        .await?
        .with_context(|| {
            format!(
                "no remotestash service found within {}s",
                target.timeout
            )
        })
}

/// Read the content to push and resolve its content type.
fn read_input(file: Option<&Path>, explicit_type: Option<String>) -> Result<(Vec<u8>, String)> {
    match file {
        Some(path) => {
            let data = std::fs::read(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let content_type = explicit_type.unwrap_or_else(|| guess_content_type(path));
            Ok((data, content_type))
        }
        None => {
            let mut data = Vec::new();
            std::io::stdin()
                .read_to_end(&mut data)
                .context("failed to read stdin")?;
            let content_type = explicit_type.unwrap_or_else(|| {
                if std::str::from_utf8(&data).is_ok() {
                    "text/plain".to_string()
                } else {
                    "application/octet-stream".to_string()
                }
            });
            Ok((data, content_type))
        }
    }
}

fn guess_content_type(path: &Path) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("txt") | Some("text") => "text/plain",
        Some("md") => "text/markdown",
        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
    .to_string()
}

/// Write a fetched item to the output sink. An absent item is the normal
/// empty-stash outcome, not a failure.
fn write_output(item: Option<Item>, out: Option<&Path>) -> Result<()> {
    let Some(item) = item else {
        eprintln!("stash is empty");
        return Ok(());
    };
    match out {
        Some(path) => {
            let mut file = std::fs::File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            item.write_to(&mut file, true)
                .context("failed to write output file")?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            item.write_to(&mut lock, false)
                .context("failed to write to stdout")?;
            lock.flush().ok();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type(Path::new("notes.txt")), "text/plain");
        assert_eq!(
            guess_content_type(Path::new("photo.JPG")),
            "image/jpeg"
        );
        assert_eq!(
            guess_content_type(Path::new("data.bin")),
            "application/octet-stream"
        );
        assert_eq!(
            guess_content_type(Path::new("no_extension")),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_read_input_from_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("note.txt");
        std::fs::write(&path, "hello")?;

        let (data, content_type) = read_input(Some(&path), None)?;
        assert_eq!(data, b"hello");
        assert_eq!(content_type, "text/plain");

        let (_, content_type) = read_input(Some(&path), Some("text/markdown".to_string()))?;
        assert_eq!(content_type, "text/markdown");
        Ok(())
    }

    #[test]
    fn test_write_output_to_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.bin");

        let item = Item::from_bytes(vec![1, 2, 3], ItemInfo::new("application/octet-stream"));
        write_output(Some(item), Some(&path))?;
        assert_eq!(std::fs::read(&path)?, vec![1, 2, 3]);

        // Empty stash result writes nothing and does not fail
        write_output(None, Some(&dir.path().join("never.bin")))?;
        assert!(!dir.path().join("never.bin").exists());
        Ok(())
    }
}
