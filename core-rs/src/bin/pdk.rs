//! PDK - photodisk operator CLI
//!
//! Command-line interface for the Disk-as-Truth storage engine.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use uuid::Uuid;

use photodisk_core::{
    DiskClient, EngineConfig, MemoryStore, PhotoService, ReconcileDepth, RemoteStore, SlotType,
    UploadFile,
};

#[derive(Parser)]
#[command(name = "pdk")]
#[command(version)]
#[command(about = "photodisk Disk-as-Truth operator CLI", long_about = None)]
struct Cli {
    /// Run against an in-memory store (dry runs, demos)
    #[arg(long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List cars in a region
    List {
        region: String,
    },
    /// Open a car and show its slots
    Open {
        region: String,
        vin: String,
        /// Load per-slot counters (extra remote calls)
        #[arg(long)]
        counts: bool,
    },
    /// Create a car with its 14-slot structure
    CreateCar {
        region: String,
        make: String,
        model: String,
        vin: String,
        #[arg(long, default_value = "operator")]
        by: String,
    },
    /// Archive a car into the ALL region
    Archive {
        region: String,
        vin: String,
        #[arg(long, default_value = "operator")]
        by: String,
    },
    /// Restore an archived car into a live region
    Restore {
        vin: String,
        target_region: String,
        #[arg(long, default_value = "operator")]
        by: String,
    },
    /// Upload local files into a slot
    Upload {
        region: String,
        vin: String,
        /// dealer, buyout or dummies
        slot_type: String,
        /// 1-based slot index
        index: u8,
        /// Files to upload
        files: Vec<PathBuf>,
        #[arg(long, default_value = "operator")]
        by: String,
    },
    /// Manage per-car external links
    Links {
        #[command(subcommand)]
        command: LinkCommands,
    },
    /// Set or clear a slot's "used" flag
    Used {
        region: String,
        vin: String,
        slot_type: String,
        index: u8,
        /// Clear instead of set
        #[arg(long)]
        clear: bool,
        #[arg(long, default_value = "operator")]
        by: String,
    },
    /// Publish a slot and print its public URL
    Publish {
        region: String,
        vin: String,
        slot_type: String,
        index: u8,
        #[arg(long, default_value = "operator")]
        by: String,
    },
    /// Rebuild derived indexes at a path
    Reconcile {
        path: String,
        /// slot, car or region
        #[arg(long, default_value = "slot")]
        depth: String,
    },
    /// Normalize a raw path (debug aid)
    Normalize {
        path: String,
    },
}

#[derive(Subcommand)]
enum LinkCommands {
    /// List a car's links
    List { region: String, vin: String },
    /// Attach a link
    Add {
        region: String,
        vin: String,
        title: String,
        url: String,
        #[arg(long, default_value = "operator")]
        by: String,
    },
    /// Remove a link by id
    Rm {
        region: String,
        vin: String,
        id: Uuid,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = EngineConfig::from_env();

    if cli.memory {
        let service = PhotoService::new(MemoryStore::new(), cfg);
        run(service, cli.command).await
    } else {
        let token = cfg
            .token
            .clone()
            .context("YANDEX_DISK_TOKEN is not set (or pass --memory)")?;
        let client = DiskClient::new(&token, cfg.debug_disk_calls)?;
        let service = PhotoService::new(client, cfg);
        run(service, cli.command).await
    }
}

async fn run<S: RemoteStore>(service: PhotoService<S>, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::List { region } => {
            let cars = service.list_cars_by_region(&region).await?;
            if cars.is_empty() {
                println!("{}", "no cars".dimmed());
            }
            for car in cars {
                println!(
                    "{}  {} {}  {}",
                    car.vin.bold(),
                    car.make,
                    car.model,
                    car.disk_root_path.dimmed()
                );
            }
        }
        Commands::Open {
            region,
            vin,
            counts,
        } => {
            let (car, slots) = service.get_car_with_slots(&region, &vin).await?;
            println!(
                "{} {} {}  region={}",
                car.meta.make.bold(),
                car.meta.model.bold(),
                car.meta.vin,
                car.meta.region
            );
            println!("{}", car.root_path.dimmed());
            if counts {
                let loaded = service.load_car_slot_counts(&region, &vin).await?;
                for slot in loaded {
                    let lock = if slot.locked { " [locked]".red().to_string() } else { String::new() };
                    let used = if slot.used { " [used]".yellow().to_string() } else { String::new() };
                    println!(
                        "  {:<12} {:>3} photos  {:>7.2} MB{}{}",
                        slot.slot.to_string(),
                        slot.count,
                        slot.total_size_mb,
                        lock,
                        used
                    );
                }
            } else {
                for slot in slots {
                    println!("  {:<12} {}", slot.slot.to_string(), slot.path.dimmed());
                }
            }
        }
        Commands::CreateCar {
            region,
            make,
            model,
            vin,
            by,
        } => {
            let car = service.create_car(&region, &make, &model, &vin, &by).await?;
            println!("{} {}", "created".green(), car.root_path);
        }
        Commands::Archive { region, vin, by } => {
            let path = service.archive_car(&region, &vin, &by).await?;
            println!("{} {}", "archived to".green(), path);
        }
        Commands::Restore {
            vin,
            target_region,
            by,
        } => {
            let car = service.restore_car(&vin, &target_region, &by).await?;
            println!("{} {}", "restored to".green(), car.root_path);
        }
        Commands::Upload {
            region,
            vin,
            slot_type,
            index,
            files,
            by,
        } => {
            let slot_type = SlotType::parse(&slot_type)?;
            let mut uploads = Vec::with_capacity(files.len());
            for path in &files {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .context("file name is not valid UTF-8")?;
                uploads.push(UploadFile::new(name, bytes, content_type_for(name)));
            }
            let outcome = service
                .upload_to_slot(&region, &vin, slot_type, index, uploads, &by)
                .await?;
            println!(
                "{} {} file(s), slot now holds {} ({:.2} MB)",
                "uploaded".green(),
                outcome.uploaded.len(),
                outcome.count,
                outcome.total_size_mb
            );
            if !outcome.verified {
                println!("{}", "verify flagged the slot dirty; reconcile will repair".yellow());
            }
        }
        Commands::Links { command } => match command {
            LinkCommands::List { region, vin } => {
                let links = service.list_links(&region, &vin).await?;
                if links.links.is_empty() {
                    println!("{}", "no links".dimmed());
                }
                for link in links.links {
                    println!("{}  {}  {}", link.id, link.title.bold(), link.url);
                }
            }
            LinkCommands::Add {
                region,
                vin,
                title,
                url,
                by,
            } => {
                let link = service.create_link(&region, &vin, &title, &url, &by).await?;
                println!("{} {}", "added".green(), link.id);
            }
            LinkCommands::Rm { region, vin, id } => {
                if service.delete_link(&region, &vin, id).await? {
                    println!("{}", "removed".green());
                } else {
                    println!("{}", "no such link".yellow());
                }
            }
        },
        Commands::Used {
            region,
            vin,
            slot_type,
            index,
            clear,
            by,
        } => {
            let slot_type = SlotType::parse(&slot_type)?;
            if clear {
                service.mark_slot_unused(&region, &vin, slot_type, index).await?;
                println!("{}", "cleared".green());
            } else {
                service
                    .mark_slot_used(&region, &vin, slot_type, index, &by)
                    .await?;
                println!("{}", "marked used".green());
            }
        }
        Commands::Publish {
            region,
            vin,
            slot_type,
            index,
            by,
        } => {
            let slot_type = SlotType::parse(&slot_type)?;
            let url = service
                .publish_slot(&region, &vin, slot_type, index, &by)
                .await?;
            println!("{}", url);
        }
        Commands::Reconcile { path, depth } => {
            let depth = ReconcileDepth::parse(&depth)?;
            let report = service.reconcile(&path, depth).await?;
            for action in &report.actions_performed {
                println!("{} {}", "action".blue(), action);
            }
            for file in &report.repaired_files {
                println!("{} {}", "repaired".green(), file);
            }
            for error in &report.errors {
                println!("{} {}", "error".red(), error);
            }
            if report.is_clean() && report.actions_performed.is_empty() {
                println!("{}", "clean".green());
            }
        }
        Commands::Normalize { path } => {
            println!("{}", photodisk_core::path::normalize(&path)?);
        }
    }
    Ok(())
}

fn content_type_for(name: &str) -> &'static str {
    match name.rsplit_once('.').map(|(_, ext)| ext.to_lowercase()) {
        Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
        Some(ext) if ext == "png" => "image/png",
        Some(ext) if ext == "webp" => "image/webp",
        Some(ext) if ext == "heic" => "image/heic",
        _ => "application/octet-stream",
    }
}
