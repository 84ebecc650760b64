//! Demo binary exercising the overlay core end to end: mounts a filesystem
//! from a TOML config and runs one operation against it.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use vdtfs::attrs::{CreateDisposition, CreateOptions, DesiredAccess, FileAttributes, ShareAccess};
use vdtfs::config::OverlayConfig;
use vdtfs::event::{
    CleanupEvent, CloseEvent, CreateEvent, FindFilesEvent, ReadEvent, RenameEvent, SetDeleteOnCloseEvent, WriteEvent,
};
use vdtfs::mount::{Overlay, Service};

#[derive(Parser)]
#[command(name = "overlay-cli", about = "Drive a userspace overlay filesystem from the command line")]
struct Cli {
    /// Path to a TOML file matching the OverlayConfig surface.
    #[arg(long)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List a directory's entries.
    Ls { path: String },
    /// Print a file's contents to stdout.
    Cat { path: String },
    /// Write a string to a file, creating it if absent.
    Write { path: String, data: String },
    /// Remove a file or empty directory.
    Rm { path: String },
    /// Rename or move a file.
    Mv { from: String, to: String },
    /// Print a file or directory's metadata.
    Stat { path: String },
    /// Print free/total space on the mount's write target.
    Df,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let text = tokio::fs::read_to_string(&cli.config).await?;
    let config = OverlayConfig::from_toml_str(&text).map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let service = Service::new().map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let overlay = Overlay::mount(&service, config).await.map_err(|e| anyhow::anyhow!(e.to_string()))?;

    match cli.command {
        Command::Ls { path } => ls(&overlay, &path).await?,
        Command::Cat { path } => cat(&overlay, &path).await?,
        Command::Write { path, data } => write(&overlay, &path, data).await?,
        Command::Rm { path } => rm(&overlay, &path).await?,
        Command::Mv { from, to } => mv(&overlay, &from, &to).await?,
        Command::Stat { path } => stat(&overlay, &path).await?,
        Command::Df => df(&overlay).await?,
    }

    overlay.unmount(&service);
    Ok(())
}

async fn open_for(overlay: &Overlay, path: &str, is_directory_hint: bool) -> anyhow::Result<u64> {
    let evt = CreateEvent {
        file_name: path.to_string(),
        create_options: CreateOptions::empty(),
        create_disposition: CreateDisposition::OpenExisting,
        desired_access: DesiredAccess::GENERIC_READ | DesiredAccess::GENERIC_WRITE,
        share_access: ShareAccess::READ | ShareAccess::WRITE,
        file_attributes: FileAttributes::empty(),
        is_directory_hint,
    };
    let (ctx, _status) = overlay.dispatch_create(evt).await.map_err(|e| anyhow::anyhow!(e.to_string()))?;
    Ok(ctx.id())
}

async fn ls(overlay: &Overlay, path: &str) -> anyhow::Result<()> {
    let context_id = open_for(overlay, path, true).await?;
    let items = overlay
        .find_files(FindFilesEvent { context_id, pattern: None })
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    for item in items {
        let marker = if item.is_directory() { "/" } else { "" };
        println!("{}{}", item.name, marker);
    }
    Ok(())
}

async fn cat(overlay: &Overlay, path: &str) -> anyhow::Result<()> {
    let context_id = open_for(overlay, path, false).await?;
    let item = overlay.get_info(context_id).await.map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let length = item.file_size.unwrap_or(0).min(u32::MAX as u64) as u32;
    let data = overlay.read(ReadEvent { context_id, offset: 0, length }).await.map_err(|e| anyhow::anyhow!(e.to_string()))?;
    print!("{}", String::from_utf8_lossy(&data));
    Ok(())
}

async fn write(overlay: &Overlay, path: &str, data: String) -> anyhow::Result<()> {
    let evt = CreateEvent {
        file_name: path.to_string(),
        create_options: CreateOptions::empty(),
        create_disposition: CreateDisposition::OpenAlways,
        desired_access: DesiredAccess::GENERIC_WRITE,
        share_access: ShareAccess::READ,
        file_attributes: FileAttributes::NORMAL,
        is_directory_hint: false,
    };
    let (ctx, _status) = overlay.dispatch_create(evt).await.map_err(|e| anyhow::anyhow!(e.to_string()))?;
    overlay
        .write(WriteEvent { context_id: ctx.id(), offset: 0, data: data.into_bytes() })
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    Ok(())
}

async fn rm(overlay: &Overlay, path: &str) -> anyhow::Result<()> {
    let context_id = open_for(overlay, path, false).await?;
    overlay.can_delete(context_id).await.map_err(|e| anyhow::anyhow!(e.to_string()))?;
    overlay
        .set_delete_on_close(SetDeleteOnCloseEvent { context_id, delete_on_close: true })
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    overlay.cleanup(CleanupEvent { context_id }).await.map_err(|e| anyhow::anyhow!(e.to_string()))?;
    overlay.close(CloseEvent { context_id }).await.map_err(|e| anyhow::anyhow!(e.to_string()))?;
    Ok(())
}

async fn mv(overlay: &Overlay, from: &str, to: &str) -> anyhow::Result<()> {
    let context_id = open_for(overlay, from, false).await?;
    overlay
        .rename(RenameEvent { context_id, new_name: to.to_string(), replace_if_exists: false })
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    Ok(())
}

async fn stat(overlay: &Overlay, path: &str) -> anyhow::Result<()> {
    let context_id = open_for(overlay, path, false).await?;
    let item = overlay.get_info(context_id).await.map_err(|e| anyhow::anyhow!(e.to_string()))?;
    println!("name: {}", item.name);
    println!("size: {:?}", item.file_size);
    println!("attributes: {:?}", item.attributes);
    Ok(())
}

async fn df(overlay: &Overlay) -> anyhow::Result<()> {
    let info = overlay.get_volume_info().await.map_err(|e| anyhow::anyhow!(e.to_string()))?;
    println!("total: {} bytes", info.total_bytes);
    println!("free:  {} bytes", info.free_bytes);
    Ok(())
}
