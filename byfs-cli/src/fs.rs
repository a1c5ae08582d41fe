//! Remote filesystem commands: ls, stat, mkdir, rmdir, rm, mv, cp, get, put.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use byfs::url::RemoteUrl;
use byfs::{Client, Stat};

use crate::{OutputFormat, human_size};

/// Buffer used for get/put; each fill is one READ or WRITE exchange.
const COPY_BUF: usize = 1 << 20;

/// Arguments for `byfs ls`.
#[derive(clap::Args)]
pub struct LsArgs {
    /// Remote directory.
    #[arg(default_value = "/")]
    pub path: String,

    /// Show type, size and modification time.
    #[arg(short = 'l', long)]
    pub long: bool,

    /// Output format.
    #[arg(long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for `byfs stat`.
#[derive(clap::Args)]
pub struct StatArgs {
    /// Remote path.
    pub path: String,

    /// Do not follow a final symlink.
    #[arg(long)]
    pub lstat: bool,

    /// Output format.
    #[arg(long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for `byfs mkdir`.
#[derive(clap::Args)]
pub struct MkdirArgs {
    /// Directories to create.
    #[arg(required = true, num_args = 1..)]
    pub paths: Vec<String>,

    /// Create missing parents.
    #[arg(short = 'p', long)]
    pub parents: bool,

    /// Permission bits, in octal.
    #[arg(short = 'm', long, default_value = "755", value_parser = parse_mode)]
    pub mode: u32,
}

/// Arguments for `byfs rmdir`.
#[derive(clap::Args)]
pub struct RmdirArgs {
    /// Directory to remove.
    pub path: String,

    /// Remove contents too.
    #[arg(short = 'r', long)]
    pub recursive: bool,
}

/// Arguments for `byfs rm`.
#[derive(clap::Args)]
pub struct RmArgs {
    /// Files to remove.
    #[arg(required = true, num_args = 1..)]
    pub paths: Vec<String>,
}

/// Source and destination for `byfs mv` and `byfs cp`.
#[derive(clap::Args)]
pub struct PairArgs {
    /// Remote source path.
    pub from: String,
    /// Remote destination path.
    pub to: String,
}

/// Arguments for `byfs get`.
#[derive(clap::Args)]
pub struct GetArgs {
    /// Remote file.
    pub remote: String,

    /// Local destination (`-` for stdout; default: the remote file name).
    pub local: Option<PathBuf>,
}

/// Arguments for `byfs put`.
#[derive(clap::Args)]
pub struct PutArgs {
    /// Local file.
    pub local: PathBuf,

    /// Remote destination.
    pub remote: String,
}

fn parse_mode(s: &str) -> Result<u32, String> {
    u32::from_str_radix(s.trim_start_matches("0o"), 8).map_err(|e| format!("invalid octal mode: {e}"))
}

/// Remote path named by `arg`, which may be a `byfs://` URL.
fn remote(arg: &str) -> String {
    RemoteUrl::parse(arg).map_or_else(|| arg.to_owned(), |u| u.path)
}

fn join(dir: &str, name: &str) -> String {
    format!("{}/{name}", dir.trim_end_matches('/'))
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').find(|s| !s.is_empty()).unwrap_or(path)
}

fn kind(st: &Stat) -> &'static str {
    if st.is_dir { "dir" } else { "file" }
}

pub fn ls(client: &Client, args: &LsArgs) -> Result<()> {
    let path = remote(&args.path);
    let names = client
        .read_dir(&path)
        .with_context(|| format!("listing {path}"))?;

    if !args.long {
        match args.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&names)?),
            OutputFormat::Table => names.iter().for_each(|n| println!("{n}")),
        }
        return Ok(());
    }

    let mut rows = Vec::with_capacity(names.len());
    for name in names {
        let st = client.lstat(&join(&path, &name))?;
        rows.push((name, st));
    }

    if matches!(args.format, OutputFormat::Json) {
        let list: Vec<_> = rows
            .iter()
            .map(|(name, st)| serde_json::json!({ "name": name, "stat": st }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }

    for (name, st) in &rows {
        match st {
            Some(st) => println!(
                "{:<5} {:>10} {:>12} {name}",
                kind(st),
                human_size(st.size.unsigned_abs()),
                st.mtime
            ),
            None => println!("{:<5} {:>10} {:>12} {name}", "?", "-", "-"),
        }
    }
    Ok(())
}

pub fn stat(client: &Client, args: &StatArgs) -> Result<()> {
    let path = remote(&args.path);
    let st = if args.lstat {
        client.lstat(&path)?
    } else {
        client.stat(&path)?
    };
    let st = st.ok_or_else(|| anyhow::anyhow!("{path}: no such file or directory"))?;

    if matches!(args.format, OutputFormat::Json) {
        let obj = serde_json::json!({ "path": path, "stat": st, "mode": format!("{:o}", st.mode()) });
        println!("{}", serde_json::to_string_pretty(&obj)?);
        return Ok(());
    }
    println!("path:  {path}");
    println!("type:  {}", kind(&st));
    println!("size:  {} ({})", st.size, human_size(st.size.unsigned_abs()));
    println!("mode:  {:o}", st.mode());
    println!("mtime: {}", st.mtime);
    Ok(())
}

pub fn mkdir(client: &Client, args: &MkdirArgs) -> Result<()> {
    for arg in &args.paths {
        let path = remote(arg);
        client
            .mkdir(&path, args.mode, args.parents)
            .with_context(|| format!("mkdir {path}"))?;
    }
    Ok(())
}

pub fn rmdir(client: &Client, args: &RmdirArgs) -> Result<()> {
    let path = remote(&args.path);
    client
        .rmdir(&path, args.recursive)
        .with_context(|| format!("rmdir {path}"))
}

pub fn rm(client: &Client, args: &RmArgs) -> Result<()> {
    for arg in &args.paths {
        let path = remote(arg);
        client.unlink(&path).with_context(|| format!("rm {path}"))?;
    }
    Ok(())
}

pub fn mv(client: &Client, args: &PairArgs) -> Result<()> {
    let (from, to) = (remote(&args.from), remote(&args.to));
    client
        .rename(&from, &to)
        .with_context(|| format!("mv {from} {to}"))
}

pub fn cp(client: &Client, args: &PairArgs) -> Result<()> {
    let (from, to) = (remote(&args.from), remote(&args.to));
    client
        .copy(&from, &to)
        .with_context(|| format!("cp {from} {to}"))
}

pub fn get(client: &Client, args: &GetArgs) -> Result<()> {
    let path = remote(&args.remote);
    let mut src = client
        .open_file(&path, "rb")
        .with_context(|| format!("opening {path}"))?;
    let mut reader = BufReader::with_capacity(COPY_BUF, &mut src);

    let bytes = match args.local.as_deref() {
        Some(p) if p == Path::new("-") => {
            let mut out = io::stdout().lock();
            let n = io::copy(&mut reader, &mut out)?;
            out.flush()?;
            n
        }
        local => {
            let dest = local.map_or_else(|| PathBuf::from(file_name(&path)), Path::to_path_buf);
            let mut out =
                File::create(&dest).with_context(|| format!("creating {}", dest.display()))?;
            io::copy(&mut reader, &mut out).with_context(|| format!("downloading {path}"))?
        }
    };
    drop(reader);
    src.close()?;
    tracing::info!(path = %path, bytes, "downloaded");
    Ok(())
}

pub fn put(client: &Client, args: &PutArgs) -> Result<()> {
    let path = remote(&args.remote);
    let mut input =
        File::open(&args.local).with_context(|| format!("opening {}", args.local.display()))?;
    let mut dst = client
        .open_file(&path, "wb")
        .with_context(|| format!("creating {path}"))?;

    let mut writer = BufWriter::with_capacity(COPY_BUF, &mut dst);
    let bytes = io::copy(&mut input, &mut writer).with_context(|| format!("uploading {path}"))?;
    writer.into_inner().map_err(io::IntoInnerError::into_error)?;
    dst.close()?;
    tracing::info!(path = %path, bytes, "uploaded");
    Ok(())
}
