use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::Parser;

use tarstream::{ArchiveOptions, Compression, CompressionLevel, TarStream};

/// Stream a tar archive of the given paths
#[derive(Debug, Parser)]
#[clap(name = "tarstream", version)]
pub struct App {
    /// Archive name, used to detect compression and in HTTP headers
    name: String,

    /// Files and directories to archive
    #[clap(required = true)]
    paths: Vec<PathBuf>,

    /// Write to this file instead of stdout
    #[clap(long, short)]
    output: Option<PathBuf>,

    /// TOML file with archive options
    #[clap(long)]
    config: Option<PathBuf>,

    /// Compression algorithm (gzip, bzip2, zstd)
    #[clap(long)]
    compress: Option<Compression>,

    /// Compression level, or "auto"
    #[clap(long)]
    level: Option<CompressionLevel>,

    /// Don't pick the compression from the archive name
    #[clap(long)]
    no_auto_compress: bool,

    /// Keep leading slashes in entry names
    #[clap(long)]
    absolute_paths: bool,

    /// Archive what symlinks point to instead of the links
    #[clap(long)]
    no_symlinks: bool,

    /// Store every hard link as a separate copy
    #[clap(long)]
    no_hardlinks: bool,

    /// Read buffer size in bytes
    #[clap(long)]
    buffer_size: Option<usize>,

    /// Emit HTTP response headers before the archive
    #[clap(long)]
    http_headers: bool,

    /// Directory inside the archive to put the paths under
    #[clap(long)]
    prefix: Option<String>,
}

impl App {
    fn options(&self) -> Result<ArchiveOptions> {
        let mut options = match &self.config {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Reading config {path:?}"))?;
                ArchiveOptions::from_toml(&content)
                    .with_context(|| format!("Parsing config {path:?}"))?
            }
            None => ArchiveOptions::default(),
        };

        if let Some(compress) = self.compress {
            options.compress = Some(compress);
        }
        if let Some(level) = self.level {
            options.compress_level = level;
        }
        if let Some(size) = self.buffer_size {
            options.buffer_size = size;
        }
        options.auto_compress &= !self.no_auto_compress;
        options.allow_absolute_path |= self.absolute_paths;
        options.preserve_symlinks &= !self.no_symlinks;
        options.preserve_hardlinks &= !self.no_hardlinks;
        options.emit_preamble |= self.http_headers;

        Ok(options)
    }

    /// Where `path` lands in the archive: its final component, under the
    /// prefix if one is given. `.` and `/` put their contents at the root.
    fn archive_root(&self, path: &Path) -> String {
        let base = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        match self.prefix.as_deref().map(|p| p.trim_end_matches('/')) {
            Some(prefix) if !prefix.is_empty() && !base.is_empty() => format!("{prefix}/{base}"),
            Some(prefix) if !prefix.is_empty() => prefix.to_string(),
            _ => base,
        }
    }
}

fn write_archive(app: &App, options: ArchiveOptions, output: impl Write) -> Result<u64> {
    let mut tar = TarStream::new(&app.name, options, output)?;
    for path in &app.paths {
        let root = app.archive_root(path);
        tar.add_tree(&root, path)
            .with_context(|| format!("Adding {path:?}"))?;
    }
    let total = tar.finish()?;
    tar.into_inner()?.flush()?;
    Ok(total)
}

fn main() -> Result<()> {
    env_logger::init();

    let app = App::parse();
    let options = app.options()?;

    let total = match &app.output {
        Some(path) => {
            let file =
                File::create(path).with_context(|| format!("Creating output {path:?}"))?;
            write_archive(&app, options, BufWriter::new(file))?
        }
        None => write_archive(&app, options, std::io::stdout().lock())?,
    };
    log::info!("wrote {total} bytes for {}", app.name);

    Ok(())
}
