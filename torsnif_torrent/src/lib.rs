#![doc = include_str!("../README.md")]

mod client;
pub mod meta_info;
pub mod record;

pub use client::Client;
pub use meta_info::{InfoHash, Magnet, MetaInfo, MetaInfoError};
pub use record::{HumanSize, TorrentFile, TorrentRecord};

use anyhow::Context;
use clap::{Args, Subcommand, ValueEnum};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};
use torsnif_parsers::bencode::DecodeOptions;

/// Inspect single torrent files on the commandline. Run `torsnif torrent --help` to see what
/// options are available
#[derive(Debug, Args)]
#[command(flatten_help = true, subcommand_required = true)]
pub struct TorrentArgs {
    #[command(subcommand)]
    command: TorrentCommands,
}

#[derive(Clone, Subcommand, Debug)]
#[command(arg_required_else_help = true)]
enum TorrentCommands {
    /// Prints the information contained in the torrent file. The information is produced fully
    /// locally without sending any internet requests.
    Info {
        /// Torrent File to process
        #[arg(short, long, required = true)]
        file: PathBuf,

        /// Print the files contained in the torrent along with the general info.
        #[arg(long, required = false)]
        with_files: bool,

        /// Reject duplicate dictionary keys and trailing bytes.
        #[arg(long)]
        strict: bool,
    },

    /// Prints the catalog record that ingestion would store for the torrent file.
    Export {
        /// Torrent File to process
        #[arg(short, long, required = true)]
        file: PathBuf,

        /// Output format of the record.
        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,

        /// Write the record to this path instead of stdout.
        #[arg(short, long, conflicts_with = "save")]
        output: Option<PathBuf>,

        /// Write the record next to the torrent file, e.g. `a.torrent.json`.
        #[arg(long)]
        save: bool,

        /// Reject duplicate dictionary keys and trailing bytes.
        #[arg(long)]
        strict: bool,
    },

    /// Prints the magnet link of the torrent file.
    Magnet {
        /// Torrent File to process
        #[arg(short, long, required = true)]
        file: PathBuf,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum Format {
    /// Pretty printed json
    Json,

    /// Yaml
    Yaml,

    /// Pretty printed toml
    Toml,
}

impl Format {
    fn extension(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Yaml => "yaml",
            Format::Toml => "toml",
        }
    }

    fn render(self, record: &TorrentRecord) -> anyhow::Result<String> {
        Ok(match self {
            Format::Json => serde_json::to_string_pretty(record)?,
            Format::Yaml => serde_yaml::to_string(record)?,
            Format::Toml => toml::to_string_pretty(record)?,
        })
    }
}

/// Path of the sibling file `--save` writes to: the torrent path with the format extension
/// appended.
fn sibling_path(file: &Path, format: Format) -> PathBuf {
    let mut name = file.as_os_str().to_owned();
    name.push(".");
    name.push(format.extension());
    PathBuf::from(name)
}

impl TorrentArgs {
    pub fn run(self) -> anyhow::Result<()> {
        // Run the commands
        match self.command {
            TorrentCommands::Info {
                file,
                with_files,
                strict,
            } => {
                let torrent = Client::with_options(file, DecodeOptions { strict })?;

                torrent.print_torrent_info();
                if with_files {
                    torrent.print_torrent_files();
                }
            }
            TorrentCommands::Export {
                file,
                format,
                output,
                save,
                strict,
            } => {
                let torrent = Client::with_options(&file, DecodeOptions { strict })?;
                let rendered = format.render(&torrent.record())?;

                let destination = output.or_else(|| save.then(|| sibling_path(&file, format)));
                match destination {
                    Some(path) => {
                        let out = File::create(&path)
                            .with_context(|| format!("unable to create {}", path.display()))?;
                        let mut buf_writer = BufWriter::new(out);
                        buf_writer.write_all(rendered.as_bytes())?;
                        buf_writer.flush()?;
                    }
                    None => println!("{rendered}"),
                }
            }
            TorrentCommands::Magnet { file } => {
                let torrent = Client::new(file)?;
                println!("{}", torrent.meta_info().magnet().to_uri());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sibling_path_appends_extension() {
        assert_eq!(
            sibling_path(Path::new("/tmp/a.torrent"), Format::Json),
            PathBuf::from("/tmp/a.torrent.json")
        );
        assert_eq!(
            sibling_path(Path::new("b.torrent"), Format::Toml),
            PathBuf::from("b.torrent.toml")
        );
    }
}
