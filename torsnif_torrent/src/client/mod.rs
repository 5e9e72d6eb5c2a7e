use anyhow::{bail, Context, Result};
use colored::Colorize;
use human_bytes::human_bytes;

use std::{fmt::Display, path::Path};

use torsnif_parsers::bencode::DecodeOptions;

use crate::{MetaInfo, TorrentRecord};

/// A single torrent file loaded from disk, for inspection on the command line.
pub struct Client {
    meta_info: MetaInfo,
    file_name: String,
}

impl Client {
    pub fn new<P>(file: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        Self::with_options(file, DecodeOptions::default())
    }

    pub fn with_options<P>(file: P, options: DecodeOptions) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = file.as_ref();
        let Some(file_name) = path.file_name() else {
            bail!("File not found")
        };
        let file_name = file_name.to_string_lossy().to_string();

        let bytes =
            std::fs::read(path).with_context(|| format!("Unable to read {}", path.display()))?;

        let meta_info = MetaInfo::from_bytes_with(&bytes, options)
            .with_context(|| format!("{} is not a valid torrent file", path.display()))?;

        Ok(Client {
            meta_info,
            file_name,
        })
    }

    pub fn meta_info(&self) -> &MetaInfo {
        &self.meta_info
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Builds the catalog record for this torrent.
    pub fn record(&self) -> TorrentRecord {
        TorrentRecord::new(&self.meta_info)
    }

    pub fn print_torrent_info(&self) {
        println!("\"{}\" ", self.file_name.magenta().bold().underline(),);

        println!(
            "\n{} Info hash: {}",
            "==>".green().bold(),
            self.meta_info.info_hash().to_string().bold().cyan()
        );

        // Length and pieces details
        let npieces = self.meta_info.number_of_pieces();
        let plen = self.meta_info.piece_length();
        let size = self.meta_info.total_length();

        println!(
            "\n{} Number of pieces: {} each {} in size. Total torrent size: {}",
            "==>".green().bold(),
            npieces.to_string().bold().cyan(),
            human_bytes(plen as f64).bold().cyan(),
            human_bytes(size as f64).bold().cyan()
        );

        // created on
        print_info("Created on", self.meta_info.creation_date());

        // created by
        print_info("Created by", self.meta_info.created_by());

        // comment
        print_info("Comment", self.meta_info.comment());

        // Encoded in
        print_info("Encoded in", self.meta_info.encoding());

        let trackers = self.meta_info.trackers();
        print_info(
            "Trackers",
            (!trackers.is_empty()).then(|| trackers.join(", ")),
        );
    }

    pub fn print_torrent_files(&self) {
        println!("\n{} Files:", "==>".green().bold(),);
        for (path, length) in self.meta_info.files().layout(self.meta_info.name()) {
            println!(
                "{:4} - {} ({})",
                "",
                path.bold(),
                human_bytes(length as f64).cyan()
            );
        }
    }
}

fn print_info<T: Display>(header: &str, value: Option<T>) {
    if let Some(value) = value {
        println!(
            "\n{} {header}: {}",
            "==>".green().bold(),
            value.to_string().bold().cyan()
        );
    } else {
        println!(
            "\n{} {header}: {}",
            "==>".green().bold(),
            "__not present__".italic().dimmed()
        );
    }
}
