#![doc = include_str!("../README.md")]

pub mod bencode;

use anyhow::Context;
use bencode::{DecodeOptions, Value};
use clap::{Args, Subcommand, ValueEnum};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
};

#[derive(Debug, Args)]
#[command(flatten_help = true, subcommand_required = true)]
pub struct ParserArgs {
    #[command(subcommand)]
    command: BencodeArgs,
}

#[derive(Debug, Subcommand)]
#[command(flatten_help = true, subcommand_required = true)]
enum BencodeArgs {
    /// A Bencode encoder and decoder
    Bencode {
        #[command(subcommand)]
        commands: BencodeCommands,
    },
}

#[derive(Clone, Subcommand, Debug)]
enum BencodeCommands {
    /// Decode the bencode into a given format
    Decode {
        /// Decode in the provided format.
        #[arg(long, value_enum, required = true)]
        format: Format,

        /// The Bencode file to decode
        #[arg(short, long, required = true)]
        file: PathBuf,

        /// Path to output the decoded data format in.
        #[arg(short, long, required = true)]
        output: PathBuf,

        /// Reject duplicate dictionary keys and trailing bytes.
        #[arg(long)]
        strict: bool,
    },

    /// Encode to canonical bencode from given format
    Encode {
        /// Format of the input file.
        #[arg(long, value_enum, required = true)]
        format: Format,

        /// File containing the format data
        #[arg(short, long, required = true)]
        file: PathBuf,

        /// Path to write the bencode to.
        #[arg(short, long, required = true)]
        output: PathBuf,
    },

    /// Try encoding or decoding a String of bencode for testing purposes. This simply prints out
    /// the output.
    Try {
        #[command(subcommand)]
        commands: TryCommands,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum Format {
    /// Convert to json format
    Json,

    /// Convert to yaml format
    Yaml,

    /// Convert to toml format
    Toml,
}

#[derive(Clone, Subcommand, Debug)]
enum TryCommands {
    /// Try encoding. The value is read as json, falling back to a plain string.
    Encode { value: String },

    /// Try decoding
    Decode { value: String },
}

impl ParserArgs {
    pub fn run(self) -> anyhow::Result<()> {
        // Run the commands
        match self.command {
            BencodeArgs::Bencode { commands } => match commands {
                BencodeCommands::Decode {
                    format,
                    file,
                    output,
                    strict,
                } => {
                    let bytes = std::fs::read(&file)
                        .with_context(|| format!("unable to read {}", file.display()))?;
                    let bencode = bencode::parse_with(&bytes, DecodeOptions { strict })?;

                    let file = File::create(&output)
                        .with_context(|| format!("unable to create {}", output.display()))?;
                    let mut buf_writer = BufWriter::new(file);
                    match format {
                        Format::Json => serde_json::to_writer_pretty(&mut buf_writer, &bencode)?,
                        Format::Yaml => serde_yaml::to_writer(&mut buf_writer, &bencode)?,
                        Format::Toml => {
                            let b = toml::to_string_pretty(&bencode)?;
                            buf_writer.write_all(b.as_bytes())?;
                        }
                    };
                    buf_writer.flush()?;
                }

                BencodeCommands::Encode {
                    format,
                    file,
                    output,
                } => {
                    let file_read = std::fs::read(&file)
                        .with_context(|| format!("unable to read {}", file.display()))?;
                    let value = foreign_to_bencode(format, &file_read)?;

                    let file_write = File::create(&output)
                        .with_context(|| format!("unable to create {}", output.display()))?;
                    let mut buf_writer = BufWriter::new(file_write);
                    buf_writer.write_all(&bencode::to_bytes(&value))?;
                    buf_writer.flush()?;
                }

                BencodeCommands::Try { commands } => match commands {
                    TryCommands::Encode { value } => {
                        let value = match serde_json::from_str::<serde_json::Value>(&value) {
                            Ok(json) => Value::try_from(json)?,
                            Err(_) => Value::from(value),
                        };
                        let encoded = bencode::to_bytes(&value);
                        println!("{}", String::from_utf8_lossy(&encoded))
                    }
                    TryCommands::Decode { value } => {
                        let decoded = bencode::parse(&value)?;
                        println!("{decoded:#}")
                    }
                },
            },
        }
        Ok(())
    }
}

fn foreign_to_bencode(format: Format, input: &[u8]) -> anyhow::Result<Value> {
    let json: serde_json::Value = match format {
        Format::Json => serde_json::from_slice(input)?,
        Format::Yaml => serde_yaml::from_slice(input)?,
        Format::Toml => toml::from_str(std::str::from_utf8(input)?)?,
    };

    Ok(Value::try_from(json)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_and_json_encode_identically() {
        let from_json = foreign_to_bencode(Format::Json, br#"{"b": 1, "a": ["x"]}"#).unwrap();
        let from_yaml = foreign_to_bencode(Format::Yaml, b"a:\n  - x\nb: 1\n").unwrap();

        assert_eq!(from_json, from_yaml);
        assert_eq!(bencode::to_bytes(&from_json), b"d1:al1:xe1:bi1ee");
    }

    #[test]
    fn toml_encodes_tables() {
        let value = foreign_to_bencode(Format::Toml, b"name = \"x\"\n[info]\nlength = 3\n").unwrap();
        assert_eq!(
            bencode::to_bytes(&value),
            b"d4:infod6:lengthi3ee4:name1:xe"
        );
    }
}
