mod telemetry;

use clap::{Parser, Subcommand};
use telemetry::{LogFormat, LoggingConfig};
use torsnif_ingest::IngestArgs;
use torsnif_parsers::ParserArgs;
use torsnif_torrent::TorrentArgs;

#[derive(Parser)]
#[command(author, version, about, long_about = None, styles=get_styles())] // Read from `Cargo.toml`
struct Cli {
    /// Log filter used when `RUST_LOG` is not set.
    #[arg(long, global = true, env = "TORSNIF_LOG", default_value = telemetry::DEFAULT_LOG_LEVEL)]
    log_level: String,

    /// Log output format. Logs are written to stderr.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a directory of torrent files into the catalog
    Ingest(IngestArgs),

    /// Inspect a single torrent file
    Torrent(TorrentArgs),

    /// Decode and encode bencode
    Parser(ParserArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    telemetry::init_logging(&LoggingConfig {
        level: &cli.log_level,
        format: cli.log_format,
    })?;

    match cli.commands {
        Commands::Ingest(ingest_args) => ingest_args.run().await,
        Commands::Torrent(torrent_args) => torrent_args.run(),
        Commands::Parser(parser_args) => parser_args.run(),
    }
}

fn get_styles() -> clap::builder::Styles {
    clap::builder::Styles::styled()
        .usage(
            anstyle::Style::new()
                .bold()
                .underline()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Blue))),
        )
        .header(
            anstyle::Style::new()
                .bold()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Blue))),
        )
        .literal(
            anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
        )
        .invalid(
            anstyle::Style::new()
                .bold()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
        )
        .error(
            anstyle::Style::new()
                .bold()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
        )
        .valid(
            anstyle::Style::new()
                .bold()
                .underline()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Cyan))),
        )
        .placeholder(
            anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
        )
}

#[test]
fn verify_cli() {
    use clap::CommandFactory;
    Cli::command().debug_assert()
}

#[test]
fn ingest_flags_parse() {
    let cli = Cli::try_parse_from([
        "torsnif",
        "--log-format",
        "json",
        "ingest",
        "--dir",
        "incoming",
        "-j",
        "8",
        "--memory-catalog",
    ])
    .unwrap();

    assert_eq!(cli.log_format, LogFormat::Json);
    assert!(matches!(cli.commands, Commands::Ingest(_)));
}
