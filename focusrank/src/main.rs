use clap::Parser;
use env_logger::Builder;
use env_logger::Env;
use log::{error, info, Level};
use std::io::Write;

use focusrank::color_utils::{colors, init_color_config, symbols};
use focusrank::config::{GlobalArgs, RankCommand, RankConfig};
use focusrank::focus_measure::Method;
use focusrank::rank_processing::run_rank_processing;

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Rank images by the sharpness of their detected regions
    Rank(RankCommand),

    /// List the available focus methods
    Methods,

    /// Show version information
    Version,
}

#[derive(Parser)]
#[command(name = "focusrank")]
#[command(about = "Rank images by how sharp their detected objects are")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

fn get_log_level_from_verbosity(
    verbosity: clap_verbosity_flag::Verbosity<clap_verbosity_flag::ErrorLevel>,
) -> log::LevelFilter {
    // -q is indistinguishable from the default in log_level_filter()
    if verbosity.is_silent() {
        return log::LevelFilter::Error;
    }
    match verbosity.log_level_filter() {
        log::LevelFilter::Off => log::LevelFilter::Off,
        log::LevelFilter::Error => log::LevelFilter::Warn, // default
        log::LevelFilter::Warn => log::LevelFilter::Info,  // -v
        log::LevelFilter::Info => log::LevelFilter::Debug, // -vv
        log::LevelFilter::Debug | log::LevelFilter::Trace => log::LevelFilter::Trace,
    }
}

fn init_logger(global: &GlobalArgs) {
    // Honour RUST_LOG only when neither -v nor -q was given
    let use_env = !global.verbosity.is_present() && std::env::var_os("RUST_LOG").is_some();

    let mut logger = if use_env {
        Builder::from_env(Env::default())
    } else {
        let mut b = Builder::new();
        b.filter_level(get_log_level_from_verbosity(global.verbosity.clone()));
        b
    };

    logger
        .format(|buf, record| {
            let level_str = match record.level() {
                Level::Error => colors::error_level("ERROR"),
                Level::Warn => colors::warning_level("WARN"),
                Level::Info => colors::info_level("INFO"),
                Level::Debug => colors::debug_level("DEBUG"),
                Level::Trace => colors::trace_level("TRACE"),
            };
            writeln!(buf, "[{}] {}", level_str, record.args())
        })
        .init();
}

fn main() {
    let cli = Cli::parse();

    init_color_config(cli.global.no_color);
    init_logger(&cli.global);

    match &cli.command {
        Some(Commands::Rank(rank_cmd)) => {
            let sources_desc = if rank_cmd.sources.len() == 1 {
                rank_cmd.sources[0].clone()
            } else {
                format!("{} inputs", rank_cmd.sources.len())
            };
            info!(
                "{}Ranking: {} | methods: {} | naming: {:?} | action: {} | device: {}",
                symbols::ranking_start(),
                sources_desc,
                rank_cmd.methods,
                rank_cmd.naming,
                rank_cmd.action,
                cli.global.device
            );

            let config = match RankConfig::from_args(cli.global.clone(), rank_cmd.clone()) {
                Ok(config) => config,
                Err(e) => {
                    error!("{}{e}", symbols::operation_failed());
                    std::process::exit(1);
                }
            };

            match run_rank_processing(&config) {
                Ok(Some(result)) if result.has_failures() => std::process::exit(1),
                Ok(_) => {}
                Err(e) => {
                    error!("{}Ranking failed: {e:#}", symbols::operation_failed());
                    std::process::exit(1);
                }
            }
        }
        Some(Commands::Methods) => {
            for method in Method::all() {
                println!("{:<10} {}", method.key(), method.description());
            }
        }
        Some(Commands::Version) => {
            println!("focusrank v{}", env!("CARGO_PKG_VERSION"));
            println!("Repository: {}", env!("CARGO_PKG_REPOSITORY"));
        }
        None => {
            use clap::CommandFactory;
            let mut cmd = Cli::command();
            if let Err(e) = cmd.print_help() {
                error!("{}{e}", symbols::operation_failed());
                std::process::exit(1);
            }
        }
    }
}
