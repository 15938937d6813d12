/* 📖 # What does the fileattr CLI do?

It is a thin shell around `AttributeService` for inspecting and changing file
attributes from a terminal or a script:

    fileattr stat PATH...
    fileattr set PATH [--read-only BOOL] [--executable BOOL] [--hidden BOOL]
                      [--archive BOOL] [--modified MILLIS]
    fileattr caps

`--json` switches every command to machine-readable output. Settings come from
`fileattr.toml` in the current directory unless `--config` names another file;
a missing file means defaults.

Exit codes:
- 0: Success
- 1: Error (invalid config, unreadable metadata, failed mutation)
*/

mod render;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use fileattr_base::tracing::init_tracing;
use fileattr_base::{FileattrResult, bail};
use fileattr_engine::{AttributeChange, AttributeService, load_config};
use serde::Serialize;
use tracing::debug;

use render::{CapsView, StatEntry, render_caps, render_delta, render_info};

const DEFAULT_CONFIG: &str = "fileattr.toml";

#[derive(Debug, Parser)]
#[command(name = "fileattr", version, about = "Inspect and change file attributes")]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the attributes of one or more paths
    Stat {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Change attributes of a path; unspecified attributes are kept
    Set {
        path: PathBuf,
        #[arg(long, value_name = "BOOL")]
        read_only: Option<bool>,
        #[arg(long, value_name = "BOOL")]
        executable: Option<bool>,
        #[arg(long, value_name = "BOOL")]
        hidden: Option<bool>,
        #[arg(long, value_name = "BOOL")]
        archive: Option<bool>,
        /// Last-modified time in milliseconds since the Unix epoch
        #[arg(long, value_name = "MILLIS", allow_negative_numbers = true)]
        modified: Option<i64>,
    },
    /// Show what this platform can report and change
    Caps,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        debug!("{:?}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> FileattrResult<()> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = load_config(&config_path)?;
    init_tracing(config.log_filter.as_deref())?;

    let service = AttributeService::for_host(&config.attributes)?;
    match cli.command {
        Command::Stat { paths } => stat(&service, &paths, cli.json),
        Command::Set {
            path,
            read_only,
            executable,
            hidden,
            archive,
            modified,
        } => {
            let change = AttributeChange {
                read_only,
                executable,
                hidden,
                archive,
            };
            set(&service, &path, &change, modified, cli.json)
        }
        Command::Caps => {
            let view = CapsView::new(service.capabilities(), service.umask());
            if cli.json {
                print_json(&view)
            } else {
                print!("{}", render_caps(&view));
                Ok(())
            }
        }
    }
}

fn stat(service: &AttributeService, paths: &[PathBuf], json: bool) -> FileattrResult<()> {
    let mut infos = Vec::with_capacity(paths.len());
    for path in paths {
        infos.push((path, service.fetch_info(path)?));
    }
    if json {
        let entries: Vec<StatEntry<'_>> = infos
            .iter()
            .map(|(path, info)| StatEntry {
                path: path.as_path(),
                info,
            })
            .collect();
        return print_json(&entries);
    }
    for (index, (path, info)) in infos.iter().enumerate() {
        if index > 0 {
            println!();
        }
        print!("{}", render_info(path, info));
    }
    Ok(())
}

fn set(
    service: &AttributeService,
    path: &Path,
    change: &AttributeChange,
    modified: Option<i64>,
    json: bool,
) -> FileattrResult<()> {
    if change.is_empty() && modified.is_none() {
        bail!("Nothing to change: pass at least one of --read-only, --executable, --hidden, --archive, --modified");
    }
    let delta = if change.is_empty() {
        None
    } else {
        Some(service.update(path, change)?)
    };
    if let Some(millis) = modified {
        service.set_last_modified(path, millis)?;
    }

    let info = service.fetch_info(path)?;
    if json {
        return print_json(&StatEntry { path, info: &info });
    }
    if let Some(delta) = &delta {
        print!("{}", render_delta(path, delta));
    }
    print!("{}", render_info(path, &info));
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> FileattrResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| fileattr_base::err!("Failed to serialize output: {}", e))?;
    println!("{}", text);
    Ok(())
}
