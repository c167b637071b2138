use clap::Parser;
use mindeploy::config::Settings;
use mindeploy::core::Plan;
use mindeploy::dispatch::Dispatcher;
use mindeploy::report::ConsoleReporter;
use mindeploy::run_plan;
use mindeploy::run_plan::RunSummary;
use mindeploy::transport::ShellTransport;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Replay a deployment procedure against one or more hosts.
#[derive(Debug, Parser)]
#[command(name = "mindeploy", version)]
struct Cli {
    /// One or more deploy targets, or "*" for every enabled host
    #[arg(required = true)]
    hosts: Vec<String>,

    /// Only run actions carrying at least one of these tags
    #[arg(long, num_args = 0..)]
    tags: Vec<String>,

    /// Actions file; ".json", ".yaml" and ".yml" are tried if it has no extension
    #[arg(
        short = 'a',
        long = "actions-filename",
        env = "MINDEPLOY_ACTIONS_FILE",
        default_value = "deployment"
    )]
    actions_file: PathBuf,

    #[arg(long = "hosts-filename", env = "MINDEPLOY_HOSTS_FILE", default_value = "hosts.json")]
    hosts_file: PathBuf,

    #[arg(long = "vars-filename", env = "MINDEPLOY_VARS_FILE", default_value = "vars.json")]
    vars_file: PathBuf,

    /// Root directory for "copy" items
    #[arg(long = "files-foldername", env = "MINDEPLOY_FILES_DIR", default_value = "files")]
    files_dir: PathBuf,

    /// Extra options placed after "ssh"
    #[arg(long, env = "MINDEPLOY_SSH_OPTIONS", default_value = "", allow_hyphen_values = true)]
    ssh_options: String,

    /// Extra options placed before the rsync source argument
    #[arg(long, env = "MINDEPLOY_RSYNC_OPTIONS", default_value = "", allow_hyphen_values = true)]
    rsync_options: String,

    /// Log verbosity: 0, 1 or 2
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=2))]
    verbosity: u8,

    /// Build and log every command, but run none
    #[arg(short, long)]
    dry_run: bool,

    /// Very verbose output; implies verbosity 2
    #[arg(short = 'x', long)]
    extra_debug: bool,

    #[arg(long)]
    no_colors: bool,

    /// Print the full error chain of a failed load
    #[arg(long)]
    traceback: bool,
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings {
            hosts_file: self.hosts_file.clone(),
            vars_file: self.vars_file.clone(),
            actions_file: self.actions_file.clone(),
            files_dir: self.files_dir.clone(),
            dry_run: self.dry_run,
            extra_debug: self.extra_debug,
            colorize: !self.no_colors,
            ssh_options: self.ssh_options.clone(),
            rsync_options: self.rsync_options.clone(),
        }
    }

    fn log_level(&self) -> &'static str {
        match (self.extra_debug, self.verbosity) {
            (true, _) | (_, 2..=u8::MAX) => "debug",
            (_, 1) => "info",
            _ => "warn",
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over -v.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(!cli.no_colors)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if cli.no_colors {
        colored::control::set_override(false);
    }

    match run(&cli) {
        Ok(summary) if summary.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            if cli.traceback {
                eprintln!("{e:?}");
            }
            ExitCode::from(2)
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<RunSummary> {
    let settings = cli.settings();
    let plan = Plan::load(&settings, &cli.hosts, &cli.tags)?;
    let mut dispatcher = Dispatcher::new(
        ShellTransport,
        ConsoleReporter::new(settings.colorize),
        settings.dispatch_options(),
    );
    Ok(run_plan(&plan, &mut dispatcher))
}
