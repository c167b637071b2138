use anyhow::bail;
use clap::Parser;
use mindeploy::command::{ShellOptions, Transfer};
use mindeploy::core::{Context, Host};
use mindeploy::session::{Session, SessionOptions};
use mindeploy::transport::ShellTransport;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Run commands on, or upload one file to, a single address without any definition files.
///
/// Example: mindeploy-remote example.com --commands whoami "ls /" --become --ssh-user master
#[derive(Debug, Parser)]
#[command(name = "mindeploy-remote", version)]
struct Cli {
    /// Hostname or IP address
    host: String,

    /// Commands to run remotely, joined with "&&"; if absent, transfer a file with rsync instead
    #[arg(long, num_args = 1.., conflicts_with_all = ["source", "destination"])]
    commands: Vec<String>,

    #[arg(long, default_value = "")]
    ssh_user: String,

    #[arg(long, env = "MINDEPLOY_SSH_OPTIONS", default_value = "", allow_hyphen_values = true)]
    ssh_options: String,

    #[arg(long, env = "MINDEPLOY_RSYNC_OPTIONS", default_value = "", allow_hyphen_values = true)]
    rsync_options: String,

    #[arg(long = "become")]
    elevate: bool,

    #[arg(long = "become-user", default_value = "")]
    elevate_user: String,

    /// Connection timeout in seconds; 0 means none
    #[arg(long, default_value_t = 0)]
    timeout: u64,

    /// Log assembled command lines
    #[arg(short, long)]
    verbose: bool,

    #[arg(short, long)]
    dry_run: bool,

    #[arg(long)]
    no_wrap_bash: bool,

    #[arg(long)]
    no_colors: bool,

    /// rsync source
    #[arg(long, requires = "destination")]
    source: Option<String>,

    /// rsync destination
    #[arg(long, requires = "source")]
    destination: Option<String>,

    /// Make rsync skip files that already exist on the host
    #[arg(long)]
    ignore_existing: bool,

    /// Print the full error chain on failure
    #[arg(long)]
    traceback: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(!cli.no_colors)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(output) => {
            print!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e:#}");
            if cli.traceback {
                eprintln!("{e:?}");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<String> {
    let host = Host {
        name: cli.host.clone(),
        address: cli.host.clone(),
        ssh_user: Some(cli.ssh_user.clone()).filter(|u| !u.is_empty()),
        context: Context::new(),
    };
    let options = SessionOptions {
        dry_run: cli.dry_run,
        ssh_options: cli.ssh_options.clone(),
        rsync_options: cli.rsync_options.clone(),
    };
    let shell = ShellOptions {
        elevate: cli.elevate,
        elevate_user: &cli.elevate_user,
        wrap_bash: !cli.no_wrap_bash,
        timeout: cli.timeout,
    };

    let mut transport = ShellTransport;
    let mut session = Session::new(&host, &mut transport, &options);

    if !cli.commands.is_empty() {
        return Ok(session.run_ssh(&cli.commands, shell)?);
    }

    let (Some(source), Some(destination)) = (&cli.source, &cli.destination) else {
        bail!("either --commands or both --source and --destination are required");
    };
    let transfer = Transfer {
        source,
        destination,
        ignore_existing: cli.ignore_existing,
        ..Transfer::default()
    };
    Ok(session.run_rsync(&transfer, shell)?)
}
