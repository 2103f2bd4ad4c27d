//! Remote workspace CLI
//!
//! Entry point for the `remote` command-line tool.

use std::env;
use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use remote_workspace::error::{run_exit_code, sync_exit_code};
use remote_workspace::logging::init_tracing;
use remote_workspace::multi::{combined_exit_code, push_to_all_hosts, run_on_all_hosts};
use remote_workspace::orchestrator::{execute_only, RunOutcome};
use remote_workspace::sync::SyncSpec;
use remote_workspace::transport::{PortForward, ShellRequest, SyncOptions, SyncRequest};
use remote_workspace::{
    CancelToken, Direction, ExecutionOrchestrator, ExplainReport, FileSync, HostSelector,
    RemoteCommand, RemoteError, RemoteShell, RsyncFileSync, RunOptions, Session, SignalHandler,
    SshShell,
};

#[derive(Parser)]
#[command(name = "remote")]
#[command(about = "Sync a workspace to a remote host and run commands there", version)]
struct Cli {
    /// Show what rsync and ssh are doing
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct HostArgs {
    /// Host to use, by 1-based index or label (default: the default host)
    #[arg(long = "host", short = 'H')]
    selector: Option<HostSelector>,
}

impl HostArgs {
    fn selector(&self) -> HostSelector {
        self.selector.clone().unwrap_or_default()
    }
}

#[derive(Args)]
struct ExecArgs {
    /// Sync and print the command instead of running it
    #[arg(long, short = 'n')]
    dry_run: bool,

    /// Delete remote files that are excluded or missing locally
    #[arg(long, short = 'm')]
    mirror: bool,

    /// Forward a remote port to localhost, as REMOTE[:LOCAL]
    #[arg(long = "port", short = 'p')]
    ports: Vec<PortForward>,

    /// Extra environment variable for the remote command, as KEY=VALUE
    #[arg(long = "env", short = 'e', value_parser = parse_env)]
    env: Vec<(String, String)>,
}

impl ExecArgs {
    fn options(&self, verbose: bool) -> RunOptions {
        RunOptions {
            dry_run: self.dry_run,
            mirror: self.mirror,
            verbose,
            forwards: self.ports.clone(),
            ..RunOptions::default()
        }
    }
}

#[derive(Args)]
struct SyncArgs {
    #[command(flatten)]
    host: HostArgs,

    /// List what would be transferred without transferring
    #[arg(long, short = 'n')]
    dry_run: bool,

    /// Delete remote files that are excluded or missing locally (push only)
    #[arg(long, short = 'm')]
    mirror: bool,
}

impl SyncArgs {
    fn options(&self, direction: Direction, verbose: bool) -> SyncOptions {
        SyncOptions {
            dry_run: self.dry_run,
            mirror: self.mirror && direction == Direction::Push,
            verbose,
            timeout: None,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Push the workspace, run a command on the host and pull results back
    Run {
        #[command(flatten)]
        host: HostArgs,

        #[command(flatten)]
        exec: ExecArgs,

        /// The command to run
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        cmd: Vec<String>,
    },

    /// Run a command on every configured host in parallel
    All {
        #[command(flatten)]
        exec: ExecArgs,

        /// The command to run
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        cmd: Vec<String>,
    },

    /// Run a command on the host without pushing or pulling
    Quick {
        #[command(flatten)]
        host: HostArgs,

        #[command(flatten)]
        exec: ExecArgs,

        /// The command to run
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        cmd: Vec<String>,
    },

    /// Push the workspace to the host
    Push {
        #[command(flatten)]
        sync: SyncArgs,

        /// Push to every configured host, one after another
        #[arg(long, conflicts_with = "selector")]
        all: bool,
    },

    /// Pull the workspace back from the host
    Pull {
        #[command(flatten)]
        sync: SyncArgs,

        /// Pull only this file or directory, relative to the current directory
        path: Option<PathBuf>,
    },

    /// Print the selected host
    Host {
        #[command(flatten)]
        host: HostArgs,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show configuration, sync rules and the remote script without running
    Explain {
        #[command(flatten)]
        host: HostArgs,

        /// Also ask rsync which files a push would change
        #[arg(long)]
        diff: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,

        /// Command to render
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        cmd: Vec<String>,
    },

    /// Push, open a login shell in the remote workspace, pull on exit
    Shell {
        #[command(flatten)]
        host: HostArgs,

        #[command(flatten)]
        exec: ExecArgs,
    },

    /// Delete the workspace copy on the host
    Delete {
        #[command(flatten)]
        host: HostArgs,

        /// Print the command instead of running it
        #[arg(long, short = 'n')]
        dry_run: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("remote: {}", e);
            e.exit_code()
        }
    };
    process::exit(code);
}

fn run(cli: Cli) -> Result<i32, RemoteError> {
    let cwd = env::current_dir()?;
    let home = env::var_os("HOME")
        .map(PathBuf::from)
        .ok_or_else(|| RemoteError::Usage("HOME is not set".to_string()))?;
    let session = Session::discover(&cwd, &home)?;

    let signals = SignalHandler::new();
    if let Err(e) = signals.install() {
        tracing::warn!(error = %e, "failed to install interrupt handler");
    }
    let cancel = signals.token();
    let sync = RsyncFileSync::new();
    let shell = SshShell::new();
    let verbose = cli.verbose;

    match cli.command {
        Commands::Run { host, exec, cmd } => {
            let command = RemoteCommand::new(cmd).with_envs(exec.env.clone());
            run_single(&session, &host, command, exec.options(verbose), &sync, &shell, cancel)
        }
        Commands::All { exec, cmd } => {
            let command = RemoteCommand::new(cmd).with_envs(exec.env.clone());
            let plans = session.run_plans_for_all(&command, &exec.options(verbose))?;
            let runs = run_on_all_hosts(&plans, &sync, &shell, &cancel);
            for run in &runs {
                match &run.result {
                    Ok(outcome) => warn_on_pull_error(outcome),
                    Err(e) => eprintln!("remote: {}: {}", run.host, e),
                }
            }
            Ok(combined_exit_code(&runs, run_exit_code))
        }
        Commands::Quick { host, exec, cmd } => {
            let command = RemoteCommand::new(cmd).with_envs(exec.env.clone());
            let (_, spec) = session.select_host(&host.selector())?;
            let plan = session.run_plan(spec, command, exec.options(verbose))?;
            Ok(execute_only(&plan, &shell, &cancel)?.exit_code)
        }
        Commands::Push { sync: args, all: true } => {
            let specs = session.push_specs_for_all()?;
            let options = args.options(Direction::Push, verbose);
            let pushes = push_to_all_hosts(&specs, options, &sync, &cancel);
            let mut code = 0;
            for push in &pushes {
                match &push.result {
                    Ok(outcome) if args.dry_run => print_changed(&outcome.changed),
                    Ok(_) => {}
                    Err(e) => {
                        eprintln!("remote: {}: {}", push.host, e);
                        if code == 0 {
                            code = sync_exit_code(e);
                        }
                    }
                }
            }
            Ok(code)
        }
        Commands::Push { sync: args, all: false } => {
            let (_, host) = session.select_host(&args.host.selector())?;
            let spec = session.plan_sync(host, Direction::Push)?;
            transfer(spec, &args, verbose, &sync, &cancel)
        }
        Commands::Pull { sync: args, path } => {
            let (_, host) = session.select_host(&args.host.selector())?;
            let spec = match path {
                Some(path) => session.plan_subpath_pull(host, &path)?,
                None => session.plan_sync(host, Direction::Pull)?,
            };
            transfer(spec, &args, verbose, &sync, &cancel)
        }
        Commands::Host { host, json } => {
            let (index, spec) = session.select_host(&host.selector())?;
            if json {
                let value = serde_json::json!({
                    "index": index + 1,
                    "host": spec,
                    "remote_directory": session.remote_directory(spec),
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("{}", spec.host);
            }
            Ok(0)
        }
        Commands::Explain {
            host,
            diff,
            json,
            cmd,
        } => {
            let command = (!cmd.is_empty()).then(|| RemoteCommand::new(cmd));
            let mut report = ExplainReport::build(&session, &host.selector(), command.as_ref())?;
            if diff {
                report = report.with_dry_run(&sync, &cancel);
            }
            if json {
                println!("{}", report.to_json()?);
            } else {
                print!("{}", report.to_human());
            }
            Ok(0)
        }
        Commands::Shell { host, exec } => {
            let command = RemoteCommand::login_shell().with_envs(exec.env.clone());
            let options = RunOptions {
                interactive: true,
                ..exec.options(verbose)
            };
            run_single(&session, &host, command, options, &sync, &shell, cancel)
        }
        Commands::Delete { host, dry_run } => {
            let (_, spec) = session.select_host(&host.selector())?;
            let command = session.delete_command(spec);
            if dry_run {
                println!("{}", command.command_line());
                return Ok(0);
            }
            let request = ShellRequest::new(spec.clone(), command.render("", false))
                .with_verbose(verbose);
            let outcome = shell.execute(&request, &cancel)?;
            if outcome.exit_code == 0 && !outcome.cancelled {
                println!("{}", session.deleted_message(spec));
            }
            Ok(outcome.exit_code)
        }
    }
}

fn run_single(
    session: &Session,
    host: &HostArgs,
    command: RemoteCommand,
    options: RunOptions,
    sync: &dyn FileSync,
    shell: &dyn RemoteShell,
    cancel: CancelToken,
) -> Result<i32, RemoteError> {
    let (_, spec) = session.select_host(&host.selector())?;
    let plan = session.run_plan(spec, command, options)?;
    let outcome = ExecutionOrchestrator::new(sync, shell, cancel).run(&plan)?;
    warn_on_pull_error(&outcome);
    Ok(outcome.exit_code)
}

fn transfer(
    spec: SyncSpec,
    args: &SyncArgs,
    verbose: bool,
    sync: &dyn FileSync,
    cancel: &CancelToken,
) -> Result<i32, RemoteError> {
    let options = args.options(spec.direction, verbose);
    let outcome = sync.sync(&SyncRequest::new(spec, options), cancel)?;
    if args.dry_run {
        print_changed(&outcome.changed);
    }
    Ok(0)
}

fn print_changed(paths: &[String]) {
    for path in paths {
        println!("{}", path);
    }
}

fn warn_on_pull_error(outcome: &RunOutcome) {
    if let Some(error) = &outcome.pull_error {
        eprintln!(
            "remote: warning: results from {} were not pulled back: {}",
            outcome.host, error
        );
    }
}

fn parse_env(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}
