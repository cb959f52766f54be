use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{ArgAction, Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use sddm::app::{App, UploadOptions};
use sddm::config::ConfigLoader;
use sddm::domain::{parse_flag, slash_path};
use sddm::error::SddmError;
use sddm::generator;
use sddm::git::SystemGitClient;
use sddm::output::{JsonOutput, LogSink, OutputMode, TextOutput};
use sddm::store::Store;

#[derive(Parser)]
#[command(name = "sddm")]
#[command(about = "Software-defined dataset manager: descriptor folders stored as git branches")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Working tree of the descriptor repository (defaults to the current directory)
    #[arg(long, global = true)]
    repo: Option<Utf8PathBuf>,

    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Store a descriptor folder on its own branch and push it")]
    Upload(UploadArgs),
    #[command(about = "Copy a descriptor folder or write its JSON manifest")]
    Download(DownloadArgs),
    #[command(
        about = "List available descriptors",
        visible_alias = "get_descriptors",
        alias = "list"
    )]
    GetDescriptors,
    #[command(about = "Merge the pipelines folder of descriptor branches into the trunk")]
    Merge(MergeArgs),
    #[command(about = "Create an example descriptor folder")]
    Generate(GenerateArgs),
}

#[derive(Args)]
struct UploadArgs {
    path: String,

    #[arg(long)]
    no_push: bool,
}

#[derive(Args)]
struct DownloadArgs {
    descriptor: String,

    out_dir: String,

    /// Write a JSON manifest instead of copying the folder (True|False)
    #[arg(value_parser = parse_flag, action = ArgAction::Set, default_value = "False")]
    as_json: bool,
}

#[derive(Args)]
struct MergeArgs {
    /// Branches to merge; the configured `merge_branches` when omitted
    branches: Vec<String>,

    #[arg(long)]
    push: bool,
}

#[derive(Args)]
struct GenerateArgs {
    folder: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    if let Commands::Generate(args) = &cli.command {
        return run_generate(args, output_mode);
    }

    let store = match &cli.repo {
        Some(repo) => Store::open(repo),
        None => Store::from_current_dir(),
    }
    .into_diagnostic()?;
    let config = ConfigLoader::resolve(cli.config.as_deref(), store.root().as_std_path())
        .into_diagnostic()?;
    let git = SystemGitClient::with_program(config.git.clone(), store.root());
    if git.version().is_none() {
        return Err(SddmError::MissingTool(config.git.display().to_string())).into_diagnostic();
    }
    let push_default = config.push;
    let app = App::new(store, git, config);

    match cli.command {
        Commands::Upload(args) => {
            let options = UploadOptions {
                push: push_default && !args.no_push,
            };
            match output_mode {
                OutputMode::NonInteractive => {
                    let result = app
                        .upload(&args.path, options, &JsonOutput)
                        .into_diagnostic()?;
                    JsonOutput::print_upload(&result).into_diagnostic()
                }
                OutputMode::Interactive => {
                    let result = app.upload(&args.path, options, &LogSink).into_diagnostic()?;
                    TextOutput::print_upload(&result);
                    Ok(())
                }
            }
        }
        Commands::Download(args) => match output_mode {
            OutputMode::NonInteractive => {
                let result = app
                    .download(&args.descriptor, &args.out_dir, args.as_json, &JsonOutput)
                    .into_diagnostic()?;
                JsonOutput::print_download(&result).into_diagnostic()
            }
            OutputMode::Interactive => {
                let result = app
                    .download(&args.descriptor, &args.out_dir, args.as_json, &LogSink)
                    .into_diagnostic()?;
                TextOutput::print_download(&result);
                Ok(())
            }
        },
        Commands::GetDescriptors => match output_mode {
            OutputMode::NonInteractive => {
                let result = app.descriptors(&JsonOutput).into_diagnostic()?;
                JsonOutput::print_list(&result).into_diagnostic()
            }
            OutputMode::Interactive => {
                let result = app.descriptors(&LogSink).into_diagnostic()?;
                TextOutput::print_list(&result);
                Ok(())
            }
        },
        Commands::Merge(args) => match output_mode {
            OutputMode::NonInteractive => {
                let result = app
                    .merge_branches(&args.branches, args.push, &JsonOutput)
                    .into_diagnostic()?;
                JsonOutput::print_merge(&result).into_diagnostic()
            }
            OutputMode::Interactive => {
                let result = app
                    .merge_branches(&args.branches, args.push, &LogSink)
                    .into_diagnostic()?;
                TextOutput::print_merge(&result);
                Ok(())
            }
        },
        Commands::Generate(args) => run_generate(&args, output_mode),
    }
}

fn run_generate(args: &GenerateArgs, output_mode: OutputMode) -> miette::Result<()> {
    let folder = slash_path(&args.folder).into_diagnostic()?;
    let result = generator::generate_example_descriptor(&folder).into_diagnostic()?;
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_generate(&result).into_diagnostic(),
        OutputMode::Interactive => {
            TextOutput::print_generate(&result);
            Ok(())
        }
    }
}
