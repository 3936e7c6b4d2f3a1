use std::path::{Component, Path, PathBuf};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tsdeps::error::Error;
use tsdeps::query::{BazelQuery, IndexFile, QueryService};
use tsdeps::session::{RunOptions, Session};
use tsdeps::updater::{UpdateOptions, DEFAULT_RULES_BZL};
use tsdeps::workspace::Workspace;

#[derive(Parser)]
#[command(name = "tsdeps", version, about = "Keep Bazel BUILD files in sync with TypeScript imports")]
struct Cli {
    /// Packages to update (or source files with --files) [default: .]
    paths: Vec<PathBuf>,

    /// The single path is the project root; also derive ts_config and
    /// ts_development_sources
    #[arg(long)]
    root: bool,

    /// Update every directory under the given paths, deepest first
    #[arg(long)]
    recursive: bool,

    /// Treat paths as source files and update their directories
    #[arg(long)]
    files: bool,

    /// Remove declaration dependencies that no import uses
    #[arg(long)]
    remove_unused_declarations: bool,

    /// Maintain `// from //pkg:name` comments on import statements
    #[arg(long)]
    update_comments: bool,

    /// Update every package and report all failures at the end
    #[arg(long)]
    keep_going: bool,

    /// Answer lookups from a JSON index file instead of bazel query
    #[arg(long, value_name = "FILE")]
    index: Option<PathBuf>,

    /// Bazel binary used for queries
    #[arg(long, value_name = "BIN", env = "TSDEPS_BAZEL", default_value = "bazel")]
    bazel: PathBuf,

    /// .bzl file that new rule kinds are loaded from
    #[arg(long, value_name = "LABEL", default_value = DEFAULT_RULES_BZL)]
    rules_bzl: String,

    /// Log more (-v for progress, -vv for resolution details)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .init();
}

fn report(err: &Error) {
    match err {
        Error::Run(failures) => {
            for failure in failures {
                eprintln!("error: {failure}");
            }
            eprintln!("error: {err}");
        }
        _ => {
            eprintln!("error: {err}");
            if let Some(hint) = err.hint() {
                eprintln!("hint: {hint}");
            }
        }
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    let paths = if cli.paths.is_empty() {
        vec![PathBuf::from(".")]
    } else {
        cli.paths
    };
    let start = match paths[0].parent() {
        Some(parent) if cli.files && !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ if cli.files => PathBuf::from("."),
        _ => paths[0].clone(),
    };
    let workspace = Workspace::find(&start)?;

    let service: Box<dyn QueryService> = match &cli.index {
        Some(path) => Box::new(IndexFile::load(path)?),
        None => Box::new(BazelQuery::new(cli.bazel, workspace.clone())),
    };

    let options = RunOptions {
        paths,
        root: cli.root,
        recursive: cli.recursive,
        files: cli.files,
        keep_going: cli.keep_going,
        update: UpdateOptions {
            remove_unused_declarations: cli.remove_unused_declarations,
            update_comments: cli.update_comments,
            rules_bzl: cli.rules_bzl,
        },
    };
    let session = Session::open(workspace, service.as_ref(), options)?;
    session.run(|pkg, outcome| {
        if let Some(build_file) = &outcome.build_file {
            let name = build_file.file_name().map_or_else(|| Path::new("BUILD"), Path::new);
            println!("Wrote {}", written_path(&pkg.display, name).display());
        }
    })
}

/// `dir/name` with `.` components dropped, so `.` gives `BUILD` and `/`
/// gives `/BUILD`.
fn written_path(dir: &str, name: &Path) -> PathBuf {
    Path::new(dir)
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect::<PathBuf>()
        .join(name)
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        report(&e);
        std::process::exit(1);
    }
}
