//! Command-line front end (spec §6): reads one or more `.chtl` files,
//! runs them through [`chtl::compile`] and writes the requested
//! `<stem>.html` / `<stem>.css` / `<stem>.js` outputs atomically.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser as ClapParser;
use tracing_subscriber::EnvFilter;

use chtl::config::Config;
use chtl::diagnostics::Severity;

const MAX_SOURCE_BYTES: u64 = 16 * 1024 * 1024;

#[derive(ClapParser, Debug)]
#[command(name = "chtl", about = "Compiles CHTL sources to HTML, CSS and JavaScript")]
struct Cli {
    /// One or more `.chtl` source files.
    #[arg(required = true)]
    input: Vec<PathBuf>,

    /// Directory to write outputs into (defaults to each input's directory).
    #[arg(long)]
    out_dir: Option<PathBuf>,

    #[arg(long)]
    emit_html: bool,
    #[arg(long)]
    emit_css: bool,
    #[arg(long)]
    emit_js: bool,

    /// Additional directories searched for bare imports, in order.
    #[arg(long = "module-path")]
    module_path: Vec<PathBuf>,
    /// Additional directories searched for `chtl::`-prefixed imports.
    #[arg(long = "official-module-path")]
    official_module_path: Vec<PathBuf>,

    /// Wall-clock budget per file, in milliseconds.
    #[arg(long)]
    timeout: Option<u64>,

    #[arg(long)]
    debug: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    run(cli)
}

fn run(cli: Cli) -> ExitCode {
    let (emit_html, emit_css, emit_js) = if !cli.emit_html && !cli.emit_css && !cli.emit_js {
        (true, true, true)
    } else {
        (cli.emit_html, cli.emit_css, cli.emit_js)
    };

    let mut config = Config {
        debug_mode: cli.debug,
        timeout_ms: cli.timeout,
        module_paths: resolve_search_path(cli.module_path, "CHTL_MODULE_PATH"),
        official_module_paths: resolve_search_path(cli.official_module_path, "CHTL_OFFICIAL_MODULE_PATH"),
        ..Config::default()
    };
    config.index_initial_count = 0;

    let mut had_error = false;
    let mut had_timeout = false;

    for input in &cli.input {
        match compile_one(input, &cli.out_dir, &config, emit_html, emit_css, emit_js) {
            Ok(true) => {}
            Ok(false) => had_error = true,
            Err(CliError::Timeout) => had_timeout = true,
            Err(CliError::Io(err)) => {
                tracing::error!(file = %input.display(), error = %err, "I/O error");
                had_error = true;
            }
            Err(CliError::TooLarge) => {
                tracing::error!(file = %input.display(), "source exceeds 16 MiB limit");
                had_error = true;
            }
        }
    }

    if had_timeout {
        ExitCode::from(124)
    } else if had_error {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}

enum CliError {
    Io(std::io::Error),
    TooLarge,
    Timeout,
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io(err)
    }
}

/// Returns `true` on success (no fatal diagnostics), `false` if the
/// compilation produced at least one error diagnostic.
fn compile_one(
    input: &Path,
    out_dir: &Option<PathBuf>,
    config: &Config,
    emit_html: bool,
    emit_css: bool,
    emit_js: bool,
) -> Result<bool, CliError> {
    let metadata = fs::metadata(input)?;
    if metadata.len() > MAX_SOURCE_BYTES {
        return Err(CliError::TooLarge);
    }

    let raw = fs::read_to_string(input)?;
    let source = normalize_line_endings(&raw);
    let file_label = input.display().to_string();

    let (result, reporter) = chtl::compile(&source, &file_label, config);

    for (file, diagnostics) in reporter.grouped() {
        for diagnostic in diagnostics {
            match diagnostic.severity {
                Severity::Error => eprintln!("error: {diagnostic}"),
                Severity::Warning => eprintln!("warning: {diagnostic}"),
                Severity::Info => eprintln!("note: {diagnostic}"),
            }
        }
        let _ = file;
    }

    if reporter.diagnostics().iter().any(|d| d.kind == chtl::ErrorKind::Timeout) {
        return Err(CliError::Timeout);
    }
    if reporter.has_errors() {
        return Ok(false);
    }

    let stem = input.file_stem().unwrap_or_default();
    let dir = out_dir.clone().unwrap_or_else(|| input.parent().unwrap_or_else(|| Path::new(".")).to_path_buf());
    fs::create_dir_all(&dir)?;

    if emit_html {
        write_atomic(&dir.join(stem).with_extension("html"), &result.initial_html)?;
    }
    if emit_css {
        let css = result.css();
        if !css.is_empty() {
            write_atomic(&dir.join(stem).with_extension("css"), &css)?;
        }
    }
    if emit_js {
        let js = result.js();
        if !js.is_empty() {
            write_atomic(&dir.join(stem).with_extension("js"), &js)?;
        }
    }

    Ok(true)
}

fn normalize_line_endings(source: &str) -> String {
    source.replace("\r\n", "\n").replace('\r', "\n")
}

fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn resolve_search_path(flags: Vec<PathBuf>, env_var: &str) -> Vec<PathBuf> {
    let mut paths = flags;
    if let Ok(value) = std::env::var(env_var) {
        paths.extend(std::env::split_paths(&value));
    }
    paths
}
