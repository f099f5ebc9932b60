use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use miette::{bail, IntoDiagnostic, NamedSource, Result, WrapErr};
use tracing::{debug, Level};

use pasm::{expand_macros, object, AsmError, Context, Encoding};

/// pasm is a two-pass assembler for a small 16-instruction, 10-bit word CPU.
#[derive(Parser)]
#[command(version, args_conflicts_with_subcommands = true)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide `.as` files (or glob patterns) to assemble
    files: Vec<String>,

    /// Word encoding of the `.ob` file, overrides PASM_ENCODING
    #[arg(short, long, global = true)]
    encoding: Option<Encoding>,

    /// Print the memory image and symbol table after assembling
    #[arg(long, global = true)]
    dump: bool,

    /// Verbosity of the internal pass log, written to stderr
    #[arg(long, global = true, default_value_t = Level::WARN)]
    log_level: Level,
}

#[derive(Subcommand)]
enum Command {
    /// Expand macros, assemble and write `.am`, `.ob`, `.ent` and `.ext` files
    Assemble {
        /// `.as` files to assemble
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Check `.as` files without writing anything
    Check {
        /// Files to check
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Only expand macros and write the `.am` file
    Expand {
        /// Files to expand
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Remove artifacts for specified sources
    Clean {
        /// `.as` files to remove artifacts for
        #[arg(required = true)]
        files: Vec<String>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Assemble,
    Check,
    Expand,
    Clean,
}

const ARTIFACT_EXTENSIONS: [&str; 4] = ["am", "ob", "ent", "ext"];
const OBJECT_EXTENSIONS: [&str; 3] = ["ob", "ent", "ext"];

fn main() -> miette::Result<()> {
    use MsgColor::*;
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_writer(io::stderr)
        .init();
    pasm::env::init();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new() //
                .context_lines(pasm::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }))?;

    let (mode, patterns) = match args.command {
        Some(Command::Assemble { files }) => (Mode::Assemble, files),
        Some(Command::Check { files }) => (Mode::Check, files),
        Some(Command::Expand { files }) => (Mode::Expand, files),
        Some(Command::Clean { files }) => (Mode::Clean, files),
        None if args.files.is_empty() => {
            bail!("No input files given. Use `-h` or `--help` for usage instructions.")
        }
        None => (Mode::Assemble, args.files),
    };
    let encoding = args.encoding.unwrap_or_else(pasm::env::encoding);
    debug!(%encoding, "selected word encoding");

    let paths = input_paths(&patterns)?;
    for path in &paths {
        reject_artifact(path)?;
    }
    let mut failed = 0;
    for path in &paths {
        let ok = match mode {
            Mode::Clean => clean(path)?,
            _ => process(path, mode, encoding, args.dump)?,
        };
        if !ok {
            failed += 1;
        }
    }

    if failed > 0 {
        message(Red, "Failed", &format!("{failed} of {} file(s)", paths.len()));
        bail!("Assembly failed");
    }
    Ok(())
}

/// Resolve glob patterns. A pattern matching nothing is kept as a plain path.
fn input_paths(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for pattern in patterns {
        let matches = glob::glob(pattern)
            .into_diagnostic()
            .wrap_err_with(|| format!("Invalid file pattern `{pattern}`"))?
            .collect::<Result<Vec<_>, _>>()
            .into_diagnostic()?;
        if matches.is_empty() {
            paths.push(PathBuf::from(pattern));
        } else {
            paths.extend(matches);
        }
    }
    Ok(paths)
}

/// An artifact given as input would be overwritten or removed by its own run.
fn reject_artifact(path: &Path) -> Result<()> {
    let ext = path.extension().and_then(|ext| ext.to_str()).unwrap_or_default();
    if ARTIFACT_EXTENSIONS.contains(&ext) {
        bail!(
            "`{}` is an output file, pass the `.as` source instead",
            path.display()
        );
    }
    Ok(())
}

/// Run one source through the pipeline. `Ok(false)` when the source had errors.
fn process(path: &Path, mode: Mode, encoding: Encoding, dump: bool) -> Result<bool> {
    let verb = match mode {
        Mode::Check => "Checking",
        Mode::Expand => "Expanding",
        _ => "Assembling",
    };
    file_message(MsgColor::Green, verb, path);
    let src = fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("Could not read `{}`", path.display()))?;

    let expanded = match expand_macros(&src) {
        Ok(text) => text,
        Err(errors) => {
            report_all(&errors, path, &src);
            match mode {
                Mode::Assemble => remove_outputs(path, &ARTIFACT_EXTENSIONS)?,
                Mode::Expand => remove_outputs(path, &["am"])?,
                _ => {}
            }
            return Ok(false);
        }
    };
    let am_path = path.with_extension("am");
    if mode != Mode::Check {
        save(&am_path, &expanded)?;
    }
    if mode == Mode::Expand {
        return Ok(true);
    }

    // Later diagnostics point into the expanded source
    let mut ctx = Context::new();
    ctx.assemble(&expanded);
    report_all(&ctx.diagnostics, &am_path, &expanded);
    if dump {
        print!("{}", object::dump(&ctx));
    }

    let Some(artifacts) = object::serialize(&ctx, encoding) else {
        if mode == Mode::Assemble {
            remove_outputs(path, &OBJECT_EXTENSIONS)?;
        }
        return Ok(false);
    };
    if mode == Mode::Check {
        message(MsgColor::Green, "Success", "no errors found!");
        return Ok(true);
    }

    save(&path.with_extension("ob"), &artifacts.object)?;
    for (ext, contents) in [("ent", &artifacts.entries), ("ext", &artifacts.externals)] {
        let out = path.with_extension(ext);
        if contents.is_empty() {
            remove_stale(&out)?;
        } else {
            save(&out, contents)?;
        }
    }
    message(
        MsgColor::Green,
        "Finished",
        &format!(
            "{} code and {} data word(s)",
            ctx.memory.code().len(),
            ctx.memory.data().len()
        ),
    );
    Ok(true)
}

fn clean(path: &Path) -> Result<bool> {
    file_message(MsgColor::Green, "Cleaning", path);
    for ext in ARTIFACT_EXTENSIONS {
        let out = path.with_extension(ext);
        if out.exists() {
            fs::remove_file(&out)
                .into_diagnostic()
                .wrap_err_with(|| format!("Could not remove `{}`", out.display()))?;
            file_message(MsgColor::Cyan, "Removed", &out);
        }
    }
    Ok(true)
}

fn report_all(errors: &[AsmError], path: &Path, src: &str) {
    for err in errors {
        let report = err.report(NamedSource::new(path.display().to_string(), src.to_string()));
        eprintln!("{report:?}");
    }
    let count = errors.iter().filter(|err| err.is_error()).count();
    if count > 0 {
        file_message(MsgColor::Red, "Failed", path);
        message(MsgColor::Red, "Errors", &format!("{count} error(s) found"));
    }
}

fn save(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents)
        .into_diagnostic()
        .wrap_err_with(|| format!("Could not write `{}`", path.display()))?;
    file_message(MsgColor::Green, "Saved", path);
    Ok(())
}

/// Drop an artifact left over from an earlier run that this run does not produce.
fn remove_stale(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("Could not remove `{}`", path.display()))?;
    }
    Ok(())
}

/// A failed run leaves none of its outputs behind.
fn remove_outputs(path: &Path, extensions: &[&str]) -> Result<()> {
    for ext in extensions {
        remove_stale(&path.with_extension(ext))?;
    }
    Ok(())
}

enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &Path) {
    let right = format!("target {}", right.display());
    message(color, left, &right);
}

fn message(color: MsgColor, left: &str, right: &str) {
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}
