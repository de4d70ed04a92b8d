use std::io::{self, BufWriter, Read, Write};
use std::process::ExitCode;

use tracing::Level;

use preproc::cli::{self, Input};
use preproc::config::EngineConfig;
use preproc::loader::fs_loader;
use preproc::script::{DirectiveError, Interpreter, LocatedLine};

/// Stack for the engine thread.  Calls, blocks and expressions recurse; the
/// engine's own limits keep the worst case well inside this.
const ENGINE_STACK_SIZE: usize = 64 * 1024 * 1024;

fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("preproc: {e}");
            eprintln!("{}", cli::USAGE);
            return ExitCode::from(2);
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::WARN })
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    // ── Engine config ─────────────────────────────────────────────────────────
    let config = match cli::find_config(args.config.as_deref()) {
        None => EngineConfig::default(),
        Some(path) => match EngineConfig::load_file(&path) {
            Ok((config, errors)) => {
                for e in errors {
                    tracing::warn!(file = %path.display(), "config {e}");
                }
                config
            }
            Err(e) => {
                eprintln!("preproc: cannot read config {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
    };
    tracing::debug!(?config, "engine config");

    // ── Input ─────────────────────────────────────────────────────────────────
    let source = match &args.input {
        Input::Stdin => {
            let mut s = String::new();
            io::stdin().read_to_string(&mut s).map(|_| s)
        }
        Input::File(path) => std::fs::read_to_string(path),
    };
    let source = match source {
        Ok(s) => s,
        Err(e) => {
            eprintln!("preproc: {}: {e}", args.input.display_name());
            return ExitCode::FAILURE;
        }
    };

    // ── Run ───────────────────────────────────────────────────────────────────
    let mut interp = Interpreter::new(config);
    interp.set_loader(fs_loader(args.input.base_dir()));
    for (name, value) in args.defines {
        interp.set_variable(name, value);
    }

    let lines = match run_on_engine_thread(interp, source) {
        Ok(Ok(lines)) => lines,
        Ok(Err(e)) => {
            report(&args.input, &e);
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("preproc: {e}");
            return ExitCode::FAILURE;
        }
    };

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for line in &lines {
        if let Err(e) = writeln!(out, "{}", line.text) {
            eprintln!("preproc: write error: {e}");
            return ExitCode::FAILURE;
        }
    }
    if let Err(e) = out.flush() {
        eprintln!("preproc: write error: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn run_on_engine_thread(
    mut interp: Interpreter,
    source: String,
) -> io::Result<Result<Vec<LocatedLine>, DirectiveError>> {
    let worker = std::thread::Builder::new()
        .name("preproc-engine".into())
        .stack_size(ENGINE_STACK_SIZE)
        .spawn(move || interp.run_text(&source))?;
    worker
        .join()
        .map_err(|_| io::Error::new(io::ErrorKind::Other, "engine thread panicked"))
}

fn report(input: &Input, e: &DirectiveError) {
    let name = input.display_name();
    if e.location.is_known() {
        eprintln!(
            "preproc: {name}:{}:{}: {}: {}",
            e.location.line,
            e.location.column,
            e.code(),
            e.message
        );
    } else {
        eprintln!("preproc: {name}: {}: {}", e.code(), e.message);
    }
}
