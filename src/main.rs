//! candiview - renders the same model file from several candidate directories side by side
//! under one shared camera and light rig, and exports the composite.

mod app;
mod assets;
mod capture;
mod events;
mod render;
mod scene;

use app::{App, AppError, InputError};
use scene::serialization::{load_session_from_file, save_session_to_file, SerializationError};
use scene::Session;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

const USAGE: &str = "\
Usage: candiview [OPTIONS]

Options:
  --session FILE        Session document to start from
  --work-dir DIR        Directory whose sub-directories are the candidates
  --file NAME           Model file to show in every candidate
  --candidates A,B      Candidate directories to show, in order (default: all)
  --pattern GLOB        Filter for the available model files, e.g. \"*.stl\"
  --focus N             Focused view index (-1 for none)
  --output NAME         Composite file name (default: the session's filename template)
  --focus-output NAME   Also write the focused view's crop
  --batch               Export every available file in turn
  --interact SCRIPT     Camera gestures, e.g. \"orbit:0.3,0.1;zoom:1.5;pan:10,0;reset\"
  --frames N            Extra frames to render before exporting
  --save-session FILE   Write the final session, including camera updates
  -h, --help            Print this help";

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid arguments: {0}")]
    Args(#[from] pico_args::Error),
    #[error("unexpected arguments: {0:?}")]
    Unexpected(Vec<String>),
    #[error("invalid --interact script: {0}")]
    Script(#[from] InputError),
    #[error(transparent)]
    Session(#[from] SerializationError),
    #[error(transparent)]
    App(#[from] AppError),
    #[error("no model file to export")]
    NothingSelected,
}

#[derive(Debug, Default)]
struct Options {
    session: Option<PathBuf>,
    work_dir: Option<PathBuf>,
    file: Option<String>,
    candidates: Option<Vec<String>>,
    pattern: Option<String>,
    focus: Option<i64>,
    output: Option<String>,
    focus_output: Option<String>,
    batch: bool,
    interact: Option<String>,
    frames: u64,
    save_session: Option<PathBuf>,
}

fn parse_options(mut args: pico_args::Arguments) -> Result<Option<Options>, CliError> {
    if args.contains(["-h", "--help"]) {
        return Ok(None);
    }
    let options = Options {
        session: args.opt_value_from_str("--session")?,
        work_dir: args.opt_value_from_str("--work-dir")?,
        file: args.opt_value_from_str("--file")?,
        candidates: args.opt_value_from_fn("--candidates", parse_list)?,
        pattern: args.opt_value_from_str("--pattern")?,
        focus: args.opt_value_from_str("--focus")?,
        output: args.opt_value_from_str("--output")?,
        focus_output: args.opt_value_from_str("--focus-output")?,
        batch: args.contains("--batch"),
        interact: args.opt_value_from_str("--interact")?,
        frames: args.opt_value_from_str("--frames")?.unwrap_or(0),
        save_session: args.opt_value_from_str("--save-session")?,
    };
    let rest = args.finish();
    if !rest.is_empty() {
        return Err(CliError::Unexpected(
            rest.into_iter()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect(),
        ));
    }
    Ok(Some(options))
}

fn parse_list(value: &str) -> Result<Vec<String>, std::convert::Infallible> {
    Ok(value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect())
}

fn run(options: Options) -> Result<(), CliError> {
    let mut session = match options.session.as_deref() {
        Some(path) => {
            let session = load_session_from_file(path)?;
            log::info!("Session loaded from {:?}", path);
            session
        }
        None => Session::new(),
    };
    if let Some(work_dir) = options.work_dir {
        session.files.work_dir = work_dir;
    }
    if options.file.is_some() {
        session.files.selected_file = options.file;
    }
    let interactions = match options.interact.as_deref() {
        Some(script) => app::parse_script(script)?,
        None => Vec::new(),
    };

    let mut app = App::new(session)?;
    let now = Instant::now();
    if let Some(pattern) = options.pattern {
        app.set_file_pattern(pattern, now);
    }
    if let Some(candidates) = options.candidates {
        app.select_candidates(candidates, now);
    }
    if let Some(focus) = options.focus {
        app.set_focus(focus);
    }
    app.settle()?;
    log::debug!("Focused view: {}", app.effective_focus());
    for interaction in interactions {
        app.apply_interaction(interaction);
        app.step()?;
    }
    for _ in 0..options.frames {
        app.step()?;
    }
    for (index, err) in app.view_errors() {
        log::error!("View {} is empty: {}", index, err);
    }

    if options.batch {
        let files = app.session().files.available_files.clone();
        let written = app.export_batch(&files)?;
        log::info!("Batch wrote {} files", written.len());
    } else {
        let filename = match options.output {
            Some(name) => name,
            None => {
                let Some(file) = app.session().files.selected_file.clone() else {
                    return Err(CliError::NothingSelected);
                };
                app.output_name(&file)
            }
        };
        let path = app.export(&filename)?;
        log::info!("Composite written to {}", path.display());
    }

    if let Some(name) = options.focus_output.as_deref() {
        let path = app.export_focus(name).wait().map_err(AppError::from)?;
        log::info!("Focused view written to {}", path.display());
    }

    for (name, err) in app.take_capture_failures() {
        log::warn!("Capture {} failed: {}", name, err);
    }
    log::debug!("Rendered {} frames", app.frames_rendered());
    let session = app.finish();
    if let Some(path) = options.save_session.as_deref() {
        save_session_to_file(&session, path)?;
        log::info!("Session saved to {:?}", path);
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let options = match parse_options(pico_args::Arguments::from_env()) {
        Ok(Some(options)) => options,
        Ok(None) => {
            println!("{}", USAGE);
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            log::error!("{}", err);
            eprintln!("{}", USAGE);
            return ExitCode::from(2);
        }
    };

    match run(options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
