use std::fs;
use std::io::{self, BufRead, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use clap::{Args, Parser, Subcommand};
use fusion_contracts::artifact::GenerationResult;
use fusion_contracts::chat::{parse_intent, Intent, SESSION_HELP_COMMANDS};
use fusion_contracts::events::EventWriter;
use fusion_contracts::settings::{Mode, Style, StyleStrength};
use fusion_engine::{
    client_for, new_session_id, BackendConfig, ClientConfig, DryrunImageModel, GeminiImageModel,
    GenerationBackend, Outcome, Session, Slot, SourceImage,
};
use serde_json::json;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Parser)]
#[command(name = "fusion", version, about = "Merge or restyle photos with an image model")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Combine two images into one.
    Merge(MergeArgs),
    /// Restyle a single image.
    Edit(EditArgs),
    /// Interactive session with history and result reuse.
    Session(SessionArgs),
    /// Serve the generation backend over HTTP.
    Serve(ServeArgs),
}

#[derive(Debug, Args)]
struct ClientArgs {
    /// Backend URL; without it the backend runs in-process.
    #[arg(long)]
    endpoint: Option<String>,
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Use the offline image model instead of Gemini.
    #[arg(long)]
    dryrun: bool,
    #[arg(long)]
    image_model: Option<String>,
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct PromptArgs {
    #[arg(long, default_value = "photorealistic")]
    style: Style,
    #[arg(long, default_value_t = 80, value_parser = clap::value_parser!(i64).range(1..=100))]
    strength: i64,
    #[arg(long, default_value = "")]
    prompt: String,
    #[arg(long, default_value = "")]
    negative: String,
}

#[derive(Debug, Parser)]
struct MergeArgs {
    #[arg(long)]
    image1: PathBuf,
    #[arg(long)]
    image2: PathBuf,
    #[arg(long)]
    out: PathBuf,
    #[command(flatten)]
    prompt: PromptArgs,
    #[command(flatten)]
    client: ClientArgs,
}

#[derive(Debug, Parser)]
struct EditArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    out: PathBuf,
    #[command(flatten)]
    prompt: PromptArgs,
    #[command(flatten)]
    client: ClientArgs,
}

#[derive(Debug, Parser)]
struct SessionArgs {
    #[arg(long, default_value = "merge")]
    mode: Mode,
    #[command(flatten)]
    client: ClientArgs,
}

#[derive(Debug, Parser)]
struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1:8888")]
    addr: SocketAddr,
    #[arg(long)]
    dryrun: bool,
    #[arg(long)]
    image_model: Option<String>,
    #[arg(long)]
    events: Option<PathBuf>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("fusion error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Merge(args) => run_one_shot(
            Mode::Merge,
            &args.image1,
            Some(&args.image2),
            &args.out,
            &args.prompt,
            &args.client,
        ),
        Command::Edit(args) => run_one_shot(
            Mode::Edit,
            &args.image,
            None,
            &args.out,
            &args.prompt,
            &args.client,
        ),
        Command::Session(args) => run_session(args),
        Command::Serve(args) => {
            run_serve(args)?;
            Ok(0)
        }
    }
}

fn build_backend(
    dryrun: bool,
    image_model: Option<&str>,
    events: EventWriter,
) -> GenerationBackend {
    let backend = if dryrun {
        GenerationBackend::new(DryrunImageModel::default())
    } else {
        let mut config = BackendConfig::from_env();
        if let Some(model) = image_model.map(str::trim).filter(|value| !value.is_empty()) {
            config.model = model.to_string();
        }
        GenerationBackend::new(GeminiImageModel::new(config))
    };
    backend.with_events(events)
}

fn event_writer(path: Option<&Path>) -> EventWriter {
    let session_id = new_session_id();
    match path {
        Some(path) => EventWriter::new(path, session_id),
        None => EventWriter::disabled(session_id),
    }
}

fn build_session(args: &ClientArgs) -> Session {
    let config = ClientConfig::from_env()
        .with_endpoint(args.endpoint.clone())
        .with_timeout_secs(args.timeout_secs);
    let events = event_writer(args.events.as_deref());
    let client = client_for(&config, || {
        build_backend(args.dryrun, args.image_model.as_deref(), events.clone())
    });
    Session::new(client, events).with_timeout(config.timeout)
}

fn run_one_shot(
    mode: Mode,
    image1: &Path,
    image2: Option<&Path>,
    out: &Path,
    prompt: &PromptArgs,
    client: &ClientArgs,
) -> Result<i32> {
    let mut session = build_session(client);
    session.set_mode(mode);
    session.set_style(prompt.style);
    session.set_strength(StyleStrength::new(prompt.strength)?);
    session.set_prompt(prompt.prompt.clone());
    session.set_negative_prompt(prompt.negative.clone());
    session.select_image(Slot::First, Some(SourceImage::from_path(image1)))?;
    if let Some(image2) = image2 {
        session.select_image(Slot::Second, Some(SourceImage::from_path(image2)))?;
    }

    if let Err(err) = session.submit() {
        eprintln!("{}", describe_session_error(&err));
        return Ok(1);
    }
    match session.wait()? {
        Outcome::Succeeded(result) => {
            let written = save_result(result, out)?;
            println!("Saved {}", written.display());
            Ok(0)
        }
        Outcome::Failed(err) => {
            eprintln!("{}", err.user_message());
            Ok(1)
        }
        other => bail!("generation ended without a result ({})", other.label()),
    }
}

fn describe_session_error(err: &fusion_engine::SessionError) -> String {
    match err {
        fusion_engine::SessionError::Generation(inner) => inner.user_message(),
        other => other.to_string(),
    }
}

/// Writes the decoded image. A path without an extension gets one from the
/// result's MIME type.
fn save_result(result: &GenerationResult, out: &Path) -> Result<PathBuf> {
    let decoded = result.decode()?;
    let path = if out.extension().is_some() {
        out.to_path_buf()
    } else {
        out.with_extension(result.file_extension())
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&path, &decoded.bytes)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

fn spawn_stdin_reader() -> Result<mpsc::Receiver<String>> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("fusion-stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
        .context("stdin reader thread spawn failed")?;
    Ok(rx)
}

fn show_prompt() -> Result<()> {
    print!("> ");
    io::stdout().flush()?;
    Ok(())
}

fn run_session(args: SessionArgs) -> Result<i32> {
    let mut session = build_session(&args.client);
    session.set_mode(args.mode);
    let lines = spawn_stdin_reader()?;

    println!("Fusion session started ({} mode). Type /help for commands.", session.mode());
    show_prompt()?;

    loop {
        match lines.recv_timeout(POLL_INTERVAL) {
            Ok(line) => {
                if !handle_line(&mut session, &line)? {
                    break;
                }
                if !session.is_submitting() {
                    show_prompt()?;
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                if session.is_submitting() {
                    session.wait()?;
                    report_outcome(&session);
                }
                break;
            }
        }
        if session.poll() {
            report_outcome(&session);
            show_prompt()?;
        }
    }
    Ok(0)
}

fn report_outcome(session: &Session) {
    match session.outcome() {
        Outcome::Succeeded(result) => println!(
            "Generated {} (history {}/{}). /save <path> or /use to refine it.",
            result,
            session.history().len(),
            session.history().capacity()
        ),
        Outcome::Failed(err) => println!("Generation failed: {}", err.user_message()),
        Outcome::Idle => println!("Idle."),
        Outcome::Submitting { id } => println!("Submission {id} in flight."),
    }
}

fn print_status(session: &Session) {
    println!("Mode: {}", session.mode());
    println!("Style: {} ({})", session.style(), session.style().descriptor());
    println!("Strength: {}", session.strength());
    for slot in [Slot::First, Slot::Second] {
        match session.source(slot) {
            Some(source) => println!("Image {}: {}", slot.number(), source.preview()),
            None => println!("Image {}: (none)", slot.number()),
        }
    }
    if !session.prompt().trim().is_empty() {
        println!("Prompt: {}", session.prompt());
    }
    if !session.negative_prompt().trim().is_empty() {
        println!("Negative: {}", session.negative_prompt());
    }
    println!(
        "Outcome: {} | history {}/{}",
        session.outcome().label(),
        session.history().len(),
        session.history().capacity()
    );
    println!("Timeout: {}s", session.timeout().as_secs());
}

fn path_arg(intent: &Intent, command: &str) -> Option<PathBuf> {
    match intent.arg_str("path").filter(|value| !value.is_empty()) {
        Some(path) => Some(PathBuf::from(path)),
        None => {
            println!("/{command} requires a path");
            None
        }
    }
}

fn select_from_disk(session: &mut Session, slot: Slot, path: PathBuf) {
    if !path.exists() {
        println!("Image not found: {}", path.display());
        return;
    }
    let source = SourceImage::from_path(path);
    let preview = source.preview().to_string();
    match session.select_image(slot, Some(source)) {
        Ok(()) => println!("Image {} set to {preview}", slot.number()),
        Err(err) => println!("{err}"),
    }
}

fn submit_and_report(session: &mut Session) {
    match session.submit() {
        Ok(id) => println!("Generating (submission {id}). /cancel to abandon."),
        Err(err) => println!("{}", describe_session_error(&err)),
    }
}

/// Applies one line of input. Returns false when the session should end.
fn handle_line(session: &mut Session, line: &str) -> Result<bool> {
    let intent = parse_intent(line);
    match intent.action.as_str() {
        "noop" => {}
        "help" => println!("Commands: {}", SESSION_HELP_COMMANDS.join(" ")),
        "quit" => return Ok(false),
        "set_mode" => match intent.arg_str("mode").unwrap_or_default().parse::<Mode>() {
            Ok(mode) => {
                let had_second = session.source(Slot::Second).is_some();
                session.set_mode(mode);
                if had_second && session.source(Slot::Second).is_none() {
                    println!("Mode set to {mode}; image 2 cleared.");
                } else {
                    println!("Mode set to {mode}");
                }
            }
            Err(err) => println!("{err}"),
        },
        "set_style" => match intent.arg_str("style").unwrap_or_default().parse::<Style>() {
            Ok(style) => {
                session.set_style(style);
                println!("Style set to {style}");
            }
            Err(err) => println!("{err}"),
        },
        "list_styles" => {
            for style in Style::ALL {
                println!("  {:<16} {}", style.id(), style.descriptor());
            }
        }
        "set_strength" => {
            let raw = intent.arg_str("strength").unwrap_or_default().trim();
            match raw.parse::<i64>().map_err(|_| raw.to_string()) {
                Ok(value) => match StyleStrength::new(value) {
                    Ok(strength) => {
                        session.set_strength(strength);
                        println!("Strength set to {strength}");
                    }
                    Err(err) => println!("{err}"),
                },
                Err(raw) => println!("/strength expects a number from 1 to 100, got {raw:?}"),
            }
        }
        "set_prompt" => {
            session.set_prompt(intent.arg_str("text").unwrap_or_default());
            println!("Prompt updated.");
        }
        "set_negative_prompt" => {
            session.set_negative_prompt(intent.arg_str("text").unwrap_or_default());
            println!("Negative prompt updated.");
        }
        "select_image1" => {
            if let Some(path) = path_arg(&intent, "image1") {
                select_from_disk(session, Slot::First, path);
            }
        }
        "select_image2" => {
            if let Some(path) = path_arg(&intent, "image2") {
                select_from_disk(session, Slot::Second, path);
            }
        }
        "clear_image1" => {
            session.select_image(Slot::First, None)?;
            println!("Image 1 cleared.");
        }
        "clear_image2" => {
            session.select_image(Slot::Second, None)?;
            println!("Image 2 cleared.");
        }
        "generate" => {
            if let Some(prompt) = intent.prompt.as_deref() {
                session.set_prompt(prompt);
            }
            submit_and_report(session);
        }
        "cancel" => match session.cancel() {
            Ok(id) => println!("Submission {id} abandoned."),
            Err(err) => println!("{err}"),
        },
        "use_result" => match session.use_result_as_source() {
            Ok(()) => {
                if let Some(source) = session.source(Slot::First) {
                    println!("Result moved to image 1: {}", source.preview());
                }
            }
            Err(err) => println!("{err}"),
        },
        "list_history" => {
            if session.history().is_empty() {
                println!("History is empty.");
            }
            for (index, result) in session.history().iter().enumerate() {
                println!("  [{index}] {result}");
            }
        }
        "select_history" => {
            let index = intent
                .command_args
                .get("index")
                .and_then(serde_json::Value::as_u64);
            match index {
                Some(index) => match session.select_from_history(index as usize) {
                    Ok(result) => println!("Showing [{index}] {result}"),
                    Err(err) => println!("{err}"),
                },
                None => println!("/show expects a history index"),
            }
        }
        "save_result" => {
            let Some(path) = path_arg(&intent, "save") else {
                return Ok(true);
            };
            match session.outcome().result() {
                Some(result) => match save_result(result, &path) {
                    Ok(written) => println!("Saved {}", written.display()),
                    Err(err) => println!("Save failed: {err:#}"),
                },
                None => println!("There is no generated image to save."),
            }
        }
        "status" => print_status(session),
        "unknown" => println!(
            "Unknown command /{}. Type /help for commands.",
            intent.arg_str("command").unwrap_or_default()
        ),
        other => println!("Unhandled action {other}"),
    }
    Ok(true)
}

async fn generate_route(
    State(backend): State<Arc<GenerationBackend>>,
    method: Method,
    body: String,
) -> Response {
    let method = method.as_str().to_string();
    let reply = tokio::task::spawn_blocking(move || backend.handle(&method, &body)).await;
    match reply {
        Ok(reply) => {
            let status =
                StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, [(CONTENT_TYPE, "application/json")], reply.body).into_response()
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(CONTENT_TYPE, "application/json")],
            json!({ "error": format!("backend task failed: {err}") }).to_string(),
        )
            .into_response(),
    }
}

fn router(backend: Arc<GenerationBackend>) -> Router {
    Router::new()
        .route("/api/generate", any(generate_route))
        .with_state(backend)
}

fn run_serve(args: ServeArgs) -> Result<()> {
    let events = event_writer(args.events.as_deref());
    let backend = Arc::new(build_backend(
        args.dryrun,
        args.image_model.as_deref(),
        events,
    ));
    let model = backend.model_name().to_string();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("tokio runtime build failed")?;
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(args.addr)
            .await
            .with_context(|| format!("failed to bind {}", args.addr))?;
        eprintln!(
            "fusion backend ({model}) listening on http://{}/api/generate",
            listener.local_addr()?
        );
        axum::serve(listener, router(backend))
            .await
            .context("backend server stopped")
    })
}
