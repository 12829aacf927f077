mod app;
mod input;
mod tui;

use anyhow::{bail, ensure, Context, Result};
use app::{App, DocumentSource};
use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use logsift::constants::POLL_INTERVAL_MS;
use logsift::feed::{start_feed, FeedEvent, LogFeed};
use logsift::protocol::{Command, Event as EngineEvent, Response};
use logsift::{Config, EngineHandle, FilterRule};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "logsift")]
#[command(about = "Large-log viewer with indexed, incremental filtering")]
struct Cli {
    #[arg(help = "Log file to view (reads from stdin if not provided)")]
    file: Option<PathBuf>,

    #[arg(short = 'l', long = "listen", help = "Listen on TCP port for incoming logs")]
    port: Option<u16>,

    #[arg(long, help = "Stream a file as it grows", conflicts_with_all = ["file", "port"])]
    follow: Option<PathBuf>,

    #[arg(short = 'i', long, default_value = "", help = "Include expression: a && b || c")]
    include: String,

    #[arg(short = 'x', long, default_value = "", help = "Exclude expression: x || y")]
    exclude: String,

    #[arg(short = 'c', long, help = "Match include, exclude and highlight terms case-sensitively")]
    case_sensitive: bool,

    #[arg(short = 'p', long, help = "Write the visible lines to stdout instead of opening the viewer")]
    print: bool,

    #[arg(long, help = "JSON file with engine and view settings")]
    config: Option<PathBuf>,

    #[arg(long, help = "Write diagnostics to this file (filtered by RUST_LOG)")]
    log_file: Option<PathBuf>,
}

fn init_logging(log_file: Option<&Path>, print: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if let Some(path) = log_file {
        let file = File::create(path)
            .with_context(|| format!("creating log file {}", path.display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    } else if print {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref(), cli.print)?;

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let feed = if let Some(port) = cli.port {
        Some(LogFeed::Network(port))
    } else if let Some(path) = &cli.follow {
        Some(LogFeed::Follow(path.clone()))
    } else if cli.file.is_none() {
        Some(LogFeed::Stdin)
    } else {
        None
    };
    let source = match (&cli.file, &feed) {
        (Some(path), None) => DocumentSource::File(path.clone()),
        _ => DocumentSource::Stream,
    };

    if cli.print {
        ensure!(
            cli.port.is_none() && cli.follow.is_none(),
            "--print needs a file or stdin, not a live feed"
        );
        let feed_rx = feed.map(start).transpose()?;
        return run_print(&config, source, feed_rx, &cli);
    }

    let feed_rx = feed.map(start).transpose()?;
    let mut app = App::new(
        &config,
        source,
        feed_rx,
        &cli.include,
        &cli.exclude,
        cli.case_sensitive,
    )?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
    }

    Ok(())
}

fn start(feed: LogFeed) -> Result<Receiver<FeedEvent>> {
    let (tx, rx) = mpsc::channel::<FeedEvent>();
    start_feed(feed, tx)?;
    Ok(rx)
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    loop {
        app.tick();
        terminal.draw(|f| tui::draw(f, app))?;

        if event::poll(Duration::from_millis(POLL_INTERVAL_MS))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    if !app.handle_key(key) {
                        return Ok(());
                    }
                }
                Event::Mouse(mouse) => app.handle_mouse(mouse),
                _ => {}
            }
        }
    }
}

/// Waits for the response to request `id` that `done` accepts. An error
/// event for that id fails the wait.
fn wait_for(
    rx: &Receiver<Response>,
    id: u64,
    done: impl Fn(&EngineEvent) -> bool,
) -> Result<EngineEvent> {
    loop {
        let response = rx.recv().context("engine stopped")?;
        if response.id != Some(id) {
            continue;
        }
        match response.event {
            EngineEvent::Error(message) => bail!(message),
            event if done(&event) => return Ok(event),
            _ => {}
        }
    }
}

fn is_filtered(event: &EngineEvent) -> bool {
    matches!(event, EngineEvent::FilterComplete { .. })
}

/// Headless mode: load, filter, and write the visible text to stdout.
fn run_print(
    config: &Config,
    source: DocumentSource,
    feed: Option<Receiver<FeedEvent>>,
    cli: &Cli,
) -> Result<()> {
    let (mut engine, rx) = EngineHandle::spawn(config.engine.clone())?;

    let open = match source {
        DocumentSource::File(path) => engine.request(Command::OpenFile(path)),
        DocumentSource::Stream => engine.request(Command::OpenStream),
    };
    wait_for(&rx, open, is_filtered)?;

    let rule = FilterRule::parse(&cli.include, &cli.exclude)?.with_case_sensitive(cli.case_sensitive);
    if !rule.is_unfiltered() {
        let filter = engine.request(Command::ApplyFilter(Some(rule)));
        wait_for(&rx, filter, is_filtered)?;
    }

    if let Some(feed) = feed {
        for event in feed {
            match event {
                FeedEvent::Chunk(chunk) => engine.notify(Command::AppendChunk(chunk)),
                FeedEvent::Error(e) => bail!("reading input: {}", e),
                FeedEvent::Closed => break,
                FeedEvent::Connected(_) | FeedEvent::Disconnected(_) => {}
            }
        }
        let finish = engine.request(Command::FinishStream);
        wait_for(&rx, finish, |e| matches!(e, EngineEvent::StreamAppended { .. }))?;
    }

    let text = engine.request(Command::GetFullText);
    let buffer = match wait_for(&rx, text, |e| matches!(e, EngineEvent::FullText(_)))? {
        EngineEvent::FullText(buffer) => buffer,
        other => bail!("unexpected engine response {:?}", other),
    };
    info!(bytes = buffer.len(), "writing visible text");

    let mut stdout = io::stdout().lock();
    stdout.write_all(&buffer)?;
    if !buffer.is_empty() && !buffer.ends_with(b"\n") {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;
    Ok(())
}
