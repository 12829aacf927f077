use crate::config::EngineConfig;
use crate::protocol::{Command, Event, Phase, Request, Response};
use crate::session::{FilterSummary, Session, StreamAppend};
use anyhow::Result;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use tracing::{error, info};

/// Owner side of the engine thread. All engine state lives on that thread;
/// this handle only sends requests.
pub struct EngineHandle {
    tx: Sender<Request>,
    next_id: u64,
    thread: Option<JoinHandle<()>>,
}

impl EngineHandle {
    pub fn spawn(config: EngineConfig) -> Result<(Self, Receiver<Response>)> {
        let (request_tx, request_rx) = mpsc::channel::<Request>();
        let (response_tx, response_rx) = mpsc::channel::<Response>();
        let thread = thread::Builder::new()
            .name("logsift-engine".to_string())
            .spawn(move || run(Session::new(config), request_rx, response_tx))?;
        Ok((
            Self {
                tx: request_tx,
                next_id: 1,
                thread: Some(thread),
            },
            response_rx,
        ))
    }

    /// Sends `command` under a fresh request id and returns it.
    pub fn request(&mut self, command: Command) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.send(Some(id), command);
        id
    }

    /// Sends `command` without an id; its responses are broadcasts.
    pub fn notify(&self, command: Command) {
        self.send(None, command);
    }

    fn send(&self, id: Option<u64>, command: Command) {
        if self.tx.send(Request { id, command }).is_err() {
            error!("engine thread is gone");
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        let _ = self.tx.send(Request {
            id: None,
            command: Command::Shutdown,
        });
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Handles requests strictly one after another until shutdown or until the
/// receiving side hangs up.
pub fn run(mut session: Session, rx: Receiver<Request>, tx: Sender<Response>) {
    for Request { id, command } in rx {
        if matches!(command, Command::Shutdown) {
            break;
        }
        if handle(&mut session, id, command, &tx).is_err() {
            break;
        }
    }
    info!("engine thread stopped");
}

type Disconnected = mpsc::SendError<Response>;

fn handle(
    session: &mut Session,
    id: Option<u64>,
    command: Command,
    tx: &Sender<Response>,
) -> Result<(), Disconnected> {
    let reply = |event: Event| tx.send(Response { id, event });

    match command {
        Command::OpenFile(path) => {
            let opened = session.open_file(&path, &mut progress(tx, Phase::Indexing));
            match opened {
                Ok(total_lines) => {
                    reply(Event::IndexComplete { total_lines })?;
                    refilter(session, tx, reply)?;
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "indexing failed");
                    reply(Event::Error(e.to_string()))?;
                }
            }
        }
        Command::OpenStream => {
            session.open_stream();
            reply(Event::IndexComplete { total_lines: 0 })?;
            refilter(session, tx, reply)?;
        }
        Command::AppendChunk(chunk) => reply(appended(session.append_chunk(&chunk)))?,
        Command::FinishStream => reply(appended(session.finish_stream()))?,
        Command::ApplyFilter(rule) => {
            let result = session.apply_filter(rule, &mut progress(tx, Phase::Filtering));
            reply(filtered(result))?;
        }
        Command::GetLines { start, count } => reply(Event::Lines(session.get_lines(start, count)))?,
        Command::GetRawLines { start, count } => {
            reply(Event::Lines(session.get_raw_lines(start, count)))?
        }
        Command::GetLinesByIndices(indices) => {
            reply(Event::IndexedLines(session.get_lines_by_indices(&indices)))?
        }
        Command::Find {
            keyword,
            start,
            direction,
        } => reply(Event::FindResult(session.find(&keyword, start, direction)))?,
        Command::ToggleBookmark(visual) => {
            reply(Event::BookmarksUpdated(session.toggle_bookmark(visual)))?
        }
        Command::GetFullText => match session.export_visible() {
            Ok(buffer) => reply(Event::FullText(buffer))?,
            Err(e) => reply(Event::Error(e.to_string()))?,
        },
        Command::Shutdown => {}
    }
    Ok(())
}

fn refilter(
    session: &mut Session,
    tx: &Sender<Response>,
    reply: impl Fn(Event) -> Result<(), Disconnected>,
) -> Result<(), Disconnected> {
    let result = session.refilter(&mut progress(tx, Phase::Filtering));
    reply(filtered(result))
}

fn filtered(result: crate::error::Result<FilterSummary>) -> Event {
    match result {
        Ok(summary) => Event::FilterComplete {
            match_count: summary.match_count,
            total_lines: summary.total_lines,
            bookmarks: summary.bookmarks,
        },
        Err(e) => {
            error!(error = %e, "filter failed");
            Event::Error(e.to_string())
        }
    }
}

fn appended(result: crate::error::Result<StreamAppend>) -> Event {
    match result {
        Ok(append) => Event::StreamAppended {
            match_count: append.match_count,
            total_lines: append.total_lines,
        },
        Err(e) => Event::Error(e.to_string()),
    }
}

/// Progress callback broadcasting a status event whenever the percentage
/// changes.
fn progress(tx: &Sender<Response>, phase: Phase) -> impl FnMut(u8) + '_ {
    let mut last = None;
    move |percent| {
        if last != Some(percent) {
            last = Some(percent);
            let _ = tx.send(Response {
                id: None,
                event: Event::Status { phase, percent },
            });
        }
    }
}
