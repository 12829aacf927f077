use anyhow::Result;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

use crate::constants::FEED_READ_SIZE;

/// Live text sources for stream mode.
pub enum LogFeed {
    Stdin,
    Follow(PathBuf),
    Network(u16),
}

pub enum FeedEvent {
    /// Raw text; not aligned to line boundaries.
    Chunk(String),
    Error(String),
    Connected(String),
    Disconnected(String),
    /// The feed ended; any unterminated tail is final.
    Closed,
}

pub fn start_feed(feed: LogFeed, tx: Sender<FeedEvent>) -> Result<()> {
    match feed {
        LogFeed::Stdin => start_stdin_feed(tx),
        LogFeed::Follow(path) => start_follow_feed(path, tx),
        LogFeed::Network(port) => start_network_feed(port, tx),
    }
}

/// Decodes UTF-8 across read boundaries, holding back a split code point
/// until the rest of it arrives.
#[derive(Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                    }
                }
            }
        }
        out
    }

    fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }
}

/// Reads `reader` until EOF, forwarding decoded chunks. Returns `false` when
/// the receiver is gone.
fn pump<R: Read>(mut reader: R, decoder: &mut Utf8Decoder, tx: &Sender<FeedEvent>) -> io::Result<bool> {
    let mut buf = vec![0u8; FEED_READ_SIZE];
    loop {
        let read = match reader.read(&mut buf) {
            Ok(0) => return Ok(true),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        let text = decoder.decode(&buf[..read]);
        if !text.is_empty() && tx.send(FeedEvent::Chunk(text)).is_err() {
            return Ok(false);
        }
    }
}

fn start_stdin_feed(tx: Sender<FeedEvent>) -> Result<()> {
    thread::spawn(move || {
        let mut decoder = Utf8Decoder::default();
        match pump(io::stdin().lock(), &mut decoder, &tx) {
            Ok(true) => {
                let tail = decoder.finish();
                if !tail.is_empty() {
                    let _ = tx.send(FeedEvent::Chunk(tail));
                }
                let _ = tx.send(FeedEvent::Closed);
            }
            Ok(false) => {}
            Err(e) => {
                let _ = tx.send(FeedEvent::Error(e.to_string()));
            }
        }
    });
    Ok(())
}

fn start_follow_feed(path: PathBuf, tx: Sender<FeedEvent>) -> Result<()> {
    thread::spawn(move || {
        if let Err(e) = run_follow_feed(path, tx.clone()) {
            let _ = tx.send(FeedEvent::Error(e.to_string()));
        }
    });
    Ok(())
}

fn run_follow_feed(path: PathBuf, tx: Sender<FeedEvent>) -> Result<()> {
    let mut decoder = Utf8Decoder::default();
    let mut pos = 0u64;

    let (notify_tx, notify_rx): (Sender<notify::Result<Event>>, Receiver<notify::Result<Event>>) =
        mpsc::channel();
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = notify_tx.send(res);
        },
        notify::Config::default().with_poll_interval(Duration::from_millis(100)),
    )?;
    watcher.watch(&path, RecursiveMode::NonRecursive)?;
    info!(path = %path.display(), "following file");

    loop {
        let mut file = File::open(&path)?;
        let len = file.metadata()?.len();
        if len < pos {
            warn!(path = %path.display(), "file truncated, reading from the start");
            pos = 0;
        }
        file.seek(SeekFrom::Start(pos))?;
        let mut reader = file.take(len - pos);
        if !pump(&mut reader, &mut decoder, &tx)? {
            return Ok(());
        }
        pos = len;

        match notify_rx.recv_timeout(Duration::from_millis(500)) {
            Ok(Ok(_)) | Err(mpsc::RecvTimeoutError::Timeout) => {}
            Ok(Err(e)) => {
                let _ = tx.send(FeedEvent::Error(e.to_string()));
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => return Ok(()),
        }
    }
}

fn start_network_feed(port: u16, tx: Sender<FeedEvent>) -> Result<()> {
    let listener = TcpListener::bind(format!("[::]:{}", port))
        .or_else(|_| TcpListener::bind(format!("0.0.0.0:{}", port)))?;
    info!(port, "listening for log connections");
    thread::spawn(move || {
        for stream in listener.incoming() {
            match stream {
                Ok(s) => {
                    let tx_clone = tx.clone();
                    thread::spawn(move || handle_client(s, tx_clone));
                }
                Err(e) => {
                    let _ = tx.send(FeedEvent::Error(format!("Accept error: {}", e)));
                }
            }
        }
    });
    Ok(())
}

/// Splits decoded text so that only whole lines leave this client; several
/// clients share one stream and must not interleave inside a line.
#[derive(Default)]
struct LineAligner {
    tail: String,
}

impl LineAligner {
    fn push(&mut self, text: &str) -> Option<String> {
        self.tail.push_str(text);
        let end = self.tail.rfind('\n')? + 1;
        let rest = self.tail.split_off(end);
        Some(std::mem::replace(&mut self.tail, rest))
    }

    fn finish(&mut self) -> Option<String> {
        if self.tail.is_empty() {
            return None;
        }
        let mut line = std::mem::take(&mut self.tail);
        line.push('\n');
        Some(line)
    }
}

fn handle_client(mut stream: TcpStream, tx: Sender<FeedEvent>) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let _ = tx.send(FeedEvent::Connected(peer.clone()));
    let _ = tx.send(FeedEvent::Chunk(format!("[connected: {}]\n", peer)));

    let mut decoder = Utf8Decoder::default();
    let mut aligner = LineAligner::default();
    let mut buf = vec![0u8; FEED_READ_SIZE];
    loop {
        let read = match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = tx.send(FeedEvent::Error(format!("Read error from {}: {}", peer, e)));
                break;
            }
        };
        let text = decoder.decode(&buf[..read]);
        if let Some(lines) = aligner.push(&text) {
            if tx.send(FeedEvent::Chunk(lines)).is_err() {
                return;
            }
        }
    }
    let tail = decoder.finish();
    if let Some(last) = aligner.push(&tail).into_iter().chain(aligner.finish()).reduce(|a, b| a + &b) {
        let _ = tx.send(FeedEvent::Chunk(last));
    }
    let _ = tx.send(FeedEvent::Chunk(format!("[disconnected: {}]\n", peer)));
    let _ = tx.send(FeedEvent::Disconnected(peer));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_code_points_are_held_back() {
        let mut decoder = Utf8Decoder::default();
        let bytes = "héllo".as_bytes();
        assert_eq!(decoder.decode(&bytes[..2]), "h");
        assert_eq!(decoder.decode(&bytes[2..]), "éllo");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn invalid_bytes_are_replaced() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(b"a\xffb"), "a\u{fffd}b");
        assert_eq!(decoder.decode(b"\xe2\x82"), "");
        assert_eq!(decoder.finish(), "\u{fffd}");
    }

    #[test]
    fn aligner_releases_whole_lines_only() {
        let mut aligner = LineAligner::default();
        assert_eq!(aligner.push("one\ntw"), Some("one\n".to_string()));
        assert_eq!(aligner.push("o"), None);
        assert_eq!(aligner.push("\nthree"), Some("two\n".to_string()));
        assert_eq!(aligner.finish(), Some("three\n".to_string()));
        assert_eq!(aligner.finish(), None);
    }

    #[test]
    fn network_clients_feed_whole_lines() {
        let (tx, rx) = mpsc::channel();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            handle_client(stream, tx);
        });

        let mut client = TcpStream::connect(addr).unwrap();
        io::Write::write_all(&mut client, b"I/a: one\nI/a: tw").unwrap();
        drop(client);
        server.join().unwrap();

        let mut text = String::new();
        for event in rx.try_iter() {
            if let FeedEvent::Chunk(chunk) = event {
                assert!(chunk.ends_with('\n'));
                text.push_str(&chunk);
            }
        }
        assert!(text.contains("I/a: one\nI/a: tw\n"));
        assert!(text.starts_with("[connected: "));
    }
}
