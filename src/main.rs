//! speechmux command-line harness
//!
//! Speaks the text given on the command line through one engine and
//! prints every engine event as a JSON line. While speaking, stdin takes
//! one command per line:
//! - `p` pause, `r` resume, `s` stop, `q` quit
//! - `p` and `s` take an optional boundary: `now`, `word`, `sentence`,
//!   `utterance`
//! - any other line is spoken, replacing the current utterance

use anyhow::{bail, Context};
use log::{debug, error, info, warn};
use mio::{Events, Interest, Poll, Token};
use speechmux::config::Config;
use speechmux::platform::NativeRuntime;
use speechmux::speech::{
    apply_settings, create_engine, BackendKind, BoundaryHint, Engine, PlaybackState,
};
use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::process;
use std::time::Instant;

/// Token for stdin in mio poll
const STDIN: Token = Token(0);

/// Parsed command line
#[derive(Debug, Default)]
struct Options {
    debug: bool,
    config: Option<PathBuf>,
    backend: Option<BackendKind>,
    list_voices: bool,
    text: Vec<String>,
}

fn parse_args<I: Iterator<Item = String>>(mut args: I) -> anyhow::Result<Options> {
    let mut options = Options::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--debug" | "-d" => options.debug = true,
            "--list-voices" => options.list_voices = true,
            "--config" => {
                let path = args.next().context("--config needs a path")?;
                options.config = Some(PathBuf::from(path));
            }
            "--backend" => {
                let name = args.next().context("--backend needs a name")?;
                match BackendKind::parse(&name) {
                    Some(kind) => options.backend = Some(kind),
                    None => bail!("Unknown backend {:?} (expected auto, mock or native)", name),
                }
            }
            _ => options.text.push(arg),
        }
    }
    Ok(options)
}

fn init_logging(debug_mode: bool) {
    if debug_mode {
        use std::fs::OpenOptions;
        match OpenOptions::new()
            .create(true)
            .append(true)
            .open("speechmux.log")
        {
            Ok(log_file) => {
                env_logger::Builder::new()
                    .filter_level(log::LevelFilter::Debug)
                    .target(env_logger::Target::Pipe(Box::new(log_file)))
                    .init();
            }
            Err(e) => {
                eprintln!("Warning: Failed to open speechmux.log for debug logging: {}", e);
                env_logger::Builder::new()
                    .filter_level(log::LevelFilter::Warn)
                    .init();
            }
        }
        info!(
            "speechmux version {} starting (debug mode, logging to speechmux.log)",
            speechmux::VERSION
        );
    } else {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Error)
            .parse_default_env()
            .init();
    }
}

fn main() {
    let options = match parse_args(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!(
                "Usage: {} [--debug] [--config PATH] [--backend auto|mock|native] \
                 [--list-voices] [TEXT...]",
                speechmux::APP_NAME
            );
            process::exit(2);
        }
    };
    init_logging(options.debug);

    if let Err(e) = run(options) {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run(options: Options) -> anyhow::Result<()> {
    let mut config = match &options.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;
    info!("Configuration loaded from {:?}", config.path());

    if let Some(kind) = options.backend {
        let name = match kind {
            BackendKind::Auto => "auto",
            BackendKind::Mock => "mock",
            BackendKind::Native => "native",
        };
        config.set("speech", "backend", name);
    }

    // Engines must be dropped before the runtime guard
    let _runtime = NativeRuntime::acquire();
    let mut engine = create_engine(&config);
    info!("Using {} speech engine", engine.name());
    if engine.state() == PlaybackState::Error {
        warn!("Engine not ready: {}", engine.error_string());
    }
    apply_settings(engine.as_mut(), &config);

    if options.list_voices {
        return list_voices(engine.as_mut());
    }

    let text = options.text.join(" ");
    if !text.is_empty() {
        engine.speak(&text);
    }
    print_events(engine.as_mut())?;

    event_loop(engine.as_mut())
}

fn list_voices(engine: &mut dyn Engine) -> anyhow::Result<()> {
    let mut stdout = io::stdout().lock();
    for locale in engine.available_locales() {
        if !engine.set_locale(&locale) {
            warn!("Cannot list voices for {}: {}", locale, engine.error_string());
            continue;
        }
        for voice in engine.available_voices() {
            writeln!(stdout, "{}", serde_json::to_string(&voice)?)?;
        }
    }
    Ok(())
}

/// Write queued engine events to stdout as JSON lines
fn print_events(engine: &mut dyn Engine) -> anyhow::Result<()> {
    let mut stdout = io::stdout().lock();
    for event in engine.drain_events() {
        writeln!(stdout, "{}", serde_json::to_string(&event)?)?;
    }
    stdout.flush()?;
    Ok(())
}

/// Drive the engine until `q`, or until stdin closes and speech is done
fn event_loop(engine: &mut dyn Engine) -> anyhow::Result<()> {
    let stdin_fd = io::stdin().as_raw_fd();
    let mut poll = Poll::new()?;
    let mut events = Events::with_capacity(16);
    let mut stdin_open = true;
    poll.registry()
        .register(
            &mut mio::unix::SourceFd(&stdin_fd),
            STDIN,
            Interest::READABLE,
        )
        .context("Failed to watch stdin")?;

    let mut pending: Vec<u8> = Vec::new();
    loop {
        let busy = matches!(
            engine.state(),
            PlaybackState::Speaking | PlaybackState::Paused
        );
        if !stdin_open && !busy {
            debug!("Input closed and engine idle, exiting");
            return Ok(());
        }

        let timeout = engine
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()));
        if !stdin_open && timeout.is_none() {
            // Nothing left that could wake us
            return Ok(());
        }

        if let Err(e) = poll.poll(&mut events, timeout) {
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(e.into());
        }

        for event in events.iter() {
            if event.token() != STDIN {
                continue;
            }
            // At least the stdin buffer size, so reads bypass it and
            // readiness stays in step with what is left unread
            let mut buf = [0u8; 8192];
            let n = io::stdin().read(&mut buf)?;
            if n == 0 {
                debug!("stdin closed");
                stdin_open = false;
                poll.registry()
                    .deregister(&mut mio::unix::SourceFd(&stdin_fd))?;
                break;
            }
            pending.extend_from_slice(&buf[..n]);

            for line in take_lines(&mut pending) {
                if !handle_command(engine, line.trim()) {
                    engine.stop(BoundaryHint::Immediate);
                    print_events(engine)?;
                    return Ok(());
                }
            }
        }

        engine.process(Instant::now());
        print_events(engine)?;
    }
}

/// Split complete lines off the front of `pending`
///
/// Bytes after the last newline stay buffered, so a character split
/// across two reads is decoded whole.
fn take_lines(pending: &mut Vec<u8>) -> Vec<String> {
    let Some(last) = pending.iter().rposition(|&b| b == b'\n') else {
        return Vec::new();
    };
    let complete: Vec<u8> = pending.drain(..=last).collect();
    complete[..last]
        .split(|&b| b == b'\n')
        .map(|line| String::from_utf8_lossy(line).into_owned())
        .collect()
}

/// Apply one input line; false means quit
fn handle_command(engine: &mut dyn Engine, line: &str) -> bool {
    let (command, argument) = line.split_once(' ').unwrap_or((line, ""));
    match (command, BoundaryHint::parse(argument)) {
        ("", _) => {}
        ("q", _) if argument.is_empty() => return false,
        ("r", _) if argument.is_empty() => engine.resume(),
        ("p", Some(hint)) => engine.pause(hint),
        ("s", Some(hint)) => engine.stop(hint),
        _ => engine.speak(line),
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use speechmux::speech::backends::mock::MockEngine;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn test_parse_args() {
        let options = parse_args(args(&["--backend", "mock", "-d", "Hello", "world"])).unwrap();
        assert_eq!(options.backend, Some(BackendKind::Mock));
        assert!(options.debug);
        assert_eq!(options.text, vec!["Hello", "world"]);
    }

    #[test]
    fn test_take_lines_keeps_split_character() {
        // "é" is 0xC3 0xA9; the read boundary falls between them
        let mut pending = b"p\nh\xC3".to_vec();
        assert_eq!(take_lines(&mut pending), vec!["p"]);
        assert_eq!(pending, b"h\xC3");

        pending.extend_from_slice(b"\xA9llo\nr\n");
        assert_eq!(take_lines(&mut pending), vec!["héllo", "r"]);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_handle_command() {
        let mut engine = MockEngine::new();
        assert!(handle_command(&mut engine, "one two"));
        assert_eq!(engine.state(), PlaybackState::Speaking);
        assert!(handle_command(&mut engine, "p word"));
        assert!(handle_command(&mut engine, "s now"));
        assert_eq!(engine.state(), PlaybackState::Ready);
        // Unknown boundary makes the line text to speak
        assert!(handle_command(&mut engine, "p please"));
        assert_eq!(engine.state(), PlaybackState::Speaking);
        assert!(!handle_command(&mut engine, "q"));
    }

    #[test]
    fn test_parse_args_rejects_bad_backend() {
        assert!(parse_args(args(&["--backend", "sapi"])).is_err());
        assert!(parse_args(args(&["--config"])).is_err());
    }
}
