//! Interactive remote shell.
//!
//! ```text
//! key events ──[blocking poll]──► key_bytes ──► Terminal::write
//! resize events ─────────────────────────────► Terminal::resize
//! TerminalEvent::Output ─────────────────────► stdout
//! ```

use std::io::Write;
use std::time::Duration;

use bytes::Bytes;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use omni_core::{OmniError, Session, TerminalEvent, TerminalOptions, TerminalSize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// How long the input thread blocks before checking whether the shell
/// has ended.
const INPUT_POLL: Duration = Duration::from_millis(10);

/// Restores cooked mode on drop.
struct RawMode;

impl RawMode {
    fn enable() -> std::io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// Whether the shell loop should keep running after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Apply one terminal event to the local display.
pub fn render(event: TerminalEvent, out: &mut impl Write) -> std::io::Result<Flow> {
    match event {
        TerminalEvent::Output(data) => {
            out.write_all(&data)?;
            out.flush()?;
            Ok(Flow::Continue)
        }
        TerminalEvent::Closed | TerminalEvent::Disconnected => Ok(Flow::Exit),
        TerminalEvent::Opened | TerminalEvent::Connected => Ok(Flow::Continue),
    }
}

fn local_size() -> TerminalSize {
    terminal::size()
        .map(|(cols, rows)| TerminalSize::new(cols, rows))
        .unwrap_or_default()
}

/// Local input for the remote pty.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Keys(Bytes),
    Resize(TerminalSize),
}

/// Bytes a VT100-style terminal would send for `key`. `None` for
/// releases and keys with no encoding.
pub fn key_bytes(key: KeyEvent) -> Option<Vec<u8>> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    let seq: &[u8] = match key.code {
        KeyCode::Char(c) if key.modifiers.contains(KeyModifiers::CONTROL) => {
            let c = c.to_ascii_uppercase();
            if !('@'..='_').contains(&c) {
                return None;
            }
            return Some(vec![c as u8 & 0x1f]);
        }
        KeyCode::Char(c) => {
            let mut buf = [0u8; 4];
            let mut out = Vec::with_capacity(5);
            if key.modifiers.contains(KeyModifiers::ALT) {
                out.push(0x1b);
            }
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            return Some(out);
        }
        KeyCode::Enter => b"\r",
        KeyCode::Tab => b"\t",
        KeyCode::BackTab => b"\x1b[Z",
        KeyCode::Backspace => b"\x7f",
        KeyCode::Esc => b"\x1b",
        KeyCode::Up => b"\x1b[A",
        KeyCode::Down => b"\x1b[B",
        KeyCode::Right => b"\x1b[C",
        KeyCode::Left => b"\x1b[D",
        KeyCode::Home => b"\x1b[H",
        KeyCode::End => b"\x1b[F",
        KeyCode::Insert => b"\x1b[2~",
        KeyCode::Delete => b"\x1b[3~",
        KeyCode::PageUp => b"\x1b[5~",
        KeyCode::PageDown => b"\x1b[6~",
        _ => return None,
    };
    Some(seq.to_vec())
}

/// Poll terminal events on a blocking thread. The thread exits once the
/// receiver is dropped, so it never outlives the shell.
fn spawn_input_pump() -> (mpsc::UnboundedReceiver<Input>, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let pump = tokio::task::spawn_blocking(move || {
        while !tx.is_closed() {
            match event::poll(INPUT_POLL) {
                Ok(false) => continue,
                Ok(true) => {}
                Err(e) => {
                    debug!("input poll failed: {e}");
                    break;
                }
            }
            let input = match event::read() {
                Ok(Event::Key(key)) => key_bytes(key).map(|b| Input::Keys(Bytes::from(b))),
                Ok(Event::Paste(text)) => Some(Input::Keys(Bytes::from(text))),
                Ok(Event::Resize(cols, rows)) => Some(Input::Resize(TerminalSize::new(cols, rows))),
                Ok(_) => None,
                Err(e) => {
                    debug!("input read failed: {e}");
                    break;
                }
            };
            if let Some(input) = input {
                if tx.send(input).is_err() {
                    break;
                }
            }
        }
    });
    (rx, pump)
}

/// Run an interactive shell until the remote side closes it.
pub async fn run(session: &Session, options: &TerminalOptions) -> Result<(), OmniError> {
    let mut events = session
        .take_terminal_events()
        .ok_or(OmniError::ChannelClosed)?;
    let remote = session.terminal();

    let _raw = RawMode::enable()?;
    remote.open(options)?;
    let mut size = local_size();
    remote.resize(size)?;

    let (mut input, _pump) = spawn_input_pump();
    let mut stdout = std::io::stdout();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                if render(event, &mut stdout)? == Flow::Exit {
                    break;
                }
            }
            local = input.recv() => match local {
                Some(Input::Keys(keys)) => remote.write(keys)?,
                Some(Input::Resize(now)) if now != size => {
                    size = now;
                    remote.resize(size)?;
                }
                Some(Input::Resize(_)) => {}
                None => {
                    debug!("input closed");
                    remote.close()?;
                    break;
                }
            },
        }
    }
    // Dropping `input` here stops the poll thread within one INPUT_POLL.
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_is_written_verbatim() {
        let mut out = Vec::new();
        let flow = render(
            TerminalEvent::Output(Bytes::from_static(b"\x1b[1mhi\x1b[0m")),
            &mut out,
        )
        .unwrap();
        assert_eq!(flow, Flow::Continue);
        assert_eq!(out, b"\x1b[1mhi\x1b[0m");
    }

    #[test]
    fn close_and_disconnect_end_the_shell() {
        let mut out = Vec::new();
        assert_eq!(render(TerminalEvent::Closed, &mut out).unwrap(), Flow::Exit);
        assert_eq!(
            render(TerminalEvent::Disconnected, &mut out).unwrap(),
            Flow::Exit
        );
        assert_eq!(render(TerminalEvent::Opened, &mut out).unwrap(), Flow::Continue);
        assert!(out.is_empty());
    }

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn printable_keys_are_utf8() {
        assert_eq!(key_bytes(key(KeyCode::Char('a'), KeyModifiers::NONE)), Some(b"a".to_vec()));
        assert_eq!(
            key_bytes(key(KeyCode::Char('é'), KeyModifiers::NONE)),
            Some("é".as_bytes().to_vec())
        );
        assert_eq!(
            key_bytes(key(KeyCode::Char('x'), KeyModifiers::ALT)),
            Some(b"\x1bx".to_vec())
        );
    }

    #[test]
    fn control_chords_map_to_c0() {
        assert_eq!(key_bytes(key(KeyCode::Char('c'), KeyModifiers::CONTROL)), Some(vec![0x03]));
        assert_eq!(key_bytes(key(KeyCode::Char('D'), KeyModifiers::CONTROL)), Some(vec![0x04]));
        assert_eq!(key_bytes(key(KeyCode::Char('['), KeyModifiers::CONTROL)), Some(vec![0x1b]));
        assert_eq!(key_bytes(key(KeyCode::Char('1'), KeyModifiers::CONTROL)), None);
    }

    #[test]
    fn special_keys_use_vt_sequences() {
        assert_eq!(key_bytes(key(KeyCode::Enter, KeyModifiers::NONE)), Some(b"\r".to_vec()));
        assert_eq!(key_bytes(key(KeyCode::Backspace, KeyModifiers::NONE)), Some(vec![0x7f]));
        assert_eq!(key_bytes(key(KeyCode::Up, KeyModifiers::NONE)), Some(b"\x1b[A".to_vec()));
        assert_eq!(
            key_bytes(key(KeyCode::Delete, KeyModifiers::NONE)),
            Some(b"\x1b[3~".to_vec())
        );
        assert_eq!(key_bytes(key(KeyCode::F(5), KeyModifiers::NONE)), None);
    }

    #[test]
    fn key_releases_send_nothing() {
        let mut release = key(KeyCode::Char('a'), KeyModifiers::NONE);
        release.kind = KeyEventKind::Release;
        assert_eq!(key_bytes(release), None);
    }

    #[tokio::test]
    async fn input_pump_stops_when_the_shell_ends() {
        let (input, pump) = spawn_input_pump();
        drop(input);
        tokio::time::timeout(Duration::from_secs(2), pump)
            .await
            .expect("input thread outlived its receiver")
            .unwrap();
    }
}
