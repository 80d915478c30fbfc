//! Forks a shell under a PTY and pumps bytes in both directions: terminal
//! input to the shell (with navigation-prefix interception), and shell
//! output to the terminal through the sequence matcher.
//!
//! Single-threaded and poll-driven, unlike [`persistent_shell`](crate)-style
//! background-reader designs: the whole process lifetime is one
//! `libc::poll` loop over stdin and the PTY master, mirroring the teacher's
//! own `run_forwarding_loop` but generalized from one forwarding burst to
//! the entire session.

use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};

use crate::actions::{Action, ActionQueue};
use crate::cmdline::{CommandLine, OverwriteQueue};
use crate::connection::{Connection, ProcessLevel, ReadOutcome};
use crate::errors::{AppError, AppResult, ConnError, PtyError};
use crate::sequences::{feed_byte, MatcherOutcome, SequenceTable, ShellKind};

/// Terminal input bytes that mean "a command is about to be entered, tab
/// completion was invoked, or the line is being navigated" — per §4.7, these
/// arm `expect_newline` so the next shell-side newline-like sequence is read
/// as "command executed" rather than "line wrapped".
fn sets_expect_newline(b: u8) -> bool {
    matches!(b, b'\n' | b'\t' | 0x03 | 0x04 | b'\r' | 0x0f)
}

/// Prefix byte that arms navigation-key interception on the terminal-input
/// side. Chosen because it never otherwise appears in ordinary typing.
const NAV_PREFIX: u8 = 0x07;

fn nav_action_for(key: u8) -> Option<Action> {
    match key {
        b'k' => Some(Action::SendUp),
        b'j' => Some(Action::SendDown),
        b'u' => Some(Action::SendPgUp),
        b'd' => Some(Action::SendPgDown),
        b't' => Some(Action::Toggle),
        b'r' => Some(Action::Refocus),
        b'x' => Some(Action::Disable),
        _ => None,
    }
}

/// Wraps a forked shell's PTY, the sequence matcher driving `CommandLine`
/// reconstruction, and the action queue raised along the way.
pub struct ShellBridge {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    reader: Box<dyn Read + Send>,
    child: Box<dyn Child + Send + Sync>,
    table: SequenceTable,
    shell_out: Connection,
    cmd: CommandLine,
    #[allow(dead_code)]
    overwrite_queue: OverwriteQueue,
    actions: ActionQueue,
    pwd: Vec<u8>,
    expect_newline: bool,
    nav_pending: bool,
    disabled: bool,
}

impl ShellBridge {
    /// Fork `shell_path` under a fresh PTY sized to the current terminal,
    /// sourcing `init_file` if given.
    pub fn spawn(
        shell_path: &str,
        shell_kind: ShellKind,
        init_file: Option<&Path>,
        rows: u16,
        cols: u16,
    ) -> AppResult<Self> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| AppError::Pty(PtyError::Alloc(e.to_string())))?;

        let mut cmd = CommandBuilder::new(shell_path);
        if let Some(init) = init_file {
            match shell_kind {
                ShellKind::Bash => {
                    cmd.arg("--rcfile");
                    cmd.arg(init);
                }
                ShellKind::Zsh => {
                    cmd.env("ZDOTDIR", init.parent().unwrap_or(init));
                }
            }
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| AppError::Pty(PtyError::Spawn(e.to_string())))?;

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| AppError::Pty(PtyError::Alloc(e.to_string())))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| AppError::Pty(PtyError::Alloc(e.to_string())))?;

        let mut shell_out = Connection::new("shell_out");
        shell_out.level = ProcessLevel::Executing;

        Ok(ShellBridge {
            master: pair.master,
            writer,
            reader,
            child,
            table: SequenceTable::build(shell_kind),
            shell_out,
            cmd: CommandLine::new(),
            overwrite_queue: OverwriteQueue::new(),
            actions: ActionQueue::new(),
            pwd: Vec::new(),
            expect_newline: false,
            nav_pending: false,
            disabled: false,
        })
    }

    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    pub fn resize(&self, rows: u16, cols: u16) {
        let _ = self.master.resize(PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        });
    }

    pub fn cmd(&self) -> &CommandLine {
        &self.cmd
    }

    pub fn pwd(&self) -> &[u8] {
        &self.pwd
    }

    pub fn is_at_prompt(&self) -> bool {
        self.shell_out.level == ProcessLevel::AtPrompt
    }

    /// Whether the byte immediately left/right of the cursor is whitespace
    /// (or the cursor sits at an edge of the line), for [`crate::feedback::escape_filename`]'s
    /// smart-whitespace decision.
    pub fn whitespace_around_cursor(&self) -> (bool, bool) {
        let text = self.cmd.as_bytes();
        let pos = self.cmd.pos();
        let left = pos == 0 || text[pos - 1].is_ascii_whitespace();
        let right = pos >= text.len() || text[pos].is_ascii_whitespace();
        (left, right)
    }

    /// Drain one queued action, most-recently-raised first (§5's
    /// intentional LIFO collapse of a prompt-transition burst).
    pub fn drain_action(&mut self) -> Option<Action> {
        self.actions.drain_next()
    }

    /// Forward terminal input to the shell, intercepting the navigation
    /// prefix (`\x07` + key code) instead of passing it through.
    pub fn process_term_in(&mut self, data: &[u8]) -> AppResult<()> {
        let mut out = Vec::with_capacity(data.len());
        for &b in data {
            if self.nav_pending {
                self.nav_pending = false;
                match nav_action_for(b) {
                    Some(action) => self.actions.enqueue(action),
                    // Not a recognized key after all: the prefix byte was
                    // ordinary input, forward both bytes untouched.
                    None => {
                        out.push(NAV_PREFIX);
                        out.push(b);
                    }
                }
                continue;
            }
            if b == NAV_PREFIX {
                self.nav_pending = true;
                continue;
            }
            if sets_expect_newline(b) {
                self.expect_newline = true;
            }
            out.push(b);
        }
        if !out.is_empty() {
            self.writer.write_all(&out).map_err(|e| {
                AppError::Conn(ConnError::Io {
                    name: "shell_in".to_string(),
                    source: e,
                })
            })?;
        }
        Ok(())
    }

    /// Read one chunk of shell output, run it through the matcher byte by
    /// byte, and write whatever isn't suppressed to `term_out`. Returns
    /// `false` once the shell side has closed.
    pub fn process_shell_out<W: Write>(&mut self, term_out: &mut W) -> AppResult<bool> {
        self.shell_out.prepend_holdover();
        match self.shell_out.fill(&mut self.reader)? {
            ReadOutcome::Exit => {
                self.actions.enqueue(Action::Exit);
                return Ok(false);
            }
            ReadOutcome::Read(_) => {}
        }

        let mut in_progress = false;
        while !self.shell_out.is_exhausted() {
            let byte = self.shell_out.remaining()[0];
            self.shell_out.grow_segment();
            let outcome = feed_byte(
                &mut self.table,
                &mut self.shell_out,
                &mut self.cmd,
                &mut self.actions,
                &mut self.pwd,
                self.expect_newline,
                byte,
            );
            match outcome {
                MatcherOutcome::Matched { suppress } => {
                    in_progress = false;
                    if suppress {
                        self.shell_out.eat_segment();
                    } else {
                        self.shell_out.pass_segment();
                    }
                }
                MatcherOutcome::InProgress => in_progress = true,
                MatcherOutcome::NoMatch => {
                    in_progress = false;
                    self.shell_out.pass_segment();
                }
            }
        }

        if in_progress {
            // At AtPrompt the in-progress bytes are ordinary terminal
            // escapes that should reach the terminal immediately even
            // before the sequence resolves; everywhere else they might
            // still turn out to be a suppressed delimiter, so they're held
            // back unwritten until the next read decides.
            let write_now = self.shell_out.level == ProcessLevel::AtPrompt;
            self.shell_out.create_holdover(!write_now);
        }

        self.shell_out
            .flush_passthrough(term_out)
            .map_err(AppError::Conn)?;

        if self.disabled {
            self.shell_out.level = ProcessLevel::Terminal;
        }

        Ok(true)
    }

    /// Write bytes directly to the shell, bypassing navigation-prefix
    /// interception — for synthetic input (a feedback-channel filename or
    /// keystroke) rather than bytes actually typed at the terminal.
    pub fn write_raw(&mut self, bytes: &[u8]) -> AppResult<()> {
        self.writer.write_all(bytes).map_err(|e| {
            AppError::Conn(ConnError::Io {
                name: "shell_in".to_string(),
                source: e,
            })
        })
    }

    /// Apply an `Action` that doesn't belong to a specific channel writer
    /// (those are `main`'s job): latch passthrough-only mode.
    pub fn disable(&mut self) {
        self.disabled = true;
        self.shell_out.level = ProcessLevel::Terminal;
    }

    /// Raw fd of the PTY master, for the poll loop.
    pub fn master_fd(&self) -> Option<RawFd> {
        self.master.as_raw_fd()
    }
}

#[cfg(unix)]
pub struct RawMode {
    orig: libc::termios,
}

#[cfg(unix)]
static ORIG_TERMIOS: std::sync::OnceLock<libc::termios> = std::sync::OnceLock::new();

#[cfg(unix)]
impl RawMode {
    /// Put stdin into raw mode for transparent byte forwarding, returning a
    /// guard that restores the original attributes on drop.
    pub fn enable() -> io::Result<Self> {
        unsafe {
            let mut orig: libc::termios = std::mem::zeroed();
            if libc::tcgetattr(libc::STDIN_FILENO, &mut orig) != 0 {
                return Err(io::Error::last_os_error());
            }
            let _ = ORIG_TERMIOS.set(orig);
            let mut raw = orig;
            libc::cfmakeraw(&mut raw);
            if libc::tcsetattr(libc::STDIN_FILENO, libc::TCSAFLUSH, &raw) != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(RawMode { orig })
        }
    }
}

#[cfg(unix)]
impl Drop for RawMode {
    fn drop(&mut self) {
        unsafe {
            libc::tcsetattr(libc::STDIN_FILENO, libc::TCSAFLUSH, &self.orig);
        }
    }
}

/// Best-effort terminal restore from a panic hook, where unwinding may not
/// reach `RawMode`'s `Drop` (e.g. a panic during a `catch_unwind`-free abort
/// path). No-op if raw mode was never entered.
#[cfg(unix)]
pub fn emergency_restore_terminal() {
    if let Some(orig) = ORIG_TERMIOS.get() {
        unsafe {
            libc::tcsetattr(libc::STDIN_FILENO, libc::TCSAFLUSH, orig);
        }
    }
}

/// Arms an `AtomicBool` that's set whenever SIGWINCH arrives, so the main
/// loop can poll it between `poll(2)` calls instead of handling the signal
/// in an async-signal-unsafe callback.
#[cfg(unix)]
pub fn register_winch_flag() -> io::Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGWINCH, Arc::clone(&flag))?;
    Ok(flag)
}

/// Arms an `AtomicBool` set on SIGTERM/SIGHUP/SIGINT/SIGQUIT, the signal set
/// §5 names as triggering the `Exit` action.
#[cfg(unix)]
pub fn register_term_flag() -> io::Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&flag))?;
    signal_hook::flag::register(signal_hook::consts::SIGHUP, Arc::clone(&flag))?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&flag))?;
    signal_hook::flag::register(signal_hook::consts::SIGQUIT, Arc::clone(&flag))?;
    Ok(flag)
}

/// One `poll(2)` round over stdin and the PTY master, timing out after
/// `timeout_ms` so the caller can re-check signal flags even with no data
/// ready — the same 50ms cadence the teacher's own forwarding loop uses.
#[cfg(unix)]
pub fn poll_ready(master_fd: RawFd, timeout_ms: i32) -> io::Result<(bool, bool)> {
    let mut fds = [
        libc::pollfd {
            fd: libc::STDIN_FILENO,
            events: libc::POLLIN,
            revents: 0,
        },
        libc::pollfd {
            fd: master_fd,
            events: libc::POLLIN,
            revents: 0,
        },
    ];
    let ret = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
    if ret < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok((false, false));
        }
        return Err(err);
    }
    Ok((
        fds[0].revents & libc::POLLIN != 0,
        fds[1].revents & libc::POLLIN != 0,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Action;

    // ShellBridge::spawn forks a real process, so these tests exercise the
    // nav-prefix state machine directly against a bare-bones stand-in
    // rather than a live pty.
    struct NavState {
        pending: bool,
        actions: ActionQueue,
    }

    impl NavState {
        fn new() -> Self {
            NavState {
                pending: false,
                actions: ActionQueue::new(),
            }
        }

        fn feed(&mut self, data: &[u8]) -> Vec<u8> {
            let mut out = Vec::new();
            for &b in data {
                if self.pending {
                    self.pending = false;
                    match nav_action_for(b) {
                        Some(a) => self.actions.enqueue(a),
                        None => {
                            out.push(NAV_PREFIX);
                            out.push(b);
                        }
                    }
                    continue;
                }
                if b == NAV_PREFIX {
                    self.pending = true;
                    continue;
                }
                out.push(b);
            }
            out
        }
    }

    #[test]
    fn nav_prefix_up_is_eaten_and_enqueues_send_up() {
        let mut st = NavState::new();
        let forwarded = st.feed(b"\x07k");
        assert!(forwarded.is_empty());
        assert_eq!(st.actions.drain_next(), Some(Action::SendUp));
    }

    #[test]
    fn unrecognized_key_after_prefix_falls_back_to_passthrough() {
        let mut st = NavState::new();
        let forwarded = st.feed(b"\x07q");
        assert_eq!(forwarded, b"\x07q");
        assert!(st.actions.drain_next().is_none());
    }

    #[test]
    fn nav_prefix_split_across_chunks_still_resolves() {
        let mut st = NavState::new();
        let mut forwarded = st.feed(b"\x07");
        forwarded.extend(st.feed(b"j"));
        assert!(forwarded.is_empty());
        assert_eq!(st.actions.drain_next(), Some(Action::SendDown));
    }

    #[test]
    fn ordinary_bytes_pass_through_untouched() {
        let mut st = NavState::new();
        assert_eq!(st.feed(b"ls -la\n"), b"ls -la\n");
    }

    #[test]
    fn expect_newline_set_by_enter_tab_and_control_chars() {
        assert!(sets_expect_newline(b'\n'));
        assert!(sets_expect_newline(b'\t'));
        assert!(sets_expect_newline(b'\r'));
        assert!(sets_expect_newline(0x03));
        assert!(sets_expect_newline(0x04));
        assert!(sets_expect_newline(0x0f));
        assert!(!sets_expect_newline(b'a'));
    }
}
