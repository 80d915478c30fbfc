//! Entry point: parses the invariant CLI surface, forks the shell under a
//! PTY, wires up the glob/cmd/feedback fifos, and runs the single-threaded
//! poll loop for the lifetime of the session.

use std::fs::OpenOptions;
use std::io::{self, stdout, Read, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::panic;
use std::path::PathBuf;

use clap::Parser;
use log::{debug, info, warn};

use vgseer::actions::Action;
use vgseer::config::Cli;
use vgseer::errors::AppResult;
use vgseer::feedback::{escape_filename, FeedbackDecoder, FeedbackRecord};
use vgseer::model::file::Ordering;
use vgseer::model::DirectoryModel;
use vgseer::protocol::GlobDecoder;
use vgseer::shell_bridge::{
    emergency_restore_terminal, poll_ready, register_term_flag, register_winch_flag, RawMode, ShellBridge,
};

/// The three fifos this process creates, named after its own pid the way
/// the teacher's forked-display setup does (`/tmp/viewglob<pid>-N`). Unlike
/// that setup we never fork a renderer ourselves — connecting to these is
/// left to whatever external process wants the glob/cmd/feedback data.
struct Fifos {
    glob_path: PathBuf,
    cmd_path: PathBuf,
    feedback_path: PathBuf,
}

impl Fifos {
    fn for_pid(pid: u32) -> Self {
        Fifos {
            glob_path: PathBuf::from(format!("/tmp/viewglob{pid}-1")),
            cmd_path: PathBuf::from(format!("/tmp/viewglob{pid}-2")),
            feedback_path: PathBuf::from(format!("/tmp/viewglob{pid}-3")),
        }
    }

    fn create_all(&self) -> io::Result<()> {
        create_fifo(&self.glob_path)?;
        create_fifo(&self.cmd_path)?;
        create_fifo(&self.feedback_path)
    }

    fn remove_all(&self) {
        let _ = std::fs::remove_file(&self.glob_path);
        let _ = std::fs::remove_file(&self.cmd_path);
        let _ = std::fs::remove_file(&self.feedback_path);
    }
}

/// Up to five attempts, matching the teacher's grounding source: an `EEXIST`
/// from a stale fifo left behind by a crashed previous run is removed and
/// retried rather than treated as fatal.
fn create_fifo(path: &std::path::Path) -> io::Result<()> {
    let c_path = std::ffi::CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    for attempt in 0..5 {
        let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::AlreadyExists {
            warn!("fifo {} already exists, removing", path.display());
            std::fs::remove_file(path)?;
            continue;
        }
        if attempt == 4 {
            return Err(err);
        }
    }
    Ok(())
}

/// Open a fifo for non-blocking reads: absent any writer yet, reads simply
/// return `WouldBlock` rather than hanging the whole process on a renderer
/// that may never show up.
fn open_nonblocking_read(path: &std::path::Path) -> io::Result<std::fs::File> {
    OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
}

/// Open a fifo for non-blocking writes. Returns `None` (rather than an
/// error) when nothing is listening yet (`ENXIO`) — the channel is simply
/// treated as disconnected until a consumer attaches.
fn open_nonblocking_write(path: &std::path::Path) -> Option<std::fs::File> {
    match OpenOptions::new()
        .write(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
    {
        Ok(f) => Some(f),
        Err(e) => {
            debug!("{} has no reader yet: {e}", path.display());
            None
        }
    }
}

fn sanitize_cmd_text(raw: &[u8]) -> Vec<u8> {
    raw.iter()
        .filter(|&&b| b != b'\r')
        .map(|&b| if b == b'\n' { b' ' } else { b })
        .collect()
}

fn read_nonblocking(f: &mut std::fs::File, buf: &mut [u8]) -> io::Result<Option<usize>> {
    match f.read(buf) {
        Ok(0) => Ok(None),
        Ok(n) => Ok(Some(n)),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(Some(0)),
        Err(e) => Err(e),
    }
}

fn setup_panic_hook() {
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        emergency_restore_terminal();
        original_hook(panic_info);
    }));
}

fn run() -> AppResult<i32> {
    let cli = Cli::parse();
    let shell_kind = cli.shell_kind.into();

    let (cols, rows) = crossterm::terminal::size().unwrap_or((80, 24));
    let mut bridge = ShellBridge::spawn(&cli.shell_path, shell_kind, cli.init_file.as_deref(), rows, cols)?;

    let fifos = Fifos::for_pid(std::process::id());
    fifos.create_all()?;
    let mut glob_fifo = open_nonblocking_read(&fifos.glob_path)?;
    let mut feedback_fifo = open_nonblocking_read(&fifos.feedback_path)?;
    let mut cmd_fifo = open_nonblocking_write(&fifos.cmd_path);

    let mut glob_decoder = GlobDecoder::new();
    let mut feedback_decoder = FeedbackDecoder::new();
    let mut model = DirectoryModel::new(Ordering::Ls);

    let _raw_mode = RawMode::enable()?;
    let winch_flag = register_winch_flag()?;
    let term_flag = register_term_flag()?;

    let mut stdout = stdout();
    let mut exit_code = 0;
    let mut disabled_announced = false;

    'outer: loop {
        if term_flag.swap(false, std::sync::atomic::Ordering::Relaxed) {
            exit_code = 1;
            break;
        }
        if winch_flag.swap(false, std::sync::atomic::Ordering::Relaxed) {
            if let Ok((cols, rows)) = crossterm::terminal::size() {
                bridge.resize(rows, cols);
            }
        }
        if !bridge.is_alive() {
            break;
        }

        let master_fd = match bridge.master_fd() {
            Some(fd) => fd,
            None => break,
        };
        let (stdin_ready, pty_ready) = match poll_ready(master_fd, 50) {
            Ok(r) => r,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };

        if stdin_ready {
            let mut buf = [0u8; 4096];
            let n = io::stdin().read(&mut buf)?;
            if n == 0 {
                break;
            }
            bridge.process_term_in(&buf[..n])?;
        }

        if pty_ready && !bridge.process_shell_out(&mut stdout)? {
            break;
        }

        let mut buf = [0u8; 4096];
        if let Some(n) = read_nonblocking(&mut glob_fifo, &mut buf).unwrap_or(None) {
            if n > 0 {
                glob_decoder.feed(&buf[..n], &mut model)?;
            }
        }
        if let Some(n) = read_nonblocking(&mut feedback_fifo, &mut buf).unwrap_or(None) {
            if n > 0 {
                for rec in feedback_decoder.feed(&buf[..n]) {
                    match rec {
                        FeedbackRecord::File(name) => {
                            let (ws_left, ws_right) = bridge.whitespace_around_cursor();
                            let at_prompt = bridge.is_at_prompt();
                            let escaped =
                                escape_filename(&name, at_prompt, cli.smart_insert(), ws_left, ws_right);
                            bridge.write_raw(&escaped)?;
                        }
                        FeedbackRecord::Key(k) => bridge.write_raw(&[k])?,
                        FeedbackRecord::Xid(xid) => info!("renderer xid: {xid}"),
                    }
                }
            }
        }

        while let Some(action) = bridge.drain_action() {
            match action {
                Action::Exit => break 'outer,
                Action::Disable => {
                    bridge.disable();
                    if !disabled_announced {
                        eprint!("(viewglob disabled)");
                        disabled_announced = true;
                    }
                }
                Action::SendCmd => {
                    if let Some(f) = cmd_fifo.as_mut() {
                        let text = sanitize_cmd_text(bridge.cmd().as_bytes());
                        let _ = f.write_all(b"cmd:");
                        let _ = f.write_all(&text);
                        let _ = f.write_all(b"\n");
                    }
                }
                Action::SendPwd => {
                    let title = format!("\x1b]0;{}\x07", String::from_utf8_lossy(bridge.pwd()));
                    let _ = stdout.write_all(title.as_bytes());
                    let _ = stdout.flush();
                }
                Action::SendLost => write_order(&mut cmd_fifo, b"order:lost\n"),
                Action::SendUp => write_order(&mut cmd_fifo, b"order:up\n"),
                Action::SendDown => write_order(&mut cmd_fifo, b"order:down\n"),
                Action::SendPgUp => write_order(&mut cmd_fifo, b"order:pgup\n"),
                Action::SendPgDown => write_order(&mut cmd_fifo, b"order:pgdown\n"),
                // Toggle/Refocus steer a renderer window that's out of scope
                // here; there's nothing local to do beyond noting the request.
                Action::Toggle => debug!("toggle requested"),
                Action::Refocus => debug!("refocus requested"),
            }
        }
    }

    fifos.remove_all();
    Ok(exit_code)
}

fn write_order(cmd_fifo: &mut Option<std::fs::File>, order: &[u8]) {
    if let Some(f) = cmd_fifo.as_mut() {
        let _ = f.write_all(order);
    }
}

fn main() {
    env_logger::init();
    setup_panic_hook();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("vgseer: {e}");
            std::process::exit(1);
        }
    }
}
