//! Zero-downtime restart by listening-socket handoff.
//!
//! # Protocol
//!
//! ```text
//! predecessor                                  successor
//! -----------                                  ---------
//! SIGUSR2
//! bind ready socket  <tmp>/oath-ready-<id>.sock
//! spawn argv[0], same args
//!   stdin  = dup(listening socket)
//!   OATH_INHERITED_LISTENER=0
//!   OATH_READY_SOCKET=<path>           ──▶     adopt fd 0 as listener
//!                                              provision keys, build routes
//! accept on ready socket               ◀──     connect, send "ready"
//! stop accepting, drain, exit                  serve
//! ```
//!
//! Both processes hold the same socket, so connections waiting in the
//! kernel backlog are never refused: whichever process is still accepting
//! picks them up. If the successor exits or stays silent past the timeout the
//! predecessor kills it and keeps serving.

use std::ffi::{OsStr, OsString};
use std::io;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::process::Command;
use tracing::{debug, info};
use uuid::Uuid;

/// Environment variable naming the descriptor of an inherited listener.
pub const INHERITED_LISTENER_ENV: &str = "OATH_INHERITED_LISTENER";

/// Environment variable holding the path of the predecessor's ready socket.
pub const READY_SOCKET_ENV: &str = "OATH_READY_SOCKET";

/// Descriptor the listener is placed at in the successor (its stdin).
const INHERITED_FD: RawFd = 0;

const READY_MESSAGE: &str = "ready";

/// Suffix Linux appends to `/proc/self/exe` once the binary was replaced.
const DELETED_SUFFIX: &[u8] = b" (deleted)";

/// Errors that abort a restart. The predecessor keeps serving on any of them.
#[derive(Debug, Error)]
pub enum RestartError {
    #[error("handoff i/o failed")]
    Io(#[from] io::Error),

    #[error("successor exited before becoming ready ({0})")]
    SuccessorExited(ExitStatus),

    #[error("successor not ready after {0:?}")]
    Timeout(Duration),

    #[error("unexpected readiness message {0:?}")]
    BadHandshake(String),
}

/// Program and arguments a restart launches.
#[derive(Debug, Clone)]
pub struct Successor {
    program: PathBuf,
    args: Vec<OsString>,
}

impl Successor {
    /// The program this process was started as, with the same arguments.
    ///
    /// The program is looked up again from `argv[0]` (through `PATH` when it
    /// has no `/`), so a binary a deploy moved over the running one is the
    /// one launched.
    pub fn current() -> io::Result<Self> {
        Self::from_argv(std::env::args_os(), std::env::var_os("PATH").as_deref())
    }

    fn from_argv<I>(argv: I, search_path: Option<&OsStr>) -> io::Result<Self>
    where
        I: IntoIterator<Item = OsString>,
    {
        let mut argv = argv.into_iter();
        let program = match argv
            .next()
            .and_then(|argv0| resolve_program(&argv0, search_path))
        {
            Some(program) => program,
            None => strip_deleted(std::env::current_exe()?),
        };
        Ok(Self::new(program, argv))
    }

    pub fn new<I, A>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

fn resolve_program(argv0: &OsStr, search_path: Option<&OsStr>) -> Option<PathBuf> {
    if argv0.as_bytes().contains(&b'/') {
        let candidate = PathBuf::from(argv0);
        return is_executable(&candidate).then_some(candidate);
    }
    std::env::split_paths(search_path?)
        .map(|dir| dir.join(argv0))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

fn strip_deleted(path: PathBuf) -> PathBuf {
    match path.as_os_str().as_bytes().strip_suffix(DELETED_SUFFIX) {
        Some(live) => PathBuf::from(OsStr::from_bytes(live)),
        None => path,
    }
}

/// Spawn `successor` on a duplicate of `listener` and wait until it is ready.
///
/// Returns the successor's pid. On error the successor has been told to die
/// and the caller should keep serving.
pub async fn hand_off(
    listener: &std::net::TcpListener,
    successor: &Successor,
    timeout: Duration,
) -> Result<u32, RestartError> {
    let ready = ReadyChannel::bind(
        std::env::temp_dir().join(format!("oath-ready-{}.sock", Uuid::new_v4())),
    )?;
    let inherited: OwnedFd = listener.try_clone()?.into();

    let mut child = Command::new(&successor.program)
        .args(&successor.args)
        .env(INHERITED_LISTENER_ENV, INHERITED_FD.to_string())
        .env(READY_SOCKET_ENV, ready.path())
        .stdin(Stdio::from(inherited))
        .spawn()?;
    let pid = child.id().unwrap_or_default();
    info!(successor_pid = pid, "spawned successor");

    let outcome = tokio::time::timeout(timeout, async {
        tokio::select! {
            handshake = ready.wait() => handshake,
            status = child.wait() => match status {
                Ok(status) => Err(RestartError::SuccessorExited(status)),
                Err(e) => Err(RestartError::Io(e)),
            },
        }
    })
    .await;

    let err = match outcome {
        Ok(Ok(())) => return Ok(pid),
        Ok(Err(e)) => e,
        Err(_) => RestartError::Timeout(timeout),
    };
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "successor already gone");
    }
    Err(err)
}

/// Adopt the listener handed down by a predecessor, if this process has one.
///
/// Must be called at most once, before anything else could claim the
/// descriptor.
pub fn inherited_listener() -> io::Result<Option<std::net::TcpListener>> {
    let Some(raw) = std::env::var_os(INHERITED_LISTENER_ENV) else {
        return Ok(None);
    };
    let fd = raw
        .to_str()
        .and_then(|s| s.parse::<RawFd>().ok())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{INHERITED_LISTENER_ENV} is not a descriptor number: {raw:?}"),
            )
        })?;
    adopt_listener(fd).map(Some)
}

/// Take ownership of `fd` as a TCP listener.
///
/// `fd` must be an open descriptor nothing else in this process owns.
fn adopt_listener(fd: RawFd) -> io::Result<std::net::TcpListener> {
    // SAFETY: callers pass a descriptor this process was handed and no other
    // owner exists for it.
    let listener = std::net::TcpListener::from(unsafe { OwnedFd::from_raw_fd(fd) });
    // Fails unless the descriptor really is a bound socket.
    let addr = listener.local_addr()?;
    debug!(%addr, fd, "adopted inherited listener");
    Ok(listener)
}

/// Tell the predecessor, if any, that this process is ready to serve.
///
/// Returns `false` when there is no predecessor waiting.
pub async fn notify_ready() -> io::Result<bool> {
    match std::env::var_os(READY_SOCKET_ENV) {
        Some(path) => {
            signal_ready(Path::new(&path)).await?;
            Ok(true)
        }
        None => Ok(false),
    }
}

async fn signal_ready(path: &Path) -> io::Result<()> {
    let mut stream = UnixStream::connect(path).await?;
    stream.write_all(READY_MESSAGE.as_bytes()).await?;
    stream.shutdown().await
}

/// Unix socket the predecessor waits on. Removed on drop.
struct ReadyChannel {
    path: PathBuf,
    listener: UnixListener,
}

impl ReadyChannel {
    fn bind(path: PathBuf) -> io::Result<Self> {
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path)?;
        Ok(Self { path, listener })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn wait(&self) -> Result<(), RestartError> {
        let (stream, _) = self.listener.accept().await?;
        let mut msg = String::new();
        stream.take(64).read_to_string(&mut msg).await?;
        if msg.trim() == READY_MESSAGE {
            Ok(())
        } else {
            Err(RestartError::BadHandshake(msg))
        }
    }
}

impl Drop for ReadyChannel {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::os::fd::IntoRawFd;

    /// Relaunches this test binary running only [`act_as_successor`], which
    /// adopts the listener and reports ready.
    pub(crate) fn ready_successor() -> Successor {
        Successor::new(
            std::env::current_exe().unwrap(),
            [
                "server::restart::tests::act_as_successor",
                "--exact",
                "--nocapture",
                "--test-threads=1",
            ],
        )
    }

    #[tokio::test]
    async fn act_as_successor() {
        // No-op unless launched by `ready_successor`.
        if std::env::var_os(READY_SOCKET_ENV).is_none() {
            return;
        }
        let listener = inherited_listener().unwrap().expect("listener handed down");
        assert!(listener.local_addr().is_ok());
        assert!(notify_ready().await.unwrap());
    }

    fn write_script(path: &Path, body: &str) {
        std::fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn socket_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("ready.sock")
    }

    fn loopback_listener() -> std::net::TcpListener {
        std::net::TcpListener::bind("127.0.0.1:0").unwrap()
    }

    #[tokio::test]
    async fn ready_handshake_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let channel = ReadyChannel::bind(socket_path(&dir)).unwrap();
        let path = channel.path().to_path_buf();

        let notifier = tokio::spawn(async move { signal_ready(&path).await });
        channel.wait().await.unwrap();
        notifier.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn unexpected_message_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let channel = ReadyChannel::bind(socket_path(&dir)).unwrap();
        let path = channel.path().to_path_buf();

        tokio::spawn(async move {
            let mut s = UnixStream::connect(path).await.unwrap();
            s.write_all(b"nope").await.unwrap();
            s.shutdown().await.unwrap();
        });

        assert!(matches!(
            channel.wait().await,
            Err(RestartError::BadHandshake(ref m)) if m == "nope"
        ));
    }

    #[tokio::test]
    async fn ready_socket_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = socket_path(&dir);
        let channel = ReadyChannel::bind(path.clone()).unwrap();
        assert!(path.exists());
        drop(channel);
        assert!(!path.exists());
    }

    #[test]
    fn adopts_a_listening_socket() {
        let listener = loopback_listener();
        let addr = listener.local_addr().unwrap();

        let adopted = adopt_listener(listener.into_raw_fd()).unwrap();

        assert_eq!(adopted.local_addr().unwrap(), addr);
    }

    #[tokio::test]
    async fn successor_receives_listener_on_stdin() {
        let listener = loopback_listener();
        let script = format!(
            "test -S /dev/stdin && test \"${INHERITED_LISTENER_ENV}\" = 0 \
             && test -S \"${READY_SOCKET_ENV}\" && exit 7; exit 1"
        );
        let successor = Successor::new("/bin/sh", ["-c", script.as_str()]);

        let err = hand_off(&listener, &successor, Duration::from_secs(5))
            .await
            .unwrap_err();

        match err {
            RestartError::SuccessorExited(status) => assert_eq!(status.code(), Some(7)),
            other => panic!("expected SuccessorExited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ready_successor_completes_the_handoff() {
        let listener = loopback_listener();

        let pid = hand_off(&listener, &ready_successor(), Duration::from_secs(30))
            .await
            .unwrap();

        assert_ne!(pid, 0);
    }

    #[tokio::test]
    async fn binary_replaced_on_disk_is_the_one_relaunched() {
        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("oath");
        write_script(&program, "exit 3");
        let upgrade = dir.path().join("oath.new");
        write_script(&upgrade, "exit 4");
        std::fs::rename(&upgrade, &program).unwrap();

        let successor =
            Successor::from_argv([program.clone().into_os_string(), "serve".into()], None).unwrap();
        assert_eq!(successor.program, program);
        assert_eq!(successor.args, vec![OsString::from("serve")]);

        let err = hand_off(&loopback_listener(), &successor, Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            RestartError::SuccessorExited(status) => assert_eq!(status.code(), Some(4)),
            other => panic!("expected SuccessorExited, got {other:?}"),
        }
    }

    #[test]
    fn bare_program_name_is_found_on_path() {
        let dir = tempfile::tempdir().unwrap();
        write_script(&dir.path().join("oath"), "exit 0");
        std::fs::write(dir.path().join("not-executable"), b"").unwrap();

        let found = resolve_program(OsStr::new("oath"), Some(dir.path().as_os_str()));
        assert_eq!(found, Some(dir.path().join("oath")));
        assert_eq!(
            resolve_program(OsStr::new("not-executable"), Some(dir.path().as_os_str())),
            None
        );
        assert_eq!(resolve_program(OsStr::new("oath"), None), None);
    }

    #[test]
    fn unresolvable_argv0_falls_back_to_running_executable() {
        let successor =
            Successor::from_argv([OsString::from("/nonexistent/oath")], None).unwrap();
        assert!(successor.program.is_file());
        assert!(successor.args.is_empty());
    }

    #[test]
    fn deleted_suffix_is_stripped() {
        assert_eq!(
            strip_deleted(PathBuf::from("/srv/oath/bin/oath (deleted)")),
            PathBuf::from("/srv/oath/bin/oath")
        );
        assert_eq!(
            strip_deleted(PathBuf::from("/srv/oath/bin/oath")),
            PathBuf::from("/srv/oath/bin/oath")
        );
    }

    #[tokio::test]
    async fn silent_successor_times_out() {
        let listener = loopback_listener();
        let successor = Successor::new("/bin/sh", ["-c", "sleep 10"]);

        let err = hand_off(&listener, &successor, Duration::from_millis(200))
            .await
            .unwrap_err();

        assert!(matches!(err, RestartError::Timeout(_)));
    }

    #[tokio::test]
    async fn missing_program_fails_to_spawn() {
        let listener = loopback_listener();
        let successor = Successor::new("/nonexistent/oath", Vec::<String>::new());

        let err = hand_off(&listener, &successor, Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(matches!(err, RestartError::Io(_)));
    }
}
