//! Host effects and replay-time write interception.
//!
//! The enumerated side effects (outbound mail, file writes, environment
//! writes) go through the [`HostEffects`] capability. The default
//! implementation performs them; the replay implementation no-ops each call
//! and logs a WRITE BLOCKED line. Reads are never intercepted, and HTTP is
//! deliberately out of scope here: tool-level caching covers it because read
//! and write intent cannot be told apart at the wire level.
//!
//! For hosts that cannot inject the capability, [`intercept_scope`] flips a
//! process-wide switch: while at least one scope is alive, [`effects`]
//! resolves to the blocking implementation. Activation is reference-counted
//! behind a process global so nested scopes restore the correct prior state
//! on every exit path, including panics.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use tracing::{info, warn};

/// File-open intent that creates or mutates the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Truncate,
    Append,
    /// Create-new, failing if the file exists
    Exclusive,
}

/// Outbound SMTP transport wired in by the embedding application.
/// The core ships no SMTP glue of its own.
pub trait Mailer: Send + Sync {
    fn login(&self, host: &str, username: &str) -> io::Result<()>;
    fn send_message(&self, to: &str, subject: &str, body: &str) -> io::Result<()>;
    fn sendmail(&self, from: &str, to: &[String], message: &str) -> io::Result<()>;
}

/// The write operations replay must be able to neutralize
pub trait HostEffects: Send + Sync {
    fn smtp_login(&self, host: &str, username: &str) -> io::Result<()>;
    fn send_message(&self, to: &str, subject: &str, body: &str) -> io::Result<()>;
    fn sendmail(&self, from: &str, to: &[String], message: &str) -> io::Result<()>;
    fn open_write(&self, path: &Path, mode: WriteMode) -> io::Result<Box<dyn Write + Send>>;
    fn set_env(&self, key: &str, value: &str) -> io::Result<()>;
}

/// Performs real effects. SMTP requires an injected [`Mailer`].
pub struct RealEffects {
    mailer: Option<Box<dyn Mailer>>,
}

impl RealEffects {
    pub fn new() -> Self {
        Self { mailer: None }
    }

    pub fn with_mailer(mailer: Box<dyn Mailer>) -> Self {
        Self {
            mailer: Some(mailer),
        }
    }

    fn mailer(&self) -> io::Result<&dyn Mailer> {
        self.mailer.as_deref().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Unsupported, "no SMTP transport configured")
        })
    }
}

impl Default for RealEffects {
    fn default() -> Self {
        Self::new()
    }
}

impl HostEffects for RealEffects {
    fn smtp_login(&self, host: &str, username: &str) -> io::Result<()> {
        self.mailer()?.login(host, username)
    }

    fn send_message(&self, to: &str, subject: &str, body: &str) -> io::Result<()> {
        self.mailer()?.send_message(to, subject, body)
    }

    fn sendmail(&self, from: &str, to: &[String], message: &str) -> io::Result<()> {
        self.mailer()?.sendmail(from, to, message)
    }

    fn open_write(&self, path: &Path, mode: WriteMode) -> io::Result<Box<dyn Write + Send>> {
        let file: File = match mode {
            WriteMode::Truncate => OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?,
            WriteMode::Append => OpenOptions::new().append(true).create(true).open(path)?,
            WriteMode::Exclusive => OpenOptions::new().write(true).create_new(true).open(path)?,
        };
        Ok(Box::new(file))
    }

    fn set_env(&self, key: &str, value: &str) -> io::Result<()> {
        // Process environment mutation is inherently racy with other threads
        // reading it; callers own that coordination.
        unsafe { std::env::set_var(key, value) };
        Ok(())
    }
}

/// Sink that accepts and discards all writes
struct NullWriter;

impl Write for NullWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Replay implementation: every write becomes a logged no-op.
#[derive(Default)]
pub struct ReplayEffects {
    blocked: AtomicUsize,
}

impl ReplayEffects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of writes neutralized since construction.
    pub fn blocked_count(&self) -> usize {
        self.blocked.load(Ordering::SeqCst)
    }

    fn block(&self, operation: &str, detail: &str) {
        self.blocked.fetch_add(1, Ordering::SeqCst);
        warn!(operation, detail, "WRITE BLOCKED during replay");
    }
}

impl HostEffects for ReplayEffects {
    fn smtp_login(&self, host: &str, username: &str) -> io::Result<()> {
        self.block("smtp_login", &format!("{}@{}", username, host));
        Ok(())
    }

    fn send_message(&self, to: &str, _subject: &str, _body: &str) -> io::Result<()> {
        self.block("send_message", to);
        Ok(())
    }

    fn sendmail(&self, from: &str, to: &[String], _message: &str) -> io::Result<()> {
        self.block("sendmail", &format!("{} -> {}", from, to.join(",")));
        Ok(())
    }

    fn open_write(&self, path: &Path, _mode: WriteMode) -> io::Result<Box<dyn Write + Send>> {
        self.block("open_write", &path.display().to_string());
        Ok(Box::new(NullWriter))
    }

    fn set_env(&self, key: &str, _value: &str) -> io::Result<()> {
        self.block("set_env", key);
        Ok(())
    }
}

struct InterceptorState {
    depth: Mutex<usize>,
    real: Arc<RealEffects>,
    replay: Arc<ReplayEffects>,
}

static INTERCEPTOR: Lazy<InterceptorState> = Lazy::new(|| InterceptorState {
    depth: Mutex::new(0),
    real: Arc::new(RealEffects::new()),
    replay: Arc::new(ReplayEffects::new()),
});

/// Resolve the active effects implementation: the replay no-op while any
/// interception scope is alive, the real one otherwise.
pub fn effects() -> Arc<dyn HostEffects> {
    let depth = INTERCEPTOR.depth.lock().unwrap_or_else(|e| e.into_inner());
    if *depth > 0 {
        INTERCEPTOR.replay.clone()
    } else {
        INTERCEPTOR.real.clone()
    }
}

/// The process-global replay implementation, for inspecting blocked counts.
pub fn replay_effects() -> Arc<ReplayEffects> {
    INTERCEPTOR.replay.clone()
}

/// RAII scope for process-wide interception. Nestable; the switch flips off
/// only when the outermost scope drops.
pub struct InterceptGuard {
    _private: (),
}

pub fn intercept_scope() -> InterceptGuard {
    let mut depth = INTERCEPTOR.depth.lock().unwrap_or_else(|e| e.into_inner());
    *depth += 1;
    if *depth == 1 {
        info!("write side-effect interception activated");
    }
    InterceptGuard { _private: () }
}

impl Drop for InterceptGuard {
    fn drop(&mut self) {
        let mut depth = INTERCEPTOR.depth.lock().unwrap_or_else(|e| e.into_inner());
        *depth = depth.saturating_sub(1);
        if *depth == 0 {
            info!("write side-effect interception deactivated");
        }
    }
}

/// Whether an interception scope is currently active.
pub fn interception_active() -> bool {
    let depth = INTERCEPTOR.depth.lock().unwrap_or_else(|e| e.into_inner());
    *depth > 0
}
