//! Process-wide runtime context.
//!
//! Holds the state that the original kept in module globals: the matcher
//! alias database, the reference clock for `today` and age thresholds, and
//! the cooperative shutdown flag. Initialised once; all later `init` calls
//! are ignored so tests and libraries can preconfigure it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use crate::config::ConfigFile;
use crate::error::Result;
use crate::matcher::aliases::AliasDatabase;
use crate::types::Time;

pub struct Runtime {
    aliases: RwLock<AliasDatabase>,
    /// Fixed reference instant for tests; `None` means the wall clock.
    reference_time: RwLock<Option<Time>>,
    shutdown: Arc<AtomicBool>,
}

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

impl Runtime {
    fn new() -> Self {
        Self {
            aliases: RwLock::new(AliasDatabase::new()),
            reference_time: RwLock::new(None),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn get() -> &'static Runtime {
        RUNTIME.get_or_init(Runtime::new)
    }

    // ── Aliases ────────────────────────────────────────────────────

    /// Load the alias database from a parsed configuration, replacing the
    /// current one.
    pub fn load_aliases(&self, cfg: &ConfigFile) -> Result<()> {
        let db = AliasDatabase::from_config(cfg)?;
        *self.aliases.write().unwrap() = db;
        Ok(())
    }

    /// Load aliases from the file named by `ARKI_ALIASES`, if set.
    pub fn load_aliases_from_env(&self) -> Result<()> {
        if let Ok(path) = std::env::var("ARKI_ALIASES") {
            let cfg = ConfigFile::read_file(&PathBuf::from(path))?;
            self.load_aliases(&cfg)?;
        }
        Ok(())
    }

    pub fn with_aliases<T>(&self, f: impl FnOnce(&AliasDatabase) -> T) -> T {
        f(&self.aliases.read().unwrap())
    }

    // ── Clock ──────────────────────────────────────────────────────

    /// The instant used for `reftime:==today` and age thresholds.
    pub fn reference_time(&self) -> Time {
        self.reference_time
            .read()
            .unwrap()
            .unwrap_or_else(Time::now)
    }

    /// Pin the clock, for tests and reproducible maintenance runs.
    pub fn set_reference_time(&self, t: Option<Time>) {
        *self.reference_time.write().unwrap() = t;
    }

    // ── Shutdown ───────────────────────────────────────────────────

    /// Install SIGINT/SIGTERM handlers that raise the shutdown flag.
    pub fn install_signal_handlers(&self) -> Result<()> {
        for sig in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
            signal_hook::flag::register(sig, self.shutdown.clone())
                .map_err(|e| crate::error::ArkiError::io("signal handler", e))?;
        }
        Ok(())
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Return `Err(ShutdownRequested)` if a signal arrived; long operations
    /// call this between units of work.
    pub fn check_shutdown(&self) -> Result<()> {
        if self.shutdown_requested() {
            Err(crate::error::ArkiError::ShutdownRequested)
        } else {
            Ok(())
        }
    }
}

/// Serialises tests that pin the process-wide reference clock.
#[cfg(test)]
pub(crate) static TEST_CLOCK_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_time_override() {
        let _guard = TEST_CLOCK_LOCK.lock().unwrap();
        let rt = Runtime::get();
        rt.set_reference_time(Some(Time::new(2009, 8, 1, 0, 0, 0)));
        assert_eq!(rt.reference_time(), Time::new(2009, 8, 1, 0, 0, 0));
        rt.set_reference_time(None);
        // Back on the wall clock: the year is at least the build year.
        assert!(rt.reference_time().ye >= 2024);
    }

    #[test]
    fn test_shutdown_flag_starts_clear() {
        assert!(Runtime::get().check_shutdown().is_ok());
    }
}
