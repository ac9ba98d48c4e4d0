//! Process-wide native speech runtime and platform detection

use log::{debug, info};
use once_cell::sync::Lazy;
use std::fs;
use std::sync::{Mutex, MutexGuard};

/// Number of live [`NativeRuntime`] guards
static RUNTIME_USERS: Lazy<Mutex<usize>> = Lazy::new(|| Mutex::new(0));

fn users() -> MutexGuard<'static, usize> {
    // A panic while holding the count cannot leave it half-updated
    RUNTIME_USERS.lock().unwrap_or_else(|e| e.into_inner())
}

/// Guard keeping the native speech runtime alive
///
/// The first guard performs one-time initialization and the last one
/// dropped tears it down. Native engines may only be created while at
/// least one guard exists.
#[derive(Debug)]
pub struct NativeRuntime {
    _private: (),
}

impl NativeRuntime {
    pub fn acquire() -> Self {
        let mut count = users();
        if *count == 0 {
            info!(
                "Starting native speech runtime ({}{})",
                std::env::consts::OS,
                if is_wsl() { ", WSL" } else { "" }
            );
        }
        *count += 1;
        debug!("Native speech runtime users: {}", *count);
        Self { _private: () }
    }
}

impl Drop for NativeRuntime {
    fn drop(&mut self) {
        let mut count = users();
        *count = count.saturating_sub(1);
        if *count == 0 {
            info!("Native speech runtime shut down");
        }
    }
}

/// True while at least one [`NativeRuntime`] guard is alive
pub fn runtime_active() -> bool {
    *users() > 0
}

/// Detect if running in WSL (Windows Subsystem for Linux)
///
/// Speech Dispatcher is rarely running there, so native engines usually
/// fail to initialize and the factory falls back to the mock.
pub fn is_wsl() -> bool {
    if let Ok(contents) = fs::read_to_string("/proc/version") {
        let lower = contents.to_lowercase();
        if lower.contains("microsoft") || lower.contains("wsl") {
            return true;
        }
    }

    std::env::var("WSL_DISTRO_NAME").is_ok()
}
