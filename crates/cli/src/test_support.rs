use std::sync::{Mutex, OnceLock};

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

/// Locks process environment mutation for the entire test body.
pub(crate) fn with_locked_env<R>(run: impl FnOnce() -> R) -> R {
    let _guard = env_lock().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    run()
}

/// Snapshot of a set of environment variables, restored on drop.
///
/// Only use inside `with_locked_env`.
pub(crate) struct ScopedEnv {
    saved: Vec<(String, Option<String>)>,
}

impl ScopedEnv {
    /// Records the current values of `keys` and clears them.
    pub(crate) fn cleared(keys: &[&str]) -> Self {
        let saved = keys
            .iter()
            .map(|key| (key.to_string(), std::env::var(key).ok()))
            .collect();
        for key in keys {
            remove_env_var(key);
        }
        Self { saved }
    }

    pub(crate) fn set(&self, key: &str, value: &str) {
        debug_assert!(
            self.saved.iter().any(|(k, _)| k == key),
            "{key} is not tracked by this ScopedEnv"
        );
        set_env_var(key, value);
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (key, value) in &self.saved {
            match value {
                Some(v) => set_env_var(key, v),
                None => remove_env_var(key),
            }
        }
    }
}

/// # Safety
/// `std::env` mutation is unsafe in edition 2024; callers hold `with_locked_env`.
fn set_env_var(key: &str, value: &str) {
    // SAFETY: serialized by `with_locked_env`.
    unsafe {
        std::env::set_var(key, value);
    }
}

fn remove_env_var(key: &str) {
    // SAFETY: serialized by `with_locked_env`.
    unsafe {
        std::env::remove_var(key);
    }
}
