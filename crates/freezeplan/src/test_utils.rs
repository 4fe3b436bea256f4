//! Helpers shared by unit tests

/// Sets or unsets an environment variable and restores the previous value
/// when dropped, including when the test panics or returns early.
///
/// Tests holding one must be `#[serial]`.
#[must_use = "EnvGuard must be held in scope to restore the variable"]
pub(crate) struct EnvGuard {
    key: &'static str,
    original_value: Option<String>,
}

impl EnvGuard {
    pub(crate) fn set(key: &'static str, value: &str) -> Self {
        let original_value = std::env::var(key).ok();
        // SAFETY: tests touching the environment are serialized
        unsafe {
            std::env::set_var(key, value);
        }
        Self {
            key,
            original_value,
        }
    }

    pub(crate) fn unset(key: &'static str) -> Self {
        let original_value = std::env::var(key).ok();
        // SAFETY: tests touching the environment are serialized
        unsafe {
            std::env::remove_var(key);
        }
        Self {
            key,
            original_value,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        // SAFETY: restoring the environment to its original state
        unsafe {
            match self.original_value.take() {
                Some(original) => std::env::set_var(self.key, original),
                None => std::env::remove_var(self.key),
            }
        }
    }
}
