//! Construction-time settings for a [`Registry`](crate::Registry).

/// Slot count used when nothing else is requested. Matches the size the
/// binding allocates for its one registry at startup.
pub const DEFAULT_CAPACITY: usize = 16;

/// Slot 0 is reserved, so a table needs at least one usable slot beside it.
pub const MIN_CAPACITY: usize = 2;

const CAPACITY_VAR: &str = "LUCY_REGISTRY_CAPACITY";
const PROFILE_VAR: &str = "LUCY_REGISTRY_PROFILE";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Initial slot count, clamped to [`MIN_CAPACITY`].
    pub initial_capacity: usize,
    /// Count operations in [`RegistryStats`](crate::RegistryStats).
    pub profile: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_CAPACITY,
            profile: false,
        }
    }
}

impl RegistryConfig {
    /// Defaults overridden by `LUCY_REGISTRY_CAPACITY` and
    /// `LUCY_REGISTRY_PROFILE`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn with_initial_capacity(mut self, initial_capacity: usize) -> Self {
        self.initial_capacity = initial_capacity;
        self
    }

    pub fn with_profile(mut self, profile: bool) -> Self {
        self.profile = profile;
        self
    }

    pub(crate) fn capacity(&self) -> usize {
        self.initial_capacity.max(MIN_CAPACITY)
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(raw) = lookup(CAPACITY_VAR) {
            match raw.trim().parse::<usize>() {
                Ok(capacity) => config.initial_capacity = capacity,
                Err(err) => tracing::warn!(
                    var = CAPACITY_VAR,
                    value = %raw,
                    error = %err,
                    "ignoring unparsable registry capacity"
                ),
            }
        }
        config.profile = lookup(PROFILE_VAR)
            .map(|val| !val.is_empty() && val != "0")
            .unwrap_or(false);
        config
    }
}
