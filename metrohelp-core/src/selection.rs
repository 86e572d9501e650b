//! Process-wide display selection with validated, persisted mutation.

use std::sync::{PoisonError, RwLock};

use serde_json::{Map, Value};

use crate::cache::{Domain, PersistentCache};
use crate::config::KioskConfig;
use crate::model::{Language, Selection};

const DEFAULT_DEPARTURES_PER_STOP: u32 = 1;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Rejected selection change.
pub enum SelectionError {
    /// The requested value is not allowed; state is unchanged.
    #[error("Invalid selection for {field}: {reason}")]
    InvalidSelection {
        /// Selection field that was being set.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Owner of the current [`Selection`].
///
/// Setters validate their input, apply it, and write the full selection to the
/// cache before returning. They never trigger data refreshes.
pub struct SelectionState {
    current: RwLock<Selection>,
    // Held shared while publishing for a site, exclusively while switching sites.
    site_gate: RwLock<()>,
    site_names: Vec<String>,
    languages: Vec<Language>,
    cache: PersistentCache,
}

impl SelectionState {
    /// Restore the persisted selection, replacing each missing or invalid
    /// field with its default.
    #[must_use]
    pub fn load(config: &KioskConfig, cache: PersistentCache) -> Self {
        let site_names: Vec<String> = config.sites.iter().map(|site| site.name.clone()).collect();
        let languages = config.supported_languages.clone();

        let stored = match cache.get(Domain::Settings, None).map(|entry| entry.payload) {
            Some(Value::Object(fields)) => fields,
            Some(other) => {
                tracing::warn!(stored = %other, "Persisted settings are not an object, using defaults");
                Map::new()
            }
            None => Map::new(),
        };

        let language = restore_field(&stored, "language", |value| {
            value
                .as_str()
                .and_then(Language::from_code)
                .filter(|language| languages.contains(language))
        })
        .unwrap_or(config.default_language);

        let active_site = restore_field(&stored, "active_site", |value| {
            value
                .as_str()
                .filter(|name| site_names.iter().any(|site| site == name))
                .map(str::to_owned)
        })
        .or_else(|| site_names.first().cloned())
        .unwrap_or_default();

        let dark_mode = restore_field(&stored, "dark_mode", Value::as_bool).unwrap_or(false);

        let departures_per_stop = restore_field(&stored, "departures_per_stop", |value| {
            value
                .as_u64()
                .and_then(|count| u32::try_from(count).ok())
                .filter(|count| *count >= 1)
        })
        .unwrap_or(DEFAULT_DEPARTURES_PER_STOP);

        Self {
            current: RwLock::new(Selection {
                language,
                active_site,
                dark_mode,
                departures_per_stop,
            }),
            site_gate: RwLock::new(()),
            site_names,
            languages,
            cache,
        }
    }

    /// Snapshot of the current selection.
    #[must_use]
    pub fn get(&self) -> Selection {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Name of the active site.
    #[must_use]
    pub fn active_site(&self) -> String {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .active_site
            .clone()
    }

    /// Run `action` only while `site` is the active site.
    ///
    /// Site switches wait until `action` returns, so whatever it shows can
    /// never land on a different site. `action` must not change the active
    /// site itself.
    pub fn while_active<R>(&self, site: &str, action: impl FnOnce() -> R) -> Option<R> {
        let _gate = self.site_gate.read().unwrap_or_else(PoisonError::into_inner);
        if self.active_site() != site {
            return None;
        }
        Some(action())
    }

    /// Switch the display language.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::InvalidSelection`] for an unsupported language.
    pub fn set_language(&self, language: Language) -> Result<(), SelectionError> {
        if !self.languages.contains(&language) {
            return Err(invalid("language", format!("{language} is not supported")));
        }
        self.mutate(|selection| selection.language = language);
        Ok(())
    }

    /// Switch the active site.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::InvalidSelection`] for an unknown site name.
    pub fn set_active_site(&self, name: &str) -> Result<(), SelectionError> {
        if !self.site_names.iter().any(|site| site == name) {
            return Err(invalid("active_site", format!("no site named {name:?}")));
        }
        let _gate = self.site_gate.write().unwrap_or_else(PoisonError::into_inner);
        self.mutate(|selection| name.clone_into(&mut selection.active_site));
        Ok(())
    }

    /// Toggle the dark colour scheme.
    ///
    /// # Errors
    ///
    /// Never fails; the signature matches the other setters.
    pub fn set_dark_mode(&self, enabled: bool) -> Result<(), SelectionError> {
        self.mutate(|selection| selection.dark_mode = enabled);
        Ok(())
    }

    /// Set how many departures to list per stop.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::InvalidSelection`] when `count` is zero.
    pub fn set_departures_per_stop(&self, count: u32) -> Result<(), SelectionError> {
        if count == 0 {
            return Err(invalid("departures_per_stop", "must be at least 1".to_owned()));
        }
        self.mutate(|selection| selection.departures_per_stop = count);
        Ok(())
    }

    fn mutate(&self, apply: impl FnOnce(&mut Selection)) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        apply(&mut current);
        tracing::debug!(selection = ?*current, "Selection changed");
        if let Err(err) = self.cache.put(Domain::Settings, None, &*current) {
            tracing::warn!(error = %err, "Failed to persist selection");
        }
    }
}

fn invalid(field: &'static str, reason: String) -> SelectionError {
    SelectionError::InvalidSelection { field, reason }
}

fn restore_field<T>(
    stored: &Map<String, Value>,
    field: &str,
    parse: impl FnOnce(&Value) -> Option<T>,
) -> Option<T> {
    let value = stored.get(field)?;
    let parsed = parse(value);
    if parsed.is_none() {
        tracing::warn!(field, stored = %value, "Persisted setting is invalid, using default");
    }
    parsed
}
