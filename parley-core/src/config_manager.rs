// Configuration manager for runtime configuration updates

use crate::config::{ParleyConfig, Theme};
use crate::error::Result;
use parking_lot::RwLock;
use std::sync::Arc;

type ConfigWatcherCallback = Box<dyn Fn(&ParleyConfig) + Send + Sync>;

/// Single owner of the process-wide configuration.
///
/// Handed explicitly to whoever needs it; every change goes through
/// [`ConfigManager::update`] or one of its helpers, which validate the new
/// value and notify the registered watchers.
#[derive(Clone)]
pub struct ConfigManager {
    config: Arc<RwLock<ParleyConfig>>,
    watchers: Arc<RwLock<Vec<ConfigWatcherCallback>>>,
}

impl ConfigManager {
    pub fn new(config: ParleyConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            watchers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Get current configuration
    pub fn get(&self) -> ParleyConfig {
        self.config.read().clone()
    }

    /// Replace the configuration
    pub fn update(&self, new_config: ParleyConfig) -> Result<()> {
        new_config.validate()?;

        *self.config.write() = new_config.clone();

        self.notify_watchers(&new_config);
        Ok(())
    }

    /// Apply a change to a copy of the current configuration, then
    /// validate and store it. The stored config is untouched on error.
    pub fn update_section<F>(&self, apply: F) -> Result<ParleyConfig>
    where
        F: FnOnce(&mut ParleyConfig),
    {
        let mut candidate = self.get();
        apply(&mut candidate);
        self.update(candidate.clone())?;
        Ok(candidate)
    }

    /// Flip between light and dark theme, returning the new theme
    pub fn toggle_theme(&self) -> Result<Theme> {
        let updated = self.update_section(|c| c.ui.theme = c.ui.theme.toggled())?;
        Ok(updated.ui.theme)
    }

    /// Watch for configuration changes
    pub fn watch(&self, watcher: ConfigWatcherCallback) {
        self.watchers.write().push(watcher);
    }

    fn notify_watchers(&self, config: &ParleyConfig) {
        let watchers = self.watchers.read();
        for watcher in watchers.iter() {
            watcher(config);
        }
    }
}

impl std::fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigManager")
            .field("config", &*self.config.read())
            .field("watchers", &self.watchers.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_toggle_theme_notifies_watchers() {
        let manager = ConfigManager::new(ParleyConfig::default());
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        manager.watch(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(manager.toggle_theme().unwrap(), Theme::Dark);
        assert_eq!(manager.get().ui.theme, Theme::Dark);
        assert_eq!(manager.toggle_theme().unwrap(), Theme::Light);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_invalid_update_is_rejected() {
        let manager = ConfigManager::new(ParleyConfig::default());
        let result = manager.update_section(|c| c.poll.interval_ms = 0);
        assert!(matches!(result, Err(Error::Configuration(_))));
        assert_eq!(manager.get().poll.interval_ms, 2000);
    }

    #[test]
    fn test_clones_share_state() {
        let manager = ConfigManager::new(ParleyConfig::default());
        let other = manager.clone();
        other
            .update_section(|c| c.interview.language = "Spanish".to_string())
            .unwrap();
        assert_eq!(manager.get().interview.language, "Spanish");
    }
}
