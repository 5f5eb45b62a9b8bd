use super::planning::{PlanningConfig, PlanningLogLevel};
use std::path::Path;
use std::sync::Arc;

/// Static mutex holding the global configuration, initialized as `None`.
static TILEFLOW_GLOBAL_CONFIG: spin::Mutex<Option<Arc<GlobalConfig>>> = spin::Mutex::new(None);

/// Represents the global configuration for tileflow.
#[derive(Default, Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct GlobalConfig {
    /// Configuration for the planning passes.
    #[serde(default)]
    pub planning: PlanningConfig,
}

impl GlobalConfig {
    /// Retrieves the current global configuration, loading it from the current directory if not set.
    ///
    /// If no configuration is set, it attempts to load one from `tileflow.toml` or `Tileflow.toml`
    /// in the current directory or its parents. If no file is found, a default configuration is
    /// used. Environment overrides are applied last.
    pub fn get() -> Arc<Self> {
        let mut state = TILEFLOW_GLOBAL_CONFIG.lock();
        if let Some(config) = state.as_ref() {
            return config.clone();
        }

        let config = Arc::new(Self::from_current_dir().override_from_env());
        *state = Some(config.clone());
        config
    }

    /// Sets the global configuration to the provided value.
    ///
    /// # Panics
    /// Panics if the configuration has already been set or read, as it cannot be overridden.
    pub fn set(config: Self) {
        let mut state = TILEFLOW_GLOBAL_CONFIG.lock();
        if state.is_some() {
            panic!("Cannot set the global configuration multiple times.");
        }
        *state = Some(Arc::new(config));
    }

    /// Save the current configuration to the provided file path.
    pub fn save_default<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
        let config = Self::get();
        let content = toml::to_string_pretty(config.as_ref())
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
        std::fs::write(path, content)
    }

    /// Parses a configuration from its TOML representation.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Overrides configuration fields based on environment variables.
    pub fn override_from_env(self) -> Self {
        self.override_from(|key| std::env::var(key).ok())
    }

    fn override_from<F: Fn(&str) -> Option<String>>(mut self, var: F) -> Self {
        if let Some(val) = var("TILEFLOW_DEBUG_LOG") {
            self.planning.logger.level = PlanningLogLevel::Basic;

            match val.as_str() {
                "stdout" => self.planning.logger.stdout = true,
                "stderr" => self.planning.logger.stderr = true,
                "1" | "true" => self.planning.logger.file = Some("/tmp/tileflow.log".into()),
                "0" | "false" => self.planning.logger.level = PlanningLogLevel::Disabled,
                file_path => self.planning.logger.file = Some(file_path.into()),
            }
        }

        if let Some(val) = var("TILEFLOW_DEBUG_OPTION") {
            match val.as_str() {
                "basic" => self.planning.logger.level = PlanningLogLevel::Basic,
                "full" => self.planning.logger.level = PlanningLogLevel::Full,
                other => log::warn!("Ignoring unknown TILEFLOW_DEBUG_OPTION value `{other}`"),
            }
        }

        self
    }

    // Traverses up the directory tree until a valid configuration file is found or the root is
    // reached.
    fn from_current_dir() -> Self {
        let Ok(mut dir) = std::env::current_dir() else {
            return Self::default();
        };

        loop {
            for name in ["tileflow.toml", "Tileflow.toml"] {
                if let Some(config) = Self::from_file_path(dir.join(name)) {
                    return config;
                }
            }

            if !dir.pop() {
                break;
            }
        }

        Self::default()
    }

    fn from_file_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).ok()?;

        match Self::from_toml(&content) {
            Ok(config) => Some(config),
            Err(err) => {
                log::warn!("Ignoring malformed config file {}: {err}", path.display());
                None
            }
        }
    }
}
