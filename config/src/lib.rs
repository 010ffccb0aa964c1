#[macro_use]
extern crate tracing;

mod app_config;
mod args;
mod options;
mod percentiles;

use app_config::AppConfig;
pub use app_config::get_config_dir;
pub use args::{
    Args,
    Command,
    MeasureArgs,
};
pub use options::{
    MeasureOptions,
    OutputFormat,
    ValidationError,
};
pub use percentiles::normalize_percentiles;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    collections::HashMap,
    path::Path,
    time::Duration,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(flatten, skip_serializing)]
    pub app_config: AppConfig,
    #[serde(with = "human_duration")]
    pub sampling_interval: Duration,
    #[serde(with = "human_duration")]
    pub progress_interval: Duration,
    #[serde(default)]
    pub pretty_json: bool,
}

const DEFAULT_CONFIG: &str = include_str!("default-config.yaml");

impl config::Source for Config {
    fn clone_into_box(&self) -> Box<dyn config::Source + Send + Sync> {
        Box::new((*self).clone())
    }

    fn collect(&self) -> Result<config::Map<String, config::Value>, config::ConfigError> {
        let mut cache = HashMap::<String, config::Value>::new();
        cache.insert(
            "sampling_interval".to_string(),
            humantime::format_duration(self.sampling_interval).to_string().into(),
        );
        cache.insert(
            "progress_interval".to_string(),
            humantime::format_duration(self.progress_interval).to_string().into(),
        );
        cache.insert("pretty_json".to_string(), self.pretty_json.into());
        Ok(cache)
    }
}

impl Config {
    /// Built-in defaults, shipped inside the binary.
    pub fn defaults() -> Result<Self, config::ConfigError> {
        serde_yml::from_str(DEFAULT_CONFIG).map_err(|err| config::ConfigError::Foreign(Box::new(err)))
    }

    /// Layers defaults, `config.yaml` from the config directory, `BPFSTAT_*` environment
    /// variables and finally the command line.
    pub fn new(args: &Args) -> Result<Self, config::ConfigError> {
        Self::load(&get_config_dir(), environment(), args)
    }

    #[instrument(level = "debug", skip(environment, args))]
    fn load(config_dir: &Path, environment: config::Environment, args: &Args) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("config_dir", config_dir.to_string_lossy().to_string())?
            .add_source(Self::defaults()?);

        let config_files = [("config.yaml", config::FileFormat::Yaml)];

        for (file, format) in &config_files {
            let source = config::File::from(config_dir.join(file))
                .format(*format)
                .required(false);
            builder = builder.add_source(source);
        }

        builder = builder
            .add_source(environment)
            .add_source(args.clone());

        let cfg: Self = builder.build()?.try_deserialize()?;
        debug!(
            sampling_interval = %humantime::format_duration(cfg.sampling_interval),
            progress_interval = %humantime::format_duration(cfg.progress_interval),
            pretty_json = cfg.pretty_json,
            "Configuration loaded"
        );

        Ok(cfg)
    }

    pub fn config_dir(&self) -> &Path {
        &self.app_config.config_dir
    }
}

/// `BPFSTAT_SAMPLING_INTERVAL=50ms` and friends.
fn environment() -> config::Environment {
    config::Environment::with_prefix(&app_config::PROJECT_NAME).try_parsing(true)
}

mod human_duration {
    use serde::{
        de::Error as _,
        Deserialize,
        Deserializer,
        Serializer,
    };
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let value = String::deserialize(deserializer)?;
        humantime::parse_duration(&value).map_err(D::Error::custom)
    }
}
