use std::path::PathBuf;

use config::{Config as ConfigLoader, Environment, builder::ConfigBuilder, builder::DefaultState};
use is_terminal::IsTerminal;
use serde::Deserialize;
use tracing_subscriber::filter::Targets;
use validator::{Validate, ValidationError};

use crate::Error;

const PREFIX: &str = "MMDB_LOOKUP";

pub const STDIN_INPUT: &str = "-";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LogStyle {
    #[default]
    Auto,
    Always,
    Never,
}

impl LogStyle {
    pub fn is_color(&self) -> bool {
        match self {
            // logs go to stderr, stdout carries the records
            LogStyle::Auto => std::io::stderr().is_terminal(),
            LogStyle::Always => true,
            LogStyle::Never => false,
        }
    }
}

impl<'de> Deserialize<'de> for LogStyle {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?.to_lowercase();
        match s.as_str() {
            "auto" => Ok(LogStyle::Auto),
            "always" => Ok(LogStyle::Always),
            "never" => Ok(LogStyle::Never),
            _ => Err(serde::de::Error::unknown_variant(
                &s,
                &["auto", "always", "never"],
            )),
        }
    }
}

#[derive(Deserialize, Debug, Validate)]
#[serde(default)]
pub struct Log {
    #[validate(custom(function = "validate_level"))]
    pub level: String,
    pub style: LogStyle,
}

impl Default for Log {
    fn default() -> Self {
        Log {
            level: Self::level(),
            style: LogStyle::default(),
        }
    }
}

impl Log {
    fn level() -> String {
        String::from("mmdb_lookup=info")
    }

    pub fn targets(&self) -> Result<Targets, Error> {
        self.level
            .parse()
            .map_err(|_| Error::Validation(level_error(&self.level)))
    }
}

fn validate_level(level: &str) -> Result<(), ValidationError> {
    match level.parse::<Targets>() {
        Ok(_) => Ok(()),
        Err(e) => {
            let mut error = ValidationError::new("level");
            error.message = Some(format!("{:?} is not a valid log filter: {}", level, e).into());
            Err(error)
        }
    }
}

fn level_error(level: &str) -> validator::ValidationErrors {
    let mut errors = validator::ValidationErrors::new();
    if let Err(err) = validate_level(level) {
        errors.add("level", err);
    }
    errors
}

#[derive(Deserialize, Debug, Validate)]
#[serde(default)]
pub struct Config {
    #[validate(nested)]
    pub log: Log,
    pub database: Option<PathBuf>,
    pub input: String,
    #[validate(range(min = 1))]
    pub max_concurrency: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log: Log::default(),
            database: None,
            input: Self::input(),
            max_concurrency: None,
        }
    }
}

impl Config {
    fn input() -> String {
        String::from(STDIN_INPUT)
    }

    /// Reads `MMDB_LOOKUP_*` variables, e.g. `MMDB_LOOKUP_DATABASE` or
    /// `MMDB_LOOKUP__LOG__LEVEL`.
    pub fn load() -> Result<Self, Error> {
        let builder = ConfigLoader::builder()
            .add_source(
                Environment::with_prefix(PREFIX)
                    .separator("_")
                    .try_parsing(true),
            )
            .add_source(
                Environment::with_prefix(PREFIX)
                    .separator("__")
                    .prefix_separator("_")
                    .try_parsing(true),
            );
        Self::from_builder(builder)
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, Error> {
        let config = builder.build()?.try_deserialize::<Config>()?;
        config.validate()?;
        Ok(config)
    }

    pub fn reads_stdin(&self) -> bool {
        self.input == STDIN_INPUT
    }
}
