use std::{ffi::OsString, num::NonZeroUsize, path::PathBuf};

use clap::{CommandFactory, Parser};

use crate::Config;

#[derive(Parser, Debug)]
#[command(
    name = "mmdb_lookup",
    version,
    about = "Look up IP addresses and networks in a MaxMind DB file, one JSON record per line"
)]
pub struct Cli {
    #[arg(short = 'd', long = "db", value_name = "PATH", help = "A path of the database file")]
    pub database: Option<PathBuf>,
    #[arg(
        short = 'f',
        long = "file",
        value_name = "PATH",
        help = "A path of a file of IP addresses, `-` reads stdin [default: -]"
    )]
    pub input: Option<String>,
    #[arg(
        long,
        value_name = "N",
        help = "Maximum number of lookups in flight [default: unbounded]"
    )]
    pub max_concurrency: Option<NonZeroUsize>,
}

impl Cli {
    /// Parses the process arguments, accepting `-db` as a spelling of `--db`.
    pub fn parse_args() -> Self {
        Self::parse_from(normalize_args(std::env::args_os()))
    }

    /// Flags take precedence over values from the environment.
    pub fn apply(self, config: &mut Config) {
        if let Some(database) = self.database {
            config.database = Some(database);
        }
        if let Some(input) = self.input {
            config.input = input;
        }
        if let Some(max) = self.max_concurrency {
            config.max_concurrency = Some(max.get());
        }
    }

    pub fn help() -> String {
        Self::command().render_help().to_string()
    }
}

/// Rewrites the single-dash long flag `-db` to `--db`, which would otherwise be
/// read as `-d b`.
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    args.into_iter()
        .map(Into::into)
        .map(|arg| match arg.to_str() {
            Some("-db") => OsString::from("--db"),
            Some(s) if s.starts_with("-db=") => OsString::from(format!("-{s}")),
            _ => arg,
        })
        .collect()
}
