use chrono::{Local, SecondsFormat};
use tracing_subscriber::{
    fmt::{self, time},
    prelude::*,
};

use crate::{Error, config::Log};

pub fn init(log: &Log) -> Result<(), Error> {
    let is_color = log.style.is_color();
    if !is_color {
        yansi::disable();
    }
    let format = fmt::layer()
        .with_timer(LocalTime)
        .with_ansi(is_color)
        .with_writer(std::io::stderr);
    let filter = log.targets()?;

    tracing_subscriber::registry()
        .with(format)
        .with(filter)
        .init();
    Ok(())
}

struct LocalTime;

impl time::FormatTime for LocalTime {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            Local::now().to_rfc3339_opts(SecondsFormat::Millis, false)
        )
    }
}
