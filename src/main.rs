#[macro_use]
extern crate tracing;

use std::{
    io::{self, BufWriter},
    process::ExitCode,
    sync::Arc,
};

use dotenvy::dotenv;
use tokio::sync::watch;
use yansi::Paint;

use mmdb_lookup::{
    Callback, Config, Error, LookupEngine, MmdbReader, RecordForNetwork, cli::Cli, input,
    output::JsonLinesEmitter, trace,
};

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();

    let mut config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err.to_string().red().bold());
            return ExitCode::FAILURE;
        }
    };
    Cli::parse_args().apply(&mut config);

    if config.database.is_none() {
        eprintln!("error: {}\n", Error::MissingDatabase);
        eprintln!("{}", Cli::help());
        return ExitCode::FAILURE;
    }

    if let Err(err) = trace::init(&config.log) {
        eprintln!("{}", err.to_string().red().bold());
        return ExitCode::FAILURE;
    }
    debug!("{:#?}", config);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(code = err.code(), "{}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), Error> {
    let database = config.database.as_deref().ok_or(Error::MissingDatabase)?;

    if config.reads_stdin() {
        debug!("reading lookup keys from standard input");
    } else {
        debug!("reading lookup keys from {}", config.input);
    }
    let keys = input::open_input(&config.input).inspect_err(|_| {
        error!("An error occurred when opening the IP addresses file.");
    })?;
    let reader = MmdbReader::open(database).inspect_err(|_| {
        error!("An error occurred when opening the mmdb database file.");
    })?;
    info!("database {}", reader.info());

    let emitter = Arc::new(JsonLinesEmitter::new(BufWriter::new(io::stdout())));
    let callback: Callback = {
        let emitter = emitter.clone();
        Arc::new(move |key: &str, records: &[RecordForNetwork]| {
            if let Err(err) = emitter.emit(key, records) {
                error!(input = key, "An error occurred when writing records: {}", err);
            }
        })
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, waiting for lookups in flight");
            let _ = shutdown_tx.send(true);
        }
    });

    let mut engine = LookupEngine::new(reader).shutdown(shutdown_rx);
    if let Some(max) = config.max_concurrency {
        engine = engine.max_concurrency(max);
    }

    let (_, stats) = engine.run_iter_with_stats(keys, Some(callback)).await;
    emitter.flush()?;

    info!(
        keys = stats.dispatched,
        matched = stats.matched,
        failed = stats.failed,
        records = stats.records,
        interrupted = stats.stopped_early,
        "done"
    );
    Ok(())
}
