use clap::Parser;
use memdis::config::Config;
use memdis::{server, Error};
use std::fs::OpenOptions;
use std::sync::Mutex;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::parse();

    let subscriber = tracing_subscriber::fmt().with_max_level(config.log_level);
    match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            subscriber
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()?;
        }
        None => subscriber.with_writer(std::io::stderr).try_init()?,
    }

    server::run(config).await
}
