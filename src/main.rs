use std::sync::Arc;

use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use sqlx::postgres::PgPoolOptions;

use rebate_engine::repositories::postgres::PgRewardStore;
use rebate_engine::services;
use rebate_engine::settings::Settings;

fn init_logging(settings: &rebate_engine::settings::Log) -> Result<(), anyhow::Error> {
    let level = settings
        .level
        .parse::<log::LevelFilter>()
        .unwrap_or(log::LevelFilter::Info);

    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d} {l} {t} - {m}{n}")))
        .build();
    let file = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d} {l} {t} - {m}{n}")))
        .build(&settings.file)?;

    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .appender(Appender::builder().build("file", Box::new(file)))
        .build(
            Root::builder()
                .appender("stdout")
                .appender("file")
                .build(level),
        )?;

    log4rs::init_config(config)?;

    Ok(())
}

#[tokio::main]
async fn main() {
    let config = Settings::new().expect("Could not load config file.");
    init_logging(&config.log).expect("Could not initialize logging.");

    let conn = PgPoolOptions::new()
        .max_connections(config.postgres.max_connections)
        .connect(&config.postgres.url)
        .await
        .expect("Could not connect to database.");

    sqlx::migrate!("./migrations")
        .run(&conn)
        .await
        .expect("Could not run migrations.");

    let store = Arc::new(PgRewardStore::new(conn));

    log::info!("Starting services.");
    let channels = services::start_services(store, config)
        .await
        .expect("Could not start services.");

    log::info!("Engine ready.");
    tokio::signal::ctrl_c()
        .await
        .expect("Could not listen for shutdown signal.");

    drop(channels);
    log::info!("Shutting down.");
}
