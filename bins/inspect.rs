use dotenvy::dotenv;
use tracing::{error, info};

fn init_logging() {
    // load .env first so RUST_LOG and DATABASE_URL are visible
    dotenv().ok();
    common::utils::logging::init_logging_default();
}

/// Print every entry of the configured store as pretty JSON on stdout.
#[tokio::main]
async fn main() -> std::process::ExitCode {
    init_logging();

    let cfg = match configs::AppConfig::load_and_validate() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(event = "config_invalid", error = %e, "failed to load configuration");
            return std::process::ExitCode::FAILURE;
        }
    };
    if !cfg.database.has_url() {
        if let Err(e) = common::env::ensure_store_dir(&cfg.store.location).await {
            error!(event = "store_dir_failed", error = %e, "cannot prepare store location");
            return std::process::ExitCode::FAILURE;
        }
    }

    let result = async {
        let db = elegantdb::open_from_config(&cfg)?;
        db.ready().await?;
        info!(adaptor = db.adaptor_name(), location = db.location(), "store opened");
        let entries = db.all().await?;
        Ok::<_, elegantdb::StoreError>(serde_json::to_string_pretty(&entries)?)
    }
    .await;

    match result {
        Ok(body) => {
            println!("{body}");
            std::process::ExitCode::SUCCESS
        }
        Err(e) => {
            error!(event = "inspect_failed", code = e.code(), expected = e.expected(), error = %e, "cannot read store");
            std::process::ExitCode::FAILURE
        }
    }
}
