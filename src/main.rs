use auth_service::cli::{
    Args, build_config, handle_create_admin, init_logging, load_previous_public_keys,
    load_private_key, load_refresh_secret, open_database, take_admin_password,
};
use auth_service::keys::{RefreshSecret, SigningKey};
use auth_service::{init_cleanup, run_server};
use clap::Parser;
use tracing::{error, info};

/// Secrets are read (and their env vars removed) here, before any runtime
/// thread exists.
fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some(signing_key) = load_private_key(args.private_key_file.as_deref()) else {
        std::process::exit(1);
    };

    let Some(previous_public_keys) = load_previous_public_keys(&args.previous_public_key_file)
    else {
        std::process::exit(1);
    };

    let Some(refresh_secret) = load_refresh_secret(args.refresh_secret_file.as_deref()) else {
        std::process::exit(1);
    };

    let admin = match args.create_admin.clone() {
        Some(email) => match take_admin_password() {
            Some(password) => Some((email, password)),
            None => std::process::exit(1),
        },
        None => None,
    };

    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        error!(error = %e, "Failed to start tokio runtime");
        std::process::exit(1);
    });
    runtime.block_on(serve(
        args,
        signing_key,
        previous_public_keys,
        refresh_secret,
        admin,
    ));
}

async fn serve(
    args: Args,
    signing_key: SigningKey,
    previous_public_keys: Vec<Vec<u8>>,
    refresh_secret: RefreshSecret,
    admin: Option<(String, String)>,
) {
    let Some(db) = open_database(&args.database).await else {
        std::process::exit(1);
    };

    if let Some((email, password)) = admin {
        handle_create_admin(&db, &email, password).await;
    }

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    let config = build_config(&args, db, signing_key, previous_public_keys, refresh_secret);
    init_cleanup(&config).await;

    match listener.local_addr() {
        Ok(local_addr) => info!(address = %local_addr, "Listening"),
        Err(_) => info!(address = %addr, "Listening"),
    }

    if let Err(e) = run_server(config, listener).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
