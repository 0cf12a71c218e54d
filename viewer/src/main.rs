//! An HTTP server for uploading DICOM files
//! and viewing their attributes and first image frame.
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use dicom_viewer::http::{router, ServerConfig};
use dicom_viewer::{BlobStore, Service};
use snafu::{Report, ResultExt, Whatever};
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// DICOM upload and viewer server
#[derive(Debug, Parser)]
#[command(version)]
struct App {
    /// Verbose mode
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
    /// Output directory for uploaded files
    #[arg(short = 'o', long = "out-dir", default_value = "./uploads")]
    out_dir: PathBuf,
    /// Which address to listen on
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    host: IpAddr,
    /// Which port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,
    /// Maximum size of an uploaded file, in MiB
    #[arg(
        long = "max-upload-size",
        default_value = "512",
        value_parser(clap::value_parser!(u32).range(1..))
    )]
    max_upload_size: u32,
}

fn main() {
    let app = App::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(Level::DEBUG)
            .with_env_filter(
                EnvFilter::from_default_env()
                    .add_directive("tower_http=info".parse().unwrap())
                    .add_directive(if app.verbose {
                        "dicom_viewer=debug".parse().unwrap()
                    } else {
                        "dicom_viewer=info".parse().unwrap()
                    }),
            )
            .finish(),
    )
    .whatever_context("Could not set up global logging subscriber")
    .unwrap_or_else(|e: Whatever| {
        eprintln!("[ERROR] {}", Report::from_error(e));
    });

    let store = BlobStore::open(&app.out_dir).unwrap_or_else(|e| {
        error!(
            "Could not create output directory {}: {}",
            app.out_dir.display(),
            e
        );
        std::process::exit(-2);
    });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            error!("Could not start runtime: {}", e);
            std::process::exit(-2);
        });
    runtime.block_on(async move {
        run(app, store).await.unwrap_or_else(|e| {
            error!("{}", Report::from_error(e));
            std::process::exit(-2);
        });
    });
}

async fn run(app: App, store: BlobStore) -> Result<(), Whatever> {
    let config = ServerConfig {
        max_upload_size: (app.max_upload_size as usize).saturating_mul(1024 * 1024),
    };
    info!("Storing uploads in {}", store.root().display());
    let router = router(Arc::new(Service::new(store)), &config);

    let listen_addr = SocketAddr::new(app.host, app.port);
    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_whatever_context(|_| format!("Could not listen on {}", listen_addr))?;
    info!("Listening on: http://{}", listen_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .whatever_context("Server failed")?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutting down"),
        Err(e) => {
            warn!("Could not listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
