use anyhow::Context;
use clap::Parser;
use htmlshot::config::ServiceConfig;
use htmlshot::server::Server;
use htmlshot::{ScreenshotHandler, ScreenshotService};
use log::info;

fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    config.validate()?;

    // Resolve (and possibly download) the browser before the runtime starts:
    // the download uses blocking I/O.
    let source = config.executable_source();
    let executable = source
        .resolve()
        .with_context(|| format!("Failed to locate browser executable ({:?})", source))?;
    match &executable {
        Some(path) => info!("Using browser executable {}", path.display()),
        None => info!("Using the browser found on this system"),
    }

    let handler = ScreenshotHandler::new(htmlshot::new_launcher(), config.handler_config(executable));
    let service = ScreenshotService::new(handler, config.max_duration());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(async move {
        let server = Server::bind(config.listen, service, config.max_body_bytes)?;
        let shutdown = server.shutdown_handle();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutting down");
                shutdown.shutdown();
            }
        });
        server.run().await?;
        Ok::<(), anyhow::Error>(())
    })
}
