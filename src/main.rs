use std::sync::Arc;

mod cli;
mod config;
mod handler;
mod http;
mod logger;
mod server;
mod upstream;

use clap::Parser;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = cli::Args::try_parse().map(|a| a.backend).unwrap_or_else(|_| vec![String::new()]);
    let backend = match cli::parse_backend(&cli::program_name(), &args) {
        Ok(backend) => backend,
        Err(usage) => {
            println!("{usage}");
            std::process::exit(1);
        }
    };

    let cfg = config::Config::load()?;
    let profile = backend.profile(&cfg.profiles).clone();

    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
    }
    let runtime = runtime_builder.build()?;

    runtime.block_on(async_main(cfg, profile))
}

async fn async_main(cfg: config::Config, profile: config::ProfileConfig) -> Result<(), Box<dyn std::error::Error>> {
    logger::init(&cfg)?;

    let forward = Arc::new(config::ForwardConfig::from_profile(&profile, &cfg.forward.prefix));
    let upstream = upstream::UpstreamConnection::new(Arc::clone(&forward))?;
    let state = Arc::new(config::AppState::new(&cfg, Arc::clone(&forward), upstream));

    let addr = cfg.get_socket_addr()?;
    let listener = server::create_reusable_listener(addr)?;
    logger::log_server_start(&addr, &cfg, &forward);

    let listener = server::start_server_loop(listener, Arc::clone(&state), server::wait_for_shutdown()).await;

    drop(listener);
    logger::log_upstream_summary(
        state.upstream.target(),
        state.upstream.state().await,
        state.upstream.connects(),
        state.upstream.reconnects(),
    );
    state.upstream.close().await;
    logger::log_server_closed();
    Ok(())
}
