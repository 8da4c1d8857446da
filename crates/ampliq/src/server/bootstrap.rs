//! Wiring of configuration, storage and the remote session into a running
//! dispatch service.

use crate::server::config::SchedulerConfig;
use crate::server::dispatch::{DispatchStats, Dispatcher, create_dispatch_service};
use crate::server::remote::SshSession;
use crate::server::store::FileJobStore;

pub fn create_dispatcher(config: SchedulerConfig) -> crate::Result<Dispatcher> {
    let store = FileJobStore::open(&config.data_dir)?;
    let session = SshSession::new(config.remote_host.clone(), config.remote_timeout())?;
    Ok(Dispatcher::new(config, Box::new(store), Box::new(session)))
}

/// Runs the dispatch scheduler until the process receives an interrupt. The
/// cycle that is running when the interrupt arrives is allowed to finish.
pub async fn run_scheduler(config: SchedulerConfig) -> crate::Result<()> {
    log::info!(
        "Starting dispatch scheduler v{}: interval {}s, batch limit {}, head node {}",
        crate::AMPLIQ_VERSION,
        config.interval_s,
        config.batch_limit,
        config.remote_host
    );
    let dispatcher = create_dispatcher(config)?;
    let (service, process) = create_dispatch_service(dispatcher);

    tokio::pin!(process);
    tokio::select! {
        _ = &mut process => {}
        _ = tokio::signal::ctrl_c() => {
            log::info!("Shutdown requested, letting the current cycle finish");
            service.quit();
            process.await;
        }
    }
    Ok(())
}

/// Runs exactly one dispatch cycle and returns its counters.
pub async fn run_single_cycle(config: SchedulerConfig) -> crate::Result<DispatchStats> {
    let mut dispatcher = create_dispatcher(config)?;
    dispatcher.run_cycle().await;
    Ok(dispatcher.stats().clone())
}
