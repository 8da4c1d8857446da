use std::future::Future;

use crate::common::rpc::{ResponseToken, RpcSender, make_rpc_queue};
use crate::server::dispatch::process::{DispatchStats, Dispatcher, dispatch_process};

#[derive(Debug)]
pub enum DispatchMessage {
    GetStats(ResponseToken<DispatchStats>),
    QuitService,
}

/// Handle for talking to a running dispatch process.
pub struct DispatchService {
    sender: RpcSender<DispatchMessage>,
}

impl DispatchService {
    pub fn get_stats(&self) -> impl Future<Output = DispatchStats> {
        let (token, receiver) = ResponseToken::make();
        if let Err(error) = self.sender.send(DispatchMessage::GetStats(token)) {
            log::warn!("Could not reach the dispatch process: {error:?}");
        }
        async move { receiver.await.unwrap() }
    }

    /// Asks the process to stop. A cycle that is already running finishes
    /// first; no job is left half-committed.
    pub fn quit(&self) {
        let _ = self.sender.send(DispatchMessage::QuitService);
    }
}

pub fn create_dispatch_service(dispatcher: Dispatcher) -> (DispatchService, impl Future<Output = ()>) {
    let (tx, rx) = make_rpc_queue();
    let process = dispatch_process(dispatcher, rx);
    let service = DispatchService { sender: tx };
    (service, process)
}
