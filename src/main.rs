//! Demo entry point: wires up logging, configuration, and a `FlowMaster`
//! against a stub upstream. The wire-level transport (actually terminating
//! TCP/TLS and feeding `TransportEvent`s in) is out of scope for this crate;
//! whatever embeds it is expected to supply a real `Upstream` and drive
//! `FlowMaster::sender()`.

use std::sync::Arc;

use async_trait::async_trait;

use flow_adapters::{Upstream, UpstreamError};
use flow_domain::{Request, Response};
use proxycore::{config, FlowMaster};

struct UnconfiguredUpstream;

#[async_trait]
impl Upstream for UnconfiguredUpstream {
    async fn send(&self, request: &Request) -> Result<Response, UpstreamError> {
        Err(UpstreamError(format!("no upstream wired up for {} {}", request.method, request.path)))
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    config::init_dotenv();

    let cfg = config::ProxyConfig::from_env();
    log::info!("starting proxycore with limit filter {:?}", cfg.limit_filter);

    let mut master = FlowMaster::new(cfg, Arc::new(UnconfiguredUpstream));
    let sender = master.sender();

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        log::info!("shutdown requested");
        let _ = sender.send(proxycore::TransportEvent::Shutdown);
    });

    master.run().await;
}
