use log::*;
use serde::Serialize;
use sse::Hub;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;

pub const EVENT: &str = "heartbeat";

#[derive(Debug, Serialize)]
pub struct Heartbeat {
    pub clients: usize,
    pub uptime_secs: u64,
}

/// Publish a heartbeat every `period` until `stopped` resolves, so idle
/// clients and intermediaries see traffic on the stream.
pub async fn run<S>(hub: Arc<Hub>, period: Duration, stopped: S)
where
    S: Future<Output = ()>,
{
    let started = Instant::now();
    let mut ticks = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(stopped);

    info!("Publishing heartbeat events every {period:?}");
    loop {
        tokio::select! {
            _ = &mut stopped => {
                debug!("Heartbeat stopped");
                return;
            }
            _ = ticks.tick() => {
                let heartbeat = Heartbeat {
                    clients: hub.client_count(),
                    uptime_secs: started.elapsed().as_secs(),
                };
                if let Ok(delivered) = hub.send_json(EVENT, &heartbeat) {
                    trace!("Heartbeat delivered to {delivered} of {} client(s)", heartbeat.clients);
                }
            }
        }
    }
}
