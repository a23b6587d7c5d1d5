use super::connections::ConnectionSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::debug;

/// Spawns the failure simulator: every `period`, with probability
/// `probability`, one live connection is closed at random.
pub(crate) fn spawn(
    connections: Arc<ConnectionSet>,
    probability: f64,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        // interval fires immediately; the first close opportunity comes one
        // full period after startup.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if rand::random::<f64>() >= probability {
                continue;
            }
            if !connections.close_random() {
                debug!("chaos tick with no live connections");
            }
        }
    })
}
