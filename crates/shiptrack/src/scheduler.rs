//! Periodic batch refresh.
//!
//! Runs `refresh_all(true)` on a fixed interval from a background thread and
//! accepts manual triggers through a broadcast channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::orchestrator::RefreshOrchestrator;

pub struct RefreshScheduler {
    orchestrator: Arc<RefreshOrchestrator>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl RefreshScheduler {
    pub fn new(orchestrator: Arc<RefreshOrchestrator>, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the refresh loop in a background thread.
    /// Accepts a trigger receiver for manual refresh requests.
    pub fn start(&self, mut trigger_rx: broadcast::Receiver<()>) -> std::io::Result<JoinHandle<()>> {
        let orchestrator = Arc::clone(&self.orchestrator);
        let shutdown = Arc::clone(&self.shutdown);
        let interval = self.interval;

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        std::thread::Builder::new()
            .name("shiptrack-scheduler".to_string())
            .spawn(move || {
                rt.block_on(async {
                    let mut interval_timer = tokio::time::interval(interval);
                    interval_timer.tick().await; // skip immediate first tick

                    loop {
                        if shutdown.load(Ordering::Acquire) {
                            break;
                        }

                        tokio::select! {
                            _ = interval_timer.tick() => {},
                            Ok(()) = trigger_rx.recv() => {
                                log::info!("Manual refresh triggered");
                            },
                        }

                        if shutdown.load(Ordering::Acquire) {
                            break;
                        }

                        match orchestrator.refresh_all(true).await {
                            Ok(report) => {
                                for failure in &report.failures {
                                    log::debug!(
                                        "Scheduled refresh of #{} failed: {}",
                                        failure.shipment_id,
                                        failure.error
                                    );
                                }
                            }
                            Err(e) => log::error!("Scheduled refresh failed: {}", e),
                        }
                    }
                    log::info!("Refresh scheduler stopped");
                });
            })
    }

    /// Signals the scheduler to stop. The loop exits at its next wake-up.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
    }
}
