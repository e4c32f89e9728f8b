// Sign observations gathered from chunk loads, batched for upload

use crate::config::{SignsConfig, MIN_TIMER_PERIOD};
use crate::coordinator::Coordinator;
use crate::session::SignEntity;
use crate::types::{Dimension, Location, ScanRegion, Sign, Vec2, Vec3};
use anyhow::Result;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

struct CollectorState {
    pending: Vec<ScanRegion>,
    last_chunk_at: Instant,
}

/// Accumulates one [`ScanRegion`] per loaded chunk until the next upload.
pub struct SignCollector {
    state: Mutex<CollectorState>,
}

impl Default for SignCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl SignCollector {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CollectorState {
                pending: Vec::new(),
                last_chunk_at: Instant::now(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, CollectorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record the signs of a freshly loaded chunk.
    ///
    /// Chunks without signs are recorded too, so the coordinator learns that
    /// the area is empty. Each sign yields two entries, front and back text.
    /// A chunk whose block bounds fall outside the i32 range is skipped.
    pub fn record_chunk(&self, cx: i32, cz: i32, signs: &[SignEntity], dimension: Dimension) {
        let Some(bounds) = chunk_bounds(cx, cz) else {
            warn!(cx, cz, "Ignoring chunk with out-of-range coordinates");
            return;
        };
        let [Vec2 { x, z }, _] = bounds;

        let mut entries = Vec::with_capacity(signs.len() * 2);
        for sign in signs {
            let (Some(sx), Some(sz)) = (sign.x.checked_add(x), sign.z.checked_add(z)) else {
                warn!(cx, cz, x = sign.x, z = sign.z, "Ignoring sign with out-of-range coordinates");
                continue;
            };
            let location = Location::new(Vec3::new(sx, sign.y, sz), dimension);
            entries.push(Sign {
                lines: sign.front.clone(),
                location,
            });
            entries.push(Sign {
                lines: sign.back.clone(),
                location,
            });
        }

        let mut state = self.state();
        state.pending.push(ScanRegion {
            signs: entries,
            bounds,
            dimension,
        });
        state.last_chunk_at = Instant::now();
    }

    pub fn since_last_chunk(&self) -> Duration {
        self.state().last_chunk_at.elapsed()
    }

    pub fn pending_count(&self) -> usize {
        self.state().pending.len()
    }

    /// Upload everything collected so far.
    ///
    /// The batch is taken out before the call so chunk events are not blocked
    /// by the network; on failure it is put back in front of anything that
    /// arrived meanwhile.
    pub async fn upload_pending(&self, coordinator: &dyn Coordinator) -> Result<usize> {
        let batch = std::mem::take(&mut self.state().pending);
        if batch.is_empty() {
            return Ok(0);
        }

        match coordinator.send_sign_scan_data(&batch).await {
            Ok(()) => {
                debug!(regions = batch.len(), "Uploaded sign data");
                Ok(batch.len())
            }
            Err(e) => {
                let mut state = self.state();
                let newer = std::mem::replace(&mut state.pending, batch);
                state.pending.extend(newer);
                Err(e)
            }
        }
    }

    /// Block until no chunk has arrived for the configured quiet period.
    pub async fn wait_until_quiet(&self, config: &SignsConfig) {
        time::sleep(config.initial_wait()).await;
        while self.since_last_chunk() < config.quiet_period() {
            time::sleep(config.poll_interval()).await;
        }
    }
}

/// Block corners of a chunk, if they are representable.
fn chunk_bounds(cx: i32, cz: i32) -> Option<[Vec2; 2]> {
    let x = cx.checked_mul(16)?;
    let z = cz.checked_mul(16)?;
    Some([
        Vec2 { x, z },
        Vec2 {
            x: x.checked_add(15)?,
            z: z.checked_add(15)?,
        },
    ])
}

/// Background timer: upload accumulated sign data every `period`.
///
/// Failures are logged and retried on the next tick.
pub async fn run_upload_loop(
    collector: Arc<SignCollector>,
    coordinator: Arc<dyn Coordinator>,
    period: Duration,
) {
    let period = period.max(MIN_TIMER_PERIOD);
    let mut interval = time::interval_at(Instant::now() + period, period);
    info!(period_secs = period.as_secs(), "Sign upload loop started");

    loop {
        interval.tick().await;
        if let Err(e) = collector.upload_pending(coordinator.as_ref()).await {
            warn!(error = %e, pending = collector.pending_count(), "Failed to upload sign data");
        }
    }
}
