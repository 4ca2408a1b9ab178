//! Chunked transmit.
//!
//! Hosts on the other end of a USB-CDC or RS-485 link drop data if it
//! arrives in large bursts, so output goes out in chunks of at most
//! `chunk_bytes` with `pacing_ms` between them. A chunk that is not
//! accepted within `chunk_timeout_ms` abandons the rest of the transmit.

use embassy_time::{with_timeout, Duration, Timer};
use embedded_io_async::Write;

use crate::config::TransmitConfig;
use crate::error::Error;
use crate::sync::{deadline_in, remaining};

/// Largest chunk the staging buffer holds.
pub const MAX_CHUNK_BYTES: usize = 64;

/// Delay before retrying a write that accepted nothing.
const BUSY_RETRY_MS: u64 = 1;

async fn send_chunk<W: Write>(w: &mut W, chunk: &[u8], cfg: &TransmitConfig) -> Result<(), Error> {
    let deadline = deadline_in(cfg.chunk_timeout_ms);
    let mut rest = chunk;
    while !rest.is_empty() {
        let left = remaining(deadline);
        if left.as_ticks() == 0 {
            return Err(Error::Timeout);
        }
        match with_timeout(left, w.write(rest)).await {
            Err(_) => return Err(Error::Timeout),
            Ok(Err(_)) => return Err(Error::Io),
            Ok(Ok(0)) => Timer::after(Duration::from_millis(BUSY_RETRY_MS)).await,
            Ok(Ok(n)) => rest = rest.get(n..).unwrap_or_default(),
        }
    }
    Ok(())
}

/// Send the concatenation of `parts` in paced chunks.
pub async fn transmit<W: Write>(
    w: &mut W,
    parts: &[&[u8]],
    cfg: &TransmitConfig,
) -> Result<(), Error> {
    let chunk_bytes = cfg.chunk_bytes.clamp(1, MAX_CHUNK_BYTES);
    let mut staging = [0u8; MAX_CHUNK_BYTES];
    let mut staged = 0usize;
    let mut sent_any = false;

    let total: usize = parts.iter().map(|p| p.len()).sum();
    let mut queued = 0usize;

    for part in parts {
        let mut src = *part;
        while !src.is_empty() {
            let room = chunk_bytes.saturating_sub(staged);
            let take = room.min(src.len());
            let (head, tail) = src.split_at(take);
            if let Some(dst) = staging.get_mut(staged..staged.saturating_add(take)) {
                dst.copy_from_slice(head);
            }
            staged = staged.saturating_add(take);
            queued = queued.saturating_add(take);
            src = tail;

            if staged == chunk_bytes || queued == total {
                if sent_any {
                    Timer::after(Duration::from_millis(u64::from(cfg.pacing_ms))).await;
                }
                send_chunk(w, staging.get(..staged).unwrap_or_default(), cfg).await?;
                sent_any = true;
                staged = 0;
            }
        }
    }

    let flush_budget = Duration::from_millis(u64::from(cfg.chunk_timeout_ms));
    match with_timeout(flush_budget, w.flush()).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) => Err(Error::Io),
        Err(_) => Err(Error::Timeout),
    }
}
