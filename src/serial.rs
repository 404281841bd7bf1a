//! Serial link tasks.
//!
//! The receive task assembles command lines and hands them to the main
//! loop; the transmit task writes whatever the main loop queues.

use embassy_stm32::usart::{BufferedUartRx, BufferedUartTx};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};
use embedded_io_async::{Read, Write};

use watering::command::{BANNER, Line, LineBuffer, LineError, ReplyLine};

/// Completed command lines, or the reason a line was dropped.
pub static LINES: Channel<CriticalSectionRawMutex, Result<Line, LineError>, 2> = Channel::new();

/// Lines waiting to be sent to the host.
pub static REPLIES: Channel<CriticalSectionRawMutex, ReplyLine, 4> = Channel::new();

/// Queues `line` without waiting. Drops it if the queue is full so the
/// control loop never stalls on a slow host.
pub fn send(line: ReplyLine) {
    if REPLIES.try_send(line).is_err() {
        #[cfg(feature = "debug-mode")]
        defmt::warn!("Reply queue full, line dropped");
    }
}

#[embassy_executor::task]
pub async fn serial_rx_task(mut rx: BufferedUartRx<'static>) {
    let mut lines = LineBuffer::new();
    let mut buf = [0u8; 16];
    loop {
        let n = match rx.read(&mut buf).await {
            Ok(n) => n,
            Err(_e) => {
                #[cfg(feature = "debug-mode")]
                defmt::warn!("UART read error: {}", _e);
                continue;
            }
        };
        for &byte in &buf[..n] {
            if let Some(line) = lines.push(byte) {
                LINES.send(line).await;
            }
        }
    }
}

#[embassy_executor::task]
pub async fn serial_tx_task(mut tx: BufferedUartTx<'static>) {
    if tx.write_all(BANNER.as_bytes()).await.is_err() {
        #[cfg(feature = "debug-mode")]
        defmt::warn!("Failed to send banner");
    }
    loop {
        let line = REPLIES.receive().await;
        if tx.write_all(line.as_bytes()).await.is_err() {
            #[cfg(feature = "debug-mode")]
            defmt::warn!("Failed to send reply");
        }
    }
}
