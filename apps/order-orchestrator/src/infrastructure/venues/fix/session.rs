//! Outbound half of a FIX session.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::codec::{FixMessage, format_timestamp, msg_type, tag};
use crate::application::ports::ConnectionStatus;
use crate::domain::shared::VenueName;
use crate::infrastructure::venues::status::StatusCell;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

struct Outbound {
    writer: BoxedWriter,
    next_seq: u64,
}

/// Stamps the standard header and writes messages in sequence order.
pub struct FixSession {
    sender_comp_id: String,
    target_comp_id: String,
    outbound: Mutex<Outbound>,
}

impl FixSession {
    /// Start a session at sequence number 1.
    pub fn new(
        sender_comp_id: impl Into<String>,
        target_comp_id: impl Into<String>,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            sender_comp_id: sender_comp_id.into(),
            target_comp_id: target_comp_id.into(),
            outbound: Mutex::new(Outbound {
                writer: Box::new(writer),
                next_seq: 1,
            }),
        }
    }

    /// Send a message and return the sequence number it went out with.
    ///
    /// The sequence number is assigned and written under one lock so numbers
    /// on the wire are strictly increasing.
    pub async fn send(&self, msg: &FixMessage) -> std::io::Result<u64> {
        let mut out = self.outbound.lock().await;
        let seq = out.next_seq;

        let mut stamped = FixMessage::new(msg.msg_type())
            .with(tag::SENDER_COMP_ID, &self.sender_comp_id)
            .with(tag::TARGET_COMP_ID, &self.target_comp_id)
            .with(tag::MSG_SEQ_NUM, seq)
            .with(tag::SENDING_TIME, format_timestamp(Utc::now()));
        for (t, v) in msg.fields() {
            stamped.push(*t, v);
        }

        out.writer.write_all(&stamped.encode()).await?;
        out.writer.flush().await?;
        out.next_seq += 1;
        Ok(seq)
    }
}

/// Send a heartbeat every `interval` until cancelled. A failed write marks
/// the session lost.
pub async fn run_heartbeat(
    venue: VenueName,
    session: Arc<FixSession>,
    interval: Duration,
    status: Arc<StatusCell>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(venue = %venue, "Heartbeat stopped");
                return;
            }
            _ = ticker.tick() => {}
        }

        if let Err(e) = session.send(&FixMessage::new(msg_type::HEARTBEAT)).await {
            warn!(venue = %venue, error = %e, "Heartbeat failed, session lost");
            status.set(ConnectionStatus::Error);
            cancel.cancel();
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::infrastructure::venues::fix::codec::decode_frame;

    async fn read_frames(reader: &mut tokio::io::DuplexStream, n: usize) -> Vec<FixMessage> {
        let mut buf = Vec::new();
        let mut out = Vec::new();
        let mut chunk = [0u8; 1024];
        while out.len() < n {
            if let Some(msg) = decode_frame(&mut buf).unwrap() {
                out.push(msg);
                continue;
            }
            let read = reader.read(&mut chunk).await.unwrap();
            buf.extend_from_slice(&chunk[..read]);
        }
        out
    }

    #[tokio::test]
    async fn sequence_numbers_increase() {
        let (client, mut server) = tokio::io::duplex(4096);
        let session = FixSession::new("ME", "THEM", client);

        assert_eq!(session.send(&FixMessage::new(msg_type::HEARTBEAT)).await.unwrap(), 1);
        assert_eq!(session.send(&FixMessage::new(msg_type::HEARTBEAT)).await.unwrap(), 2);

        let frames = read_frames(&mut server, 2).await;
        assert_eq!(frames[0].get(tag::MSG_SEQ_NUM), Some("1"));
        assert_eq!(frames[1].get(tag::MSG_SEQ_NUM), Some("2"));
        assert_eq!(frames[0].get(tag::SENDER_COMP_ID), Some("ME"));
        assert_eq!(frames[0].get(tag::TARGET_COMP_ID), Some("THEM"));
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_fires_on_interval_until_cancelled() {
        let (client, mut server) = tokio::io::duplex(4096);
        let session = Arc::new(FixSession::new("ME", "THEM", client));
        let status = Arc::new(StatusCell::new());
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_heartbeat(
            VenueName::new("fix"),
            session,
            Duration::from_secs(30),
            status,
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(61)).await;
        let frames = read_frames(&mut server, 2).await;
        assert!(frames.iter().all(|f| f.msg_type() == msg_type::HEARTBEAT));

        cancel.cancel();
        task.await.unwrap();
    }
}
