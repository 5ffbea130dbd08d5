//! Inbound half of a FIX session.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::codec::{FixMessage, decode_frame, msg_type, parse_timestamp, tag};
use super::session::FixSession;
use crate::application::ports::{
    AdapterError, ConnectionStatus, ExecutionReport, ExecutionReportKind, ExecutionReportSender,
};
use crate::domain::shared::{OrderId, VenueName};
use crate::infrastructure::venues::status::StatusCell;

const READ_CHUNK: usize = 4096;

/// Read until one complete message is buffered.
pub async fn read_message<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> Result<FixMessage, AdapterError> {
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match decode_frame(buf) {
            Ok(Some(msg)) => return Ok(msg),
            Ok(None) => {}
            Err(e) => return Err(AdapterError::Protocol(e.to_string())),
        }
        let n = reader
            .read(&mut chunk)
            .await
            .map_err(|e| AdapterError::Connection(e.to_string()))?;
        if n == 0 {
            return Err(AdapterError::Connection(
                "Connection closed by counterparty".to_string(),
            ));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Convert an ExecutionReport (35=8) into a platform report.
///
/// Acknowledgements and other non-terminal, non-fill exec types yield `None`.
pub fn parse_execution_report(venue: &VenueName, msg: &FixMessage) -> Option<ExecutionReport> {
    let decimal = |t: u32| msg.get(t).and_then(|v| v.parse::<Decimal>().ok());

    let kind = match msg.get(tag::EXEC_TYPE)? {
        "1" | "2" => {
            let quantity = decimal(tag::LAST_SHARES)?;
            let price = decimal(tag::LAST_PX)?;
            if quantity <= Decimal::ZERO {
                return None;
            }
            ExecutionReportKind::Fill { quantity, price }
        }
        "4" => ExecutionReportKind::Canceled,
        "8" => ExecutionReportKind::Rejected {
            reason: msg.get(tag::TEXT).unwrap_or("Rejected by venue").to_string(),
        },
        "C" => ExecutionReportKind::Expired,
        _ => return None,
    };

    Some(ExecutionReport {
        venue: venue.clone(),
        exchange_order_id: msg.get(tag::ORDER_ID).unwrap_or_default().to_string(),
        client_order_id: msg
            .get(tag::ORIG_CL_ORD_ID)
            .or_else(|| msg.get(tag::CL_ORD_ID))
            .map(OrderId::new),
        kind,
        time: msg
            .get(tag::TRANSACT_TIME)
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now),
    })
}

/// Everything the listener task shares with its adapter.
pub struct ListenerContext {
    pub venue: VenueName,
    pub session: Arc<FixSession>,
    pub status: Arc<StatusCell>,
    pub reports: ExecutionReportSender,
    pub cancel: CancellationToken,
}

impl ListenerContext {
    /// Handle one inbound message. Returns `false` when the session is over.
    async fn dispatch(&self, msg: FixMessage) -> bool {
        match msg.msg_type() {
            msg_type::HEARTBEAT => {
                debug!(venue = %self.venue, "Heartbeat received");
            }
            msg_type::TEST_REQUEST => {
                let mut reply = FixMessage::new(msg_type::HEARTBEAT);
                if let Some(id) = msg.get(tag::TEST_REQ_ID) {
                    reply.push(tag::TEST_REQ_ID, id);
                }
                if let Err(e) = self.session.send(&reply).await {
                    warn!(venue = %self.venue, error = %e, "Failed to answer test request");
                    return false;
                }
            }
            msg_type::LOGON => {
                info!(venue = %self.venue, "Logon acknowledged");
                self.status.set(ConnectionStatus::Connected);
            }
            msg_type::LOGOUT => {
                warn!(
                    venue = %self.venue,
                    text = msg.get(tag::TEXT).unwrap_or_default(),
                    "Counterparty logged out"
                );
                return false;
            }
            msg_type::EXECUTION_REPORT => match parse_execution_report(&self.venue, &msg) {
                Some(report) => {
                    if self.reports.send(report).is_err() {
                        warn!(venue = %self.venue, "Execution report receiver dropped");
                    }
                }
                None => debug!(
                    venue = %self.venue,
                    exec_type = msg.get(tag::EXEC_TYPE).unwrap_or_default(),
                    "Execution report without fill or final state"
                ),
            },
            msg_type::REJECT => {
                warn!(
                    venue = %self.venue,
                    ref_seq_num = msg.get(tag::REF_SEQ_NUM).unwrap_or_default(),
                    text = msg.get(tag::TEXT).unwrap_or_default(),
                    "Session-level reject"
                );
            }
            other => debug!(venue = %self.venue, msg_type = other, "Unhandled message type"),
        }
        true
    }

    fn session_lost(&self) {
        self.status.set(ConnectionStatus::Error);
        self.cancel.cancel();
    }
}

/// Decode and dispatch inbound messages until the session ends or `cancel`
/// fires. Bytes already read past the logon acknowledgement are passed in as
/// `buf`.
pub async fn run_listener<R: AsyncRead + Unpin>(mut reader: R, mut buf: Vec<u8>, ctx: ListenerContext) {
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        loop {
            if ctx.cancel.is_cancelled() {
                return;
            }
            match decode_frame(&mut buf) {
                Ok(Some(msg)) => {
                    if !ctx.dispatch(msg).await {
                        ctx.session_lost();
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => warn!(venue = %ctx.venue, error = %e, "Dropping malformed frame"),
            }
        }

        let read = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => {
                debug!(venue = %ctx.venue, "Listener stopped");
                return;
            }
            read = reader.read(&mut chunk) => read,
        };
        match read {
            Ok(0) => {
                warn!(venue = %ctx.venue, "Connection closed by counterparty");
                ctx.session_lost();
                return;
            }
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) => {
                warn!(venue = %ctx.venue, error = %e, "Session read failed");
                ctx.session_lost();
                return;
            }
        }
    }
}
