//! Per-connection session machinery.
//!
//! Each accepted connection is served by three tasks: the command loop
//! (greeting, prompt/read/dispatch round trips), a writer task that owns the
//! write half of the socket, and a heartbeat loop. Every outbound message
//! goes through one bounded queue drained by the writer, so a heartbeat can
//! never land in the middle of a response line.

use crate::identity::ServerIdentity;
use crate::protocol::{sanitize, Command, HEARTBEAT, MENU, PROMPT};
use bytes::{Bytes, BytesMut};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Interval between liveness lines.
pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(3);

/// Read buffer size per connection
const READ_BUFFER_SIZE: usize = 2048;

/// Outbound queue depth per connection
const OUTBOUND_QUEUE: usize = 32;

/// Serve one accepted connection until the peer exits, the transport fails,
/// or the session token is cancelled.
///
/// The returned error is the session's terminal read error, if any; write
/// failures surface as a cancelled token instead and are logged by the
/// writer task.
pub async fn run_session(
    stream: TcpStream,
    identity: Arc<ServerIdentity>,
    cancel: CancellationToken,
) -> io::Result<()> {
    let (read_half, write_half) = stream.into_split();
    let (outbound, outbound_rx) = mpsc::channel::<Bytes>(OUTBOUND_QUEUE);

    let writer = tokio::spawn(writer_task(write_half, outbound_rx, cancel.clone()));

    // The heartbeat gets a child token so the command loop can stop it on a
    // normal exit while the writer is still draining the final responses.
    let heartbeat_cancel = cancel.child_token();
    let heartbeat = tokio::spawn(run_heartbeat(
        outbound.clone(),
        HEARTBEAT_PERIOD,
        heartbeat_cancel.clone(),
    ));

    let result = command_loop(read_half, outbound, identity, cancel.clone()).await;

    // Stopping the heartbeat drops the last sender; the writer then drains
    // the queue and exits on its own.
    heartbeat_cancel.cancel();
    let _ = heartbeat.await;
    let _ = writer.await;

    result
}

/// Sole owner of the connection's write half.
///
/// Drains the outbound queue until every sender is gone, then exits. A single
/// failed write cancels the session and ends the task; queued bytes are
/// dropped with the connection.
async fn writer_task<W>(
    mut writer: W,
    mut outbound: mpsc::Receiver<Bytes>,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(bytes) = outbound.recv().await {
        let result = tokio::select! {
            result = writer.write_all(&bytes) => result,
            _ = cancel.cancelled() => break,
        };
        if let Err(e) = result {
            debug!(error = %e, "Write failed");
            cancel.cancel();
            break;
        }
    }
}

/// Push a liveness line through the outbound queue every `period`.
///
/// Stops silently once the queue is gone or the token fires; the connection
/// is presumed closed by then. No retry, no backoff.
pub(crate) async fn run_heartbeat(
    outbound: mpsc::Sender<Bytes>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval(period);
    // interval() fires immediately; consume that so the first beat comes one
    // full period after the connection is accepted
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !enqueue(&outbound, &cancel, Bytes::from_static(HEARTBEAT.as_bytes())).await {
                    break;
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
}

/// The session state machine: greeting, then prompt → read → dispatch round
/// trips until the peer exits or the transport dies.
async fn command_loop<R>(
    reader: R,
    outbound: mpsc::Sender<Bytes>,
    identity: Arc<ServerIdentity>,
    cancel: CancellationToken,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, reader);
    let mut line = Vec::with_capacity(READ_BUFFER_SIZE);

    // Greeting
    if !enqueue(&outbound, &cancel, Bytes::from_static(MENU.as_bytes())).await {
        return Ok(());
    }

    loop {
        // Prompting
        if !enqueue(&outbound, &cancel, Bytes::from_static(PROMPT.as_bytes())).await {
            return Ok(());
        }

        // Reading: commands are delimited on `\n`, so one command split
        // across packets is reassembled and bytes past the newline stay
        // buffered for the next round trip
        line.clear();
        let n = tokio::select! {
            result = reader.read_until(b'\n', &mut line) => result?,
            _ = cancel.cancelled() => return Ok(()),
        };
        if n == 0 {
            trace!("Connection closed by client");
            return Ok(());
        }

        // Dispatching: non-UTF-8 bytes are decoded lossily and treated like
        // any other input rather than rejected
        let input = String::from_utf8_lossy(&line);
        let command = Command::parse(&sanitize(&input));
        trace!(?command, "Processing command");

        let Some(reply) = command.respond(&identity) else {
            // exit elicits no response; the session just closes
            return Ok(());
        };

        let mut response = BytesMut::with_capacity(reply.len() + 1);
        response.extend_from_slice(reply.as_bytes());
        response.extend_from_slice(b"\n");
        if !enqueue(&outbound, &cancel, response.freeze()).await {
            return Ok(());
        }
    }
}

/// Queue one outbound message, giving up if the session is cancelled first
/// or the writer is gone.
async fn enqueue(
    outbound: &mpsc::Sender<Bytes>,
    cancel: &CancellationToken,
    bytes: Bytes,
) -> bool {
    tokio::select! {
        result = outbound.send(bytes) => result.is_ok(),
        _ = cancel.cancelled() => false,
    }
}
