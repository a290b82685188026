use crate::config::NattyConfig;
use crate::error::Result;
use crate::peer::{Natty, PeerStatus};
use log::{debug, info, warn};
use signal::{InputLine, SignalMessage, SignalWriter};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Why the input loop ended.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Exit {
    /// `exit` was read from the input.
    Command,
    EndOfInput,
    /// External stop request, e.g. Ctrl-C.
    Stopped,
    /// ICE failed; the error report has been written.
    IceFailed,
}

/// Runs one natty session: emits the offer (offerer only), then applies
/// every message read from `input` until the session ends. All queued
/// signaling output is written before this returns.
///
/// `stop_rx` must stay connected to a live sender; a closed channel reads
/// as a stop request.
pub async fn run<R>(
    config: &NattyConfig,
    input: R,
    writer: SignalWriter,
    mut stop_rx: broadcast::Receiver<()>,
) -> Result<Exit>
where
    R: AsyncBufRead + Unpin,
{
    let (sink, outgoing) = mpsc::unbounded_channel::<SignalMessage>();
    let natty = Natty::new(config, sink).await?;
    serve(natty, outgoing, input, writer, &mut stop_rx).await
}

/// Runs `natty` until the session ends, with `outgoing` as the receiving
/// end of its sink.
async fn serve<R>(
    natty: Natty,
    outgoing: mpsc::UnboundedReceiver<SignalMessage>,
    input: R,
    writer: SignalWriter,
    stop_rx: &mut broadcast::Receiver<()>,
) -> Result<Exit>
where
    R: AsyncBufRead + Unpin,
{
    let (done_tx, done_rx) = oneshot::channel::<()>();
    let write_task = spawn_writer(writer, outgoing, done_rx);
    let mut status = natty.status();

    let result = match natty.start().await {
        Ok(()) => read_input(&natty, input, stop_rx, &mut status).await,
        Err(err) => Err(err),
    };

    let shutdown = natty.shutdown().await;
    let _ = done_tx.send(());
    if let Err(err) = write_task.await {
        warn!("Signaling writer task failed: {err}");
    }

    let exit = result?;
    shutdown?;
    info!("Session ended: {exit:?}");
    Ok(exit)
}

/// Drains the sink into `writer` until told to stop, then writes whatever is
/// still queued.
fn spawn_writer(
    mut writer: SignalWriter,
    mut outgoing: mpsc::UnboundedReceiver<SignalMessage>,
    mut done_rx: oneshot::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                biased;

                msg = outgoing.recv() => msg,
                _ = &mut done_rx => {
                    outgoing.close();
                    while let Ok(msg) = outgoing.try_recv() {
                        if let Err(err) = writer.write(&msg).await {
                            warn!("Failed to write signaling message: {err}");
                        }
                    }
                    None
                }
            };

            let Some(msg) = msg else {
                break;
            };
            if let Err(err) = writer.write(&msg).await {
                warn!("Failed to write signaling message: {err}");
            }
        }
        debug!("Signaling writer done");
    })
}

async fn read_input<R>(
    natty: &Natty,
    input: R,
    stop_rx: &mut broadcast::Receiver<()>,
    status: &mut watch::Receiver<PeerStatus>,
) -> Result<Exit>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        let line = tokio::select! {
            biased;

            _ = stop_rx.recv() => return Ok(Exit::Stopped),
            failed = ice_failed(status) => {
                return Ok(if failed { Exit::IceFailed } else { Exit::Stopped });
            }
            line = lines.next_line() => line?,
        };

        let Some(line) = line else {
            return Ok(Exit::EndOfInput);
        };

        match InputLine::classify(&line) {
            InputLine::Exit => return Ok(Exit::Command),
            InputLine::Empty => continue,
            InputLine::Message(raw) => {
                let msg = match SignalMessage::parse(&raw) {
                    Ok(msg) => msg,
                    Err(err) => {
                        info!("Received an unknown message: {err}");
                        continue;
                    }
                };
                debug!("Received message: {raw}");
                if let Err(err) = natty.handle_message(msg).await {
                    warn!("Failed to apply the received message: {err}");
                }
            }
        }
    }
}

/// Resolves once the peer reports an ICE failure (`true`), or when the peer
/// is gone (`false`).
async fn ice_failed(status: &mut watch::Receiver<PeerStatus>) -> bool {
    status.wait_for(|s| s.failed).await.is_ok()
}
