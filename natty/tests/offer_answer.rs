//! Two natty peers in one process, signaling wired through channels.
//!
//! No ICE servers are configured and loopback candidates are enabled, so the
//! connection is established over the local host only.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use natty::peer::DATA_CHANNEL_LABEL;
use natty::{Natty, NattyConfig, Role};
use signal::{SdpType, SignalMessage};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

fn local_config(role: Role) -> NattyConfig {
    NattyConfig::new(role)
        .with_stun_servers(Vec::<String>::new())
        .with_loopback(true)
}

/// Delivers every message `from` emits to `to`, returning what was seen.
fn forward(
    mut from: mpsc::UnboundedReceiver<SignalMessage>,
    to: Arc<Natty>,
) -> tokio::task::JoinHandle<Vec<SignalMessage>> {
    tokio::spawn(async move {
        let mut seen = vec![];
        while let Some(msg) = from.recv().await {
            seen.push(msg.clone());
            if let Err(err) = to.handle_message(msg).await {
                log::warn!("forwarded message rejected: {err}");
            }
        }
        seen
    })
}

async fn wait_channel_open(natty: &Natty) -> Result<()> {
    let mut status = natty.status();
    tokio::time::timeout(CONNECT_TIMEOUT, status.wait_for(|s| s.channel_open))
        .await
        .map_err(|_| anyhow::anyhow!("{} data channel did not open", natty.role()))??;
    Ok(())
}

#[tokio::test]
async fn test_offer_answer_opens_data_channel() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init()
        .ok();

    let (offerer_tx, offerer_rx) = mpsc::unbounded_channel();
    let (answerer_tx, answerer_rx) = mpsc::unbounded_channel();

    let offerer = Arc::new(Natty::new(&local_config(Role::Offerer), offerer_tx).await?);
    let answerer = Arc::new(Natty::new(&local_config(Role::Answerer), answerer_tx).await?);
    assert_eq!(offerer.data_channel().label(), DATA_CHANNEL_LABEL);
    assert_eq!(answerer.data_channel().label(), DATA_CHANNEL_LABEL);

    let to_answerer = forward(offerer_rx, Arc::clone(&answerer));
    let to_offerer = forward(answerer_rx, Arc::clone(&offerer));

    offerer.start().await?;
    answerer.start().await?;

    wait_channel_open(&offerer).await?;
    wait_channel_open(&answerer).await?;
    log::info!("both data channels open");

    assert!(!offerer.status().borrow().failed);
    assert!(!answerer.status().borrow().failed);

    offerer.shutdown().await?;
    answerer.shutdown().await?;

    // the observers hold sinks until the engine lets go of them
    to_answerer.abort();
    to_offerer.abort();
    Ok(())
}

#[tokio::test]
async fn test_offerer_emits_offer_before_answer_is_known() -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let offerer = Natty::new(&local_config(Role::Offerer), tx).await?;
    offerer.start().await?;

    let first = tokio::time::timeout(CONNECT_TIMEOUT, async {
        loop {
            match rx.recv().await {
                Some(SignalMessage::Description(desc)) => return Some(desc),
                Some(_) => continue,
                None => return None,
            }
        }
    })
    .await?;

    let desc = first.ok_or_else(|| anyhow::anyhow!("no offer emitted"))?;
    assert_eq!(desc.sdp_type, SdpType::Offer);
    assert!(desc.sdp.starts_with("v=0"));

    // candidates that arrive for an answerer before any offer are queued
    let (tx, _rx) = mpsc::unbounded_channel();
    let answerer = Natty::new(&local_config(Role::Answerer), tx).await?;
    answerer
        .handle_message(SignalMessage::candidate(
            "0",
            0,
            "candidate:1 1 udp 2130706431 127.0.0.1 50000 typ host",
        ))
        .await?;
    answerer.handle_message(SignalMessage::offer(desc.sdp)).await?;

    offerer.shutdown().await?;
    answerer.shutdown().await?;
    Ok(())
}
