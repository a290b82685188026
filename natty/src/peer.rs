//! The natty peer: one engine peer connection, one reliable data channel,
//! and the observer callbacks that turn engine events into signaling
//! messages.
//!
//! Both roles create a data channel labeled [`DATA_CHANNEL_LABEL`]. The
//! offerer additionally produces the initial offer from [`Natty::start`];
//! the answerer waits for an offer to arrive through
//! [`Natty::handle_message`].

use crate::config::{NattyConfig, Role};
use crate::error::{Error, Result};
use log::{debug, info, trace, warn};
use signal::{IceCandidate, SdpType, SessionDescription, SignalMessage};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc, watch};

use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

pub const DATA_CHANNEL_LABEL: &str = "datachannel";

/// Sent to the remote peer when ICE gives up.
pub const ICE_FAILED_MESSAGE: &str = "Checked all candidate pairs and failed to find a connection";

/// Where outgoing signaling messages go. The receiving end is drained by
/// whatever transport carries them to the remote peer.
pub type SignalSink = mpsc::UnboundedSender<SignalMessage>;

/// What the peer does in response to an ICE connection state change.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IceAction {
    /// A usable candidate pair was found (or the agent closed cleanly).
    Established,
    /// Every candidate pair failed: report and shut down.
    Failed,
    Ignore,
}

impl IceAction {
    pub fn from_state(state: RTCIceConnectionState) -> Self {
        match state {
            RTCIceConnectionState::Connected
            | RTCIceConnectionState::Completed
            | RTCIceConnectionState::Closed => IceAction::Established,
            RTCIceConnectionState::Failed => IceAction::Failed,
            _ => IceAction::Ignore,
        }
    }
}

/// Snapshot of the peer published through [`Natty::status`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PeerStatus {
    pub ice: RTCIceConnectionState,
    /// The locally created data channel is open.
    pub channel_open: bool,
    /// ICE failed and the peer asked to be shut down.
    pub failed: bool,
}

impl Default for PeerStatus {
    fn default() -> Self {
        Self {
            ice: RTCIceConnectionState::New,
            channel_open: false,
            failed: false,
        }
    }
}

/// Keeps local candidates behind the local description they belong to, so
/// the remote side never sees a candidate before the offer or answer.
struct Outbox {
    sink: SignalSink,
    state: Mutex<OutboxState>,
}

#[derive(Default)]
struct OutboxState {
    description_sent: bool,
    held: Vec<SignalMessage>,
}

impl Outbox {
    fn new(sink: SignalSink) -> Self {
        Self {
            sink,
            state: Mutex::new(OutboxState::default()),
        }
    }

    async fn send_description(&self, msg: SignalMessage) {
        let mut state = self.state.lock().await;
        emit(&self.sink, msg);
        state.description_sent = true;
        for held in state.held.drain(..) {
            emit(&self.sink, held);
        }
    }

    async fn send_candidate(&self, msg: SignalMessage) {
        let mut state = self.state.lock().await;
        if state.description_sent {
            emit(&self.sink, msg);
        } else {
            trace!("Holding candidate until the local description is sent");
            state.held.push(msg);
        }
    }

    fn send_error(&self, msg: SignalMessage) {
        emit(&self.sink, msg);
    }
}

pub struct Natty {
    role: Role,
    peer_connection: Arc<RTCPeerConnection>,
    data_channel: Arc<RTCDataChannel>,
    outbox: Arc<Outbox>,
    status: watch::Sender<PeerStatus>,
    /// Remote candidates that arrived before the remote description.
    pending_candidates: Mutex<Vec<RTCIceCandidateInit>>,
    closed: AtomicBool,
}

impl Natty {
    /// Creates the peer connection and its data channel and registers every
    /// observer. Candidate gathering starts once a local description is set.
    pub async fn new(config: &NattyConfig, sink: SignalSink) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let mut setting_engine = SettingEngine::default();
        setting_engine.set_include_loopback_candidate(config.include_loopback);

        let api = APIBuilder::new()
            .with_setting_engine(setting_engine)
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: config.ice_servers(),
            ..Default::default()
        };

        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await?);
        info!(
            "Created peer connection as {} with {} ICE server(s)",
            config.role,
            config.stun_servers.len()
        );

        let data_channel = peer_connection
            .create_data_channel(
                DATA_CHANNEL_LABEL,
                Some(RTCDataChannelInit {
                    ordered: Some(true),
                    ..Default::default()
                }),
            )
            .await?;

        let (status, _) = watch::channel(PeerStatus::default());

        let natty = Self {
            role: config.role,
            peer_connection,
            data_channel,
            outbox: Arc::new(Outbox::new(sink)),
            status,
            pending_candidates: Mutex::new(vec![]),
            closed: AtomicBool::new(false),
        };
        natty.register_observers();

        Ok(natty)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn data_channel(&self) -> &Arc<RTCDataChannel> {
        &self.data_channel
    }

    pub fn status(&self) -> watch::Receiver<PeerStatus> {
        self.status.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// The ICE connection state observer registered with the engine.
    pub(crate) fn ice_state_handler(
        &self,
    ) -> impl Fn(RTCIceConnectionState) + Send + Sync + use<> {
        let outbox = Arc::clone(&self.outbox);
        let status = self.status.clone();
        move |state| on_ice_state(&outbox, &status, state)
    }

    fn register_observers(&self) {
        let outbox = Arc::clone(&self.outbox);
        self.peer_connection
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                let outbox = Arc::clone(&outbox);
                Box::pin(async move {
                    let Some(candidate) = candidate else {
                        info!("ICE finished gathering candidates");
                        return;
                    };
                    match candidate.to_json() {
                        Ok(init) => {
                            debug!("Local candidate: {}", init.candidate);
                            outbox.send_candidate(candidate_message(init)).await;
                        }
                        Err(err) => warn!("Failed to serialize candidate: {err}"),
                    }
                })
            }));

        let on_state = self.ice_state_handler();
        self.peer_connection
            .on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
                on_state(state);
                Box::pin(async {})
            }));

        self.peer_connection
            .on_peer_connection_state_change(Box::new(move |state| {
                info!("Peer connection state has changed: {state}");
                Box::pin(async {})
            }));

        self.peer_connection
            .on_signaling_state_change(Box::new(move |state| {
                info!("Signaling state has changed: {state}");
                Box::pin(async {})
            }));

        self.peer_connection
            .on_ice_gathering_state_change(Box::new(move |state| {
                debug!("ICE gathering state has changed: {state}");
                Box::pin(async {})
            }));

        self.peer_connection
            .on_negotiation_needed(Box::new(move || {
                info!("Renegotiation needed");
                Box::pin(async {})
            }));

        self.peer_connection
            .on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
                info!("New data channel created '{}'-'{}'", dc.label(), dc.id());
                observe_channel(&dc);
                Box::pin(async {})
            }));

        observe_channel(&self.data_channel);
        let status = self.status.clone();
        let label = self.data_channel.label().to_owned();
        self.data_channel.on_open(Box::new(move || {
            info!("Local data channel '{label}' open");
            status.send_modify(|s| s.channel_open = true);
            Box::pin(async {})
        }));
    }

    /// Offerer: creates the offer, applies it locally and emits it.
    /// Answerer: nothing to do until an offer arrives.
    pub async fn start(&self) -> Result<()> {
        if self.role != Role::Offerer {
            debug!("Waiting for a remote offer");
            return Ok(());
        }
        self.ensure_open()?;

        let offer = self.peer_connection.create_offer(None).await?;
        info!("Setting local description (offer)");
        self.peer_connection
            .set_local_description(offer.clone())
            .await?;
        self.outbox
            .send_description(SignalMessage::offer(offer.sdp))
            .await;
        Ok(())
    }

    /// Applies one message received from the remote peer.
    pub async fn handle_message(&self, msg: SignalMessage) -> Result<()> {
        self.ensure_open()?;

        match msg {
            SignalMessage::Description(desc) => self.handle_description(desc).await,
            SignalMessage::Candidate(candidate) => self.handle_candidate(candidate).await,
            SignalMessage::Error(err) => {
                warn!("Remote peer reported an error: {}", err.message);
                Ok(())
            }
        }
    }

    async fn handle_description(&self, desc: SessionDescription) -> Result<()> {
        info!("Received session description ({})", desc.sdp_type);
        let remote = match desc.sdp_type {
            SdpType::Offer => RTCSessionDescription::offer(desc.sdp)?,
            SdpType::Answer => RTCSessionDescription::answer(desc.sdp)?,
        };
        self.peer_connection.set_remote_description(remote).await?;
        self.inspect_remote_description().await;
        self.flush_pending_candidates().await;

        if desc.sdp_type == SdpType::Offer {
            let answer = self.peer_connection.create_answer(None).await?;
            info!("Setting local description (answer)");
            self.peer_connection
                .set_local_description(answer.clone())
                .await?;
            self.outbox
                .send_description(SignalMessage::answer(answer.sdp))
                .await;
        }
        Ok(())
    }

    async fn handle_candidate(&self, candidate: IceCandidate) -> Result<()> {
        debug!("Received candidate: {}", candidate.candidate);
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: Some(candidate.sdp_mid),
            sdp_mline_index: Some(candidate.sdp_mline_index),
            username_fragment: None,
        };

        {
            let mut pending = self.pending_candidates.lock().await;
            if self.peer_connection.remote_description().await.is_none() {
                debug!("No remote description yet, queueing candidate");
                pending.push(init);
                return Ok(());
            }
        }

        self.peer_connection.add_ice_candidate(init).await?;
        Ok(())
    }

    async fn flush_pending_candidates(&self) {
        let pending: Vec<RTCIceCandidateInit> =
            self.pending_candidates.lock().await.drain(..).collect();
        for init in pending {
            if let Err(err) = self.peer_connection.add_ice_candidate(init).await {
                warn!("Failed to apply a queued candidate: {err}");
            }
        }
    }

    /// Logs the transport details carried by the remote description.
    async fn inspect_remote_description(&self) {
        let Some(remote) = self.peer_connection.remote_description().await else {
            return;
        };
        for line in remote.sdp.lines() {
            if let Some(setup) = line.strip_prefix("a=setup:") {
                debug!("Remote transport connection role {setup}");
            }
        }
        for candidate in sdp_candidates(&remote.sdp) {
            debug!("Remote candidate -> {candidate}");
        }
    }

    /// Closes the data channel and the peer connection. Safe to call more
    /// than once.
    pub async fn shutdown(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Deleting peer connection");

        if let Err(err) = self.data_channel.close().await {
            warn!("Failed to close data channel: {err}");
        }
        self.peer_connection.close().await?;
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::ErrClosed)
        } else {
            Ok(())
        }
    }
}

fn observe_channel(dc: &Arc<RTCDataChannel>) {
    let label = dc.label().to_owned();
    dc.on_message(Box::new(move |msg| {
        trace!("Message from data channel '{label}': {} bytes", msg.data.len());
        Box::pin(async {})
    }));

    let label = dc.label().to_owned();
    dc.on_close(Box::new(move || {
        info!("Data channel '{label}' closed");
        Box::pin(async {})
    }));
}

/// Publishes `state`. On failure the error report is queued before the
/// status flags `failed`, so a session reacting to the flag always finds the
/// report ahead of its shutdown.
fn on_ice_state(
    outbox: &Outbox,
    status: &watch::Sender<PeerStatus>,
    state: RTCIceConnectionState,
) {
    status.send_modify(|s| s.ice = state);
    match IceAction::from_state(state) {
        IceAction::Established => info!("Found ideal connection ({state})"),
        IceAction::Failed => {
            warn!("{ICE_FAILED_MESSAGE}");
            outbox.send_error(SignalMessage::error(ICE_FAILED_MESSAGE));
            status.send_modify(|s| s.failed = true);
        }
        IceAction::Ignore => info!("ICE connection state has changed: {state}"),
    }
}

fn emit(sink: &SignalSink, msg: SignalMessage) {
    if sink.send(msg).is_err() {
        warn!("Signaling output closed, dropping message");
    }
}

fn candidate_message(init: RTCIceCandidateInit) -> SignalMessage {
    SignalMessage::candidate(
        init.sdp_mid.unwrap_or_default(),
        init.sdp_mline_index.unwrap_or_default(),
        init.candidate,
    )
}

/// `candidate:` attributes carried inline in an SDP blob.
pub fn sdp_candidates(sdp: &str) -> impl Iterator<Item = &str> {
    sdp.lines()
        .filter_map(|line| line.trim_end().strip_prefix("a="))
        .filter(|attr| attr.starts_with("candidate:"))
}
