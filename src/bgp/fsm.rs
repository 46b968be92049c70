//! The peer finite state machine (RFC 4271 Section 8)
//!
//! The machine consumes administrative, timer, transport and message events
//! through [`Fsm::handle_event`] and produces outbound frames through a
//! [`MessageSink`]. It owns its seven timers; each timer publishes its
//! expiry back onto the single event channel, so every event reaches the
//! machine through one serialized entry point.

// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::capability::Capabilities;
use crate::error::{CeaseSubcode, FsmErrorSubcode, HeaderError, OpenError, UpdateError};
use crate::timer::SessionTimer;
use crate::{Codec, Message, Notification, Open, Update};
use bytes::{Bytes, BytesMut};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::codec::Encoder;

/// Default connect-retry interval in seconds (RFC 4271 Section 10)
pub const DEFAULT_CONNECT_RETRY_TIME: u16 = 120;

/// Default hold interval in seconds (RFC 4271 Section 10)
pub const DEFAULT_HOLD_TIME: u16 = 90;

/// Hold interval armed after sending an OPEN, before the peer's arrives
const OPEN_HOLD_TIME: u16 = u16::MAX;

/// BGP session states
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum State {
    Idle,
    Connect,
    Active,
    OpenSent,
    OpenConfirm,
    Established,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::Connect => "Connect",
            Self::Active => "Active",
            Self::OpenSent => "OpenSent",
            Self::OpenConfirm => "OpenConfirm",
            Self::Established => "Established",
        };
        f.write_str(name)
    }
}

bitflags::bitflags! {
    /// Session attribute flags (RFC 4271 Section 8)
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct SessionAttributes: u16 {
        const ACCEPT_CONNECTIONS_UNCONFIGURED_PEERS = 0x0001;
        const ALLOW_AUTOMATIC_START = 0x0002;
        const ALLOW_AUTOMATIC_STOP = 0x0004;
        const COLLISION_DETECT_ESTABLISHED_STATE = 0x0008;
        const DAMP_PEER_OSCILLATIONS = 0x0010;
        const DELAY_OPEN = 0x0020;
        const PASSIVE_TCP_ESTABLISHMENT = 0x0040;
        const SEND_NOTIFICATION_WITHOUT_OPEN = 0x0080;
        const TRACK_TCP_STATE = 0x0100;
    }
}

/// Events consumed by the state machine
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Placeholder expiry for the advertisement pacing timers; ignored in
    /// every state
    Unknown,
    // Administrative events
    ManualStart,
    ManualStop,
    AutomaticStart,
    ManualStartWithPassiveTcpEstablishment,
    AutomaticStartWithPassiveTcpEstablishment,
    AutomaticStartWithDampPeerOscillations,
    AutomaticStartWithDampPeerOscillationsAndPassiveTcpEstablishment,
    AutomaticStop,
    // Timer events
    ConnectRetryTimerExpires,
    HoldTimerExpires,
    KeepaliveTimerExpires,
    DelayOpenTimerExpires,
    IdleHoldTimerExpires,
    // TCP connection events
    TcpConnectionValid,
    TcpConnectionRequestInvalid,
    TcpConnectionRequestAcked,
    TcpConnectionConfirmed,
    TcpConnectionFails,
    // BGP message events
    BgpOpenMessageReceived(Open),
    BgpOpenWithDelayOpenTimerRunning(Open),
    BgpHeaderError(HeaderError),
    BgpOpenMessageError(OpenError),
    BgpOpenCollisionDump,
    BgpNotificationMessageVersionError,
    BgpNotificationMessageReceived(Notification),
    BgpKeepaliveMessageReceived,
    BgpUpdateMessageReceived(Update),
    BgpUpdateMessageError(UpdateError),
}

impl Event {
    /// Event kind name without the payload, for logging
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::ManualStart => "ManualStart",
            Self::ManualStop => "ManualStop",
            Self::AutomaticStart => "AutomaticStart",
            Self::ManualStartWithPassiveTcpEstablishment => {
                "ManualStartWithPassiveTcpEstablishment"
            }
            Self::AutomaticStartWithPassiveTcpEstablishment => {
                "AutomaticStartWithPassiveTcpEstablishment"
            }
            Self::AutomaticStartWithDampPeerOscillations => {
                "AutomaticStartWithDampPeerOscillations"
            }
            Self::AutomaticStartWithDampPeerOscillationsAndPassiveTcpEstablishment => {
                "AutomaticStartWithDampPeerOscillationsAndPassiveTcpEstablishment"
            }
            Self::AutomaticStop => "AutomaticStop",
            Self::ConnectRetryTimerExpires => "ConnectRetryTimerExpires",
            Self::HoldTimerExpires => "HoldTimerExpires",
            Self::KeepaliveTimerExpires => "KeepaliveTimerExpires",
            Self::DelayOpenTimerExpires => "DelayOpenTimerExpires",
            Self::IdleHoldTimerExpires => "IdleHoldTimerExpires",
            Self::TcpConnectionValid => "TcpConnectionValid",
            Self::TcpConnectionRequestInvalid => "TcpConnectionRequestInvalid",
            Self::TcpConnectionRequestAcked => "TcpConnectionRequestAcked",
            Self::TcpConnectionConfirmed => "TcpConnectionConfirmed",
            Self::TcpConnectionFails => "TcpConnectionFails",
            Self::BgpOpenMessageReceived(_) => "BgpOpenMessageReceived",
            Self::BgpOpenWithDelayOpenTimerRunning(_) => "BgpOpenWithDelayOpenTimerRunning",
            Self::BgpHeaderError(_) => "BgpHeaderError",
            Self::BgpOpenMessageError(_) => "BgpOpenMessageError",
            Self::BgpOpenCollisionDump => "BgpOpenCollisionDump",
            Self::BgpNotificationMessageVersionError => "BgpNotificationMessageVersionError",
            Self::BgpNotificationMessageReceived(_) => "BgpNotificationMessageReceived",
            Self::BgpKeepaliveMessageReceived => "BgpKeepaliveMessageReceived",
            Self::BgpUpdateMessageReceived(_) => "BgpUpdateMessageReceived",
            Self::BgpUpdateMessageError(_) => "BgpUpdateMessageError",
        }
    }
}

/// Outbound frame sink into the transport; tests substitute a capturing mock
pub trait MessageSink: Send + Sync {
    /// Queue one complete frame for transmission to the peer
    fn send(&self, frame: Bytes);
}

/// Per-peer session configuration
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub local_addr: IpAddr,
    pub remote_addr: IpAddr,
    pub local_asn: u16,
    /// Expected remote ASN; zero accepts any peer AS
    pub remote_asn: u16,
    pub local_id: Ipv4Addr,
    pub attributes: SessionAttributes,
    pub connect_retry_time: u16,
    pub hold_time: u16,
    pub keepalive_time: u16,
    pub min_as_origination_interval_time: u16,
    pub min_route_advertisement_interval_time: u16,
    pub delay_open_time: u16,
    pub idle_hold_time: u16,
    /// Capabilities announced in our OPEN
    pub capabilities: Capabilities,
    /// Capabilities the peer must announce for the session to come up
    pub required_capabilities: Capabilities,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            local_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            remote_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            local_asn: 0,
            remote_asn: 0,
            local_id: Ipv4Addr::UNSPECIFIED,
            attributes: SessionAttributes::empty(),
            connect_retry_time: DEFAULT_CONNECT_RETRY_TIME,
            hold_time: DEFAULT_HOLD_TIME,
            keepalive_time: DEFAULT_HOLD_TIME / 3,
            min_as_origination_interval_time: 0,
            min_route_advertisement_interval_time: 0,
            delay_open_time: 0,
            idle_hold_time: 0,
            capabilities: Capabilities::default(),
            required_capabilities: Capabilities::default(),
        }
    }
}

/// What happens to the connect-retry counter on a transition into Idle
#[derive(Copy, Clone, Debug)]
enum CounterPolicy {
    Reset,
    Increment,
    Preserve,
}

/// The peer finite state machine
pub struct Fsm {
    config: SessionConfig,
    state: State,
    connect_retry_counter: u16,
    remote_id: Option<Ipv4Addr>,
    negotiated_hold_time: u16,
    peer_capabilities: Capabilities,
    negotiated_capabilities: Capabilities,
    connect_retry_timer: SessionTimer,
    hold_timer: SessionTimer,
    keepalive_timer: SessionTimer,
    min_as_origination_timer: SessionTimer,
    min_route_advertisement_timer: SessionTimer,
    delay_open_timer: SessionTimer,
    idle_hold_timer: SessionTimer,
    sink: Arc<dyn MessageSink>,
    updates: Option<UnboundedSender<Update>>,
}

impl Fsm {
    /// Create a machine in Idle. `events` is the channel the owning driver
    /// reads; the timers publish their expiries onto it.
    #[must_use]
    pub fn new(
        config: SessionConfig,
        sink: Arc<dyn MessageSink>,
        events: UnboundedSender<Event>,
    ) -> Self {
        let connect_retry_timer = SessionTimer::new(
            "connect-retry",
            config.connect_retry_time,
            true,
            Event::ConnectRetryTimerExpires,
            events.clone(),
        );
        let hold_timer = SessionTimer::new(
            "hold",
            config.hold_time,
            false,
            Event::HoldTimerExpires,
            events.clone(),
        );
        let keepalive_timer = SessionTimer::new(
            "keepalive",
            config.keepalive_time,
            true,
            Event::KeepaliveTimerExpires,
            events.clone(),
        );
        let min_as_origination_timer = SessionTimer::new(
            "min-AS-origination-interval",
            config.min_as_origination_interval_time,
            false,
            Event::Unknown,
            events.clone(),
        );
        let min_route_advertisement_timer = SessionTimer::new(
            "min-route-advertisement-interval",
            config.min_route_advertisement_interval_time,
            false,
            Event::Unknown,
            events.clone(),
        );
        let delay_open_timer = SessionTimer::new(
            "delay-open",
            config.delay_open_time,
            false,
            Event::DelayOpenTimerExpires,
            events.clone(),
        );
        let idle_hold_timer = SessionTimer::new(
            "idle-hold",
            config.idle_hold_time,
            true,
            Event::IdleHoldTimerExpires,
            events,
        );
        Self {
            config,
            state: State::Idle,
            connect_retry_counter: 0,
            remote_id: None,
            negotiated_hold_time: 0,
            peer_capabilities: Capabilities::default(),
            negotiated_capabilities: Capabilities::default(),
            connect_retry_timer,
            hold_timer,
            keepalive_timer,
            min_as_origination_timer,
            min_route_advertisement_timer,
            delay_open_timer,
            idle_hold_timer,
            sink,
            updates: None,
        }
    }

    /// Deliver parsed UPDATE messages to the routing table consumer
    pub fn deliver_updates_to(&mut self, updates: UnboundedSender<Update>) {
        self.updates = Some(updates);
    }

    #[must_use]
    pub const fn state(&self) -> State {
        self.state
    }

    #[must_use]
    pub const fn connect_retry_counter(&self) -> u16 {
        self.connect_retry_counter
    }

    #[must_use]
    pub const fn remote_id(&self) -> Option<Ipv4Addr> {
        self.remote_id
    }

    #[must_use]
    pub const fn negotiated_hold_time(&self) -> u16 {
        self.negotiated_hold_time
    }

    #[must_use]
    pub const fn negotiated_capabilities(&self) -> &Capabilities {
        &self.negotiated_capabilities
    }

    /// Whether the delay-open timer is currently counting down. The server
    /// shell uses this to classify an inbound OPEN.
    #[must_use]
    pub fn delay_open_running(&self) -> bool {
        self.delay_open_timer.is_active()
    }

    /// Single serialized entry point for every event
    pub fn handle_event(&mut self, event: Event) {
        log::debug!("Handling event {} in state {}", event.kind(), self.state);
        match self.state {
            State::Idle => self.handle_idle(event),
            State::Connect => self.handle_connect(event),
            State::Active => self.handle_active(event),
            State::OpenSent => self.handle_open_sent(event),
            State::OpenConfirm => self.handle_open_confirm(event),
            State::Established => self.handle_established(event),
        }
    }

    /// Stop every running timer and all session state tied to the wire,
    /// releasing the connection back to Idle
    fn enter_idle(&mut self, policy: CounterPolicy) {
        match policy {
            CounterPolicy::Reset => self.connect_retry_counter = 0,
            CounterPolicy::Increment => {
                self.connect_retry_counter = self.connect_retry_counter.saturating_add(1);
            }
            CounterPolicy::Preserve => {}
        }
        self.connect_retry_timer.stop();
        self.hold_timer.stop();
        self.keepalive_timer.stop();
        self.min_as_origination_timer.stop();
        self.min_route_advertisement_timer.stop();
        self.delay_open_timer.stop();
        self.idle_hold_timer.stop();
        self.state = State::Idle;
        if self
            .config
            .attributes
            .contains(SessionAttributes::DAMP_PEER_OSCILLATIONS)
            && self.config.idle_hold_time > 0
        {
            // Re-entry to Connect/Active waits for the idle-hold timer
            self.idle_hold_timer.restart_with(self.config.idle_hold_time);
        }
    }

    fn send_message(&self, message: Message) {
        let mut codec = Codec;
        let mut buf = BytesMut::new();
        match codec.encode(message, &mut buf) {
            Ok(()) => self.sink.send(buf.freeze()),
            Err(err) => log::error!("Failed to flatten outbound message: {err}"),
        }
    }

    fn send_open(&self) {
        log::info!(
            "Sending OPEN (ASN {}, hold time {}s)",
            self.config.local_asn,
            self.config.hold_time
        );
        self.send_message(Message::Open(Open::new(
            self.config.local_asn,
            self.config.hold_time,
            self.config.local_id,
            self.config.capabilities.clone(),
        )));
    }

    fn send_keepalive(&self) {
        self.send_message(Message::Keepalive);
    }

    fn send_notification(&self, notification: Notification) {
        log::info!("Sending NOTIFICATION {notification}");
        self.send_message(Message::Notification(notification));
    }

    /// Record the peer's identity from its OPEN and negotiate the session
    /// parameters: hold time is the minimum of both sides, and the
    /// capability set is the intersection of both announcements.
    fn complete_initialization(&mut self, open: &Open) -> Result<(), OpenError> {
        if self.config.remote_asn != 0 && open.asn != self.config.remote_asn {
            return Err(OpenError::BadPeerAs(open.asn));
        }
        self.remote_id = Some(open.bgp_id);
        self.peer_capabilities = open.capabilities();
        self.negotiated_capabilities = self
            .config
            .capabilities
            .intersection(&self.peer_capabilities);
        if let Some(code) = self
            .config
            .required_capabilities
            .missing_from(&self.peer_capabilities)
            .first()
        {
            return Err(OpenError::UnsupportedCapability(*code));
        }
        self.negotiated_hold_time = self.config.hold_time.min(open.hold_time);
        log::info!(
            "Peer {} (ASN {}): negotiated hold time {}s, {} shared capabilities",
            open.bgp_id,
            open.asn,
            self.negotiated_hold_time,
            self.negotiated_capabilities.len()
        );
        Ok(())
    }

    const fn negotiated_keepalive_time(&self) -> u16 {
        self.negotiated_hold_time / 3
    }

    fn start_session(&mut self, passive: bool) {
        self.connect_retry_counter = 0;
        self.connect_retry_timer
            .restart_with(self.config.connect_retry_time);
        // The transport collaborator initiates the outbound connection
        // and keeps listening for one from the peer
        self.state = if passive { State::Active } else { State::Connect };
    }

    /// Automatic start while oscillation damping is on: re-entry waits for
    /// the idle-hold timer when it is counting down
    fn damped_start(&mut self, passive_variant: bool) {
        if self.idle_hold_timer.is_active() {
            log::debug!("Start deferred until the idle-hold timer expires");
            return;
        }
        let passive = passive_variant
            || self
                .config
                .attributes
                .contains(SessionAttributes::PASSIVE_TCP_ESTABLISHMENT);
        self.start_session(passive);
    }

    /// Shared Connect/Active handling of an inbound transport session
    fn transport_established(&mut self) {
        self.connect_retry_timer.reset_with(0);
        if self
            .config
            .attributes
            .contains(SessionAttributes::DELAY_OPEN)
        {
            self.delay_open_timer
                .restart_with(self.config.delay_open_time);
        } else {
            self.send_open();
            self.hold_timer.restart_with(OPEN_HOLD_TIME);
            self.state = State::OpenSent;
        }
    }

    /// Shared Connect/Active handling of an OPEN that raced the delay-open
    /// timer
    fn open_before_delay_open_expiry(&mut self, open: &Open) {
        self.connect_retry_timer.reset_with(0);
        self.delay_open_timer.reset_with(0);
        match self.complete_initialization(open) {
            Ok(()) => {
                self.send_open();
                self.send_keepalive();
                if self.negotiated_hold_time > 0 {
                    self.keepalive_timer
                        .restart_with(self.negotiated_keepalive_time());
                    self.hold_timer.restart_with(self.negotiated_hold_time);
                }
                self.state = State::OpenConfirm;
            }
            Err(err) => {
                self.send_notification(err.to_notification());
                self.enter_idle(CounterPolicy::Increment);
            }
        }
    }

    /// Shared Connect/Active handling of framing and OPEN errors before a
    /// session exists; a notification goes out only when configured to
    fn error_before_open(&mut self, notification: Notification) {
        if self
            .config
            .attributes
            .contains(SessionAttributes::SEND_NOTIFICATION_WITHOUT_OPEN)
        {
            self.send_notification(notification);
        }
        self.enter_idle(CounterPolicy::Increment);
    }

    /// Shared Connect/Active handling of a version-error notification; the
    /// counter moves only when no delay-open race was in progress
    fn version_error_before_open(&mut self) {
        if self.delay_open_timer.is_active() {
            self.enter_idle(CounterPolicy::Preserve);
        } else {
            self.enter_idle(CounterPolicy::Increment);
        }
    }

    fn handle_idle(&mut self, event: Event) {
        match event {
            Event::ManualStart | Event::AutomaticStart => self.start_session(false),
            Event::ManualStartWithPassiveTcpEstablishment
            | Event::AutomaticStartWithPassiveTcpEstablishment => self.start_session(true),
            Event::AutomaticStartWithDampPeerOscillations => self.damped_start(false),
            Event::AutomaticStartWithDampPeerOscillationsAndPassiveTcpEstablishment => {
                self.damped_start(true);
            }
            Event::IdleHoldTimerExpires => {
                if self
                    .config
                    .attributes
                    .contains(SessionAttributes::ALLOW_AUTOMATIC_START)
                {
                    self.start_session(
                        self.config
                            .attributes
                            .contains(SessionAttributes::PASSIVE_TCP_ESTABLISHMENT),
                    );
                }
            }
            _ => {}
        }
    }

    fn handle_connect(&mut self, event: Event) {
        match event {
            Event::ManualStart
            | Event::AutomaticStart
            | Event::ManualStartWithPassiveTcpEstablishment
            | Event::AutomaticStartWithPassiveTcpEstablishment
            | Event::AutomaticStartWithDampPeerOscillations
            | Event::AutomaticStartWithDampPeerOscillationsAndPassiveTcpEstablishment => {}
            Event::ManualStop => {
                // The transport drops the connection
                self.enter_idle(CounterPolicy::Reset);
            }
            Event::ConnectRetryTimerExpires => {
                // Drop the connection and try again while continuing to
                // listen for one initiated by the peer
                self.connect_retry_timer
                    .restart_with(self.config.connect_retry_time);
                self.delay_open_timer
                    .restart_with(self.config.delay_open_time);
            }
            Event::DelayOpenTimerExpires => {
                self.send_open();
                self.hold_timer.restart_with(OPEN_HOLD_TIME);
                self.state = State::OpenSent;
            }
            Event::TcpConnectionValid | Event::TcpConnectionRequestInvalid => {
                // The transport collaborator screens the connection
            }
            Event::TcpConnectionRequestAcked | Event::TcpConnectionConfirmed => {
                self.transport_established();
            }
            Event::TcpConnectionFails => {
                if self.delay_open_timer.is_active() {
                    self.connect_retry_timer
                        .restart_with(self.config.connect_retry_time);
                    self.delay_open_timer.reset_with(0);
                    self.state = State::Active;
                } else {
                    self.enter_idle(CounterPolicy::Preserve);
                }
            }
            Event::BgpOpenWithDelayOpenTimerRunning(open) => {
                self.open_before_delay_open_expiry(&open);
            }
            Event::BgpHeaderError(err) => self.error_before_open(err.to_notification()),
            Event::BgpOpenMessageError(err) => self.error_before_open(err.to_notification()),
            Event::BgpNotificationMessageVersionError => self.version_error_before_open(),
            _ => log::debug!("Event {} ignored in Connect", event.kind()),
        }
    }

    fn handle_active(&mut self, event: Event) {
        match event {
            Event::ManualStart
            | Event::AutomaticStart
            | Event::ManualStartWithPassiveTcpEstablishment
            | Event::AutomaticStartWithPassiveTcpEstablishment
            | Event::AutomaticStartWithDampPeerOscillations
            | Event::AutomaticStartWithDampPeerOscillationsAndPassiveTcpEstablishment
            | Event::Unknown => {}
            Event::ManualStop => {
                if self.delay_open_timer.is_active()
                    && self
                        .config
                        .attributes
                        .contains(SessionAttributes::SEND_NOTIFICATION_WITHOUT_OPEN)
                {
                    self.send_notification(Notification::cease(
                        CeaseSubcode::AdministrativeShutdown,
                    ));
                }
                self.enter_idle(CounterPolicy::Reset);
            }
            Event::ConnectRetryTimerExpires => {
                self.connect_retry_timer
                    .restart_with(self.config.connect_retry_time);
                self.state = State::Connect;
            }
            Event::DelayOpenTimerExpires => {
                self.connect_retry_timer.reset_with(0);
                self.delay_open_timer.reset_with(0);
                self.send_open();
                self.hold_timer.restart_with(OPEN_HOLD_TIME);
                self.state = State::OpenSent;
            }
            Event::TcpConnectionValid | Event::TcpConnectionRequestInvalid => {}
            Event::TcpConnectionRequestAcked | Event::TcpConnectionConfirmed => {
                self.transport_established();
            }
            Event::BgpOpenWithDelayOpenTimerRunning(open) => {
                self.open_before_delay_open_expiry(&open);
            }
            Event::BgpHeaderError(err) => self.error_before_open(err.to_notification()),
            Event::BgpOpenMessageError(err) => self.error_before_open(err.to_notification()),
            Event::BgpNotificationMessageVersionError => self.version_error_before_open(),
            _ => {
                // TcpConnectionFails and every other unexpected event
                self.enter_idle(CounterPolicy::Increment);
            }
        }
    }

    fn handle_open_sent(&mut self, event: Event) {
        match event {
            Event::ManualStart
            | Event::AutomaticStart
            | Event::ManualStartWithPassiveTcpEstablishment
            | Event::AutomaticStartWithPassiveTcpEstablishment
            | Event::AutomaticStartWithDampPeerOscillations
            | Event::AutomaticStartWithDampPeerOscillationsAndPassiveTcpEstablishment
            | Event::Unknown => {}
            Event::ManualStop => {
                self.send_notification(Notification::cease(CeaseSubcode::AdministrativeShutdown));
                self.enter_idle(CounterPolicy::Reset);
            }
            Event::AutomaticStop => {
                self.send_notification(Notification::cease(CeaseSubcode::AdministrativeShutdown));
                self.enter_idle(CounterPolicy::Increment);
            }
            Event::HoldTimerExpires => {
                self.send_notification(Notification::hold_timer_expired());
                self.enter_idle(CounterPolicy::Increment);
            }
            Event::TcpConnectionValid
            | Event::TcpConnectionRequestAcked
            | Event::TcpConnectionConfirmed
            | Event::TcpConnectionRequestInvalid => {
                // A second connection is tracked by collision processing
                // until an OPEN is received on it
            }
            Event::TcpConnectionFails => {
                self.connect_retry_timer
                    .restart_with(self.config.connect_retry_time);
                // Keep listening for a connection the peer may initiate
                self.state = State::Active;
            }
            Event::BgpOpenMessageReceived(open) => {
                self.delay_open_timer.reset_with(0);
                self.connect_retry_timer.reset_with(0);
                match self.complete_initialization(&open) {
                    Ok(()) => {
                        self.send_keepalive();
                        if self.negotiated_hold_time > 0 {
                            self.keepalive_timer
                                .restart_with(self.negotiated_keepalive_time());
                            self.hold_timer.restart_with(self.negotiated_hold_time);
                        }
                        self.state = State::OpenConfirm;
                    }
                    Err(err) => {
                        self.send_notification(err.to_notification());
                        self.enter_idle(CounterPolicy::Increment);
                    }
                }
            }
            Event::BgpHeaderError(err) => {
                self.send_notification(err.to_notification());
                self.enter_idle(CounterPolicy::Increment);
            }
            Event::BgpOpenMessageError(err) => {
                self.send_notification(err.to_notification());
                self.enter_idle(CounterPolicy::Increment);
            }
            Event::BgpOpenCollisionDump => {
                self.send_notification(Notification::cease(
                    CeaseSubcode::ConnectionCollisionResolution,
                ));
                self.enter_idle(CounterPolicy::Increment);
            }
            Event::BgpNotificationMessageVersionError => {
                // The peer speaks an older version; fall back without
                // charging the retry counter
                self.enter_idle(CounterPolicy::Preserve);
            }
            _ => {
                self.send_notification(Notification::fsm_error(
                    FsmErrorSubcode::ReceivedUnexpectedMessageInOpenSentState,
                ));
                self.enter_idle(CounterPolicy::Increment);
            }
        }
    }

    fn handle_open_confirm(&mut self, event: Event) {
        match event {
            Event::ManualStart
            | Event::AutomaticStart
            | Event::ManualStartWithPassiveTcpEstablishment
            | Event::AutomaticStartWithPassiveTcpEstablishment
            | Event::AutomaticStartWithDampPeerOscillations
            | Event::AutomaticStartWithDampPeerOscillationsAndPassiveTcpEstablishment
            | Event::Unknown => {}
            Event::ManualStop => {
                self.send_notification(Notification::cease(CeaseSubcode::AdministrativeShutdown));
                self.enter_idle(CounterPolicy::Reset);
            }
            Event::AutomaticStop => {
                self.send_notification(Notification::cease(CeaseSubcode::AdministrativeShutdown));
                self.enter_idle(CounterPolicy::Increment);
            }
            Event::HoldTimerExpires => {
                self.send_notification(Notification::hold_timer_expired());
                self.enter_idle(CounterPolicy::Increment);
            }
            Event::KeepaliveTimerExpires => {
                self.send_keepalive();
                self.keepalive_timer.restart();
            }
            Event::TcpConnectionValid
            | Event::TcpConnectionRequestAcked
            | Event::TcpConnectionConfirmed
            | Event::TcpConnectionRequestInvalid => {
                // Second connection tracking
            }
            Event::TcpConnectionFails | Event::BgpNotificationMessageReceived(_) => {
                self.enter_idle(CounterPolicy::Increment);
            }
            Event::BgpNotificationMessageVersionError => {
                self.enter_idle(CounterPolicy::Preserve);
            }
            Event::BgpOpenMessageReceived(_) => {
                // Collision resolution hook; until implemented the original
                // connection is kept
                log::debug!("OPEN in OpenConfirm held for collision processing");
            }
            Event::BgpHeaderError(err) => {
                self.send_notification(err.to_notification());
                self.enter_idle(CounterPolicy::Increment);
            }
            Event::BgpOpenMessageError(err) => {
                self.send_notification(err.to_notification());
                self.enter_idle(CounterPolicy::Increment);
            }
            Event::BgpOpenCollisionDump => {
                self.send_notification(Notification::cease(
                    CeaseSubcode::ConnectionCollisionResolution,
                ));
                self.enter_idle(CounterPolicy::Increment);
            }
            Event::BgpKeepaliveMessageReceived => {
                if self.negotiated_hold_time > 0 {
                    self.hold_timer.restart_with(self.negotiated_hold_time);
                }
                self.state = State::Established;
            }
            _ => {
                self.send_notification(Notification::fsm_error(
                    FsmErrorSubcode::ReceivedUnexpectedMessageInOpenConfirmState,
                ));
                self.enter_idle(CounterPolicy::Increment);
            }
        }
    }

    fn handle_established(&mut self, event: Event) {
        match event {
            Event::ManualStart
            | Event::AutomaticStart
            | Event::ManualStartWithPassiveTcpEstablishment
            | Event::AutomaticStartWithPassiveTcpEstablishment
            | Event::AutomaticStartWithDampPeerOscillations
            | Event::AutomaticStartWithDampPeerOscillationsAndPassiveTcpEstablishment
            | Event::Unknown => {}
            Event::ManualStop => {
                self.send_notification(Notification::cease(CeaseSubcode::AdministrativeShutdown));
                self.delete_routes();
                self.enter_idle(CounterPolicy::Reset);
            }
            Event::AutomaticStop => {
                self.send_notification(Notification::cease(CeaseSubcode::AdministrativeShutdown));
                self.delete_routes();
                self.enter_idle(CounterPolicy::Increment);
            }
            Event::HoldTimerExpires => {
                self.send_notification(Notification::hold_timer_expired());
                self.enter_idle(CounterPolicy::Increment);
            }
            Event::KeepaliveTimerExpires => {
                self.send_keepalive();
                if self.negotiated_hold_time > 0 {
                    self.keepalive_timer.restart();
                }
            }
            Event::TcpConnectionValid
            | Event::TcpConnectionRequestInvalid
            | Event::TcpConnectionRequestAcked
            | Event::TcpConnectionConfirmed => {
                // Second connection tracking until an OPEN is seen
            }
            Event::BgpOpenMessageReceived(_) => {
                if self
                    .config
                    .attributes
                    .contains(SessionAttributes::COLLISION_DETECT_ESTABLISHED_STATE)
                {
                    self.handle_event(Event::BgpOpenCollisionDump);
                }
            }
            Event::BgpOpenCollisionDump => {
                self.send_notification(Notification::cease(
                    CeaseSubcode::ConnectionCollisionResolution,
                ));
                self.delete_routes();
                self.enter_idle(CounterPolicy::Increment);
            }
            Event::BgpNotificationMessageVersionError
            | Event::BgpNotificationMessageReceived(_)
            | Event::TcpConnectionFails => {
                self.delete_routes();
                self.enter_idle(CounterPolicy::Increment);
            }
            Event::BgpKeepaliveMessageReceived => {
                if self.negotiated_hold_time > 0 {
                    self.hold_timer.restart();
                }
            }
            Event::BgpUpdateMessageReceived(update) => {
                self.deliver_update(update);
                if self.negotiated_hold_time > 0 {
                    self.hold_timer.restart();
                }
            }
            Event::BgpUpdateMessageError(err) => {
                self.send_notification(err.to_notification());
                self.delete_routes();
                self.enter_idle(CounterPolicy::Increment);
            }
            _ => {
                self.send_notification(Notification::fsm_error(
                    FsmErrorSubcode::ReceivedUnexpectedMessageInEstablishedState,
                ));
                self.delete_routes();
                self.enter_idle(CounterPolicy::Increment);
            }
        }
    }

    fn deliver_update(&self, update: Update) {
        log::info!(
            "UPDATE: {} withdrawn, {} announced, {} path attributes",
            update.withdrawn_routes.len(),
            update.nlri.len(),
            update.path_attributes.len()
        );
        if let Some(updates) = &self.updates {
            if updates.send(update).is_err() {
                log::warn!("Route consumer gone; UPDATE discarded");
            }
        }
    }

    fn delete_routes(&self) {
        // The routing table collaborator owns the entries; it withdraws
        // everything learned from this peer when the session closes
        log::info!("Session closing; routes from this peer are withdrawn");
    }
}
