//! BGP server shell
//!
//! Accepts one inbound connection, wires the transport into the state
//! machine, and fans transport and message events into its single event
//! entry point. The framed reader reassembles messages, so a partial
//! segment never reaches the machine.

// SPDX-License-Identifier: AGPL-3.0-or-later

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use minibgp::fsm::{Event, Fsm, MessageSink, SessionConfig, State};
use minibgp::{Codec, Error as PacketError, Message};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_util::codec::{BytesCodec, FramedRead, FramedWrite};

/// Outbound frame queue; the writer task drains it into the socket, so a
/// send initiated by an event handler never blocks the handler
struct ChannelSink(UnboundedSender<Bytes>);

impl MessageSink for ChannelSink {
    fn send(&self, frame: Bytes) {
        if self.0.send(frame).is_err() {
            log::warn!("Transport writer gone; outbound frame dropped");
        }
    }
}

pub struct Server {
    listener: TcpListener,
    config: SessionConfig,
}

impl Server {
    pub async fn bind(
        addr: IpAddr,
        port: u16,
        config: SessionConfig,
    ) -> Result<Self, std::io::Error> {
        let listener = TcpListener::bind((addr, port)).await?;
        log::info!("Listening on {}", listener.local_addr()?);
        Ok(Self { listener, config })
    }

    /// Accept one peer connection and run the session until the peer
    /// disconnects or the machine returns to Idle
    pub async fn serve(self) -> Result<(), std::io::Error> {
        let (socket, peer_addr) = self.listener.accept().await?;
        log::info!("Connection from peer {peer_addr}");
        let mut config = self.config;
        config.remote_addr = peer_addr.ip();

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<Bytes>();
        let mut fsm = Fsm::new(config, Arc::new(ChannelSink(frames_tx)), events_tx.clone());

        // Stand-in for the routing table collaborator
        let (updates_tx, mut updates_rx) = mpsc::unbounded_channel();
        fsm.deliver_updates_to(updates_tx);
        tokio::spawn(async move {
            while let Some(update) = updates_rx.recv().await {
                for route in update.withdrawn_routes.iter() {
                    log::info!("Withdrawn {}", route.to_cidr());
                }
                for route in update.nlri.iter() {
                    log::info!("Learned {}", route.to_cidr());
                }
            }
        });

        let (rd, wr) = socket.into_split();
        let mut reader = FramedRead::new(rd, Codec);
        let writer = tokio::spawn(async move {
            let mut writer = FramedWrite::new(wr, BytesCodec::new());
            while let Some(frame) = frames_rx.recv().await {
                if let Err(err) = writer.send(frame).await {
                    log::error!("Failed to send to peer: {err}");
                    break;
                }
            }
        });

        fsm.handle_event(Event::AutomaticStartWithPassiveTcpEstablishment);
        fsm.handle_event(Event::TcpConnectionConfirmed);

        loop {
            tokio::select! {
                // Timer expiries queued during the last handler run first
                biased;
                Some(event) = events_rx.recv() => fsm.handle_event(event),
                message = reader.next() => match message {
                    Some(Ok(message)) => dispatch_message(&mut fsm, message),
                    Some(Err(err)) => dispatch_error(&mut fsm, &err),
                    None => {
                        log::info!("Peer closed the connection");
                        fsm.handle_event(Event::TcpConnectionFails);
                        break;
                    }
                },
            }
            if fsm.state() == State::Idle {
                log::info!("Session returned to Idle; dropping the connection");
                break;
            }
        }

        // Teardown order: reader first, then the machine (stopping its
        // timers), then wait for the writer to flush any final frame
        drop(reader);
        drop(fsm);
        let _ = writer.await;
        Ok(())
    }
}

/// Route a decoded message to the right state machine event
fn dispatch_message(fsm: &mut Fsm, message: Message) {
    match message {
        Message::Open(open) => {
            if fsm.delay_open_running() {
                fsm.handle_event(Event::BgpOpenWithDelayOpenTimerRunning(open));
            } else {
                fsm.handle_event(Event::BgpOpenMessageReceived(open));
            }
        }
        Message::Update(update) => fsm.handle_event(Event::BgpUpdateMessageReceived(update)),
        Message::Notification(notification) => {
            log::warn!("Peer sent NOTIFICATION {notification}");
            if notification.is_version_error() {
                fsm.handle_event(Event::BgpNotificationMessageVersionError);
            } else {
                fsm.handle_event(Event::BgpNotificationMessageReceived(notification));
            }
        }
        Message::Keepalive => fsm.handle_event(Event::BgpKeepaliveMessageReceived),
        Message::RouteRefresh(route_refresh) => {
            log::warn!(
                "ROUTE-REFRESH for AFI {} SAFI {} not supported; ignored",
                route_refresh.afi,
                route_refresh.safi
            );
        }
    }
}

/// Route a decode failure to the matching error event; the machine decides
/// whether a NOTIFICATION goes out and whether the session drops
fn dispatch_error(fsm: &mut Fsm, err: &PacketError) {
    log::warn!("Failed to decode inbound message: {err}");
    match err {
        PacketError::Header(err) => fsm.handle_event(Event::BgpHeaderError(err.clone())),
        PacketError::Open(err) => fsm.handle_event(Event::BgpOpenMessageError(err.clone())),
        PacketError::Update(err) => fsm.handle_event(Event::BgpUpdateMessageError(err.clone())),
        PacketError::RouteRefresh(_) | PacketError::Value(..) => {
            // Not fatal to the session; the message is dropped
        }
        PacketError::Io(_) => fsm.handle_event(Event::TcpConnectionFails),
    }
}
