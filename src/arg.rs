//! Command line arguments parsing.
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use clap::Parser;
use minibgp::capability::CapabilitiesBuilder;
use minibgp::fsm::{SessionAttributes, SessionConfig};
use std::net::{IpAddr, Ipv4Addr};

#[derive(Parser, Debug)]
pub struct MiniBgpd {
    /// Our AS number
    pub local_as: u16,
    /// Our BGP router ID
    pub local_id: Ipv4Addr,
    /// Expected peer AS number; zero accepts any peer AS
    #[arg(short = 'r', long, default_value = "0")]
    pub remote_as: u16,
    /// BGP session listen address
    #[arg(short = 'l', long, default_value = "0.0.0.0")]
    pub listen_addr: IpAddr,
    /// BGP session listen port
    #[arg(short = 'p', long, default_value = "179")]
    pub listen_port: u16,
    /// Hold time proposed in our OPEN, in seconds (zero disables keepalives)
    #[arg(long, default_value = "90")]
    pub hold_time: u16,
    /// Connect retry interval in seconds
    #[arg(long, default_value = "120")]
    pub connect_retry_time: u16,
    /// Wait this many seconds after the connection before sending our OPEN
    #[arg(long, default_value = "0")]
    pub delay_open_time: u16,
    /// Idle hold interval for damped session re-entry, in seconds
    #[arg(long, default_value = "0")]
    pub idle_hold_time: u16,
    /// Damp session oscillations with the idle-hold timer
    #[arg(long)]
    pub damp_peer_oscillations: bool,
    /// Send a NOTIFICATION for errors detected before an OPEN was sent
    #[arg(long)]
    pub notify_without_open: bool,
    /// Announce the route refresh capability
    #[arg(long)]
    pub route_refresh: bool,
    /// Verbose mode
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl MiniBgpd {
    /// Session configuration for the one configured peer. The remote
    /// address is filled in at accept time.
    pub fn session_config(&self) -> SessionConfig {
        let mut attributes =
            SessionAttributes::PASSIVE_TCP_ESTABLISHMENT | SessionAttributes::ALLOW_AUTOMATIC_STOP;
        if self.delay_open_time > 0 {
            attributes |= SessionAttributes::DELAY_OPEN;
        }
        if self.damp_peer_oscillations {
            attributes |= SessionAttributes::DAMP_PEER_OSCILLATIONS;
        }
        if self.notify_without_open {
            attributes |= SessionAttributes::SEND_NOTIFICATION_WITHOUT_OPEN;
        }
        let mut capabilities = CapabilitiesBuilder::new().mp_ipv4_unicast();
        if self.route_refresh {
            capabilities = capabilities.route_refresh();
        }
        SessionConfig {
            local_addr: self.listen_addr,
            local_asn: self.local_as,
            remote_asn: self.remote_as,
            local_id: self.local_id,
            attributes,
            connect_retry_time: self.connect_retry_time,
            hold_time: self.hold_time,
            keepalive_time: self.hold_time / 3,
            delay_open_time: self.delay_open_time,
            idle_hold_time: self.idle_hold_time,
            capabilities: capabilities.build(),
            ..SessionConfig::default()
        }
    }
}
