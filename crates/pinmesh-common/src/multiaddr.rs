//! Composite network addresses.
//!
//! A [`Multiaddr`] names a TCP endpoint and, optionally, the peer expected
//! to answer there:
//!
//! ```text
//! /ip4/192.0.2.7/tcp/9096
//! /ip4/192.0.2.7/tcp/9096/p2p/<peer-id-hex>
//! /ip6/::1/tcp/9096/p2p/<peer-id-hex>
//! ```
//!
//! The two core operations are [`Multiaddr::split`], which separates the
//! peer id from the transport address, and [`Multiaddr::with_peer`], which
//! decorates a transport address with one.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::peer::PeerId;
use crate::protocol::error::{ClusterError, Result};

/// A composable network address that may carry a peer id suffix.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Multiaddr {
    ip: IpAddr,
    port: u16,
    peer: Option<PeerId>,
}

impl Multiaddr {
    /// Builds a bare transport address.
    pub fn from_socket_addr(addr: SocketAddr) -> Self {
        Multiaddr {
            ip: addr.ip(),
            port: addr.port(),
            peer: None,
        }
    }

    /// The TCP endpoint this address names.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    /// The peer id suffix, if any.
    pub fn peer(&self) -> Option<PeerId> {
        self.peer
    }

    /// Returns this address decorated with a `/p2p/<peer>` suffix.
    pub fn with_peer(&self, peer: PeerId) -> Self {
        Multiaddr {
            ip: self.ip,
            port: self.port,
            peer: Some(peer),
        }
    }

    /// Returns this address with any peer suffix removed.
    pub fn transport(&self) -> Self {
        Multiaddr {
            ip: self.ip,
            port: self.port,
            peer: None,
        }
    }

    /// Splits a composite address into its peer id and transport parts.
    ///
    /// Fails if the address carries no peer suffix.
    pub fn split(&self) -> Result<(PeerId, Multiaddr)> {
        match self.peer {
            Some(pid) => Ok((pid, self.transport())),
            None => Err(ClusterError::Address(format!(
                "{} carries no /p2p/ peer component",
                self
            ))),
        }
    }
}

impl fmt::Display for Multiaddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip {
            IpAddr::V4(ip) => write!(f, "/ip4/{}/tcp/{}", ip, self.port)?,
            IpAddr::V6(ip) => write!(f, "/ip6/{}/tcp/{}", ip, self.port)?,
        }
        if let Some(pid) = self.peer {
            write!(f, "/p2p/{}", pid)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Multiaddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Multiaddr({})", self)
    }
}

impl FromStr for Multiaddr {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self> {
        let bad = |msg: &str| ClusterError::Address(format!("'{}': {}", s, msg));

        let mut parts = s.split('/');
        if parts.next() != Some("") {
            return Err(bad("must start with '/'"));
        }

        let ip = match (parts.next(), parts.next()) {
            (Some("ip4"), Some(ip)) => IpAddr::V4(ip.parse().map_err(|_| bad("bad ip4 address"))?),
            (Some("ip6"), Some(ip)) => IpAddr::V6(ip.parse().map_err(|_| bad("bad ip6 address"))?),
            _ => return Err(bad("expected /ip4/ or /ip6/ prefix")),
        };

        let port = match (parts.next(), parts.next()) {
            (Some("tcp"), Some(port)) => port.parse().map_err(|_| bad("bad tcp port"))?,
            _ => return Err(bad("expected /tcp/<port>")),
        };

        let peer = match (parts.next(), parts.next()) {
            (None, _) => None,
            (Some("p2p"), Some(pid)) => Some(pid.parse()?),
            _ => return Err(bad("trailing components must be /p2p/<peer-id>")),
        };

        if parts.next().is_some() {
            return Err(bad("unexpected trailing components"));
        }

        Ok(Multiaddr { ip, port, peer })
    }
}

impl Serialize for Multiaddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Multiaddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct MultiaddrVisitor;

        impl Visitor<'_> for MultiaddrVisitor {
            type Value = Multiaddr;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a multiaddr string like /ip4/1.2.3.4/tcp/9096")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Multiaddr, E> {
                v.parse().map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_str(MultiaddrVisitor)
    }
}
