//! The registration registry, running in its own task.
//!
//! Entries are one-shot: a claim removes the registration, so a virtual
//! address can be consumed exactly once. The registry is owned by the bridge
//! task; producers and the HTTP front talk to it over a command channel, so
//! there is no shared mutable map and no global state.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use sealdrop_core::{ObjectHandle, SealdropError, SealdropResult};
use sealdrop_crypto::SecretKey;

/// A pending stream: everything the proxy needs to satisfy a download of
/// the virtual address without consulting the producer again.
pub struct Registration {
    /// Opaque virtual address the consumer will be pointed at.
    pub address: String,
    /// Filename offered in the response's content disposition.
    pub display_name: String,
    /// Plaintext size. Informational; never sent as a length header.
    pub total_size: u64,
    /// Where the ciphertext lives.
    pub remote: ObjectHandle,
    /// Transfer key for decrypting frames.
    pub key: SecretKey,
    /// Frame geometry of the remote ciphertext.
    pub plain_chunk_size: usize,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("address", &self.address)
            .field("display_name", &self.display_name)
            .field("total_size", &self.total_size)
            .field("remote", &self.remote)
            .field("key", &"[REDACTED]")
            .field("plain_chunk_size", &self.plain_chunk_size)
            .finish()
    }
}

enum Command {
    Register {
        reg: Registration,
        ready: oneshot::Sender<()>,
    },
    Claim {
        address: String,
        reply: oneshot::Sender<Option<Registration>>,
    },
    Unregister {
        address: String,
    },
}

pub struct ProxyBridge;

impl ProxyBridge {
    /// Spawn the registry task and hand back the producer/consumer handle.
    pub fn spawn(handshake_timeout: Duration) -> BridgeHandle {
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(run(rx));
        BridgeHandle {
            tx,
            handshake_timeout,
        }
    }
}

async fn run(mut rx: mpsc::Receiver<Command>) {
    let mut pending: HashMap<String, Registration> = HashMap::new();
    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::Register { reg, ready } => {
                debug!(address = %reg.address, name = %reg.display_name, "stream registered");
                pending.insert(reg.address.clone(), reg);
                let _ = ready.send(());
            }
            Command::Claim { address, reply } => {
                let hit = pending.remove(&address);
                debug!(address = %address, found = hit.is_some(), "stream claimed");
                let _ = reply.send(hit);
            }
            Command::Unregister { address } => {
                pending.remove(&address);
                debug!(address = %address, "stream unregistered");
            }
        }
    }
}

#[derive(Clone)]
pub struct BridgeHandle {
    tx: mpsc::Sender<Command>,
    handshake_timeout: Duration,
}

impl BridgeHandle {
    /// Register a pending stream and wait for the bridge to acknowledge
    /// readiness on a dedicated reply channel.
    ///
    /// A bridge that never acknowledges within the handshake timeout is an
    /// error. Proceeding optimistically here would race a slow bridge and
    /// fail silently on the consumer side.
    pub async fn register(&self, reg: Registration) -> SealdropResult<()> {
        let (ready_tx, ready_rx) = oneshot::channel();
        self.tx
            .send(Command::Register {
                reg,
                ready: ready_tx,
            })
            .await
            .map_err(|_| SealdropError::Transport("proxy bridge is gone".into()))?;

        match tokio::time::timeout(self.handshake_timeout, ready_rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(SealdropError::Transport(
                "proxy bridge dropped the handshake".into(),
            )),
            Err(_) => Err(SealdropError::Transport(format!(
                "proxy bridge did not acknowledge within {:?}",
                self.handshake_timeout
            ))),
        }
    }

    /// Take the registration for an address, if any. Claims are one-shot.
    pub async fn claim(&self, address: &str) -> SealdropResult<Option<Registration>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Claim {
                address: address.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| SealdropError::Transport("proxy bridge is gone".into()))?;
        reply_rx
            .await
            .map_err(|_| SealdropError::Transport("proxy bridge dropped the claim".into()))
    }

    /// Drop a registration that will not be consumed.
    pub async fn unregister(&self, address: &str) -> SealdropResult<()> {
        self.tx
            .send(Command::Unregister {
                address: address.to_string(),
            })
            .await
            .map_err(|_| SealdropError::Transport("proxy bridge is gone".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealdrop_crypto::generate_key;

    fn registration(address: &str) -> Registration {
        Registration {
            address: address.into(),
            display_name: "file.bin".into(),
            total_size: 100,
            remote: ObjectHandle("obj-1".into()),
            key: generate_key(),
            plain_chunk_size: 64,
        }
    }

    #[tokio::test]
    async fn test_register_then_claim() {
        let bridge = ProxyBridge::spawn(Duration::from_secs(3));
        bridge.register(registration("addr-1")).await.unwrap();

        let claimed = bridge.claim("addr-1").await.unwrap();
        assert!(claimed.is_some());
        assert_eq!(claimed.unwrap().display_name, "file.bin");
    }

    #[tokio::test]
    async fn test_claims_are_one_shot() {
        let bridge = ProxyBridge::spawn(Duration::from_secs(3));
        bridge.register(registration("addr-1")).await.unwrap();

        assert!(bridge.claim("addr-1").await.unwrap().is_some());
        assert!(bridge.claim("addr-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_unknown_address() {
        let bridge = ProxyBridge::spawn(Duration::from_secs(3));
        assert!(bridge.claim("nowhere").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unregister_drops_entry() {
        let bridge = ProxyBridge::spawn(Duration::from_secs(3));
        bridge.register(registration("addr-1")).await.unwrap();
        bridge.unregister("addr-1").await.unwrap();
        assert!(bridge.claim("addr-1").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_timeout_is_an_error() {
        // A handle wired to a channel nobody services: the ready ack never
        // comes and register must fail rather than proceed optimistically.
        let (tx, rx) = mpsc::channel(16);
        let handle = BridgeHandle {
            tx,
            handshake_timeout: Duration::from_secs(3),
        };
        // Keep the receiver alive but unresponsive.
        let _parked = rx;

        let err = handle.register(registration("addr-1")).await.unwrap_err();
        assert!(matches!(err, SealdropError::Transport(_)));
    }

    #[tokio::test]
    async fn test_dead_bridge_fails_register() {
        let (tx, rx) = mpsc::channel(16);
        drop(rx);
        let handle = BridgeHandle {
            tx,
            handshake_timeout: Duration::from_secs(3),
        };
        let err = handle.register(registration("addr-1")).await.unwrap_err();
        assert!(matches!(err, SealdropError::Transport(_)));
    }
}
