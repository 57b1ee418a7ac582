//! The client registry: every connected session, behind one lock.
//!
//! # Lock discipline
//!
//! The lock guards membership and the per-member message logs. It is held
//! for map operations only and is always released before any transport
//! I/O:
//!
//! - `remove` takes the member out under the lock, then closes its
//!   transport after the guard is dropped.
//! - `broadcast` copies the recipients (`Arc` clones) under the lock, then
//!   writes to the copies with the lock released. Recipients whose write
//!   failed are removed afterwards.
//!
//! A slow client can therefore never stall a connect, a disconnect, or a
//! broadcast to somebody else.

use std::collections::HashMap;
use std::sync::Arc;

use chatline_protocol::Reply;
use chatline_transport::{Connection, ConnectionId};
use futures_util::future::join_all;
use tokio::sync::Mutex;

use crate::{RegistryConfig, RegistryError};

/// One registered connection.
struct Member<C> {
    connection: Arc<C>,
    /// Identity snapshot, updated by the owning handler on AUTH_REQUEST.
    name: String,
    /// Append-only log of the chat lines this member sent.
    messages: Vec<String>,
}

/// A read-only view of one member, for listings and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub id: ConnectionId,
    pub name: String,
    pub message_count: usize,
}

/// The outcome of one broadcast.
///
/// Failures are reported here and logged; they are never returned to the
/// client whose message triggered the broadcast.
#[derive(Debug, Default)]
pub struct BroadcastReport {
    /// Recipients that received the full encoded reply.
    pub delivered: Vec<ConnectionId>,
    /// Recipients whose write failed or timed out.
    pub failed: Vec<(ConnectionId, RegistryError)>,
}

impl BroadcastReport {
    /// Number of recipients a write was attempted for.
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }
}

/// The shared set of live connections.
///
/// Cheap to share: wrap it in an `Arc` and hand a clone to every handler
/// task. The membership map itself is never exposed.
pub struct Registry<C: Connection> {
    members: Mutex<HashMap<ConnectionId, Member<C>>>,
    config: RegistryConfig,
}

impl<C: Connection> Registry<C> {
    /// Creates an empty registry.
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            members: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Registers a newly accepted connection.
    ///
    /// # Errors
    /// Returns [`RegistryError::AlreadyRegistered`] if a connection with
    /// the same id is present.
    pub async fn add(
        &self,
        connection: Arc<C>,
    ) -> Result<ConnectionId, RegistryError> {
        let id = connection.id();
        let mut members = self.members.lock().await;
        if members.contains_key(&id) {
            return Err(RegistryError::AlreadyRegistered(id));
        }
        members.insert(
            id,
            Member {
                connection,
                name: String::new(),
                messages: Vec::new(),
            },
        );
        tracing::info!(%id, total = members.len(), "client registered");
        Ok(id)
    }

    /// Updates the identity snapshot of a member.
    pub async fn identify(
        &self,
        id: ConnectionId,
        name: &str,
    ) -> Result<(), RegistryError> {
        let mut members = self.members.lock().await;
        let member =
            members.get_mut(&id).ok_or(RegistryError::NotFound(id))?;
        member.name.clear();
        member.name.push_str(name);
        Ok(())
    }

    /// Removes a member and closes its transport.
    ///
    /// Returns `false` if the id was not registered, in which case nothing
    /// is closed. Because only the call that actually removed the member
    /// closes it, a transport is closed exactly once no matter how many
    /// times `remove` is called.
    pub async fn remove(&self, id: ConnectionId) -> bool {
        let removed = {
            let mut members = self.members.lock().await;
            let removed = members.remove(&id);
            if removed.is_some() {
                tracing::info!(%id, total = members.len(), "client removed");
            }
            removed
        };

        let Some(member) = removed else {
            return false;
        };
        if let Err(e) = member.connection.close().await {
            tracing::debug!(%id, user = %member.name, error = %e, "close failed");
        }
        true
    }

    /// Appends a chat line to a member's log.
    pub async fn register_message(
        &self,
        id: ConnectionId,
        text: &str,
    ) -> Result<(), RegistryError> {
        let mut members = self.members.lock().await;
        let member =
            members.get_mut(&id).ok_or(RegistryError::NotFound(id))?;
        member.messages.push(text.to_owned());
        Ok(())
    }

    /// Returns a copy of a member's message log.
    pub async fn messages(&self, id: ConnectionId) -> Option<Vec<String>> {
        let members = self.members.lock().await;
        members.get(&id).map(|m| m.messages.clone())
    }

    /// Writes `reply` to every member, optionally skipping one.
    ///
    /// The recipients are the members present when the snapshot is taken.
    /// A member removed while the writes are in flight may or may not get
    /// the line; a write to its closed transport fails cleanly and is
    /// reported like any other failure.
    ///
    /// Every recipient whose write fails or times out is removed from the
    /// registry and closed, the same as [`remove`](Self::remove).
    ///
    /// # Errors
    /// Only encoding errors are returned. Per-recipient write failures are
    /// logged and collected in the [`BroadcastReport`].
    pub async fn broadcast(
        &self,
        reply: &Reply,
        exclude: Option<ConnectionId>,
    ) -> Result<BroadcastReport, RegistryError> {
        let bytes = reply.to_bytes()?;
        let recipients = self.snapshot(exclude).await;
        let timeout = self.config.write_timeout;

        let writes = recipients.iter().map(|(id, connection)| {
            let bytes = &bytes;
            async move {
                let result =
                    tokio::time::timeout(timeout, connection.send(bytes)).await;
                (*id, result)
            }
        });

        let mut report = BroadcastReport::default();
        for (id, result) in join_all(writes).await {
            match result {
                Ok(Ok(())) => report.delivered.push(id),
                Ok(Err(source)) => {
                    tracing::warn!(%id, error = %source, "broadcast write failed");
                    report
                        .failed
                        .push((id, RegistryError::BroadcastWrite { id, source }));
                }
                Err(_) => {
                    tracing::warn!(%id, ?timeout, "broadcast write timed out");
                    report.failed.push((
                        id,
                        RegistryError::WriteTimeout { id, after: timeout },
                    ));
                }
            }
        }

        // A failed or timed-out write may have left part of a line on the
        // wire. The member is dropped so nothing else is written after it.
        for (id, _) in &report.failed {
            self.remove(*id).await;
        }

        tracing::debug!(
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "broadcast finished"
        );
        Ok(report)
    }

    /// Copies the recipient list, ordered by id, under the lock.
    async fn snapshot(
        &self,
        exclude: Option<ConnectionId>,
    ) -> Vec<(ConnectionId, Arc<C>)> {
        let members = self.members.lock().await;
        let mut recipients: Vec<_> = members
            .iter()
            .filter(|(id, _)| Some(**id) != exclude)
            .map(|(id, m)| (*id, Arc::clone(&m.connection)))
            .collect();
        recipients.sort_by_key(|(id, _)| *id);
        recipients
    }

    /// Lists every member, ordered by id.
    pub async fn members(&self) -> Vec<MemberInfo> {
        let members = self.members.lock().await;
        let mut infos: Vec<_> = members
            .iter()
            .map(|(id, m)| MemberInfo {
                id: *id,
                name: m.name.clone(),
                message_count: m.messages.len(),
            })
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.members.lock().await.contains_key(&id)
    }

    /// Returns the number of registered members.
    pub async fn len(&self) -> usize {
        self.members.lock().await.len()
    }

    /// Returns `true` if nobody is connected.
    pub async fn is_empty(&self) -> bool {
        self.members.lock().await.is_empty()
    }
}
