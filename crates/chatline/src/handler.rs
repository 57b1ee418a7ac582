//! Per-connection handler: framing, the auth state machine, and broadcast.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Register the connection in the registry
//!   2. Loop: read bytes → decode every complete frame → apply it to the
//!      session → reply / broadcast
//!   3. Stop on DISCONNECTION, EOF, repeated read errors, authentication
//!      failure, or server shutdown
//!   4. Remove the connection from the registry (which closes it)

use std::sync::Arc;

use bytes::BytesMut;
use chatline_protocol::{Command, CommandCodec, Decoder, Reply};
use chatline_session::{Action, Session};
use chatline_transport::{Connection, ConnectionId};

use crate::ChatError;
use crate::server::ServerState;

/// Whether the read loop keeps going after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Handles a single connection from accept to close.
///
/// The connection is in the registry for exactly as long as this function
/// runs; removal happens on every exit path, errors included.
pub(crate) async fn handle_connection<C: Connection>(
    conn: C,
    state: Arc<ServerState<C>>,
) -> Result<(), ChatError> {
    let conn = Arc::new(conn);
    let conn_id = state.registry.add(Arc::clone(&conn)).await?;
    tracing::debug!(%conn_id, "handling new connection");

    let result = serve(&conn, &state).await;

    state.registry.remove(conn_id).await;
    result
}

/// The read loop. Returns when the connection should be torn down.
async fn serve<C: Connection>(
    conn: &Arc<C>,
    state: &ServerState<C>,
) -> Result<(), ChatError> {
    let conn_id = conn.id();
    let mut session = Session::new(conn_id);
    let mut codec = CommandCodec::with_max_frame_len(state.config.max_frame_len);
    let mut buf = BytesMut::new();
    let mut read_errors = 0u32;

    loop {
        // Everything already buffered is processed before reading again.
        while let Some(command) = next_command(&mut codec, &mut buf, conn_id, false) {
            if step(conn, state, &mut session, command).await? == Flow::Stop {
                return Ok(());
            }
        }

        let received = tokio::select! {
            _ = state.shutdown.cancelled() => {
                tracing::info!(%conn_id, "server shutting down, closing connection");
                return Ok(());
            }
            received = conn.recv() => received,
        };

        match received {
            Ok(Some(data)) => {
                read_errors = 0;
                buf.extend_from_slice(&data);
            }
            Ok(None) => {
                while let Some(command) =
                    next_command(&mut codec, &mut buf, conn_id, true)
                {
                    if step(conn, state, &mut session, command).await?
                        == Flow::Stop
                    {
                        return Ok(());
                    }
                }
                tracing::info!(
                    %conn_id,
                    user = %session.name(),
                    "connection closed by peer"
                );
                return Ok(());
            }
            Err(e) => {
                read_errors += 1;
                tracing::warn!(%conn_id, error = %e, read_errors, "read failed");
                if read_errors >= state.config.max_read_errors {
                    return Err(e.into());
                }
            }
        }
    }
}

/// Pulls the next well-formed command out of the buffer.
///
/// Bad frames are logged and skipped; the codec has already dropped them,
/// so the loop simply moves on to the next frame.
fn next_command(
    codec: &mut CommandCodec,
    buf: &mut BytesMut,
    conn_id: ConnectionId,
    eof: bool,
) -> Option<Command> {
    loop {
        let decoded = if eof {
            codec.decode_eof(buf)
        } else {
            codec.decode(buf)
        };
        match decoded {
            Ok(command) => return command,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "dropping bad frame");
            }
        }
    }
}

/// Runs one command unless the server shuts down first.
///
/// A reply or broadcast stuck on a peer that stopped reading must not keep
/// the handler alive past [`ServerHandle::close`](crate::ServerHandle::close).
async fn step<C: Connection>(
    conn: &Arc<C>,
    state: &ServerState<C>,
    session: &mut Session,
    command: Command,
) -> Result<Flow, ChatError> {
    let conn_id = session.id();
    tokio::select! {
        _ = state.shutdown.cancelled() => {
            tracing::info!(%conn_id, "server shutting down, abandoning command");
            Ok(Flow::Stop)
        }
        flow = dispatch(conn, state, session, command) => flow,
    }
}

/// Applies one command to the session and performs the resulting action.
async fn dispatch<C: Connection>(
    conn: &Arc<C>,
    state: &ServerState<C>,
    session: &mut Session,
    command: Command,
) -> Result<Flow, ChatError> {
    let conn_id = session.id();
    tracing::debug!(%conn_id, code = %command.code(), "command received");

    let action = session.apply(command, &state.secret)?;

    if let Some(reply) = action.reply() {
        if let Err(e) = send_reply(conn.as_ref(), state, &reply).await {
            tracing::debug!(%conn_id, error = %e, "reply not delivered");
            if !action.is_terminal() {
                return Err(e);
            }
        }
    }

    match action {
        Action::Identified { user } => {
            state.registry.identify(conn_id, &user).await?;
        }
        Action::Broadcast { user, text } => {
            state.registry.register_message(conn_id, &text).await?;
            let exclude = (!state.config.echo_to_sender).then_some(conn_id);
            let reply = Reply::Message { user, text };
            if let Err(e) = state.registry.broadcast(&reply, exclude).await {
                tracing::warn!(%conn_id, error = %e, "message not broadcast");
            }
        }
        Action::AuthenticationFailed => return Err(session.failure().into()),
        Action::Disconnect => return Ok(Flow::Stop),
        Action::Authenticated | Action::Ignored => {}
    }

    Ok(Flow::Continue)
}

/// Writes a reply to the session's own client, bounded like a broadcast
/// write.
async fn send_reply<C: Connection>(
    conn: &C,
    state: &ServerState<C>,
    reply: &Reply,
) -> Result<(), ChatError> {
    let bytes = reply.to_bytes()?;
    let after = state.config.write_timeout();
    match tokio::time::timeout(after, conn.send(&bytes)).await {
        Ok(sent) => Ok(sent?),
        Err(_) => Err(ChatError::WriteTimeout { id: conn.id(), after }),
    }
}
