// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use eyre::Context;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, info, warn};

use moor_common::matching::tokenize_words;
use moor_common::tasks::NarrativeEvent;
use moor_kernel::SchedulerClient;
use moor_var::{v_obj, Objid};

/// One line the event pump wants written to a connection, or a lifecycle action it should take.
enum ConnEvent {
    Line(String),
    Disconnect,
    Shutdown(String),
}

type Registry = Arc<Mutex<HashMap<Objid, mpsc::UnboundedSender<ConnEvent>>>>;

/// Binds `addr` and serves connections until a wizard calls `shutdown()` in-world. Returns once
/// the listener and every connection have wound down, leaving the caller free to join the
/// scheduler thread and write a final checkpoint.
pub async fn serve(addr: SocketAddr, scheduler: SchedulerClient) -> eyre::Result<()> {
    let registry: Registry = Arc::new(Mutex::new(HashMap::new()));
    let kill_switch = Arc::new(AtomicBool::new(false));

    let pump = spawn_event_pump(scheduler.clone(), registry.clone(), kill_switch.clone());

    let listener = TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?;
    info!(%addr, "moor listening");

    loop {
        if kill_switch.load(Ordering::Relaxed) {
            break;
        }
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
            },
            _ = tokio::time::sleep(Duration::from_millis(200)) => continue,
        };
        let scheduler = scheduler.clone();
        let registry = registry.clone();
        tokio::spawn(async move {
            info!(%peer, "accepted connection");
            if let Err(e) = handle_connection(stream, peer, scheduler, registry).await {
                warn!(%peer, error = %e, "connection ended with error");
            }
        });
    }

    // The pump thread only exits once the scheduler thread has dropped its event sender, which
    // happens after `SchedulerClient::shutdown()` -- posted by the pump itself on seeing
    // `NarrativeEvent::Shutdown`.
    let _ = tokio::task::spawn_blocking(move || pump.join()).await;
    Ok(())
}

/// Runs on its own OS thread (spec.md §5: the stepper and anything synchronous stays off the
/// Tokio runtime) draining the scheduler's event channel and routing each event to the connection
/// registered for its player, the way the reference host's pubsub subscriber thread routes
/// narrative events by client id.
fn spawn_event_pump(
    scheduler: SchedulerClient,
    registry: Registry,
    kill_switch: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("moor-net-pump".into())
        .spawn(move || {
            while let Some(event) = scheduler.recv_event_blocking() {
                match event {
                    NarrativeEvent::Notify { player, text } => {
                        if let Some(tx) = registry.lock().unwrap().get(&player) {
                            let _ = tx.send(ConnEvent::Line(text));
                        }
                    }
                    NarrativeEvent::Disconnect { player } => {
                        if let Some(tx) = registry.lock().unwrap().get(&player) {
                            let _ = tx.send(ConnEvent::Disconnect);
                        }
                    }
                    NarrativeEvent::Shutdown { message } => {
                        kill_switch.store(true, Ordering::Relaxed);
                        for tx in registry.lock().unwrap().values() {
                            let _ = tx.send(ConnEvent::Shutdown(message.clone()));
                        }
                        scheduler.shutdown();
                        break;
                    }
                }
            }
        })
        .expect("failed to spawn event-pump thread")
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    scheduler: SchedulerClient,
    registry: Registry,
) -> eyre::Result<()> {
    let framed = Framed::new(stream, LinesCodec::new());
    let (mut write, mut read) = framed.split();

    let Some(player) = authorize(&mut write, &mut read, &scheduler).await? else {
        return Ok(());
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    registry.lock().unwrap().insert(player, tx);

    let reconnect = tokio::task::block_in_place(|| scheduler.connect(player, peer.to_string()));
    let hook = if reconnect { "user_reconnected" } else { "user_connected" };
    scheduler.fire_hook(Objid::SYSTEM_OBJECT, hook, vec![v_obj(player)]);
    write
        .send(if reconnect { "*** Reconnected ***".to_string() } else { "*** Connected ***".to_string() })
        .await?;

    debug!(?player, %peer, "entering command loop");
    let result = command_loop(player, &mut write, &mut read, &scheduler, &mut rx).await;

    registry.lock().unwrap().remove(&player);
    scheduler.disconnect(player);
    // The connection was logged in by construction at this point (spec.md §4.8
    // "user_disconnected ... when the player was logged in"); a socket that closes before login
    // never reaches here at all (see `authorize`'s early `Ok(None)` return).
    scheduler.fire_hook(Objid::SYSTEM_OBJECT, "user_disconnected", vec![v_obj(player)]);

    result
}

/// Pre-login loop (spec.md §4.8 "Login handshake"): each line is tokenized and handed whole to
/// `#0:do_login_command`. A `None` result is treated as a failed attempt, not a fatal error --
/// the connection gets another try until the socket closes.
async fn authorize(
    write: &mut SplitSink<Framed<TcpStream, LinesCodec>, String>,
    read: &mut SplitStream<Framed<TcpStream, LinesCodec>>,
    scheduler: &SchedulerClient,
) -> eyre::Result<Option<Objid>> {
    loop {
        let Some(line) = read.next().await else {
            return Ok(None);
        };
        let line = line?;
        let words = tokenize_words(&line);
        if words.is_empty() {
            continue;
        }
        let scheduler = scheduler.clone();
        let result = tokio::task::spawn_blocking(move || scheduler.do_login_command(words))
            .await
            .unwrap_or(None);
        match result {
            Some(player) => return Ok(Some(player)),
            None => {
                write
                    .send("Either that player does not exist, or has a different password.".to_string())
                    .await?;
            }
        }
    }
}

async fn command_loop(
    player: Objid,
    write: &mut SplitSink<Framed<TcpStream, LinesCodec>, String>,
    read: &mut SplitStream<Framed<TcpStream, LinesCodec>>,
    scheduler: &SchedulerClient,
    rx: &mut mpsc::UnboundedReceiver<ConnEvent>,
) -> eyre::Result<()> {
    loop {
        tokio::select! {
            line = read.next() => {
                let Some(line) = line else {
                    info!(?player, "connection closed by client");
                    return Ok(());
                };
                scheduler.submit_input(player, line?);
            }
            event = rx.recv() => {
                match event {
                    Some(ConnEvent::Line(text)) => {
                        write.send(text).await.with_context(|| "writing to client")?;
                    }
                    Some(ConnEvent::Disconnect) => {
                        write.send("*** Disconnected ***".to_string()).await.ok();
                        write.close().await.ok();
                        return Ok(());
                    }
                    Some(ConnEvent::Shutdown(message)) => {
                        write.send(format!("*** Shutting down: {message} ***")).await.ok();
                        write.close().await.ok();
                        return Ok(());
                    }
                    None => {
                        // Sender side was dropped from the registry (duplicate login elsewhere);
                        // nothing more will arrive for this connection.
                        return Ok(());
                    }
                }
            }
        }
    }
}
