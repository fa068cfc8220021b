use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};

use crate::classify::{classify, Debouncer};
use crate::handlers::{self, Action, Client};
use crate::presence::{Realtime, RoomEvent};
use crate::state::AppState;

const GREETING: &str = "welcome to rusty-rooms, /login <name> to start, /help for commands";

pub async fn run(state: Arc<AppState>) -> io::Result<()> {
    let listener = TcpListener::bind(&state.config.bind_addr).await?;
    info!("Listening on {}", listener.local_addr()?);

    loop {
        let (socket, addr) = listener.accept().await?;
        let state = Arc::clone(&state);

        // One task per connection
        tokio::spawn(async move {
            if let Err(e) = handle_connection(state, socket, addr).await {
                warn!("Connection {} ended with error: {}", addr, e);
            }
        });
    }
}

async fn handle_connection(state: Arc<AppState>, socket: TcpStream, addr: SocketAddr) -> io::Result<()> {
    info!("Connection from {}", addr);
    let (reader, mut writer) = socket.into_split();
    let mut lines = BufReader::new(reader).lines();

    // Replies, room events and debounced previews all funnel through here
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let writer_task = tokio::spawn(async move {
        while let Some(line) = out_rx.recv().await {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
        }
        writer.shutdown().await
    });

    let _ = out_tx.send(GREETING.to_string());

    let mut client = Client::default();
    let mut events: Option<broadcast::Receiver<RoomEvent>> = None;
    let mut debouncer = Debouncer::new(state.config.draft_debounce);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let outcome = handlers::handle_line(&state, &mut client, &line).await;
                for reply in outcome.lines {
                    let _ = out_tx.send(reply);
                }
                match outcome.action {
                    Some(Action::Entered(room_id)) => events = Some(state.hub.subscribe(&room_id)),
                    Some(Action::Left) => events = None,
                    Some(Action::Draft(text)) => {
                        let tx = out_tx.clone();
                        debouncer.call(async move {
                            let _ = tx.send(format!("draft looks like: {}", classify(&text).as_str()));
                        });
                    }
                    Some(Action::Quit) => break,
                    None => {}
                }
            }
            event = next_event(&mut events) => match event {
                Ok(event) => {
                    if let RoomEvent::Terminated { .. } = event {
                        client.room_id = None;
                        events = None;
                    }
                    let _ = out_tx.send(event.to_string());
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Connection {} lagged behind by {} events", addr, missed);
                    let _ = out_tx.send(format!("* missed {missed} events, use /history to catch up"));
                }
                Err(broadcast::error::RecvError::Closed) => events = None,
            },
        }
    }

    debouncer.cancel();
    handlers::disconnect(&state, &client).await;
    drop(out_tx);

    match writer_task.await {
        Ok(result) => result,
        Err(e) => {
            error!("Writer task for {} failed: {}", addr, e);
            Ok(())
        }
    }
}

async fn next_event(events: &mut Option<broadcast::Receiver<RoomEvent>>) -> Result<RoomEvent, broadcast::error::RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
