use std::io;

use log::{debug, trace};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

use crate::storage::lifecycle::Shutdown;
use crate::storage::types::Message;

/// Splits one `"<topic> <payload>"` line, the output format of
/// `mosquitto_sub -v`. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }
    Some(line.split_once(' ').unwrap_or((line, "")))
}

/// Feeds every line of `reader` into `tx` as a received [`Message`].
///
/// Returns the number of messages sent once the reader hits EOF, the
/// receiver goes away or `shutdown` fires.
///
/// With `tokio::io::stdin()` as the reader, returning on shutdown abandons a
/// read that keeps blocking one of the runtime's blocking threads until a
/// line or EOF arrives. Dropping the runtime waits for that thread, so a
/// caller feeding from stdin has to leave through `std::process::exit`.
pub async fn feed_lines<R>(
    reader: R,
    tx: mpsc::Sender<Message>,
    shutdown: Shutdown,
) -> io::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut sent = 0u64;
    loop {
        let line = tokio::select! {
            _ = shutdown.triggered() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            debug!("input closed after {} messages", sent);
            break;
        };
        let Some((topic, payload)) = parse_line(&line) else {
            continue;
        };
        trace!("line {}: [{}] {}", sent, topic, payload);
        if tx.send(Message::received(sent, topic, payload)).await.is_err() {
            break;
        }
        sent += 1;
    }
    Ok(sent)
}
