//! Local input read on a detached thread.
//!
//! A blocking read on the runtime's blocking pool holds the runtime open until
//! it returns. Reading on a thread the runtime does not own lets a session
//! finish, and the runtime shut down, while local input is still open.

use std::io::{self, Read};
use std::thread;

use bytes::Bytes;
use futures_util::stream;
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;

use super::LocalInput;

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Chunks read ahead of the remote writer.
const READ_AHEAD_CHUNKS: usize = 4;

/// Wrap a blocking `reader` as a [`LocalInput`] fed by a detached thread.
///
/// The thread exits at end of input, after a read error, or on its next read
/// once the returned stream has been dropped.
///
/// # Errors
///
/// Returns the I/O error from spawning the reader thread.
pub fn detached_input<R: Read + Send + 'static>(reader: R) -> io::Result<LocalInput> {
    let (sender, receiver) = mpsc::channel(READ_AHEAD_CHUNKS);
    thread::Builder::new()
        .name(String::from("runbox-input"))
        .spawn(move || pump(reader, &sender))?;
    let chunks = stream::unfold(receiver, |mut pending| async move {
        pending.recv().await.map(|chunk| (chunk, pending))
    });
    Ok(Box::pin(StreamReader::new(chunks)))
}

fn pump<R: Read>(mut reader: R, sender: &mpsc::Sender<io::Result<Bytes>>) {
    let mut buffer = vec![0_u8; READ_CHUNK_BYTES];
    loop {
        let chunk = match reader.read(&mut buffer) {
            Ok(0) => return,
            Ok(count) => Ok(Bytes::copy_from_slice(
                buffer.get(..count).unwrap_or_default(),
            )),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => Err(error),
        };
        let last = chunk.is_err();
        if sender.blocking_send(chunk).is_err() || last {
            return;
        }
    }
}
