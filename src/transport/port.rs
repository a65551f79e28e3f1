//! The live serial transport: an evofw3/HGI80 dongle reached through
//! `tokio-serial`.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::{is_control_line, rewrite_fake_gateway_addr0, RawLine, Transport};

const DEFAULT_BAUD: u32 = 115_200;
const CHANNEL_CAPACITY: usize = 256;

/// Open a serial port and spawn its read/write pump as a background task.
///
/// `fake_gateway_id`, when set, is substituted for the hardcoded
/// `18:000730` identity evofw3 firmware stamps on its own traffic, so the
/// rest of the stack sees this gateway's real device id.
pub fn open(path: &str, fake_gateway_id: Option<String>) -> Result<Transport> {
    let port = tokio_serial::new(path, DEFAULT_BAUD)
        .open_native_async()
        .map_err(|e| Error::Transport(format!("opening {path}: {e}")))?;

    let (reader, mut writer) = tokio::io::split(port);
    let mut lines = BufReader::new(reader).lines();

    let (in_tx, in_rx) = mpsc::channel::<RawLine>(CHANNEL_CAPACITY);
    let (out_tx, mut out_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);

    let join = tokio::spawn(async move {
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            if is_control_line(&line) {
                                debug!(%line, "evofw3 control line");
                                continue;
                            }
                            let line = match &fake_gateway_id {
                                Some(id) => rewrite_fake_gateway_addr0(&line, id),
                                None => line,
                            };
                            let raw = RawLine {
                                line,
                                dtm: chrono::Local::now(),
                                sent: false,
                            };
                            if in_tx.send(raw).await.is_err() {
                                return Ok(());
                            }
                        }
                        Ok(None) => {
                            warn!("serial port closed (EOF)");
                            return Err(Error::Transport("serial port EOF".into()));
                        }
                        Err(e) => {
                            return Err(Error::Transport(format!("read error: {e}")));
                        }
                    }
                }
                cmd = out_rx.recv() => {
                    match cmd {
                        Some(line) => {
                            if let Err(e) = writer.write_all(format!("{line}\r\n").as_bytes()).await {
                                return Err(Error::Transport(format!("write error: {e}")));
                            }
                        }
                        None => return Ok(()),
                    }
                }
            }
        }
    });

    Ok(Transport {
        inbound: in_rx,
        outbound: out_tx,
        join,
    })
}
