// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Byte-stream transport over a serial port.

use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, warn};

use fpga_core::transport::{Inbound, Transport, TransportError, TransportFuture, TransportKind};

const READ_CHUNK: usize = 256;

pub struct SerialTransport {
    path: String,
    baud: u32,
    writer: Option<WriteHalf<SerialStream>>,
    reader: Option<JoinHandle<()>>,
}

impl SerialTransport {
    pub fn new(path: impl Into<String>, baud: u32) -> Self {
        Self {
            path: path.into(),
            baud,
            writer: None,
            reader: None,
        }
    }

    fn stop_reader(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.stop_reader();
    }
}

async fn read_loop(mut port: ReadHalf<SerialStream>, inbound: mpsc::Sender<Inbound>) {
    let mut buf = [0u8; READ_CHUNK];
    let reason = loop {
        match port.read(&mut buf).await {
            Ok(0) => break "end of stream".to_string(),
            Ok(n) => {
                if inbound
                    .send(Inbound::data(buf[..n].to_vec()))
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Err(e) => break e.to_string(),
        }
    };
    warn!("Serial read stopped: {}", reason);
    let _ = inbound.send(Inbound::Disconnected { reason }).await;
}

impl Transport for SerialTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::ByteStream
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud", self.path, self.baud)
    }

    fn open<'a>(&'a mut self, inbound: mpsc::Sender<Inbound>) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            self.stop_reader();
            self.writer = None;

            let port = tokio_serial::new(&self.path, self.baud)
                .open_native_async()
                .map_err(|e| TransportError::Connection(format!("{}: {}", self.path, e)))?;
            if let Err(e) = port.clear(ClearBuffer::All) {
                debug!("Could not flush {}: {}", self.path, e);
            }

            let (reader, writer) = tokio::io::split(port);
            self.writer = Some(writer);
            self.reader = Some(tokio::spawn(read_loop(reader, inbound)));
            Ok(())
        })
    }

    fn send<'a>(&'a mut self, bytes: &'a [u8]) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            let writer = self.writer.as_mut().ok_or(TransportError::NotConnected)?;
            writer.write_all(bytes).await?;
            writer.flush().await?;
            Ok(())
        })
    }

    fn close<'a>(&'a mut self) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            self.stop_reader();
            if let Some(mut writer) = self.writer.take() {
                let _ = writer.shutdown().await;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_missing_port_fails() {
        let mut transport = SerialTransport::new("/dev/does-not-exist-fpga", 115_200);
        let (tx, _rx) = mpsc::channel(1);
        let err = transport.open(tx).await.unwrap_err();
        assert!(matches!(err, TransportError::Connection(msg) if msg.contains("does-not-exist")));
    }

    #[tokio::test]
    async fn test_send_before_open() {
        let mut transport = SerialTransport::new("/dev/ttyUSB0", 115_200);
        assert_eq!(
            transport.send(&[1, 2, 3]).await.unwrap_err(),
            TransportError::NotConnected
        );
        assert_eq!(transport.describe(), "/dev/ttyUSB0 @ 115200 baud");
        assert_eq!(transport.kind(), TransportKind::ByteStream);
    }
}
