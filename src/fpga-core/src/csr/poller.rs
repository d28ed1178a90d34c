// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Background task reading a fixed set of registers on an interval.

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, info, warn};

use super::client::CsrClient;
use crate::transport::PollingPolicy;

/// Latest values of the polled registers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegisterSnapshot {
    /// `None` when the last read timed out or failed.
    pub values: BTreeMap<u32, Option<u32>>,
    pub polled_at: Option<String>,
    pub polls: u64,
}

pub async fn run_register_poller<P: PollingPolicy>(
    client: CsrClient,
    addresses: Vec<u32>,
    policy: P,
    snapshot_tx: watch::Sender<RegisterSnapshot>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!(
        "Polling {} register(s) every {:?}",
        addresses.len(),
        policy.interval()
    );
    let mut ticker = time::interval(policy.interval());
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    let mut snapshot = RegisterSnapshot::default();

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
                continue;
            }
        }

        let state = client.state();
        if !policy.should_poll(&state) {
            debug!("Skipping poll while {}", state);
            continue;
        }

        for &address in &addresses {
            let value = match client.read(address).await {
                Ok(value) => value,
                Err(err) => {
                    warn!("Poll of 0x{:08X} failed: {}", address, err);
                    None
                }
            };
            snapshot.values.insert(address, value);
        }
        snapshot.polls += 1;
        snapshot.polled_at = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));
        snapshot_tx.send_replace(snapshot.clone());
    }

    info!("Register poller stopped after {} poll(s)", snapshot.polls);
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::csr::client::CsrTaskConfig;
    use crate::csr::codec::{decode_command, ResponseFrame};
    use crate::transport::mock::MockTransport;
    use crate::transport::{FixedPolling, NoPolling};

    fn board() -> MockTransport {
        let (transport, _) = MockTransport::new(Box::new(|frame| match decode_command(frame) {
            Ok(Some(cmd)) if cmd.address() == 0x10 => {
                vec![ResponseFrame::ok(0xCAFE).to_bytes().to_vec()]
            }
            _ => Vec::new(),
        }));
        transport
    }

    #[tokio::test]
    async fn test_poller_publishes_snapshots() {
        let (client, _task) = CsrClient::spawn(Box::new(board()), CsrTaskConfig::default());
        client.open().await.unwrap();
        let (snapshot_tx, mut snapshot_rx) = watch::channel(RegisterSnapshot::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let poller = tokio::spawn(run_register_poller(
            client.clone(),
            vec![0x10, 0x14],
            FixedPolling::new(Duration::from_millis(20)),
            snapshot_tx,
            shutdown_rx,
        ));

        time::timeout(Duration::from_secs(2), snapshot_rx.changed())
            .await
            .unwrap()
            .unwrap();
        let snapshot = snapshot_rx.borrow().clone();
        assert_eq!(snapshot.values.get(&0x10), Some(&Some(0xCAFE)));
        // 0x14 never answers.
        assert_eq!(snapshot.values.get(&0x14), Some(&None));
        assert!(snapshot.polled_at.is_some());

        shutdown_tx.send(true).unwrap();
        time::timeout(Duration::from_secs(1), poller)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_poller_skips_when_disconnected() {
        let (client, _task) = CsrClient::spawn(Box::new(board()), CsrTaskConfig::default());
        let (snapshot_tx, snapshot_rx) = watch::channel(RegisterSnapshot::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let poller = tokio::spawn(run_register_poller(
            client,
            vec![0x10],
            FixedPolling::new(Duration::from_millis(10)),
            snapshot_tx,
            shutdown_rx,
        ));
        time::sleep(Duration::from_millis(60)).await;
        assert_eq!(snapshot_rx.borrow().polls, 0);

        shutdown_tx.send(true).unwrap();
        time::timeout(Duration::from_secs(1), poller)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_no_polling_stops_on_dropped_shutdown() {
        let (client, _task) = CsrClient::spawn(Box::new(board()), CsrTaskConfig::default());
        let (snapshot_tx, _snapshot_rx) = watch::channel(RegisterSnapshot::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let poller = tokio::spawn(run_register_poller(
            client,
            vec![0x10],
            NoPolling,
            snapshot_tx,
            shutdown_rx,
        ));
        drop(shutdown_tx);
        time::timeout(Duration::from_secs(1), poller)
            .await
            .unwrap()
            .unwrap();
    }
}
