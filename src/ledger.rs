//! The simulated ledger: an append-only log of fingerprints keyed by a
//! store-backed ordinal ("block number").

use chrono::Utc;

use crate::models::{CertificateStatus, LedgerEntry, LedgerStats};
use crate::store::{Store, StoreResult, LEDGER_SEQUENCE};

pub const NETWORK_NAME: &str = "chainlearn-simulated";

#[derive(Debug, Clone)]
pub struct Ledger<S> {
    store: S,
}

impl<S: Store> Ledger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Strictly greater than every ordinal handed out before, including to concurrent callers.
    pub async fn next_ordinal(&self) -> StoreResult<i64> {
        self.store.next_sequence(LEDGER_SEQUENCE).await
    }

    /// Takes a fresh ordinal and appends the fingerprint under it.
    pub async fn record(&self, certificate_id: &str, hash: &str) -> StoreResult<LedgerEntry> {
        let block_number = self.next_ordinal().await?;
        let entry = self
            .store
            .append_ledger_entry(LedgerEntry {
                block_number,
                certificate_id: certificate_id.to_string(),
                hash: hash.to_string(),
                timestamp: Utc::now(),
                verified: true,
            })
            .await?;
        tracing::info!(block_number, certificate_id, "ledger entry recorded");
        Ok(entry)
    }

    pub async fn transactions(&self) -> StoreResult<Vec<LedgerEntry>> {
        self.store.list_ledger_entries().await
    }

    pub async fn stats(&self) -> StoreResult<LedgerStats> {
        let summary = self.store.ledger_summary().await?;
        let total_certificates = self.store.count_certificates(None).await?;
        let verified_certificates = self
            .store
            .count_certificates(Some(CertificateStatus::Verified))
            .await?;
        Ok(LedgerStats {
            network: NETWORK_NAME.to_string(),
            total_transactions: summary.total_entries,
            latest_block_number: summary.latest_block_number,
            total_certificates,
            verified_certificates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::collections::HashSet;

    #[tokio::test]
    async fn ordinals_strictly_increase() {
        let ledger = Ledger::new(MemoryStore::new());
        let mut last = 0;
        for _ in 0..10 {
            let next = ledger.next_ordinal().await.unwrap();
            assert!(next > last);
            last = next;
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_records_never_share_an_ordinal() {
        let ledger = Ledger::new(MemoryStore::new());
        let mut handles = Vec::new();
        for i in 0..32 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.record(&format!("CERT-{i}"), "h").await.unwrap().block_number
            }));
        }
        let mut seen = HashSet::new();
        for h in handles {
            assert!(seen.insert(h.await.unwrap()));
        }
        assert_eq!(seen.len(), 32);

        let txs = ledger.transactions().await.unwrap();
        let numbers: Vec<i64> = txs.iter().map(|t| t.block_number).collect();
        assert_eq!(numbers, (1..=32).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn stats_on_empty_ledger() {
        let ledger = Ledger::new(MemoryStore::new());
        let stats = ledger.stats().await.unwrap();
        assert_eq!(stats.total_transactions, 0);
        assert_eq!(stats.latest_block_number, None);
        assert_eq!(stats.network, NETWORK_NAME);
    }
}
