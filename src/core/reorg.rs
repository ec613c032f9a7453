//! Reorganization: find where a peer's chain diverges from ours
//!
//! Starting at the remote tip, the resolver follows `prev_block_hash` links
//! one fetch at a time until it reaches a block we already hold. The blocks
//! visited on the way form the fragment that replaces our suffix. Any
//! failure yields an empty fragment; a partially fetched one is never
//! returned.

use crate::config::ReorgConfig;
use crate::core::block::Block;
use crate::core::codec::{Decode, DecodeError};
use crate::crypto::{Hash256, ZERO_HASH};
use log::{debug, warn};
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Hash a walk must never step past: the parent of every genesis block
pub const PRE_GENESIS_HASH: Hash256 = ZERO_HASH;

/// Fetch failures reported by a [`BlockFetcher`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("block not found: {0}")]
    NotFound(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Reply to a fetch: the block's height and its storage bytes, if the peer has it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedBlock {
    pub height: u32,
    pub block_bytes: Option<Vec<u8>>,
}

/// Source of remote blocks by hash
pub trait BlockFetcher {
    fn fetch_by_hash(
        &self,
        hash_hex: &str,
    ) -> impl Future<Output = Result<FetchedBlock, FetchError>> + Send;
}

/// Why a walk was abandoned
#[derive(Error, Debug)]
pub enum ReorgError {
    #[error("couldn't fetch block {hash}: {source}")]
    Fetch {
        hash: String,
        #[source]
        source: FetchError,
    },
    #[error("peer has no bytes for block {0}")]
    MissingBlock(String),
    #[error("block {hash} is malformed: {source}")]
    Decode {
        hash: String,
        #[source]
        source: DecodeError,
    },
    #[error("peer returned block {got} when asked for {requested}")]
    HashMismatch { requested: String, got: String },
    #[error("fetching block {hash} timed out after {timeout:?}")]
    Timeout { hash: String, timeout: Duration },
    #[error("reached the genesis parent without finding a common ancestor")]
    NoCommonAncestor,
}

/// Walks a remote chain back to a common ancestor
#[derive(Debug, Clone, Default)]
pub struct ReorgResolver {
    config: ReorgConfig,
}

impl ReorgResolver {
    pub fn new(config: ReorgConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReorgConfig {
        &self.config
    }

    /// Fragment of remote blocks above the first locally known ancestor,
    /// oldest first
    ///
    /// Empty if the tip is already known, no common ancestor exists, or any
    /// fetch fails. Callers retry later.
    pub async fn resolve<F: BlockFetcher>(
        &self,
        known_hashes: &HashSet<Hash256>,
        tip: Block,
        fetcher: &F,
    ) -> Vec<Block> {
        match self.walk(known_hashes, tip, fetcher).await {
            Ok(fragment) => fragment,
            Err(err) => {
                warn!("Reorg abandoned, try again later: {}", err);
                Vec::new()
            }
        }
    }

    /// Like [`resolve`](Self::resolve) but reports why the walk stopped
    pub async fn walk<F: BlockFetcher>(
        &self,
        known_hashes: &HashSet<Hash256>,
        tip: Block,
        fetcher: &F,
    ) -> Result<Vec<Block>, ReorgError> {
        let mut fragment = VecDeque::new();
        let mut current = tip;

        while !known_hashes.contains(&current.hash()) {
            let prev = *current.prev_block_hash();
            fragment.push_front(current);

            if known_hashes.contains(&prev) {
                break;
            }
            if prev == PRE_GENESIS_HASH {
                return Err(ReorgError::NoCommonAncestor);
            }

            current = self.fetch(&prev, fetcher).await?;
        }

        debug!("Reorg fragment of {} blocks", fragment.len());
        Ok(fragment.into())
    }

    /// One hop: fetch, decode and check the block is the one asked for
    async fn fetch<F: BlockFetcher>(&self, hash: &Hash256, fetcher: &F) -> Result<Block, ReorgError> {
        let hash_hex = hex::encode(hash);
        debug!("Fetching ancestor {}", hash_hex);

        let request = fetcher.fetch_by_hash(&hash_hex);
        let reply = match self.config.hop_timeout {
            Some(timeout) => tokio::time::timeout(timeout, request)
                .await
                .map_err(|_| ReorgError::Timeout {
                    hash: hash_hex.clone(),
                    timeout,
                })?,
            None => request.await,
        };

        let fetched = reply.map_err(|source| ReorgError::Fetch {
            hash: hash_hex.clone(),
            source,
        })?;
        let bytes = fetched
            .block_bytes
            .ok_or_else(|| ReorgError::MissingBlock(hash_hex.clone()))?;
        let block = Block::decode(&bytes).map_err(|source| ReorgError::Decode {
            hash: hash_hex.clone(),
            source,
        })?;

        if &block.hash() != hash {
            return Err(ReorgError::HashMismatch {
                requested: hash_hex,
                got: block.hash_hex(),
            });
        }
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::block::BLOCK_VERSION;
    use crate::core::codec::Encode;
    use crate::core::transaction::{Destination, Transaction};
    use crate::crypto::{Address, KeyPair};
    use std::collections::HashMap;

    /// Serves blocks from a map, optionally stalling
    #[derive(Default)]
    struct MapFetcher {
        blocks: HashMap<String, (u32, Vec<u8>)>,
        stall: Option<Duration>,
    }

    impl MapFetcher {
        fn with_blocks(blocks: &[Block]) -> Self {
            let blocks = blocks
                .iter()
                .map(|b| (b.hash_hex(), (b.height(), b.encode())))
                .collect();
            Self {
                blocks,
                stall: None,
            }
        }
    }

    impl BlockFetcher for MapFetcher {
        fn fetch_by_hash(
            &self,
            hash_hex: &str,
        ) -> impl Future<Output = Result<FetchedBlock, FetchError>> + Send {
            let reply = self.blocks.get(hash_hex).cloned();
            let stall = self.stall;
            let hash_hex = hash_hex.to_owned();
            async move {
                if let Some(stall) = stall {
                    tokio::time::sleep(stall).await;
                }
                match reply {
                    Some((height, bytes)) => Ok(FetchedBlock {
                        height,
                        block_bytes: Some(bytes),
                    }),
                    None => Err(FetchError::NotFound(hash_hex)),
                }
            }
        }
    }

    fn chain(len: u32, salt: u64) -> Vec<Block> {
        let miner = KeyPair::generate().address();
        let mut blocks: Vec<Block> = Vec::new();
        for height in 0..len {
            let prev = blocks.last().map(Block::hash).unwrap_or(ZERO_HASH);
            let coinbase = Transaction::new(
                Address::COINBASE,
                0,
                0,
                vec![Destination::to(miner, salt)],
            );
            blocks.push(Block::new(BLOCK_VERSION, height, prev, 0, vec![coinbase], 0).unwrap());
        }
        blocks
    }

    fn extend(base: &[Block], extra: u32, salt: u64) -> Vec<Block> {
        let miner = KeyPair::generate().address();
        let mut blocks = base.to_vec();
        for _ in 0..extra {
            let tip = blocks.last().unwrap();
            let coinbase = Transaction::new(
                Address::COINBASE,
                0,
                0,
                vec![Destination::to(miner, salt)],
            );
            let next = Block::new(BLOCK_VERSION, tip.height() + 1, tip.hash(), 0, vec![coinbase], 0)
                .unwrap();
            blocks.push(next);
        }
        blocks
    }

    fn hashes(blocks: &[Block]) -> HashSet<Hash256> {
        blocks.iter().map(Block::hash).collect()
    }

    #[tokio::test]
    async fn test_fragment_above_common_ancestor() {
        let local = chain(3, 1);
        let remote = extend(&local[..2], 3, 2);
        let fetcher = MapFetcher::with_blocks(&remote);

        let resolver = ReorgResolver::default();
        let tip = remote.last().unwrap().clone();
        let fragment = resolver.resolve(&hashes(&local), tip, &fetcher).await;

        assert_eq!(fragment, remote[2..].to_vec());
        assert_eq!(fragment[0].height(), 2);
        assert_eq!(fragment[0].prev_block_hash(), &local[1].hash());
    }

    #[tokio::test]
    async fn test_known_tip_gives_empty_fragment() {
        let local = chain(2, 1);
        let fetcher = MapFetcher::default();

        let fragment = ReorgResolver::default()
            .resolve(&hashes(&local), local[1].clone(), &fetcher)
            .await;
        assert!(fragment.is_empty());
    }

    #[tokio::test]
    async fn test_direct_extension_needs_no_fetch() {
        let local = chain(2, 1);
        let remote = extend(&local, 1, 2);
        let fetcher = MapFetcher::default();

        let fragment = ReorgResolver::default()
            .resolve(&hashes(&local), remote[2].clone(), &fetcher)
            .await;
        assert_eq!(fragment, vec![remote[2].clone()]);
    }

    #[tokio::test]
    async fn test_unrelated_chain_hits_sentinel() {
        let local = chain(2, 1);
        let remote = chain(3, 2);
        let fetcher = MapFetcher::with_blocks(&remote);
        let resolver = ReorgResolver::default();

        let err = resolver
            .walk(&hashes(&local), remote[2].clone(), &fetcher)
            .await
            .unwrap_err();
        assert!(matches!(err, ReorgError::NoCommonAncestor));

        let fragment = resolver
            .resolve(&hashes(&local), remote[2].clone(), &fetcher)
            .await;
        assert!(fragment.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_returns_nothing() {
        let local = chain(2, 1);
        let remote = extend(&local, 3, 2);
        // the middle block is missing on the peer
        let mut fetcher = MapFetcher::with_blocks(&remote);
        fetcher.blocks.remove(&remote[3].hash_hex());

        let resolver = ReorgResolver::default();
        let err = resolver
            .walk(&hashes(&local), remote[4].clone(), &fetcher)
            .await
            .unwrap_err();
        assert!(matches!(err, ReorgError::Fetch { .. }));

        let fragment = resolver
            .resolve(&hashes(&local), remote[4].clone(), &fetcher)
            .await;
        assert!(fragment.is_empty());
    }

    #[tokio::test]
    async fn test_missing_bytes_and_garbage() {
        let local = chain(1, 1);
        let remote = extend(&local, 2, 2);
        let resolver = ReorgResolver::default();

        let mut fetcher = MapFetcher::with_blocks(&remote);
        fetcher
            .blocks
            .insert(remote[1].hash_hex(), (1, vec![0xde, 0xad]));
        let err = resolver
            .walk(&hashes(&local), remote[2].clone(), &fetcher)
            .await
            .unwrap_err();
        assert!(matches!(err, ReorgError::Decode { .. }));

        // a peer answering with some other valid block
        let mut fetcher = MapFetcher::with_blocks(&remote);
        fetcher
            .blocks
            .insert(remote[1].hash_hex(), (1, local[0].encode()));
        let err = resolver
            .walk(&hashes(&local), remote[2].clone(), &fetcher)
            .await
            .unwrap_err();
        assert!(matches!(err, ReorgError::HashMismatch { .. }));
    }

    #[tokio::test]
    async fn test_hop_timeout() {
        let local = chain(1, 1);
        let remote = extend(&local, 2, 2);
        let mut fetcher = MapFetcher::with_blocks(&remote);
        fetcher.stall = Some(Duration::from_millis(200));

        let resolver = ReorgResolver::new(ReorgConfig {
            hop_timeout: Some(Duration::from_millis(10)),
        });
        let err = resolver
            .walk(&hashes(&local), remote[2].clone(), &fetcher)
            .await
            .unwrap_err();
        assert!(matches!(err, ReorgError::Timeout { .. }));

        let patient = ReorgResolver::new(ReorgConfig { hop_timeout: None });
        let fragment = patient
            .resolve(&hashes(&local), remote[2].clone(), &fetcher)
            .await;
        assert_eq!(fragment.len(), 2);
    }
}
