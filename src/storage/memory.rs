//! In-memory block store
//!
//! Wraps a [`ChainValidator`] and the chain it guards behind one async lock,
//! so appends and reorgs run as a single critical section. The store also
//! serves its blocks by hash, letting one store act as the peer another
//! reorgs against.

use crate::config::LedgerConfig;
use crate::core::{
    Balance, Block, BlockFetcher, Blockchain, ChainValidationError, ChainValidator,
    ConsensusEngine, ConsensusRules, Decode, DecodeError, Encode, FetchError, FetchedBlock,
    ReorgResolver, SignatureVerifier, TransactionVerifier,
};
use crate::crypto::{Address, Hash256};
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use thiserror::Error;
use tokio::sync::RwLock;

/// Default number of rejected blocks remembered for inspection
pub const DEFAULT_REJECTED_LIMIT: usize = 1_000;

/// Block store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Block rejected: {0}")]
    Rejected(#[from] ChainValidationError),
    #[error("Malformed block: {0}")]
    Decode(#[from] DecodeError),
    #[error("Fragment starts at height {height} but the chain has only {length} blocks")]
    Detached { height: usize, length: usize },
    #[error("Fragment would leave {length} blocks, not more than the current {current}")]
    NotLonger { length: usize, current: usize },
}

struct StoreInner<V, C> {
    validator: ChainValidator<V, C>,
    blockchain: Blockchain,
    /// Rejected blocks by hash, kept for inspection
    rejected: HashMap<String, Block>,
    /// Rejected block hashes, oldest first
    rejected_order: VecDeque<String>,
    rejected_limit: usize,
}

impl<V, C> StoreInner<V, C> {
    /// Remember a rejected block, evicting the oldest past the limit
    fn remember_rejected(&mut self, block: Block) {
        let hash = block.hash_hex();
        if self.rejected.insert(hash.clone(), block).is_none() {
            self.rejected_order.push_back(hash);
        }
        while self.rejected_order.len() > self.rejected_limit {
            if let Some(oldest) = self.rejected_order.pop_front() {
                debug!("Forgetting rejected block {}", oldest);
                self.rejected.remove(&oldest);
            }
        }
    }
}

/// Validated chain held in memory
pub struct MemoryBlockStore<V = SignatureVerifier, C = ConsensusEngine> {
    inner: RwLock<StoreInner<V, C>>,
}

impl MemoryBlockStore {
    /// Store with secp256k1 signatures and consensus limits from `config`
    pub fn new(config: &LedgerConfig) -> Self {
        Self::with_validator(ChainValidator::new(
            SignatureVerifier::new(),
            ConsensusEngine::with_config(&config.consensus),
        ))
    }
}

impl Default for MemoryBlockStore {
    fn default() -> Self {
        Self::new(&LedgerConfig::default())
    }
}

impl<V, C> MemoryBlockStore<V, C>
where
    V: TransactionVerifier + Send + Sync,
    C: ConsensusRules + Send + Sync,
{
    /// Store guarded by a caller-built validator, starting from an empty chain
    pub fn with_validator(validator: ChainValidator<V, C>) -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                validator,
                blockchain: Blockchain::new(),
                rejected: HashMap::new(),
                rejected_order: VecDeque::new(),
                rejected_limit: DEFAULT_REJECTED_LIMIT,
            }),
        }
    }

    /// Remember at most `limit` rejected blocks
    pub fn with_rejected_limit(mut self, limit: usize) -> Self {
        self.inner.get_mut().rejected_limit = limit;
        self
    }

    /// Validate and append a block
    pub async fn append_block(&self, block: Block) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let StoreInner {
            validator,
            blockchain,
            ..
        } = &mut *inner;

        if let Err(err) = validator.try_append_block(blockchain, block.clone()) {
            warn!("Block {} rejected: {}", block.hash_hex(), err);
            inner.remember_rejected(block);
            return Err(err.into());
        }
        Ok(())
    }

    /// Validate and append a block; false if it was rejected
    pub async fn try_append_block(&self, block: Block) -> bool {
        self.append_block(block).await.is_ok()
    }

    /// Decode storage bytes and append; decode failures are reported, not
    /// validated
    pub async fn try_append_raw(&self, bytes: &[u8]) -> Result<bool, StoreError> {
        let block = Block::decode(bytes)?;
        Ok(self.try_append_block(block).await)
    }

    /// Number of blocks in the chain
    pub async fn len(&self) -> usize {
        self.inner.read().await.blockchain.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.blockchain.is_empty()
    }

    /// Height of the tip, `None` for an empty chain
    pub async fn latest_height(&self) -> Option<u32> {
        self.inner.read().await.blockchain.tip().map(Block::height)
    }

    pub async fn latest_block(&self) -> Option<Block> {
        self.inner.read().await.blockchain.tip().cloned()
    }

    /// A block of the chain by hex hash
    pub async fn block_by_hash(&self, hash_hex: &str) -> Option<Block> {
        let inner = self.inner.read().await;
        inner
            .blockchain
            .blocks()
            .iter()
            .find(|b| b.hash_hex() == hash_hex)
            .cloned()
    }

    /// A previously rejected block by hex hash
    pub async fn rejected_block(&self, hash_hex: &str) -> Option<Block> {
        self.inner.read().await.rejected.get(hash_hex).cloned()
    }

    /// Hashes of every block in the chain
    pub async fn known_hashes(&self) -> HashSet<Hash256> {
        let inner = self.inner.read().await;
        inner.blockchain.blocks().iter().map(Block::hash).collect()
    }

    /// Copy of the current chain
    pub async fn blockchain(&self) -> Blockchain {
        self.inner.read().await.blockchain.clone()
    }

    pub async fn balance(&self, address: &Address) -> Balance {
        self.inner.read().await.validator.balance(address)
    }

    /// Replace the chain suffix from the fragment's first height and
    /// revalidate it
    ///
    /// The fragment must attach to the current chain and leave it longer.
    /// If it fails validation the previous chain and balances are restored.
    pub async fn apply_fragment(&self, fragment: Vec<Block>) -> Result<(), StoreError> {
        let Some(first) = fragment.first() else {
            return Ok(());
        };
        let start = first.height() as usize;

        let mut inner = self.inner.write().await;
        let StoreInner {
            validator,
            blockchain,
            ..
        } = &mut *inner;

        let current = blockchain.len();
        if start > current {
            return Err(StoreError::Detached {
                height: start,
                length: current,
            });
        }
        let length = start + fragment.len();
        if length <= current {
            return Err(StoreError::NotLonger { length, current });
        }

        let saved_chain = blockchain.clone();
        let saved_state = validator.snapshot_state();

        blockchain.truncate(start);
        for block in fragment {
            blockchain.push(block);
        }

        // balances above `start` cannot be unwound block by block
        let result = if validator.validated_length() > start {
            validator.validate_entire_chain_from_zero(blockchain)
        } else {
            validator.validate_missing_chain(blockchain)
        };

        if let Err(err) = result {
            warn!("Reorg fragment rejected: {}", err);
            *blockchain = saved_chain;
            validator.restore_state(saved_state);
            return Err(err.into());
        }

        info!(
            "Reorganized from height {}: {} -> {} blocks",
            start, current, length
        );
        Ok(())
    }

    /// Resolve a peer's tip against this chain and apply the resulting
    /// fragment; returns the number of blocks replaced in
    pub async fn reorg_from<F: BlockFetcher>(
        &self,
        resolver: &ReorgResolver,
        tip: Block,
        peer: &F,
    ) -> Result<usize, StoreError> {
        // no lock is held while fetching
        let known = self.known_hashes().await;
        let fragment = resolver.resolve(&known, tip, peer).await;
        let count = fragment.len();
        self.apply_fragment(fragment).await?;
        Ok(count)
    }
}

impl<V, C> BlockFetcher for MemoryBlockStore<V, C>
where
    V: TransactionVerifier + Send + Sync,
    C: ConsensusRules + Send + Sync,
{
    fn fetch_by_hash(
        &self,
        hash_hex: &str,
    ) -> impl Future<Output = Result<FetchedBlock, FetchError>> + Send {
        let hash_hex = hash_hex.to_owned();
        async move {
            match self.block_by_hash(&hash_hex).await {
                Some(block) => Ok(FetchedBlock {
                    height: block.height(),
                    block_bytes: Some(block.encode()),
                }),
                None => Err(FetchError::NotFound(hash_hex)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Destination, Transaction, BLOCK_VERSION};
    use crate::crypto::{KeyPair, ZERO_HASH};

    struct AcceptAll;

    impl TransactionVerifier for AcceptAll {
        fn verify_signature(&self, _tx: &Transaction) -> bool {
            true
        }

        fn verify_consensus(&self, _tx: &Transaction) -> bool {
            true
        }
    }

    fn store() -> MemoryBlockStore<AcceptAll, ConsensusEngine> {
        MemoryBlockStore::with_validator(ChainValidator::new(AcceptAll, ConsensusEngine::new()))
    }

    fn block(height: u32, prev: Hash256, miner: &Address, reward: u64) -> Block {
        let coinbase = Transaction::new(
            Address::COINBASE,
            height,
            0,
            vec![Destination::to(*miner, reward)],
        );
        Block::new(BLOCK_VERSION, height, prev, 0, vec![coinbase], 0).unwrap()
    }

    fn grow(blocks: &mut Vec<Block>, count: u32, miner: &Address) {
        for _ in 0..count {
            let (height, prev) = match blocks.last() {
                Some(tip) => (tip.height() + 1, tip.hash()),
                None => (0, ZERO_HASH),
            };
            blocks.push(block(height, prev, miner, 10));
        }
    }

    #[tokio::test]
    async fn test_append_and_lookup() {
        let store = store();
        let miner = KeyPair::generate().address();
        assert!(store.is_empty().await);
        assert_eq!(store.latest_height().await, None);

        let genesis = block(0, ZERO_HASH, &miner, 50);
        assert!(store.try_append_block(genesis.clone()).await);

        assert_eq!(store.len().await, 1);
        assert_eq!(store.latest_height().await, Some(0));
        assert_eq!(store.latest_block().await, Some(genesis.clone()));
        assert_eq!(store.block_by_hash(&genesis.hash_hex()).await, Some(genesis.clone()));
        assert!(store.known_hashes().await.contains(&genesis.hash()));
        assert_eq!(store.balance(&miner).await, 50);
    }

    #[tokio::test]
    async fn test_rejected_block_is_remembered() {
        let store = store();
        let miner = KeyPair::generate().address();

        let orphan = block(3, ZERO_HASH, &miner, 50);
        assert!(!store.try_append_block(orphan.clone()).await);
        assert!(store.is_empty().await);
        assert_eq!(store.rejected_block(&orphan.hash_hex()).await, Some(orphan.clone()));
        assert_eq!(store.block_by_hash(&orphan.hash_hex()).await, None);

        match store.append_block(orphan).await {
            Err(StoreError::Rejected(err)) => {
                assert_eq!(err.message, "block height out of order")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rejected_blocks_are_capped() {
        let store = store().with_rejected_limit(2);
        let miner = KeyPair::generate().address();

        let orphans: Vec<Block> = (1..=5).map(|h| block(h, ZERO_HASH, &miner, 50)).collect();
        for orphan in &orphans {
            assert!(!store.try_append_block(orphan.clone()).await);
        }
        // a repeat does not take a second slot
        assert!(!store.try_append_block(orphans[4].clone()).await);

        assert_eq!(store.inner.read().await.rejected.len(), 2);
        assert_eq!(store.inner.read().await.rejected_order.len(), 2);
        for oldest in &orphans[..3] {
            assert_eq!(store.rejected_block(&oldest.hash_hex()).await, None);
        }
        assert!(store.rejected_block(&orphans[3].hash_hex()).await.is_some());
        assert!(store.rejected_block(&orphans[4].hash_hex()).await.is_some());
    }

    #[tokio::test]
    async fn test_default_rejected_limit_holds() {
        let store = store();
        let miner = KeyPair::generate().address();

        for height in 1..=(DEFAULT_REJECTED_LIMIT as u32 + 50) {
            store.try_append_block(block(height, ZERO_HASH, &miner, 1)).await;
        }
        assert_eq!(store.inner.read().await.rejected.len(), DEFAULT_REJECTED_LIMIT);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_raw_append() {
        let store = store();
        let miner = KeyPair::generate().address();
        let genesis = block(0, ZERO_HASH, &miner, 50);

        assert!(store.try_append_raw(&genesis.encode()).await.unwrap());
        assert!(matches!(
            store.try_append_raw(&[0u8; 5]).await,
            Err(StoreError::Decode(_))
        ));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_fetch_by_hash() {
        let store = store();
        let miner = KeyPair::generate().address();
        let genesis = block(0, ZERO_HASH, &miner, 50);
        store.try_append_block(genesis.clone()).await;

        let fetched = store.fetch_by_hash(&genesis.hash_hex()).await.unwrap();
        assert_eq!(fetched.height, 0);
        assert_eq!(fetched.block_bytes, Some(genesis.encode()));

        assert!(matches!(
            store.fetch_by_hash(&hex::encode(ZERO_HASH)).await,
            Err(FetchError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_apply_fragment_replaces_suffix() {
        let ours = KeyPair::generate().address();
        let theirs = KeyPair::generate().address();

        let mut local = Vec::new();
        grow(&mut local, 3, &ours);
        let mut remote = local[..1].to_vec();
        grow(&mut remote, 3, &theirs);

        let store = store();
        for b in &local {
            assert!(store.try_append_block(b.clone()).await);
        }
        assert_eq!(store.balance(&ours).await, 30);

        store.apply_fragment(remote[1..].to_vec()).await.unwrap();
        assert_eq!(store.len().await, 4);
        assert_eq!(store.latest_block().await, remote.last().cloned());
        assert_eq!(store.balance(&ours).await, 10);
        assert_eq!(store.balance(&theirs).await, 30);
    }

    #[tokio::test]
    async fn test_invalid_fragment_restores_state() {
        let ours = KeyPair::generate().address();
        let mut local = Vec::new();
        grow(&mut local, 2, &ours);

        let store = store();
        for b in &local {
            store.try_append_block(b.clone()).await;
        }

        // second fragment block points at the wrong parent
        let good = block(1, local[0].hash(), &ours, 99);
        let bad = block(2, ZERO_HASH, &ours, 99);
        let err = store.apply_fragment(vec![good, bad]).await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));

        assert_eq!(store.blockchain().await.blocks(), &local[..]);
        assert_eq!(store.balance(&ours).await, 20);
    }

    #[tokio::test]
    async fn test_fragment_must_attach_and_grow() {
        let ours = KeyPair::generate().address();
        let mut local = Vec::new();
        grow(&mut local, 2, &ours);

        let store = store();
        for b in &local {
            store.try_append_block(b.clone()).await;
        }

        let detached = block(5, ZERO_HASH, &ours, 1);
        assert!(matches!(
            store.apply_fragment(vec![detached]).await,
            Err(StoreError::Detached { height: 5, length: 2 })
        ));

        let same_length = block(1, local[0].hash(), &ours, 1);
        assert!(matches!(
            store.apply_fragment(vec![same_length]).await,
            Err(StoreError::NotLonger { .. })
        ));

        assert!(store.apply_fragment(vec![]).await.is_ok());
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_reorg_from_peer_store() {
        let ours = KeyPair::generate().address();
        let theirs = KeyPair::generate().address();

        let mut shared = Vec::new();
        grow(&mut shared, 2, &ours);
        let mut local = shared.clone();
        grow(&mut local, 1, &ours);
        let mut remote = shared.clone();
        grow(&mut remote, 3, &theirs);

        let me = store();
        let peer = store();
        for b in &local {
            me.try_append_block(b.clone()).await;
        }
        for b in &remote {
            peer.try_append_block(b.clone()).await;
        }

        let tip = peer.latest_block().await.unwrap();
        let replaced = me
            .reorg_from(&ReorgResolver::default(), tip, &peer)
            .await
            .unwrap();

        assert_eq!(replaced, 3);
        assert_eq!(me.blockchain().await, peer.blockchain().await);
        assert_eq!(me.balance(&theirs).await, 30);
        assert_eq!(me.balance(&ours).await, 20);
    }
}
