//! CLI commands for the ledger
//!
//! Implements all command handlers for the CLI interface.

use crate::config::LedgerConfig;
use crate::core::{
    Block, Blockchain, ChainValidationError, ChainValidator, ConsensusEngine, Decode, Destination,
    SignatureVerifier, Transaction,
};
use crate::crypto::{KeyPair, Secp256k1Signer};
use crate::mining::{Mempool, Miner};
use crate::storage::MemoryBlockStore;
use std::fmt;
use std::path::Path;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Amount the demo miner pays each wallet per block
const DEMO_TRANSFER: u64 = 100;

/// Fee attached to demo transfers
const DEMO_FEE: u64 = 1;

/// Number of demo wallets
const DEMO_WALLETS: usize = 3;

/// Parse a difficulty target written in hex, with or without `0x`
pub fn parse_difficulty(text: &str) -> CliResult<u32> {
    let digits = text
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    Ok(u32::from_str_radix(digits, 16)?)
}

/// Generate a key pair
pub fn cmd_keygen() -> CliResult<()> {
    let keypair = KeyPair::generate();

    println!("🔐 New key pair");
    println!("   📍 Address:     {}", keypair.address());
    println!("   🔑 Private key: {}", keypair.private_key_hex());
    println!("\n   ⚠️  Keep the private key secret!");

    Ok(())
}

/// Mine a short chain with transfers and print the resulting balances
pub async fn cmd_demo(config: &LedgerConfig, difficulty: Option<u32>, blocks: u32) -> CliResult<()> {
    let store = MemoryBlockStore::new(config);
    let engine = ConsensusEngine::with_config(&config.consensus);
    let signer = Secp256k1Signer::new();
    let miner = Miner::new(KeyPair::generate(), config.mining.clone());
    let wallets: Vec<KeyPair> = (0..DEMO_WALLETS).map(|_| KeyPair::generate()).collect();
    let mut mempool = Mempool::new();
    let mut sequence = 0u32;

    println!("⛏️  Mining {} block(s) for {}", blocks, miner.address());

    for _ in 0..blocks {
        let chain = store.blockchain().await;
        let pending = mempool.take(mempool.len());
        let tx_count = pending.len();

        let mut candidate = miner.next_candidate(&chain, pending)?;
        if chain.is_empty() {
            if let Some(target) = difficulty {
                candidate.set_difficulty_target(target);
            }
        }

        let (block, stats) = miner
            .mine(candidate, &engine)
            .ok_or("mining gave up before solving the block")?;
        let hash = block.hash_hex();
        let height = block.height();
        store.append_block(block).await?;

        println!("\n   Block {} mined!", height);
        println!("   ├─ Hash: {}", &hash[..16]);
        println!("   ├─ Transactions: {}", tx_count + 1);
        println!("   ├─ Time: {}ms", stats.time_ms);
        println!("   ├─ Attempts: {}", stats.hash_attempts);
        println!("   └─ Hash rate: {:.2} H/s", stats.hash_rate);

        // pay every wallet from the fresh reward in the next block
        for wallet in &wallets {
            sequence += 1;
            let tx = Transaction::signed(
                miner.keypair(),
                sequence,
                DEMO_FEE,
                vec![Destination::new(wallet.address(), DEMO_TRANSFER, "demo")],
                &signer,
            )?;
            mempool.put(tx);
        }
    }

    println!("\n💰 Balances after {} block(s):", store.len().await);
    println!("   miner {}: {}", miner.address(), store.balance(&miner.address()).await);
    for wallet in &wallets {
        println!("   {}: {}", wallet.address(), store.balance(&wallet.address()).await);
    }
    if !mempool.is_empty() {
        println!("   ({} transfer(s) still pending)", mempool.len());
    }

    Ok(())
}

/// Decode one hex block per non-empty line
pub fn load_chain(path: &Path) -> CliResult<Blockchain> {
    let text = std::fs::read_to_string(path)?;
    let mut blocks = Vec::new();
    for (number, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let block =
            Block::decode_hex(line).map_err(|e| format!("line {}: {}", number + 1, e))?;
        blocks.push(block);
    }
    Ok(Blockchain::from_blocks(blocks))
}

/// Validate a whole chain from an empty balance cache
pub fn validate_chain(
    config: &LedgerConfig,
    blockchain: &Blockchain,
) -> Result<(), ChainValidationError> {
    let mut validator = ChainValidator::new(
        SignatureVerifier::new(),
        ConsensusEngine::with_config(&config.consensus),
    );
    validator.validate_entire_chain_from_zero(blockchain)
}

/// Validate a file of hex blocks, printing OK or the error as JSON
pub fn cmd_validate(config: &LedgerConfig, path: &Path) -> CliResult<()> {
    let blockchain = load_chain(path)?;

    match validate_chain(config, &blockchain) {
        Ok(()) => println!("OK: {} block(s) valid", blockchain.len()),
        Err(err) => println!("{}", serde_json::to_string_pretty(&err)?),
    }

    Ok(())
}

/// Human-readable dump of a block
pub struct BlockSummary<'a>(pub &'a Block);

impl fmt::Display for BlockSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let block = self.0;
        writeln!(f, "Block {}", block.hash_hex())?;
        writeln!(f, "├─ Version: {}", block.version())?;
        writeln!(f, "├─ Height: {}", block.height())?;
        writeln!(f, "├─ Previous: {}", block.prev_block_hash_hex())?;
        writeln!(f, "├─ Target: {:08x}", block.difficulty_target())?;
        writeln!(f, "├─ Merkle root: {}", hex::encode(block.merkle_root()))?;
        writeln!(f, "├─ Nonce: {}", block.nonce())?;
        writeln!(f, "├─ Size: {} bytes", block.size())?;
        writeln!(f, "└─ Transactions: {}", block.tx_count())?;

        for (index, tx) in block.transactions().iter().enumerate() {
            let kind = if tx.is_coinbase() { "coinbase" } else { "transfer" };
            writeln!(f, "   [{}] {} {}", index, kind, tx.hash_hex())?;
            if !tx.is_coinbase() {
                writeln!(
                    f,
                    "       from {} (sequence {}, fee {})",
                    tx.sender(),
                    tx.sequence(),
                    tx.fee()
                )?;
            }
            for destination in tx.destinations() {
                write!(
                    f,
                    "       -> {} {}",
                    destination.address(),
                    destination.amount()
                )?;
                if !destination.message().is_empty() {
                    write!(f, " \"{}\"", destination.message_utf8())?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

/// Human-readable dump of a block as a string
pub fn describe_block(block: &Block) -> String {
    BlockSummary(block).to_string()
}

/// Decode a hex block and print it
pub fn cmd_inspect(hex_block: &str) -> CliResult<()> {
    let block = Block::decode_hex(hex_block)?;
    print!("{}", BlockSummary(&block));
    Ok(())
}
