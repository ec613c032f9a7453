//! Command-line interface handlers

pub mod commands;

pub use commands::{
    cmd_demo, cmd_inspect, cmd_keygen, cmd_validate, describe_block, load_chain,
    parse_difficulty, validate_chain, BlockSummary, CliResult,
};
