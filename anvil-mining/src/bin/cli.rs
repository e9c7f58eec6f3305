//! Offline helper for the anvil mining RPC formats.
//!
//! Decodes what miners and pools exchange with the node, without talking
//! to one. Output is JSON on stdout.

use std::env;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use bitcoin::hashes::Hash;
use bitcoin::pow::{CompactTarget, Target};
use serde_json::{Value, json};

use anvil_mining::auxpow::AuxPow;
use anvil_mining::auxpow::commitment::find_commitment;
use anvil_mining::merkle::{Digest, MerkleTree};
use anvil_mining::tracing::init_journald_or_stdout;
use anvil_mining::tracing::prelude::*;
use anvil_mining::types::Difficulty;
use anvil_mining::work::WorkBuffer;

fn main() -> Result<()> {
    init_journald_or_stdout();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: anvil-cli <command> [args...]");
        eprintln!();
        eprintln!("Commands:");
        eprintln!("  decode-work <data>       Decode a 128-byte getwork data buffer");
        eprintln!("  merkle <txid>...         Print every node of the merkle tree");
        eprintln!("  decode-auxpow <hex>      Decode a serialized aux proof of work");
        eprintln!("  target <bits>            Expand compact bits (hex)");
        std::process::exit(1);
    }

    let command = &args[1];
    let rest = &args[2..];

    let output = match command.as_str() {
        "decode-work" => cmd_decode_work(rest)?,
        "merkle" => cmd_merkle(rest)?,
        "decode-auxpow" => cmd_decode_auxpow(rest)?,
        "target" => cmd_target(rest)?,
        _ => {
            eprintln!("Unknown command: {}", command);
            eprintln!("Run without arguments to see usage.");
            std::process::exit(1);
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn single_arg<'a>(args: &'a [String], what: &str) -> Result<&'a str> {
    match args {
        [arg] => Ok(arg),
        _ => bail!("expected exactly one argument: <{what}>"),
    }
}

fn cmd_decode_work(args: &[String]) -> Result<Value> {
    let data = single_arg(args, "data")?;
    let header = WorkBuffer::decode_hex(data).context("decoding work data")?;
    debug!(hash = %header.block_hash(), "Decoded work");

    Ok(json!({
        "hash": header.block_hash().to_string(),
        "version": header.version.to_consensus(),
        "previousblockhash": header.prev_blockhash.to_string(),
        "merkleroot": header.merkle_root.to_string(),
        "time": header.time,
        "bits": format!("{:08x}", header.bits.to_consensus()),
        "nonce": header.nonce,
    }))
}

fn cmd_merkle(args: &[String]) -> Result<Value> {
    let leaves = args
        .iter()
        .map(|txid| Digest::from_str(txid).with_context(|| format!("parsing {txid}")))
        .collect::<Result<Vec<_>>>()?;
    let tree: MerkleTree = MerkleTree::from_leaves(leaves)?;

    Ok(json!({
        "root": tree.root().to_string(),
        "nodes": tree.nodes().iter().map(ToString::to_string).collect::<Vec<_>>(),
    }))
}

fn cmd_decode_auxpow(args: &[String]) -> Result<Value> {
    let data = single_arg(args, "hex")?;
    let aux_pow = AuxPow::from_hex(data).context("decoding aux pow")?;

    let commitment = aux_pow
        .coinbase_tx
        .input
        .first()
        .map(|input| find_commitment(&input.script_sig));
    let commitment = match commitment {
        Some(Ok(c)) => json!({
            "root": hex::encode(c.root.to_byte_array()),
            "size": c.size,
            "nonce": c.nonce,
        }),
        Some(Err(e)) => {
            warn!(error = %e, "Coinbase carries no usable commitment");
            Value::Null
        }
        None => Value::Null,
    };

    let branch = |digests: Vec<Digest>| digests.iter().map(ToString::to_string).collect::<Vec<_>>();

    Ok(json!({
        "parent_hash": aux_pow.parent_hash.to_string(),
        "coinbase_txid": aux_pow.coinbase_tx.compute_txid().to_string(),
        "coinbase_branch": branch(aux_pow.coinbase_branch.siblings().collect()),
        "chain_index": aux_pow.chain_index(),
        "chain_branch": branch(aux_pow.chain_branch.siblings().collect()),
        "parent_version": aux_pow.parent_header.version.to_consensus(),
        "commitment": commitment,
    }))
}

fn cmd_target(args: &[String]) -> Result<Value> {
    let bits = single_arg(args, "bits")?;
    let bits = u32::from_str_radix(bits.trim_start_matches("0x"), 16)
        .with_context(|| format!("bits {bits:?} are not hex"))?;
    let bits = CompactTarget::from_consensus(bits);
    let target = Target::from_compact(bits);

    Ok(json!({
        "bits": format!("{:08x}", bits.to_consensus()),
        "target": hex::encode(target.to_be_bytes()),
        "target_le": hex::encode(target.to_le_bytes()),
        "difficulty": Difficulty::from_bits(bits).as_f64(),
        "display": Difficulty::from_bits(bits).to_string(),
    }))
}
