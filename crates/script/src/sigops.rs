//! Legacy signature operation counting.

use emberd_primitives::Transaction;

use crate::{
    OP_CHECKMULTISIG, OP_CHECKMULTISIGVERIFY, OP_CHECKSIG, OP_CHECKSIGVERIFY, OP_PUSHDATA1,
    OP_PUSHDATA2, OP_PUSHDATA4,
};

/// Each CHECKMULTISIG is charged the maximum key count under legacy rules.
const MAX_PUBKEYS_PER_MULTISIG: u32 = 20;

/// Count signature operations in a script the legacy way: multisig costs
/// the full twenty regardless of the actual key count. Malformed pushes
/// terminate the scan, matching consensus behavior.
pub fn legacy_sigop_count(script: &[u8]) -> u32 {
    let mut count = 0u32;
    let mut cursor = 0usize;
    while cursor < script.len() {
        let opcode = script[cursor];
        cursor += 1;
        if opcode > 0 && opcode < OP_PUSHDATA1 {
            cursor += opcode as usize;
        } else if opcode == OP_PUSHDATA1 {
            let Some(len) = script.get(cursor).copied() else {
                break;
            };
            cursor += 1 + len as usize;
        } else if opcode == OP_PUSHDATA2 {
            let Some(bytes) = script.get(cursor..cursor + 2) else {
                break;
            };
            let len = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
            cursor += 2 + len;
        } else if opcode == OP_PUSHDATA4 {
            let Some(bytes) = script.get(cursor..cursor + 4) else {
                break;
            };
            let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
            cursor += 4 + len;
        } else if opcode == OP_CHECKSIG || opcode == OP_CHECKSIGVERIFY {
            count += 1;
        } else if opcode == OP_CHECKMULTISIG || opcode == OP_CHECKMULTISIGVERIFY {
            count += MAX_PUBKEYS_PER_MULTISIG;
        }
    }
    count
}

/// Legacy sigop count over all input and output scripts of a transaction.
pub fn tx_legacy_sigop_count(tx: &Transaction) -> u32 {
    let mut count = 0u32;
    for input in &tx.vin {
        count += legacy_sigop_count(&input.script_sig);
    }
    for output in &tx.vout {
        count += legacy_sigop_count(&output.script_pubkey);
    }
    count
}
