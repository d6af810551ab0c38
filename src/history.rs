//! Callback history
//!
//! A fixed record of past cross-chain rebalance callbacks, plus the
//! explorer link helpers used when printing them. Nothing here reads the
//! network.

use serde::{Deserialize, Serialize};

/// RVM contract that emitted the recorded callbacks
pub const RVM_ADDRESS: &str = "0x75b3aee6908d0447dd598bf183bdc955ae280ca1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub tx_number: u64,
    /// Hash on the origin (reactive) chain
    pub reactive_hash: String,
    /// Hash of the callback on the destination chain
    pub destination_hash: String,
    pub timestamp: String,
    pub status: TxStatus,
    pub destination_chain: String,
    pub block_number: u64,
}

struct Sample {
    tx_number: u64,
    reactive_hash: &'static str,
    destination_hash: &'static str,
    timestamp: &'static str,
    block_number: u64,
}

const SAMPLES: [Sample; 6] = [
    Sample {
        tx_number: 49,
        reactive_hash: "0xfe5e48caca2a179ae807a73492fea41cca20ac0248acb9e8fdb0679a888026e6",
        destination_hash: "0x717b361935c68b1a4f2d0c51f2d3547e26788656234122024ecf250dc75999f3",
        timestamp: "2025-12-26 12:09:12",
        block_number: 9918025,
    },
    Sample {
        tx_number: 48,
        reactive_hash: "0xb7d2de7797aefde21d3f1bf945f0baf577d37f1444ac5745fec784feaae475e0",
        destination_hash: "0xe45e3694cfc420ec047100cf03ee5ae37e04dff9591ed44bada12e71fbe9bbab",
        timestamp: "2025-12-26 11:57:12",
        block_number: 9917972,
    },
    Sample {
        tx_number: 47,
        reactive_hash: "0xdc0879e6f3d37e15e45b020119b6da757595bc0c0accf57013707b80b6267f83",
        destination_hash: "0x57ea838365d7b004d8d2951f79911ef1d864b874a2b7ed59ec7c2ee843f15d7e",
        timestamp: "2025-12-24 22:25:24",
        block_number: 9908016,
    },
    Sample {
        tx_number: 46,
        reactive_hash: "0x0f59cf08514fae9db605a4a937251f5bd3f6adf7e1fd1c1357a438d46640b1b7",
        destination_hash: "0xc193f06e9fcfe66bbc1a89d8fa4de5ffded09832318380c6580b37a7fc485aa4",
        timestamp: "2025-12-24 22:13:36",
        block_number: 9907964,
    },
    Sample {
        tx_number: 45,
        reactive_hash: "0xbe3ceeb84df5479631a7deba5b5337d4892b41d01ed787060c89efb45ed5b596",
        destination_hash: "0xfe94034ca0a85ecfabfccffe4bce8125d168ed36c64531590054e3bb9ef3c04c",
        timestamp: "2025-12-24 22:02:00",
        block_number: 9907909,
    },
    Sample {
        tx_number: 44,
        reactive_hash: "0x059314ef0567523f825f9a652e305ea4284f4ba1973e95bced2f8c09d22618ac",
        destination_hash: "0x70d771c6219d76c7a5328a0abd214bf9e5bfb2188f82211a65dd32d613a713fe",
        timestamp: "2025-12-24 21:50:24",
        block_number: 9907854,
    },
];

/// Recorded callbacks, newest first
pub fn sample_transactions() -> Vec<TransactionRecord> {
    SAMPLES
        .iter()
        .enumerate()
        .map(|(i, s)| TransactionRecord {
            id: (i + 1).to_string(),
            tx_number: s.tx_number,
            reactive_hash: s.reactive_hash.to_string(),
            destination_hash: s.destination_hash.to_string(),
            timestamp: s.timestamp.to_string(),
            status: TxStatus::Success,
            destination_chain: "Sepolia".to_string(),
            block_number: s.block_number,
        })
        .collect()
}

/// `0xfe5e48...8026e6`. Short inputs come back unchanged.
pub fn truncate_hash(hash: &str) -> String {
    if hash.len() < 14 || !hash.is_ascii() {
        return hash.to_string();
    }
    format!("{}...{}", &hash[..8], &hash[hash.len() - 6..])
}

pub fn reactscan_url(rvm_address: &str, tx_number: u64) -> String {
    format!("https://lasna.reactscan.net/address/{}/{}", rvm_address, tx_number)
}

pub fn etherscan_address_url(address: &str) -> String {
    format!("https://sepolia.etherscan.io/address/{}", address)
}
