use crate::errors::ChainError;

/// keccak256("Swap(address,uint256,uint256,uint256,uint256,address)"),
/// the V2 pair Swap event signature.
pub const SWAP_V2_TOPIC: &str =
    "0xd78ad95fa46c994b6551d0da85fc275fe613ce37657fb8d5e3d130840159d822";

const WORD_BYTES: usize = 32;
const DATA_WORDS: usize = 4;

/// The four amount words of a V2 Swap log, in event order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapAmounts {
    pub amount0_in: u128,
    pub amount1_in: u128,
    pub amount0_out: u128,
    pub amount1_out: u128,
}

impl SwapAmounts {
    /// Resolves trade direction: `(zero_for_one, amount_in, amount_out)`.
    ///
    /// Returns `None` when the amounts do not describe a single directed
    /// trade (both inputs zero, or no matching output).
    pub fn direction(&self) -> Option<(bool, u128, u128)> {
        if self.amount0_in > 0 && self.amount1_out > 0 {
            Some((true, self.amount0_in, self.amount1_out))
        } else if self.amount1_in > 0 && self.amount0_out > 0 {
            Some((false, self.amount1_in, self.amount0_out))
        } else {
            None
        }
    }
}

pub fn is_swap_topic(topic0: &str) -> bool {
    topic0.eq_ignore_ascii_case(SWAP_V2_TOPIC)
}

/// Decodes the data field of a V2 Swap log into its four amount words.
///
/// Each word must fit in a u128; anything wider is rejected rather than
/// silently truncated.
pub fn decode_swap_data(data: &str) -> Result<SwapAmounts, ChainError> {
    let stripped = data.strip_prefix("0x").unwrap_or(data);
    let bytes = hex::decode(stripped)?;

    if bytes.len() < WORD_BYTES * DATA_WORDS {
        return Err(ChainError::MalformedLog(format!(
            "swap data too short: {} bytes, expected at least {}",
            bytes.len(),
            WORD_BYTES * DATA_WORDS
        )));
    }

    let mut words = [0u128; DATA_WORDS];
    for (i, word) in words.iter_mut().enumerate() {
        let chunk = &bytes[i * WORD_BYTES..(i + 1) * WORD_BYTES];
        if chunk[..16].iter().any(|b| *b != 0) {
            return Err(ChainError::MalformedLog(format!(
                "amount word {i} exceeds u128"
            )));
        }
        *word = chunk[16..]
            .iter()
            .fold(0u128, |acc, b| (acc << 8) | *b as u128);
    }

    Ok(SwapAmounts {
        amount0_in: words[0],
        amount1_in: words[1],
        amount0_out: words[2],
        amount1_out: words[3],
    })
}
