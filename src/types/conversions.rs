use ethers::types::Address;
use std::str::FromStr;

/// Zero address used by registries to pad fixed-size coin arrays.
pub const NULL_ADDRESS: Address = Address::zero();

/// Parse an address in any hex casing, with or without EIP-55 checksum.
///
/// The returned `Address` is the canonical form used as key everywhere in
/// the crate; two spellings of the same address compare equal after parsing.
pub fn string_to_address(s: &str) -> Result<Address, ConversionError> {
    let trimmed = s.trim();
    if !trimmed.starts_with("0x") && !trimmed.starts_with("0X") {
        return Err(ConversionError::InvalidAddress(format!(
            "{trimmed}: missing 0x prefix"
        )));
    }
    Address::from_str(&trimmed[2..]).map_err(|e| ConversionError::InvalidAddress(format!("{trimmed}: {e}")))
}

// Para claves JSON: minúsculas, con prefijo 0x
pub fn address_to_string(addr: Address) -> String {
    format!("{:#x}", addr)
}

/// Cache key for an ordered token pair, `"<in>|<out>"`.
pub fn pair_key(token_in: Address, token_out: Address) -> String {
    format!("{}|{}", address_to_string(token_in), address_to_string(token_out))
}

/// Inverse of [`pair_key`].
pub fn parse_pair_key(key: &str) -> Result<(Address, Address), ConversionError> {
    let (a, b) = key
        .split_once('|')
        .ok_or_else(|| ConversionError::InvalidPairKey(key.to_string()))?;
    Ok((string_to_address(a)?, string_to_address(b)?))
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Invalid token pair key: {0}")]
    InvalidPairKey(String),
}
