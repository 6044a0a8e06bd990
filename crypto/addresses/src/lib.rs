//! XAddress encoding of Lotus destinations.
//!
//! An address string is `<token><network><base58 body>` where the body is
//! `type || payload || checksum` and the checksum is the first four bytes of
//! `SHA256(token || network || type || payload)`.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

/// The token every Lotus address starts with
pub const TOKEN_NAME: &str = "lotus";

const CHECKSUM_LEN: usize = 4;

#[derive(Error, PartialEq, Eq, Debug, Clone)]
pub enum AddressError {
    #[error("address has no network marker")]
    MissingNetwork,

    #[error("invalid token {0}")]
    InvalidToken(String),

    #[error("unknown network marker '{0}'")]
    InvalidNetwork(char),

    #[error("unknown address type {0}")]
    InvalidType(u8),

    #[error("base58 decoding failed: {0}")]
    DecodingError(String),

    #[error("address body of {0} bytes is too short")]
    UndersizedPayload(usize),

    #[error("checksum is invalid")]
    BadChecksum,
}

#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug, Hash, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

impl Network {
    pub fn marker(self) -> char {
        match self {
            Network::Mainnet => '_',
            Network::Testnet => 'T',
            Network::Regtest => 'R',
        }
    }
}

impl TryFrom<char> for Network {
    type Error = AddressError;

    fn try_from(marker: char) -> Result<Self, Self::Error> {
        match marker {
            '_' => Ok(Network::Mainnet),
            'T' => Ok(Network::Testnet),
            'R' => Ok(Network::Regtest),
            _ => Err(AddressError::InvalidNetwork(marker)),
        }
    }
}

#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug, Hash, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum AddressType {
    /// The payload is a full locking script
    ScriptPubKey = 0,
    /// The payload is a 33-byte taproot commitment
    Taproot = 2,
}

impl TryFrom<u8> for AddressType {
    type Error = AddressError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AddressType::ScriptPubKey),
            2 => Ok(AddressType::Taproot),
            _ => Err(AddressError::InvalidType(value)),
        }
    }
}

#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Debug, Hash, BorshSerialize, BorshDeserialize)]
pub struct Address {
    pub network: Network,
    pub address_type: AddressType,
    pub payload: Vec<u8>,
}

impl Address {
    pub fn new(network: Network, address_type: AddressType, payload: &[u8]) -> Self {
        Self { network, address_type, payload: payload.to_vec() }
    }

    /// The address of a pay-to-public-key-hash locking script for `pubkey_hash`.
    pub fn from_pubkey_hash(network: Network, pubkey_hash: &[u8; 20]) -> Self {
        // OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG
        let mut script = Vec::with_capacity(25);
        script.extend_from_slice(&[0x76, 0xa9, 0x14]);
        script.extend_from_slice(pubkey_hash);
        script.extend_from_slice(&[0x88, 0xac]);
        Self::new(network, AddressType::ScriptPubKey, &script)
    }

    fn checksum(&self) -> [u8; CHECKSUM_LEN] {
        let mut hasher = Sha256::new();
        hasher.update(TOKEN_NAME.as_bytes());
        hasher.update([self.network.marker() as u8, self.address_type as u8]);
        hasher.update(&self.payload);
        let digest = hasher.finalize();
        [digest[0], digest[1], digest[2], digest[3]]
    }

    /// Checksum produced by lotusd 1.0.1 and prior, which hashed length-prefixed fields.
    /// Still accepted on decode.
    fn legacy_checksum(&self) -> [u8; CHECKSUM_LEN] {
        let mut hasher = Sha256::new();
        hasher.update(compact_size(TOKEN_NAME.len()));
        hasher.update(TOKEN_NAME.as_bytes());
        hasher.update([self.network.marker() as u8, self.address_type as u8]);
        hasher.update(compact_size(self.payload.len()));
        hasher.update(&self.payload);
        let digest = hasher.finalize();
        [digest[0], digest[1], digest[2], digest[3]]
    }

    pub fn encode(&self) -> String {
        let mut body = Vec::with_capacity(1 + self.payload.len() + CHECKSUM_LEN);
        body.push(self.address_type as u8);
        body.extend_from_slice(&self.payload);
        body.extend_from_slice(&self.checksum());
        format!("{}{}{}", TOKEN_NAME, self.network.marker(), bs58::encode(body).into_string())
    }

    pub fn decode(address: &str) -> Result<Self, AddressError> {
        let position = address.find(|c: char| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_').ok_or(AddressError::MissingNetwork)?;
        let (token, rest) = address.split_at(position);
        if token != TOKEN_NAME {
            return Err(AddressError::InvalidToken(token.to_string()));
        }
        let mut chars = rest.chars();
        let network = Network::try_from(chars.next().ok_or(AddressError::MissingNetwork)?)?;
        let body = bs58::decode(chars.as_str()).into_vec().map_err(|err| AddressError::DecodingError(err.to_string()))?;
        if body.len() < 1 + CHECKSUM_LEN {
            return Err(AddressError::UndersizedPayload(body.len()));
        }
        let address_type = AddressType::try_from(body[0])?;
        let (payload, check) = body[1..].split_at(body.len() - 1 - CHECKSUM_LEN);
        let decoded = Address::new(network, address_type, payload);
        if check == decoded.checksum() || check == decoded.legacy_checksum() {
            Ok(decoded)
        } else {
            Err(AddressError::BadChecksum)
        }
    }
}

fn compact_size(len: usize) -> Vec<u8> {
    match len {
        0..=0xfc => vec![len as u8],
        0xfd..=0xffff => [&[0xfd][..], &(len as u16).to_le_bytes()].concat(),
        _ => [&[0xfe][..], &(len as u32).to_le_bytes()].concat(),
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::decode(s)
    }
}

impl TryFrom<&str> for Address {
    type Error = AddressError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Address::decode(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as Deserialize>::deserialize(deserializer)?;
        Address::decode(&s).map_err(serde::de::Error::custom)
    }
}
