//! Fixed-size identifiers with base58check text encoding.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::HashError;

fn encode(prefix: &[u8], payload: &[u8]) -> String {
    let mut buf = Vec::with_capacity(prefix.len() + payload.len());
    buf.extend_from_slice(prefix);
    buf.extend_from_slice(payload);
    bs58::encode(buf).with_check().into_string()
}

fn decode<const N: usize>(
    s: &str,
    prefix: &[u8],
    kind: &'static str,
) -> Result<[u8; N], HashError> {
    let raw = bs58::decode(s).with_check(None).into_vec()?;
    let payload = raw.strip_prefix(prefix).ok_or(HashError::Prefix(kind))?;

    <[u8; N]>::try_from(payload).map_err(|_| HashError::Length {
        expected: N,
        actual: payload.len(),
    })
}

macro_rules! base58_hash {
    ($(#[$meta:meta])* $name:ident, $len:expr, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name([u8; $len]);

        impl $name {
            /// Payload length in bytes.
            pub const LEN: usize = $len;

            const PREFIX: &'static [u8] = &$prefix;

            /// Wraps raw payload bytes.
            #[must_use]
            pub const fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Returns the raw payload bytes.
            #[must_use]
            pub const fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&encode(Self::PREFIX, &self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = HashError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                decode(s, Self::PREFIX, stringify!($name)).map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(D::Error::custom)
            }
        }
    };
}

base58_hash!(
    /// Identifies the chain being monitored.
    ChainId,
    4,
    [87, 82, 0]
);

base58_hash!(
    /// Identifies a block.
    BlockHash,
    32,
    [1, 52]
);

base58_hash!(
    /// Identifies a protocol version.
    ProtocolHash,
    32,
    [2, 170]
);

#[cfg(test)]
mod tests {
    use super::*;

    fn block_hash(first: u8) -> BlockHash {
        let mut bytes = [0u8; 32];
        bytes[0] = first;
        BlockHash::new(bytes)
    }

    #[test]
    fn test_chain_id_encoding() {
        assert_eq!(ChainId::new([0; 4]).to_string(), "NetXH12Aer3be93");
    }

    #[test]
    fn test_block_hash_encoding() {
        assert_eq!(
            block_hash(1).to_string(),
            "BKiisx71SeX91a4DF6vd4ykBkDTdSVpkH44SvxUc9U8ytodDvfn"
        );
    }

    #[test]
    fn test_parse_from_display() {
        let hash = block_hash(7);
        assert_eq!(hash.to_string().parse::<BlockHash>().unwrap(), hash);

        let chain: ChainId = "NetXH12Aer3be93".parse().unwrap();
        assert_eq!(chain, ChainId::new([0; 4]));
    }

    #[test]
    fn test_wrong_kind_is_rejected() {
        let encoded = block_hash(1).to_string();
        assert!(matches!(
            encoded.parse::<ProtocolHash>(),
            Err(HashError::Prefix("ProtocolHash"))
        ));
        assert!(matches!(
            encoded.parse::<ChainId>(),
            Err(HashError::Prefix("ChainId"))
        ));
    }

    #[test]
    fn test_corrupted_checksum_is_rejected() {
        let mut encoded = ChainId::new([1, 2, 3, 4]).to_string();
        let last = encoded.pop().unwrap();
        encoded.push(if last == '1' { '2' } else { '1' });
        assert!(matches!(
            encoded.parse::<ChainId>(),
            Err(HashError::Base58(_))
        ));
    }

    #[test]
    fn test_serde_uses_text_form() {
        let chain = ChainId::new([0; 4]);
        let json = serde_json::to_string(&chain).unwrap();
        assert_eq!(json, "\"NetXH12Aer3be93\"");
        assert_eq!(serde_json::from_str::<ChainId>(&json).unwrap(), chain);
        assert!(serde_json::from_str::<ChainId>("\"not-a-chain\"").is_err());
    }
}
