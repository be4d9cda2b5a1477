use std::fmt;

use serde::{Deserialize, Serialize};

/// A 32-byte public key identifying a peer or node owner.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct PublicKey(pub [u8; 32]);

/// A content address: the hash of a node's packed body.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct NodeId1(pub [u8; 32]);

/// Correlation id for a request, assigned by the issuing side.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct MsgId(pub Vec<u8>);

macro_rules! byte_array_newtype {
    ($ty:ident, $len:expr) => {
        impl $ty {
            pub const LEN: usize = $len;

            pub fn from_slice(bytes: &[u8]) -> Option<Self> {
                if bytes.len() != $len {
                    return None;
                }
                let mut buf = [0u8; $len];
                buf.copy_from_slice(bytes);
                Some(Self(buf))
            }

            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }

            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($ty), hex::encode(self.0))
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }

        impl From<[u8; $len]> for $ty {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }
    };
}

byte_array_newtype!(PublicKey, 32);
byte_array_newtype!(NodeId1, 32);

impl MsgId {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MsgId({})", hex::encode(&self.0))
    }
}

impl From<Vec<u8>> for MsgId {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}
