//! Wager codec and per-room RSA cipher

pub mod cipher;
pub mod codec;

pub use cipher::{
    decrypt, encrypt, max_plaintext_len, open_wager, parse_public_key, seal_wager, RoomKeyPair,
    MAX_CIPHERTEXT_LEN,
};
pub use codec::{decode_wager, encode_wager};
