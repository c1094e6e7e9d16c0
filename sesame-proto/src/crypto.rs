// sesame-os3/sesame-proto/src/crypto.rs
//
// Copyright (c) 2025 Sesame OS3 Client Team
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE>
// or the MIT license <LICENSE-MIT>, at your option.
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Login token derivation and the AES-CCM session cipher.
//!
//! The lock publishes a 4-byte random code when notifications are enabled.
//! Both sides derive a 16-byte token as AES-CMAC(device key, random code);
//! the token is the AES-128-CCM key for the rest of the connection.
//! Nonces are `counter (u64 LE) || 0x00 || random code`, with independent
//! counters per direction. Tags are 4 bytes and the associated data is a
//! single zero byte.

use std::fmt;

use aes::Aes128;
use ccm::aead::generic_array::GenericArray;
use ccm::aead::{Aead, KeyInit, Payload};
use ccm::consts::{U13, U4};
use ccm::Ccm;
use cmac::{Cmac, Mac};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{ProtoError, Result};

pub const KEY_LEN: usize = 16;
pub const RANDOM_CODE_LEN: usize = 4;
pub const NONCE_LEN: usize = 13;
pub const TAG_LEN: usize = 4;

const ASSOCIATED_DATA: [u8; 1] = [0x00];

type SesameCcm = Ccm<Aes128, U4, U13>;

/// The per-device AES-128 secret.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DeviceKey([u8; KEY_LEN]);

impl DeviceKey {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| ProtoError::InvalidKeyLength(bytes.len()))?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DeviceKey(<redacted>)")
    }
}

/// Session key derived during login.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct LoginToken([u8; 16]);

impl LoginToken {
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// The four bytes sent in the login command.
    pub fn login_tag(&self) -> [u8; 4] {
        [self.0[0], self.0[1], self.0[2], self.0[3]]
    }
}

impl fmt::Debug for LoginToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LoginToken(<redacted>)")
    }
}

fn aes_cmac(key: &DeviceKey, message: &[u8]) -> Result<[u8; 16]> {
    let mut mac = <Cmac<Aes128> as Mac>::new_from_slice(key.as_bytes())
        .map_err(|_| ProtoError::InvalidKeyLength(KEY_LEN))?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().into())
}

/// Derives the session token from the device key and the published random code.
pub fn login_token(key: &DeviceKey, random_code: &[u8; RANDOM_CODE_LEN]) -> Result<LoginToken> {
    aes_cmac(key, random_code).map(LoginToken)
}

/// AES-128-CCM with the lock's nonce layout and per-direction counters.
///
/// The same type serves both ends: the client's send counter pairs with
/// the device's receive counter and vice versa.
pub struct SessionCipher {
    cipher: SesameCcm,
    random_code: [u8; RANDOM_CODE_LEN],
    send_count: u64,
    recv_count: u64,
}

impl SessionCipher {
    pub fn new(token: &LoginToken, random_code: [u8; RANDOM_CODE_LEN]) -> Self {
        Self {
            cipher: SesameCcm::new(GenericArray::from_slice(token.as_bytes())),
            random_code,
            send_count: 0,
            recv_count: 0,
        }
    }

    pub fn nonce(&self, count: u64) -> [u8; NONCE_LEN] {
        let mut nonce = [0u8; NONCE_LEN];
        nonce[..8].copy_from_slice(&count.to_le_bytes());
        // nonce[8] is reserved and always zero
        nonce[9..].copy_from_slice(&self.random_code);
        nonce
    }

    /// Returns `ciphertext || tag` and advances the send counter.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = self.nonce(self.send_count);
        self.send_count += 1;
        self.cipher
            .encrypt(
                GenericArray::from_slice(&nonce),
                Payload { msg: plaintext, aad: &ASSOCIATED_DATA },
            )
            .map_err(|e| ProtoError::Encrypt(e.to_string()))
    }

    /// Verifies and decrypts `ciphertext || tag`.
    ///
    /// The receive counter advances even when verification fails, matching
    /// the lock, which never retransmits.
    pub fn decrypt(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let nonce = self.nonce(self.recv_count);
        self.recv_count += 1;
        if data.len() < TAG_LEN {
            return Err(ProtoError::Decrypt(format!(
                "ciphertext shorter than tag ({} bytes)",
                data.len()
            )));
        }
        self.cipher
            .decrypt(
                GenericArray::from_slice(&nonce),
                Payload { msg: data, aad: &ASSOCIATED_DATA },
            )
            .map_err(|_| ProtoError::Decrypt("authentication tag mismatch".to_string()))
    }

    pub fn send_count(&self) -> u64 {
        self.send_count
    }

    pub fn recv_count(&self) -> u64 {
        self.recv_count
    }
}

impl fmt::Debug for SessionCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCipher")
            .field("random_code", &self.random_code)
            .field("send_count", &self.send_count)
            .field("recv_count", &self.recv_count)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rfc4493_key() -> DeviceKey {
        DeviceKey::from_slice(&hex::decode("2b7e151628aed2a6abf7158809cf4f3c").unwrap()).unwrap()
    }

    fn assert_zeroize_on_drop<T: ZeroizeOnDrop>() {}

    #[test]
    fn test_key_material_is_wiped_on_drop() {
        assert_zeroize_on_drop::<DeviceKey>();
        assert_zeroize_on_drop::<LoginToken>();
        // Key schedule held by the session cipher.
        assert_zeroize_on_drop::<Aes128>();
    }

    #[test]
    fn test_aes_cmac_rfc4493_vectors() {
        let key = rfc4493_key();
        assert_eq!(
            hex::encode(aes_cmac(&key, &[]).unwrap()),
            "bb1d6929e95937287fa37d129b756746"
        );
        let message = hex::decode("6bc1bee22e409f96e93d7e117393172a").unwrap();
        assert_eq!(
            hex::encode(aes_cmac(&key, &message).unwrap()),
            "070a16b46b4d4144f79bdd9dd04a287c"
        );
    }

    #[test]
    fn test_login_token_depends_on_random_code() {
        let key = rfc4493_key();
        let a = login_token(&key, &[1, 2, 3, 4]).unwrap();
        let b = login_token(&key, &[1, 2, 3, 5]).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.login_tag(), a.as_bytes()[..4]);
    }

    #[test]
    fn test_device_key_length() {
        assert_eq!(
            DeviceKey::from_slice(&[0u8; 15]).unwrap_err(),
            ProtoError::InvalidKeyLength(15)
        );
        assert_eq!(format!("{:?}", rfc4493_key()), "DeviceKey(<redacted>)");
    }

    #[test]
    fn test_nonce_layout() {
        let token = login_token(&rfc4493_key(), &[0xa1, 0xa2, 0xa3, 0xa4]).unwrap();
        let cipher = SessionCipher::new(&token, [0xa1, 0xa2, 0xa3, 0xa4]);
        assert_eq!(
            cipher.nonce(0x0102),
            [0x02, 0x01, 0, 0, 0, 0, 0, 0, 0x00, 0xa1, 0xa2, 0xa3, 0xa4]
        );
    }

    #[test]
    fn test_cipher_pair_exchanges_messages() {
        let random_code = [9, 8, 7, 6];
        let token = login_token(&rfc4493_key(), &random_code).unwrap();
        let mut client = SessionCipher::new(&token, random_code);
        let mut device = SessionCipher::new(&token, random_code);

        for message in [&[82u8, 3, b'B', b'o', b'b'][..], &[5], &[4, 1]] {
            let sealed = client.encrypt(message).unwrap();
            assert_eq!(sealed.len(), message.len() + TAG_LEN);
            assert_eq!(device.decrypt(&sealed).unwrap(), message);
        }
        let reply = device.encrypt(&[7, 82, 0]).unwrap();
        assert_eq!(client.decrypt(&reply).unwrap(), vec![7, 82, 0]);
        assert_eq!(client.send_count(), 3);
        assert_eq!(client.recv_count(), 1);
    }

    #[test]
    fn test_counter_changes_ciphertext() {
        let token = login_token(&rfc4493_key(), &[0; 4]).unwrap();
        let mut cipher = SessionCipher::new(&token, [0; 4]);
        let first = cipher.encrypt(&[1, 2, 3]).unwrap();
        let second = cipher.encrypt(&[1, 2, 3]).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_decrypt_failures_advance_counter() {
        let random_code = [1, 1, 1, 1];
        let token = login_token(&rfc4493_key(), &random_code).unwrap();
        let mut client = SessionCipher::new(&token, random_code);
        let mut device = SessionCipher::new(&token, random_code);

        let mut tampered = device.encrypt(&[7, 5, 0]).unwrap();
        tampered[0] ^= 0xff;
        assert!(matches!(client.decrypt(&tampered), Err(ProtoError::Decrypt(_))));
        assert!(matches!(client.decrypt(&[1, 2]), Err(ProtoError::Decrypt(_))));
        assert_eq!(client.recv_count(), 2);

        // Device and client counters are now out of step.
        let next = device.encrypt(&[7, 5, 0]).unwrap();
        assert!(client.decrypt(&next).is_err());
    }
}
