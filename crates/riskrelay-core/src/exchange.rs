//! Peer exchange channel
//!
//! Owns the profile's RSA-2048 keypair and turns a 29-day analysis series
//! into a sealed certificate for one recipient, and back.
//!
//! Export is a two-pass transform: the encoded certificate is encrypted to
//! the recipient with OAEP(SHA-256), then the ciphertext is "sealed" by a
//! raw RSA private-key transform. The seal is a legacy authenticity
//! stand-in, not a real signature (textbook RSA without padding is
//! malleable); it is kept because peers on the wire expect exactly this
//! two-pass format. Import reverses both passes and validates the decoded
//! certificate header.
//!
//! The transport address of a certificate is deterministic:
//! `message_id = hex(SHA-256(sender_pem || recipient_pem))`. The sender
//! pushes under `id(own, recipient)`; the recipient pulls the same message
//! by computing `id(peer, own)` from its own perspective, which is the
//! identical string.

use rsa::pkcs8::{
    DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding,
};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::certificate::RiskCertificate;
use crate::error::{RiskError, RiskResult};
use crate::store::ProfileStore;
use crate::types::AnalysisDay;

/// RSA modulus size. 2048 bits is the fixed wire parameter: the raw seal
/// only round-trips between keys of the same size.
pub const RSA_BITS: usize = 2048;

/// Encryption and sealing endpoint for one profile.
///
/// The keypair is created once, persisted, and never mutated afterwards, so
/// a channel is safe to share read-only across concurrent operations.
pub struct PeerExchangeChannel {
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
    public_pem: String,
}

impl PeerExchangeChannel {
    /// Load the profile's keypair, generating and persisting a fresh one if
    /// the key files do not exist yet. Missing keys are never an error.
    pub fn open(store: &ProfileStore) -> RiskResult<Self> {
        if let Some((private_pem, public_pem)) = store.load_keys()? {
            let private_key = RsaPrivateKey::from_pkcs8_pem(&private_pem)
                .map_err(|e| RiskError::Crypto(format!("invalid private key: {e}")))?;
            let public_key = RsaPublicKey::from_public_key_pem(&public_pem)
                .map_err(|e| RiskError::Crypto(format!("invalid public key: {e}")))?;
            return Ok(Self {
                private_key,
                public_key,
                public_pem,
            });
        }

        info!(profile = store.name(), "no keypair found, generating");
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, RSA_BITS)
            .map_err(|e| RiskError::Crypto(format!("key generation failed: {e}")))?;
        let public_key = RsaPublicKey::from(&private_key);

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| RiskError::Crypto(format!("private key encoding failed: {e}")))?;
        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| RiskError::Crypto(format!("public key encoding failed: {e}")))?;
        store.save_keys(&private_pem, &public_pem)?;
        info!(profile = store.name(), "new keypair generated and saved");

        Ok(Self {
            private_key,
            public_key,
            public_pem,
        })
    }

    /// This profile's public key, SPKI PEM. Peers exchange these strings
    /// out of band; they are also the message-id hash inputs.
    pub fn public_key_pem(&self) -> &str {
        &self.public_pem
    }

    /// Deterministic transport address for a certificate flowing from
    /// `sender_pem` to `recipient_pem`.
    pub fn message_id(sender_pem: &str, recipient_pem: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(sender_pem.as_bytes());
        hasher.update(recipient_pem.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Message id under which this profile publishes for `recipient_pem`.
    pub fn push_id(&self, recipient_pem: &str) -> String {
        Self::message_id(&self.public_pem, recipient_pem)
    }

    /// Message id under which this profile looks for data from `sender_pem`.
    /// Ordering is swapped versus [`push_id`], matching the sender's view.
    pub fn pull_id(&self, sender_pem: &str) -> String {
        Self::message_id(sender_pem, &self.public_pem)
    }

    /// Encode the series as a certificate, encrypt it for the recipient and
    /// seal it with the local private key.
    pub fn export_for(&self, recipient_pem: &str, series: &[AnalysisDay]) -> RiskResult<Vec<u8>> {
        let recipient_key = RsaPublicKey::from_public_key_pem(recipient_pem)
            .map_err(|e| RiskError::Crypto(format!("invalid recipient key: {e}")))?;

        let plaintext = RiskCertificate::from_series(series)?.encode();

        let mut rng = rand::thread_rng();
        let ciphertext = recipient_key
            .encrypt(&mut rng, Oaep::new::<Sha256>(), &plaintext)
            .map_err(|e| RiskError::Crypto(format!("encryption failed: {e}")))?;

        self.seal(&ciphertext)
    }

    /// Reverse the seal with the sender's public key, decrypt with the
    /// local private key and decode the certificate.
    pub fn import_from(&self, sender_pem: &str, sealed: &[u8]) -> RiskResult<RiskCertificate> {
        let sender_key = RsaPublicKey::from_public_key_pem(sender_pem)
            .map_err(|e| RiskError::Crypto(format!("invalid sender key: {e}")))?;

        let ciphertext = Self::unseal(&sender_key, sealed)?;

        let plaintext = self
            .private_key
            .decrypt(Oaep::new::<Sha256>(), &ciphertext)
            .map_err(|e| RiskError::Crypto(format!("decryption failed: {e}")))?;

        RiskCertificate::decode(&plaintext)
    }

    /// Raw RSA private-key transform of the ciphertext block (no padding).
    fn seal(&self, ciphertext: &[u8]) -> RiskResult<Vec<u8>> {
        let k = self.private_key.size();
        if ciphertext.len() != k {
            return Err(RiskError::Crypto(format!(
                "cannot seal block of {} bytes with a {}-byte modulus",
                ciphertext.len(),
                k
            )));
        }
        let mut rng = rand::thread_rng();
        let c = BigUint::from_bytes_be(ciphertext);
        let m = rsa::hazmat::rsa_decrypt(Some(&mut rng), &self.private_key, &c)
            .map_err(|e| RiskError::Crypto(format!("sealing failed: {e}")))?;
        Ok(to_fixed_bytes(&m, k))
    }

    /// Raw RSA public-key transform, recovering the sealed block.
    fn unseal(sender_key: &RsaPublicKey, sealed: &[u8]) -> RiskResult<Vec<u8>> {
        let k = sender_key.size();
        if sealed.len() != k {
            return Err(RiskError::Crypto(format!(
                "sealed block is {} bytes, expected {}",
                sealed.len(),
                k
            )));
        }
        let s = BigUint::from_bytes_be(sealed);
        if s >= *sender_key.n() {
            return Err(RiskError::Crypto(
                "sealed block exceeds the key modulus".to_string(),
            ));
        }
        let c = rsa::hazmat::rsa_encrypt(sender_key, &s)
            .map_err(|e| RiskError::Crypto(format!("unsealing failed: {e}")))?;
        Ok(to_fixed_bytes(&c, k))
    }
}

/// Big-endian bytes left-padded with zeros to the modulus size, as raw RSA
/// blocks are always exchanged at full width.
fn to_fixed_bytes(value: &BigUint, size: usize) -> Vec<u8> {
    let bytes = value.to_bytes_be();
    let mut out = vec![0u8; size.saturating_sub(bytes.len())];
    out.extend_from_slice(&bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::DAY_COUNT;
    use chrono::{Days, NaiveDate};

    fn channel_in(dir: &std::path::Path, name: &str) -> PeerExchangeChannel {
        let store = ProfileStore::open(dir, name).unwrap();
        PeerExchangeChannel::open(&store).unwrap()
    }

    fn sample_series() -> Vec<AnalysisDay> {
        let today = NaiveDate::from_ymd_opt(2021, 5, 30).unwrap();
        (0..DAY_COUNT)
            .map(|offset| AnalysisDay {
                date: today - Days::new(offset as u64),
                incoming_risk: 0.0,
                outgoing_risk: offset as f64 * 17.0,
                has_error: false,
            })
            .collect()
    }

    #[test]
    fn test_keypair_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::open(dir.path(), "me").unwrap();

        let first = PeerExchangeChannel::open(&store).unwrap();
        let second = PeerExchangeChannel::open(&store).unwrap();
        assert_eq!(first.public_key_pem(), second.public_key_pem());
        assert!(first.public_key_pem().contains("BEGIN PUBLIC KEY"));
    }

    #[test]
    fn test_message_id_push_pull_symmetry() {
        let dir = tempfile::tempdir().unwrap();
        let a = channel_in(dir.path(), "a");
        let b = channel_in(dir.path(), "b");

        // A pushing to B and B pulling from A must land on the same id.
        assert_eq!(
            a.push_id(b.public_key_pem()),
            b.pull_id(a.public_key_pem())
        );
        // The reverse direction is a different id.
        assert_ne!(
            a.push_id(b.public_key_pem()),
            b.push_id(a.public_key_pem())
        );
    }

    #[test]
    fn test_export_import_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let a = channel_in(dir.path(), "a");
        let b = channel_in(dir.path(), "b");

        let series = sample_series();
        let sealed = a.export_for(b.public_key_pem(), &series).unwrap();
        // Seal preserves the OAEP block size.
        assert_eq!(sealed.len(), RSA_BITS / 8);

        let cert = b.import_from(a.public_key_pem(), &sealed).unwrap();
        assert_eq!(cert.anchor_date(), series[0].date);
        for (i, day) in series.iter().enumerate() {
            assert_eq!(cert.risks()[i], day.outgoing_risk.round() as u16);
        }
    }

    #[test]
    fn test_import_with_wrong_sender_key_fails() {
        let dir = tempfile::tempdir().unwrap();
        let a = channel_in(dir.path(), "a");
        let b = channel_in(dir.path(), "b");
        let c = channel_in(dir.path(), "c");

        let sealed = a.export_for(b.public_key_pem(), &sample_series()).unwrap();
        // Unsealing with C's key yields garbage the OAEP layer rejects.
        assert!(b.import_from(c.public_key_pem(), &sealed).is_err());
    }

    #[test]
    fn test_import_by_wrong_recipient_fails() {
        let dir = tempfile::tempdir().unwrap();
        let a = channel_in(dir.path(), "a");
        let b = channel_in(dir.path(), "b");
        let c = channel_in(dir.path(), "c");

        let sealed = a.export_for(b.public_key_pem(), &sample_series()).unwrap();
        assert!(c.import_from(a.public_key_pem(), &sealed).is_err());
    }

    #[test]
    fn test_import_of_corrupted_block_fails() {
        let dir = tempfile::tempdir().unwrap();
        let a = channel_in(dir.path(), "a");
        let b = channel_in(dir.path(), "b");

        let mut sealed = a.export_for(b.public_key_pem(), &sample_series()).unwrap();
        sealed[10] ^= 0xFF;
        assert!(b.import_from(a.public_key_pem(), &sealed).is_err());

        assert!(b.import_from(a.public_key_pem(), &sealed[..100]).is_err());
    }
}
