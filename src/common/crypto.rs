use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest as ShaDigest, Sha512};

use super::error::{Result, SyncError};

/*
    Secure messages are an optional wrapper a caller can put around payload
    content exchanged between nodes. The clock synchronization protocols
    never produce or consume them.
*/

pub type Digest = [u8; 64];

/// Maximum age of a secure message before `verify` rejects it.
pub const MAX_MESSAGE_AGE_SECS: i64 = 300;

pub struct Keypair {
    pubkey: Pubkey,
    dalek_signer: SigningKey,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Pubkey {
    pub key: [u8; 32],
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Signature {
    pub signer: Pubkey,
    pub sig: [u8; 64],
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SecureMessage {
    pub from: String,
    pub to: String,
    pub content: String,
    /// Unix seconds at creation.
    pub timestamp: i64,
    pub signature: Signature,
}

impl Keypair {
    pub fn new_pair() -> Self {
        let mut csprng = OsRng;
        let dalek_signer = SigningKey::generate(&mut csprng);
        let pubkey = Pubkey::from(&dalek_signer.verifying_key().to_bytes());

        Keypair {
            pubkey,
            dalek_signer,
        }
    }

    pub fn sign(&self, digest: &Digest) -> Signature {
        let sig = self.dalek_signer.sign(digest).to_bytes();

        Signature {
            signer: self.pubkey.clone(),
            sig,
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.pubkey.clone()
    }
}

impl From<&[u8; 32]> for Pubkey {
    fn from(bytes: &[u8; 32]) -> Self {
        Pubkey { key: *bytes }
    }
}

impl Signature {
    pub fn verify(&self, digest: &Digest) -> bool {
        let dalek_sig = DalekSignature::from_bytes(&self.sig);
        match VerifyingKey::from_bytes(&self.signer.key) {
            Ok(pubkey) => pubkey.verify_strict(digest, &dalek_sig).is_ok(),
            Err(_) => false,
        }
    }
}

impl SecureMessage {
    pub fn create(from: &str, to: &str, content: &str, keypair: &Keypair) -> Self {
        Self::create_at(from, to, content, chrono::Utc::now().timestamp(), keypair)
    }

    pub fn create_at(from: &str, to: &str, content: &str, timestamp: i64, keypair: &Keypair) -> Self {
        let digest = digest_fields(from, to, content, timestamp);
        SecureMessage {
            from: from.to_string(),
            to: to.to_string(),
            content: content.to_string(),
            timestamp,
            signature: keypair.sign(&digest),
        }
    }

    pub fn digest(&self) -> Digest {
        digest_fields(&self.from, &self.to, &self.content, self.timestamp)
    }

    /// Checks the signature, then the message age against `now` (unix seconds).
    pub fn verify(&self, now: i64) -> Result<()> {
        if !self.signature.verify(&self.digest()) {
            return Err(SyncError::InvalidSignature);
        }

        let age = now - self.timestamp;
        if age > MAX_MESSAGE_AGE_SECS {
            return Err(SyncError::Expired { age });
        }

        Ok(())
    }
}

fn digest_fields(from: &str, to: &str, content: &str, timestamp: i64) -> Digest {
    let mut hasher = Sha512::new();
    // Length prefixes keep ("a:b", "c") and ("a", "b:c") apart.
    for field in [from, to, content] {
        hasher.update((field.len() as u64).to_be_bytes());
        hasher.update(field.as_bytes());
    }
    hasher.update(timestamp.to_be_bytes());
    let result = hasher.finalize();
    let mut digest = [0u8; 64];
    digest.copy_from_slice(&result[..]);
    digest
}
