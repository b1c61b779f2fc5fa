use bech32::{ToBase32, Variant};
use cosmwasm_std::Binary;
use ripemd160::{Digest as _, Ripemd160};
use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, SecretKey};
use serde::Deserialize;
use sha2::{Digest as _, Sha256};

use crate::{
    backend::SignedTx,
    error::{DeployError, DeployResult},
};

/// Hex encoded secp256k1 key of the deploying account
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub secret_key_hex: String,
}

impl Credentials {
    pub fn new(secret_key_hex: impl Into<String>) -> Self {
        Credentials {
            secret_key_hex: secret_key_hex.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("secret_key_hex", &"<redacted>")
            .finish()
    }
}

pub struct Signer {
    secret: SecretKey,
    public: PublicKey,
    address: String,
}

impl Signer {
    pub fn from_credentials(creds: &Credentials, prefix: &str) -> DeployResult<Self> {
        let invalid = |reason: String| DeployError::Config(format!("invalid credentials: {reason}"));
        let bytes = hex::decode(creds.secret_key_hex.trim()).map_err(|e| invalid(e.to_string()))?;
        let secret = SecretKey::from_slice(&bytes).map_err(|e| invalid(e.to_string()))?;
        let public = PublicKey::from_secret_key(&Secp256k1::new(), &secret);
        let address = pub_key_to_address(prefix, &public.serialize())?;
        Ok(Signer {
            secret,
            public,
            address,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn public_key(&self) -> Binary {
        Binary::from(self.public.serialize().to_vec())
    }

    pub fn sign(&self, sign_bytes: &[u8]) -> DeployResult<Binary> {
        let digest = Sha256::digest(sign_bytes);
        let msg = Message::from_slice(&digest).map_err(|e| DeployError::Config(e.to_string()))?;
        let sig = Secp256k1::new().sign_ecdsa(&msg, &self.secret);
        Ok(Binary::from(sig.serialize_compact().to_vec()))
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("address", &self.address)
            .finish()
    }
}

/// bech32(prefix, ripemd160(sha256(compressed_pub_key)))
pub fn pub_key_to_address(prefix: &str, pub_key: &[u8]) -> DeployResult<String> {
    let mut ripemd160_hasher = Ripemd160::new();
    ripemd160_hasher.update(Sha256::digest(pub_key));
    let addr_bytes = ripemd160_hasher.finalize().to_vec();
    bech32::encode(prefix, addr_bytes.to_base32(), Variant::Bech32)
        .map_err(|e| DeployError::Config(format!("address prefix {prefix}: {e}")))
}

/// Checks the signature and that the public key owns the signer address.
pub fn verify_signature(tx: &SignedTx, prefix: &str) -> DeployResult<()> {
    let pub_key = PublicKey::from_slice(tx.pub_key.as_slice())
        .map_err(|e| DeployError::Config(format!("pub key: {e}")))?;
    if pub_key_to_address(prefix, tx.pub_key.as_slice())? != tx.body.signer {
        return Err(DeployError::Config("pub key does not match signer".into()));
    }
    let digest = Sha256::digest(tx.body.to_sign_bytes()?);
    let msg = Message::from_slice(&digest).map_err(|e| DeployError::Config(e.to_string()))?;
    let sig = Signature::from_compact(tx.signature.as_slice())
        .map_err(|e| DeployError::Config(format!("signature: {e}")))?;
    Secp256k1::verification_only()
        .verify_ecdsa(&msg, &sig, &pub_key)
        .map_err(|e| DeployError::Config(format!("signature: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Fee, SignDoc};

    const KEY: &str = "1111111111111111111111111111111111111111111111111111111111111111";

    fn signed(signer: &Signer) -> SignedTx {
        let body = SignDoc {
            chain_id: "juno-1".into(),
            signer: signer.address().to_string(),
            sequence: 0,
            msgs: vec![],
            fee: Fee {
                amount: vec![],
                gas_limit: 0,
            },
            memo: String::new(),
        };
        let signature = signer.sign(&body.to_sign_bytes().unwrap()).unwrap();
        SignedTx {
            body,
            pub_key: signer.public_key(),
            signature,
        }
    }

    #[test]
    fn derives_prefixed_address() {
        let signer = Signer::from_credentials(&Credentials::new(KEY), "juno").unwrap();
        assert!(signer.address().starts_with("juno1"));
        let other = Signer::from_credentials(&Credentials::new(KEY), "wasm").unwrap();
        assert!(other.address().starts_with("wasm1"));
    }

    #[test]
    fn rejects_bad_key() {
        assert!(matches!(
            Signer::from_credentials(&Credentials::new("zz"), "juno"),
            Err(DeployError::Config(reason)) if reason.starts_with("invalid credentials")
        ));
        assert!(matches!(
            Signer::from_credentials(&Credentials::new("00".repeat(32)), "juno"),
            Err(DeployError::Config(_))
        ));
    }

    #[test]
    fn signature_verifies_and_detects_tampering() {
        let signer = Signer::from_credentials(&Credentials::new(KEY), "juno").unwrap();
        let tx = signed(&signer);
        verify_signature(&tx, "juno").unwrap();

        let mut tampered = tx;
        tampered.body.sequence = 7;
        assert!(verify_signature(&tampered, "juno").is_err());
    }

    #[test]
    fn debug_hides_secret() {
        let creds = Credentials::new(KEY);
        assert!(!format!("{creds:?}").contains(KEY));
    }
}
