//! Authentication tokens: minting and verifying the stateless
//! ECDSA worker tokens. The codec itself (`sig ∥ ts`) lives in
//! `zkseq-types`; this module is the half that actually signs and
//! recovers.

use alloy::primitives::{Address, Signature};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use thiserror::Error;
use time::OffsetDateTime;
use zkseq_types::auth::{auth_message, AuthToken, AuthTokenError};

#[derive(Debug, Error)]
pub enum TokenError {
    #[error(transparent)]
    Codec(#[from] AuthTokenError),
    #[error("signing failed: {0}")]
    Sign(String),
    #[error("signature recovery failed: {0}")]
    Recover(String),
    #[error("token signer does not match the claimed worker address")]
    AddressMismatch,
}

/// Mint a fresh token: sign `AuthMessage(sequencer, now)` with the
/// worker's key and encode it with that same timestamp.
pub async fn mint_token(
    signer: &PrivateKeySigner,
    sequencer: Address,
) -> Result<[u8; zkseq_types::auth::TOKEN_LEN], TokenError> {
    let now = OffsetDateTime::now_utc();
    let message = auth_message(sequencer, now);
    let signature = signer
        .sign_message(message.as_bytes())
        .await
        .map_err(|e| TokenError::Sign(e.to_string()))?;
    Ok(AuthToken::encode(signature.as_bytes(), now))
}

/// Verify a token against a claimed worker address. Stateless: the
/// token's own timestamp is reconstructed into the message and the
/// signature is recovered directly, with no lookup beyond that.
pub fn verify_token(sequencer: Address, token: &[u8], claimed_worker: Address) -> Result<(), TokenError> {
    let decoded = AuthToken::decode(token)?;
    let message = auth_message(sequencer, decoded.timestamp);
    let signature = Signature::try_from(decoded.signature.as_slice())
        .map_err(|e| TokenError::Recover(e.to_string()))?;
    let recovered = signature
        .recover_address_from_msg(message.as_bytes())
        .map_err(|e| TokenError::Recover(e.to_string()))?;
    if recovered != claimed_worker {
        return Err(TokenError::AddressMismatch);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn minted_token_verifies_against_its_own_signer() {
        let signer = PrivateKeySigner::random();
        let sequencer = Address::repeat_byte(0xaa);
        let token = mint_token(&signer, sequencer).await.unwrap();
        assert_eq!(token.len(), zkseq_types::auth::TOKEN_LEN);
        verify_token(sequencer, &token, signer.address()).unwrap();
    }

    #[tokio::test]
    async fn token_is_rejected_for_the_wrong_worker() {
        let signer = PrivateKeySigner::random();
        let other = PrivateKeySigner::random();
        let sequencer = Address::repeat_byte(0xbb);
        let token = mint_token(&signer, sequencer).await.unwrap();
        assert!(matches!(
            verify_token(sequencer, &token, other.address()),
            Err(TokenError::AddressMismatch)
        ));
    }

    #[tokio::test]
    async fn tampering_with_the_signature_breaks_verification() {
        let signer = PrivateKeySigner::random();
        let sequencer = Address::repeat_byte(0xcc);
        let mut token = mint_token(&signer, sequencer).await.unwrap();
        token[0] ^= 0xff;
        assert!(verify_token(sequencer, &token, signer.address()).is_err());
    }
}
