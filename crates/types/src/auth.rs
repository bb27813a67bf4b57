//! Worker authentication tokens: a stateless, self-timestamping
//! ECDSA signature over a fixed message template.

use alloy::primitives::Address;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// `sig[65] ∥ ts[30]`, `ts` zero-padded on the right to 30 bytes.
pub const TOKEN_LEN: usize = 95;
const SIG_LEN: usize = 65;
const TS_LEN: usize = 30;

#[derive(Debug, thiserror::Error)]
pub enum AuthTokenError {
    #[error("token is {0} bytes, expected {TOKEN_LEN}")]
    WrongLength(usize),
    #[error("timestamp field is not valid RFC3339: {0}")]
    BadTimestamp(String),
    #[error("signature recovery failed: {0}")]
    BadSignature(String),
}

/// The message a worker signs to authenticate; stable across a given
/// sequencer address and the instant the token was minted.
pub fn auth_message(sequencer: Address, timestamp: OffsetDateTime) -> String {
    format!(
        "Authorizing worker in sequencer '{sequencer}' at {}",
        format_timestamp(timestamp)
    )
}

/// Format a timestamp the way the token embeds it: RFC3339 with
/// nanosecond precision, always `Z`-suffixed.
pub fn format_timestamp(timestamp: OffsetDateTime) -> String {
    timestamp
        .to_offset(time::UtcOffset::UTC)
        .format(&Rfc3339)
        .expect("RFC3339 formatting of a UTC offset never fails")
}

/// A decoded, not-yet-verified token: the raw signature bytes and the
/// timestamp it carries.
pub struct AuthToken {
    pub signature: [u8; SIG_LEN],
    pub timestamp: OffsetDateTime,
}

impl AuthToken {
    pub fn encode(signature: [u8; SIG_LEN], timestamp: OffsetDateTime) -> [u8; TOKEN_LEN] {
        let mut out = [0u8; TOKEN_LEN];
        out[..SIG_LEN].copy_from_slice(&signature);
        let ts = format_timestamp(timestamp);
        let ts_bytes = ts.as_bytes();
        assert!(ts_bytes.len() <= TS_LEN, "RFC3339 nanosecond timestamp overflowed the token's 30-byte field");
        out[SIG_LEN..SIG_LEN + ts_bytes.len()].copy_from_slice(ts_bytes);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, AuthTokenError> {
        if bytes.len() != TOKEN_LEN {
            return Err(AuthTokenError::WrongLength(bytes.len()));
        }
        let mut signature = [0u8; SIG_LEN];
        signature.copy_from_slice(&bytes[..SIG_LEN]);

        let ts_field = &bytes[SIG_LEN..];
        let ts_str = std::str::from_utf8(ts_field)
            .map_err(|e| AuthTokenError::BadTimestamp(e.to_string()))?
            .trim_end_matches('\0');
        let timestamp = OffsetDateTime::parse(ts_str, &Rfc3339)
            .map_err(|e| AuthTokenError::BadTimestamp(e.to_string()))?;

        Ok(Self {
            signature,
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trips() {
        let ts = OffsetDateTime::from_unix_timestamp_nanos(1_700_000_000_123_456_789).unwrap();
        let sig = [7u8; SIG_LEN];
        let token = AuthToken::encode(sig, ts);
        assert_eq!(token.len(), TOKEN_LEN);

        let decoded = AuthToken::decode(&token).unwrap();
        assert_eq!(decoded.signature, sig);
        assert_eq!(decoded.timestamp.unix_timestamp_nanos(), ts.unix_timestamp_nanos());
    }

    #[test]
    fn wrong_length_is_rejected() {
        assert!(matches!(
            AuthToken::decode(&[0u8; 10]),
            Err(AuthTokenError::WrongLength(10))
        ));
    }

    #[test]
    fn auth_message_matches_template() {
        let seq = Address::repeat_byte(0xab);
        let ts = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let msg = auth_message(seq, ts);
        assert!(msg.starts_with(&format!("Authorizing worker in sequencer '{seq}' at ")));
    }
}
