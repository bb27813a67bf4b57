use thiserror::Error;

#[derive(Debug, Error)]
pub enum CensusError {
    #[error("address is not a member of this census")]
    UnknownAddress,
    #[error("census signer failure: {0}")]
    Signer(String),
    #[error("census witness origin is not supported by this process's census")]
    UnsupportedOrigin,
    #[error("poseidon hashing failed: {0}")]
    Hash(#[from] zkseq_crypto::PoseidonError),
}
