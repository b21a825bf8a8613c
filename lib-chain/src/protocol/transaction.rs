//! Signed and processed transactions.
//!
//! The transaction id covers the body only (reference block, expiration,
//! and operations), never the signatures, so co-signing cannot change the
//! id. Expensive derived values (id, recovered signer keys) are memoised in
//! cells the precompute pool fills ahead of serial application; the cells
//! are skipped by serialization and by equality.

use crate::error::{ChainError, ChainResult};
use crate::protocol::operations::{Operation, OperationResult};
use crate::serial;
use lib_crypto::{canonical_consensus_hash, PrivateKey, PublicKey, Signature};
use lib_types::{Digest, TimePointSec, TransactionId};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignedTransaction {
    /// Low 16 bits of the referenced block's number (TaPoS).
    pub ref_block_num: u16,
    /// Id prefix of the referenced block; binds the transaction to a fork.
    pub ref_block_prefix: u32,
    pub expiration: TimePointSec,
    pub operations: Vec<Operation>,
    pub signatures: Vec<Signature>,

    #[serde(skip)]
    cached_id: OnceCell<TransactionId>,
    #[serde(skip)]
    cached_signers: OnceCell<Vec<PublicKey>>,
}

/// Borrowed view of the signed fields, used for digests so the bytes always
/// match the canonical encoding of the owned body.
#[derive(Serialize)]
struct BodyRef<'a> {
    ref_block_num: u16,
    ref_block_prefix: u32,
    expiration: TimePointSec,
    operations: &'a [Operation],
}

impl SignedTransaction {
    pub fn new(
        ref_block_num: u16,
        ref_block_prefix: u32,
        expiration: TimePointSec,
        operations: Vec<Operation>,
    ) -> Self {
        Self {
            ref_block_num,
            ref_block_prefix,
            expiration,
            operations,
            signatures: Vec::new(),
            cached_id: OnceCell::new(),
            cached_signers: OnceCell::new(),
        }
    }

    fn body_ref(&self) -> BodyRef<'_> {
        BodyRef {
            ref_block_num: self.ref_block_num,
            ref_block_prefix: self.ref_block_prefix,
            expiration: self.expiration,
            operations: &self.operations,
        }
    }

    /// Digest of the body without signatures; what gets signed and what the
    /// transaction id truncates.
    pub fn signing_digest(&self) -> Digest {
        canonical_consensus_hash(&serial::canonical_bytes(&self.body_ref()))
    }

    /// Memoised transaction id.
    pub fn id(&self) -> TransactionId {
        *self
            .cached_id
            .get_or_init(|| TransactionId::from_digest(&self.signing_digest()))
    }

    /// Append a signature from `key`.
    pub fn sign(&mut self, key: &PrivateKey) {
        let digest = self.signing_digest();
        self.signatures.push(key.sign(&digest));
        // Signer memo may exist from a pre-signature verification pass.
        self.cached_signers = OnceCell::new();
    }

    /// Verify every attached signature and return the signer keys.
    /// Memoised on success; a failed set is re-checked on each call.
    pub fn signature_keys(&self) -> ChainResult<Vec<PublicKey>> {
        if let Some(keys) = self.cached_signers.get() {
            return Ok(keys.clone());
        }
        let digest = self.signing_digest();
        let mut keys = Vec::with_capacity(self.signatures.len());
        for sig in &self.signatures {
            sig.verify(&digest)
                .map_err(|e| ChainError::authority(format!("bad signature: {e}")))?;
            keys.push(sig.signer());
        }
        let _ = self.cached_signers.set(keys.clone());
        Ok(keys)
    }

    /// Structural validation: per-operation static checks.
    pub fn validate(&self) -> ChainResult<()> {
        if self.operations.is_empty() {
            return Err(ChainError::structural("transaction has no operations"));
        }
        for op in &self.operations {
            op.validate()?;
        }
        Ok(())
    }

    /// Run the independent per-transaction work ahead of serial application:
    /// structural checks, id, signer recovery. Failures leave the memo cells
    /// unset so the serial path re-derives and reports them.
    pub fn precompute(&self, need_id: bool, need_signatures: bool) {
        let _ = self.validate();
        if need_id {
            self.id();
        }
        if need_signatures {
            let _ = self.signature_keys();
        }
    }
}

impl PartialEq for SignedTransaction {
    fn eq(&self, other: &Self) -> bool {
        self.ref_block_num == other.ref_block_num
            && self.ref_block_prefix == other.ref_block_prefix
            && self.expiration == other.expiration
            && self.operations == other.operations
            && self.signatures == other.signatures
    }
}

/// A transaction after evaluation, carrying one result per operation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProcessedTransaction {
    pub trx: SignedTransaction,
    pub operation_results: Vec<OperationResult>,
}

impl ProcessedTransaction {
    pub fn id(&self) -> TransactionId {
        self.trx.id()
    }
}
