//! Canonical signable payloads

use spotnet_types::{Offer, OfferTerms, Signature};

use crate::hash::keccak256;
use crate::packed::{encode_packed, identifier_bytes, PackedToken};
use crate::signer::{recover_signer, AgentSigner};
use crate::CryptoResult;

/// Types with a canonical packed encoding that gets hashed and signed
pub trait Signable {
    /// Ordered, typed tokens making up the payload
    fn signable_tokens(&self) -> Vec<PackedToken>;

    fn signable_bytes(&self) -> Vec<u8> {
        encode_packed(&self.signable_tokens())
    }

    fn signable_hash(&self) -> [u8; 32] {
        keccak256(&self.signable_bytes())
    }
}

/// The settlement contract verifies offers against exactly this tuple:
/// `(bytes model, bytes objective, address token, uint256 cost,
///   address validator, address lighthouse, uint256 lighthouseFee,
///   uint256 deadline, uint256 nonce, address sender)`.
impl Signable for OfferTerms {
    fn signable_tokens(&self) -> Vec<PackedToken> {
        vec![
            PackedToken::Bytes(identifier_bytes(&self.model)),
            PackedToken::Bytes(identifier_bytes(&self.objective)),
            PackedToken::Address(self.token),
            PackedToken::Uint256(self.cost),
            PackedToken::Address(self.validator),
            PackedToken::Address(self.lighthouse),
            PackedToken::Uint256(self.lighthouse_fee),
            PackedToken::Uint256(self.deadline),
            PackedToken::Uint256(self.nonce),
            PackedToken::Address(self.sender),
        ]
    }
}

/// Sign any Signable type
pub fn sign<T: Signable>(signer: &AgentSigner, item: &T) -> CryptoResult<Signature> {
    signer.sign_hash(&item.signable_hash())
}

/// Check that an offer was signed by its declared sender
pub fn verify_offer(offer: &Offer) -> CryptoResult<bool> {
    let signer = recover_signer(&offer.terms().signable_hash(), &offer.signature)?;
    Ok(signer == offer.sender)
}
