//! Offers: the provider's signed commitment to serve a demand

use std::fmt;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::demand::Demand;
use crate::wire;

/// Length of a recoverable secp256k1 signature (`r || s || v`)
pub const SIGNATURE_LENGTH: usize = 65;

/// A recoverable ECDSA signature, hex-encoded with a `0x` prefix on the wire
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature([u8; SIGNATURE_LENGTH]);

impl Signature {
    pub fn from_bytes(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, which must be exactly 65 bytes
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; SIGNATURE_LENGTH] = bytes.try_into().ok()?;
        Some(Self(array))
    }

    /// Parse a `0x`-prefixed hex signature
    pub fn from_hex(text: &str) -> Result<Self, String> {
        let digits = text
            .strip_prefix("0x")
            .ok_or_else(|| "signature is missing the 0x prefix".to_string())?;
        let bytes = hex::decode(digits).map_err(|e| format!("signature: {}", e))?;
        Self::from_slice(&bytes).ok_or_else(|| {
            format!(
                "signature must be {} bytes, got {}",
                SIGNATURE_LENGTH,
                bytes.len()
            )
        })
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }

    /// The `r || s` part
    pub fn rs(&self) -> &[u8] {
        &self.0[..64]
    }

    /// The Ethereum `v` byte (27 or 28)
    pub fn v(&self) -> u8 {
        self.0[64]
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Signature::from_hex(&text).map_err(serde::de::Error::custom)
    }
}

/// Every offer field that goes into the signed payload.
///
/// Built from a [`Demand`] plus chain state; turned into an [`Offer`] once
/// signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferTerms {
    pub model: String,
    pub objective: String,
    pub token: Address,
    pub cost: U256,
    pub validator: Address,
    pub lighthouse: Address,
    pub lighthouse_fee: U256,
    pub deadline: U256,
    pub nonce: U256,
    /// The provider's own address
    pub sender: Address,
}

impl OfferTerms {
    /// Copy the demand's terms, replacing the requester with `provider`
    pub fn from_demand(
        demand: &Demand,
        provider: Address,
        lighthouse_fee: U256,
        deadline: U256,
        nonce: U256,
    ) -> Self {
        Self {
            model: demand.model.clone(),
            objective: demand.objective.clone(),
            token: demand.token,
            cost: demand.cost,
            validator: demand.validator,
            lighthouse: demand.lighthouse,
            lighthouse_fee,
            deadline,
            nonce,
            sender: provider,
        }
    }

    pub fn into_offer(self, signature: Signature) -> Offer {
        Offer {
            model: self.model,
            objective: self.objective,
            token: self.token,
            cost: self.cost,
            validator: self.validator,
            lighthouse: self.lighthouse,
            lighthouse_fee: self.lighthouse_fee,
            deadline: self.deadline,
            nonce: self.nonce,
            sender: self.sender,
            signature,
        }
    }
}

/// A signed offer as published on the provider topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub model: String,
    pub objective: String,
    #[serde(with = "wire::address")]
    pub token: Address,
    #[serde(with = "wire::uint256")]
    pub cost: U256,
    #[serde(with = "wire::address")]
    pub validator: Address,
    #[serde(with = "wire::address")]
    pub lighthouse: Address,
    #[serde(with = "wire::uint256")]
    pub lighthouse_fee: U256,
    #[serde(with = "wire::uint256")]
    pub deadline: U256,
    #[serde(with = "wire::uint256")]
    pub nonce: U256,
    #[serde(with = "wire::address")]
    pub sender: Address,
    pub signature: Signature,
}

impl Offer {
    /// The signed terms, for re-hashing and verification
    pub fn terms(&self) -> OfferTerms {
        OfferTerms {
            model: self.model.clone(),
            objective: self.objective.clone(),
            token: self.token,
            cost: self.cost,
            validator: self.validator,
            lighthouse: self.lighthouse,
            lighthouse_fee: self.lighthouse_fee,
            deadline: self.deadline,
            nonce: self.nonce,
            sender: self.sender,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = last;
        Address::from_slice(&bytes)
    }

    fn sample_offer() -> Offer {
        let mut sig = [7u8; SIGNATURE_LENGTH];
        sig[64] = 28;
        Offer {
            model: "QmModel".to_string(),
            objective: "QmObjective".to_string(),
            token: addr(1),
            cost: U256::from(100u64),
            validator: addr(2),
            lighthouse: addr(3),
            lighthouse_fee: U256::from(1u64),
            deadline: U256::from(100_500u64),
            nonce: U256::MAX,
            sender: addr(9),
            signature: Signature::from_bytes(sig),
        }
    }

    #[test]
    fn test_offer_wire_field_names() {
        let value = serde_json::to_value(sample_offer()).unwrap();
        let obj = value.as_object().unwrap();
        for key in [
            "model",
            "objective",
            "token",
            "cost",
            "validator",
            "lighthouse",
            "lighthouseFee",
            "deadline",
            "nonce",
            "sender",
            "signature",
        ] {
            assert!(obj.contains_key(key), "missing {}", key);
        }
        assert_eq!(obj.len(), 11);
        assert_eq!(obj["lighthouseFee"], serde_json::json!(1));
        assert!(obj["nonce"].is_string(), "uint256 max must not be squeezed into a number");
    }

    #[test]
    fn test_offer_amounts_beyond_double_precision_are_strings() {
        let mut offer = sample_offer();
        offer.cost = U256::from(1_000_000_000_000_000_001u64);
        offer.deadline = U256::from(9_007_199_254_740_991u64);
        let value = serde_json::to_value(&offer).unwrap();
        assert_eq!(value["cost"], "1000000000000000001");
        assert!(value["deadline"].is_u64());
        let decoded: Offer = serde_json::from_value(value).unwrap();
        assert_eq!(decoded.cost, offer.cost);
    }

    #[test]
    fn test_offer_roundtrip_preserves_signature_bytes() {
        let offer = sample_offer();
        let bytes = serde_json::to_vec(&offer).unwrap();
        let decoded: Offer = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, offer);
        assert_eq!(decoded.signature.as_bytes(), offer.signature.as_bytes());
        assert_eq!(decoded.terms().into_offer(decoded.signature), offer);
    }

    #[test]
    fn test_signature_parsing() {
        assert!(Signature::from_hex("0x1234").is_err());
        assert!(Signature::from_hex(&"ab".repeat(65)).is_err());
        let sig = Signature::from_hex(&format!("0x{}1b", "00".repeat(64))).unwrap();
        assert_eq!(sig.v(), 27);
        assert_eq!(sig.rs(), &[0u8; 64][..]);
    }
}
