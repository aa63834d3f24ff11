//! Wire format types for the Tollgate payment protocol.
//!
//! These types define the JSON messages exchanged between clients, the
//! gateway, and the payment facilitator. All types serialize with camelCase
//! field names. Monetary amounts travel as decimal strings in the smallest
//! token unit (wei of a 6-decimal stablecoin) so that JavaScript clients
//! never lose precision.

use std::fmt::{self, Display, Formatter};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};

/// The payment scheme used for every billable call.
///
/// Under `upto`, the client authorizes a ceiling and the gateway settles the
/// actual metered cost, which is never above that ceiling.
pub const UPTO_SCHEME: &str = "upto";

/// Machine-readable error string carried in the 402 challenge body.
pub const PAYMENT_REQUIRED_ERROR: &str = "payment_required";

/// A wrapper for base64-encoded byte data.
///
/// Holds bytes that represent base64-encoded data and provides methods for
/// encoding and decoding, used for the `x-payment` request header and the
/// mirrored challenge response header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64Bytes(pub Vec<u8>);

impl Base64Bytes {
    /// Decodes the base64 string bytes to raw binary data.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is not valid base64.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        b64.decode(&self.0)
    }

    /// Encodes raw binary data into base64 string bytes.
    pub fn encode<T: AsRef<[u8]>>(input: T) -> Self {
        let encoded = b64.encode(input.as_ref());
        Self(encoded.into_bytes())
    }
}

impl AsRef<[u8]> for Base64Bytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<&[u8]> for Base64Bytes {
    fn from(slice: &[u8]) -> Self {
        Self(slice.to_vec())
    }
}

impl Display for Base64Bytes {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Payment requirements for one protected resource.
///
/// Sent to clients inside the 402 challenge and to the facilitator alongside
/// the payment payload during verification and settlement.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    /// The payment scheme identifier (always [`UPTO_SCHEME`]).
    pub scheme: String,
    /// The network the payment settles on (CAIP-2 chain ID).
    pub network: String,
    /// The token contract address the payment is priced in.
    pub asset: String,
    /// The authorization ceiling in smallest token units.
    #[serde_as(as = "DisplayFromStr")]
    pub max_amount: u128,
    /// The recipient address for the settled amount.
    pub pay_to: String,
    /// URL of the protected resource.
    pub resource: String,
}

impl PaymentRequirements {
    /// Creates `upto` requirements for a resource with the given ceiling.
    #[must_use]
    pub fn upto(
        network: impl Into<String>,
        asset: impl Into<String>,
        pay_to: impl Into<String>,
        resource: impl Into<String>,
        max_amount: u128,
    ) -> Self {
        Self {
            scheme: UPTO_SCHEME.to_owned(),
            network: network.into(),
            asset: asset.into(),
            max_amount,
            pay_to: pay_to.into(),
            resource: resource.into(),
        }
    }
}

/// Body of a 402 Payment Required response.
///
/// The client uses `accepts` to build a signed payment authorization and
/// retry the request with an `x-payment` header.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    /// Payment requirements the gateway accepts for this resource.
    pub accepts: Vec<PaymentRequirements>,
    /// Machine-readable error string (always [`PAYMENT_REQUIRED_ERROR`]).
    pub error: String,
}

impl PaymentRequired {
    /// Creates a challenge accepting a single set of requirements.
    #[must_use]
    pub fn new(requirements: PaymentRequirements) -> Self {
        Self {
            accepts: vec![requirements],
            error: PAYMENT_REQUIRED_ERROR.to_owned(),
        }
    }

    /// Serializes the challenge body into a base64 header value.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn to_header_value(&self) -> Result<Base64Bytes, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        Ok(Base64Bytes::encode(json))
    }
}

/// Request to verify a payment authorization before any work happens.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    /// The decoded payment payload from the `x-payment` header.
    pub payment_payload: serde_json::Value,
    /// The requirements the payload must satisfy.
    pub payment_requirements: PaymentRequirements,
    /// HTTP method of the protected request; authorizations are bound to
    /// `(resource, method)`.
    pub method: String,
}

/// Facilitator response to a verification request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum VerifyResponse {
    /// The authorization is valid and covers the requested ceiling.
    #[serde(rename_all = "camelCase")]
    Valid {
        /// Address of the paying account.
        payer: String,
    },
    /// The authorization is missing, malformed, or insufficient.
    #[serde(rename_all = "camelCase")]
    Invalid {
        /// Machine-readable rejection reason.
        reason: String,
        /// The payer address, when it could be recovered.
        #[serde(skip_serializing_if = "Option::is_none")]
        payer: Option<String>,
    },
}

/// Request to settle a verified payment at its actual metered cost.
///
/// Structurally a [`VerifyRequest`] plus the settlement amount; represented
/// as a distinct type so a settle can never be issued without going through
/// verification first.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleRequest {
    /// The payment payload that was verified.
    pub payment_payload: serde_json::Value,
    /// The requirements the payload was verified against.
    pub payment_requirements: PaymentRequirements,
    /// The amount to transfer, in smallest token units. Never above
    /// the verified `max_amount`.
    #[serde_as(as = "DisplayFromStr")]
    pub amount: u128,
}

/// Receipt for a settled payment.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleReceipt {
    /// On-chain transaction identifier.
    pub transaction: String,
    /// The network the settlement executed on.
    pub network: String,
    /// Address of the paying account.
    pub payer: String,
    /// The settled amount in smallest token units.
    #[serde_as(as = "DisplayFromStr")]
    pub amount: u128,
}

/// Facilitator response to a settlement request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SettleResponse {
    /// The transfer executed.
    #[serde(rename_all = "camelCase")]
    Success {
        /// The settlement receipt.
        receipt: SettleReceipt,
    },
    /// The transfer failed.
    #[serde(rename_all = "camelCase")]
    Error {
        /// Machine-readable failure reason.
        reason: String,
        /// Human-readable detail, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requirements_serialize_amount_as_string() {
        let req = PaymentRequirements::upto(
            "eip155:84532",
            "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
            "0xRecipient",
            "https://gateway.example/api/inference",
            25_000,
        );
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["scheme"], "upto");
        assert_eq!(json["maxAmount"], "25000");
        assert_eq!(json["payTo"], "0xRecipient");
    }

    #[test]
    fn requirements_round_trip() {
        let req = PaymentRequirements::upto("eip155:8453", "0xToken", "0xTo", "https://r", u128::MAX);
        let json = serde_json::to_string(&req).unwrap();
        let back: PaymentRequirements = serde_json::from_str(&json).unwrap();
        assert_eq!(req, back);
    }

    #[test]
    fn challenge_header_round_trips_through_base64() {
        let challenge = PaymentRequired::new(PaymentRequirements::upto(
            "eip155:84532",
            "0xToken",
            "0xTo",
            "https://r",
            5_000,
        ));
        let header = challenge.to_header_value().unwrap();
        let decoded = header.decode().unwrap();
        let back: PaymentRequired = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(back.error, PAYMENT_REQUIRED_ERROR);
        assert_eq!(back.accepts.len(), 1);
        assert_eq!(back.accepts[0].max_amount, 5_000);
    }

    #[test]
    fn verify_response_parses_tagged_variants() {
        let valid: VerifyResponse =
            serde_json::from_str(r#"{"status":"valid","payer":"0xPayer"}"#).unwrap();
        assert!(matches!(valid, VerifyResponse::Valid { .. }));

        let invalid: VerifyResponse =
            serde_json::from_str(r#"{"status":"invalid","reason":"insufficient_funds"}"#).unwrap();
        match invalid {
            VerifyResponse::Invalid { reason, payer } => {
                assert_eq!(reason, "insufficient_funds");
                assert!(payer.is_none());
            }
            VerifyResponse::Valid { .. } => panic!("expected invalid"),
        }
    }
}
