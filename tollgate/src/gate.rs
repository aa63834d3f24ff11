//! The verify/settle payment bracket around billable work.
//!
//! [`PaymentGate::verify_and_reserve`] runs before any backend work: it
//! extracts the `x-payment` header, decodes the signed authorization, and
//! verifies it with the facilitator. On success it hands back a
//! [`VerifyContext`] that [`PaymentGate::settle`] consumes after the work
//! completes. A context can settle at most once because `settle` takes it
//! by value.
//!
//! Settlement failures are absorbed: by the time settle runs the response
//! bytes have been delivered, so the error is logged and the client keeps
//! what it received.

use std::sync::Arc;

use http::{HeaderMap, StatusCode};
use serde_json::json;

use crate::facilitator::Facilitator;
use crate::proto::{
    Base64Bytes, PaymentRequired, PaymentRequirements, SettleReceipt, SettleRequest,
    SettleResponse, VerifyRequest, VerifyResponse,
};
use crate::{PAYMENT_HEADER, PAYMENT_REQUIRED_HEADER};

/// Network and recipient parameters shared by every challenge the gate
/// issues.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// CAIP-2 chain ID payments settle on.
    pub network: String,
    /// Stablecoin contract address payments are priced in.
    pub asset: String,
    /// Recipient address for settled amounts.
    pub pay_to: String,
}

/// A response the gate produced instead of letting the request through:
/// either a 402 challenge or a 503 when the facilitator is unreachable.
#[derive(Debug, Clone)]
pub struct GateDenial {
    /// HTTP status to return.
    pub status: StatusCode,
    /// Headers to attach (includes the mirrored base64 challenge on 402).
    pub headers: Vec<(&'static str, String)>,
    /// JSON response body.
    pub body: serde_json::Value,
}

/// Verified payment state carried from `verify_and_reserve` to `settle`.
///
/// Consumed by value on settlement so each verified payment settles at most
/// once.
#[derive(Debug)]
pub struct VerifyContext {
    payload: serde_json::Value,
    requirements: PaymentRequirements,
    /// Address of the paying account.
    pub payer: String,
}

impl VerifyContext {
    /// The authorization ceiling this payment was verified against.
    #[must_use]
    pub const fn max_amount(&self) -> u128 {
        self.requirements.max_amount
    }
}

/// The payment gate bracketing every billable call.
#[derive(Clone)]
pub struct PaymentGate {
    facilitator: Arc<dyn Facilitator>,
    config: GateConfig,
}

impl std::fmt::Debug for PaymentGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentGate")
            .field("facilitator", &"<dyn Facilitator>")
            .field("config", &self.config)
            .finish()
    }
}

impl PaymentGate {
    /// Creates a gate over the given facilitator.
    pub fn new(facilitator: Arc<dyn Facilitator>, config: GateConfig) -> Self {
        Self {
            facilitator,
            config,
        }
    }

    /// Builds the payment requirements for a resource at the given ceiling.
    #[must_use]
    pub fn requirements(&self, resource: &str, max_amount: u128) -> PaymentRequirements {
        PaymentRequirements::upto(
            self.config.network.clone(),
            self.config.asset.clone(),
            self.config.pay_to.clone(),
            resource,
            max_amount,
        )
    }

    /// Builds the 402 challenge denial for a resource.
    #[must_use]
    pub fn challenge(&self, resource: &str, max_amount: u128, detail: Option<&str>) -> GateDenial {
        let challenge = PaymentRequired::new(self.requirements(resource, max_amount));
        let mut body = serde_json::to_value(&challenge)
            .unwrap_or_else(|_| json!({ "error": crate::proto::PAYMENT_REQUIRED_ERROR }));
        if let Some(detail) = detail {
            body["detail"] = json!(detail);
        }
        let mut headers = Vec::new();
        if let Ok(header) = challenge.to_header_value() {
            headers.push((PAYMENT_REQUIRED_HEADER, header.to_string()));
        }
        GateDenial {
            status: StatusCode::PAYMENT_REQUIRED,
            headers,
            body,
        }
    }

    /// Verifies the request's payment authorization against the facilitator.
    ///
    /// Returns a [`VerifyContext`] when the payment is valid. Returns a
    /// [`GateDenial`] (402 with challenge, or 503 when the facilitator is
    /// unreachable) otherwise; no backend work may happen in that case.
    pub async fn verify_and_reserve(
        &self,
        headers: &HeaderMap,
        method: &str,
        resource: &str,
        max_amount: u128,
    ) -> Result<VerifyContext, GateDenial> {
        let Some(header) = headers.get(PAYMENT_HEADER) else {
            return Err(self.challenge(resource, max_amount, None));
        };

        let payload = Base64Bytes::from(header.as_bytes())
            .decode()
            .ok()
            .and_then(|raw| serde_json::from_slice::<serde_json::Value>(&raw).ok());
        let Some(payload) = payload else {
            return Err(self.challenge(resource, max_amount, Some("malformed x-payment header")));
        };

        let requirements = self.requirements(resource, max_amount);
        let verify = self
            .facilitator
            .verify(VerifyRequest {
                payment_payload: payload.clone(),
                payment_requirements: requirements.clone(),
                method: method.to_ascii_uppercase(),
            })
            .await;

        match verify {
            Ok(VerifyResponse::Valid { payer }) => {
                tracing::debug!(%payer, resource, max_amount, "payment verified");
                Ok(VerifyContext {
                    payload,
                    requirements,
                    payer,
                })
            }
            Ok(VerifyResponse::Invalid { reason, payer }) => {
                tracing::info!(reason, ?payer, resource, "payment rejected");
                Err(self.challenge(resource, max_amount, Some(&reason)))
            }
            Err(e) => {
                tracing::error!(error = %e, resource, "facilitator unreachable during verify");
                Err(GateDenial {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    headers: Vec::new(),
                    body: json!({
                        "error": "facilitator_unreachable",
                        "message": "payment verification is temporarily unavailable",
                    }),
                })
            }
        }
    }

    /// Settles the actual metered cost of completed work.
    ///
    /// The amount is clamped to the verified ceiling; a metered cost above
    /// the ceiling settles at the ceiling and logs the discrepancy. A zero
    /// amount skips settlement entirely. Facilitator failures are logged
    /// and absorbed: the response has already been delivered.
    pub async fn settle(&self, ctx: VerifyContext, actual_amount: u128) -> Option<SettleReceipt> {
        let max = ctx.requirements.max_amount;
        if actual_amount > max {
            tracing::warn!(
                actual_amount,
                max_amount = max,
                payer = %ctx.payer,
                "metered cost exceeds authorization ceiling; settling at ceiling"
            );
        }
        let amount = actual_amount.min(max);
        if amount == 0 {
            tracing::info!(payer = %ctx.payer, "zero-cost call; skipping settlement");
            return None;
        }

        let result = self
            .facilitator
            .settle(SettleRequest {
                payment_payload: ctx.payload,
                payment_requirements: ctx.requirements,
                amount,
            })
            .await;

        match result {
            Ok(SettleResponse::Success { receipt }) => {
                tracing::info!(
                    amount,
                    payer = %receipt.payer,
                    transaction = %receipt.transaction,
                    "payment settled"
                );
                Some(receipt)
            }
            Ok(SettleResponse::Error { reason, message }) => {
                tracing::error!(reason, ?message, amount, "settlement rejected");
                None
            }
            Err(e) => {
                tracing::error!(error = %e, amount, "settlement failed");
                None
            }
        }
    }
}
