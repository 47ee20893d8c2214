use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Payment provider that processes a wallet top-up.
///
/// `Unknown` is the zero value used when the caller did not specify a provider.
/// It is never a valid dispatch target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentProvider {
    /// Default or unrecognized provider.
    #[default]
    Unknown,
    /// Payment processed via Stripe.
    Stripe,
    /// Payment processed via `PayPal`.
    PayPal,
}

impl PaymentProvider {
    /// Every variant, in wire-code order.
    pub const ALL: [Self; 3] = [Self::Unknown, Self::Stripe, Self::PayPal];

    /// Integer wire code carried by the inbound RPC contract.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Unknown => 0,
            Self::Stripe => 1,
            Self::PayPal => 2,
        }
    }

    /// Maps a wire code back to a variant. Codes outside the enumeration
    /// return `None`.
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Unknown),
            1 => Some(Self::Stripe),
            2 => Some(Self::PayPal),
            _ => None,
        }
    }

    /// Stable display name, used in logs, metrics labels and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Stripe => "Stripe",
            Self::PayPal => "PayPal",
        }
    }
}

impl fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Finalized top-up command handed to the outbound command collaborator
/// after a successful dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUpIntent {
    /// Amount applied, exactly as requested.
    pub amount: Decimal,
    /// Provider that processed the top-up.
    pub provider: PaymentProvider,
}

impl TopUpIntent {
    #[must_use]
    pub fn new(amount: Decimal, provider: PaymentProvider) -> Self {
        Self { amount, provider }
    }
}
