//! The four Aave V3 pool events captured by the pipeline.
//!
//! Amount-class fields are decimal strings of unsigned 256-bit integers so
//! that no value ever passes through a float. Addresses are lowercase `0x`
//! hex, and every event carries the hash of the transaction that emitted it.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Value of the `protocol` attribute attached to every stored event.
pub const PROTOCOL: &str = "aave-v3";

// ─── EventKind ────────────────────────────────────────────────────────────────

/// Tag identifying which [`DomainEvent`] variant a job or entity holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    Withdraw,
    Supply,
    FlashLoan,
    LiquidationCall,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Withdraw,
        EventKind::Supply,
        EventKind::FlashLoan,
        EventKind::LiquidationCall,
    ];

    /// PascalCase name, as used in the `eventType` attribute.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Withdraw => "Withdraw",
            Self::Supply => "Supply",
            Self::FlashLoan => "FlashLoan",
            Self::LiquidationCall => "LiquidationCall",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    /// Accepts `Withdraw`, `withdraw`, `flashLoan`, `flash-loan`,
    /// `liquidation_call`, ...
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match folded.as_str() {
            "withdraw" => Ok(Self::Withdraw),
            "supply" => Ok(Self::Supply),
            "flashloan" => Ok(Self::FlashLoan),
            "liquidationcall" => Ok(Self::LiquidationCall),
            _ => Err(format!("unknown event type '{s}'")),
        }
    }
}

// ─── Variant payloads ────────────────────────────────────────────────────────

/// Emitted on `withdraw()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawEvent {
    /// Underlying asset being withdrawn.
    pub reserve: String,
    /// Owner of the aTokens.
    pub user: String,
    /// Receiver of the underlying.
    pub to: String,
    pub amount: String,
    pub tx_hash: String,
}

/// Emitted on `supply()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplyEvent {
    pub reserve: String,
    pub user: String,
    /// Beneficiary receiving the aTokens.
    pub on_behalf_of: String,
    pub amount: String,
    pub referral_code: String,
    pub tx_hash: String,
}

/// Emitted on `flashLoan()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashLoanEvent {
    /// Flash loan receiver contract.
    pub target: String,
    pub initiator: String,
    pub asset: String,
    pub amount: String,
    /// 0 = regular flash loan, 1 = stable (deprecated), 2 = variable.
    pub interest_rate_mode: String,
    pub premium: String,
    pub referral_code: String,
    pub tx_hash: String,
}

/// Emitted on `liquidationCall()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidationCallEvent {
    pub collateral_asset: String,
    pub debt_asset: String,
    /// Borrower being liquidated.
    pub user: String,
    pub debt_to_cover: String,
    pub liquidated_collateral_amount: String,
    pub liquidator: String,
    pub receive_a_token: bool,
    pub tx_hash: String,
}

// ─── DomainEvent ─────────────────────────────────────────────────────────────

/// A normalized protocol event. Exactly one variant is active.
///
/// Serializes with an `eventType` tag next to the variant's fields:
/// `{"eventType":"Withdraw","reserve":"0x…","amount":"100",…}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "eventType")]
pub enum DomainEvent {
    Withdraw(WithdrawEvent),
    Supply(SupplyEvent),
    FlashLoan(FlashLoanEvent),
    LiquidationCall(LiquidationCallEvent),
}

impl DomainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Withdraw(_) => EventKind::Withdraw,
            Self::Supply(_) => EventKind::Supply,
            Self::FlashLoan(_) => EventKind::FlashLoan,
            Self::LiquidationCall(_) => EventKind::LiquidationCall,
        }
    }

    pub fn tx_hash(&self) -> &str {
        match self {
            Self::Withdraw(e) => &e.tx_hash,
            Self::Supply(e) => &e.tx_hash,
            Self::FlashLoan(e) => &e.tx_hash,
            Self::LiquidationCall(e) => &e.tx_hash,
        }
    }

    /// The account acting in the event: `user`, or `initiator` for flash loans.
    pub fn actor(&self) -> &str {
        match self {
            Self::Withdraw(e) => &e.user,
            Self::Supply(e) => &e.user,
            Self::FlashLoan(e) => &e.initiator,
            Self::LiquidationCall(e) => &e.user,
        }
    }

    /// Every account taking part in the event (used for unique-user counts).
    pub fn participants(&self) -> Vec<&str> {
        match self {
            Self::LiquidationCall(e) => vec![e.user.as_str(), e.liquidator.as_str()],
            other => vec![other.actor()],
        }
    }

    /// `reserve`, `asset`, or `collateralAsset` depending on the variant.
    pub fn primary_asset(&self) -> &str {
        match self {
            Self::Withdraw(e) => &e.reserve,
            Self::Supply(e) => &e.reserve,
            Self::FlashLoan(e) => &e.asset,
            Self::LiquidationCall(e) => &e.collateral_asset,
        }
    }

    /// `amount`, or `liquidatedCollateralAmount` for liquidations.
    pub fn primary_amount(&self) -> &str {
        match self {
            Self::Withdraw(e) => &e.amount,
            Self::Supply(e) => &e.amount,
            Self::FlashLoan(e) => &e.amount,
            Self::LiquidationCall(e) => &e.liquidated_collateral_amount,
        }
    }

    /// [`primary_amount`](Self::primary_amount) as a U256. Stored events are
    /// validated at normalization time, so a parse failure maps to zero.
    pub fn primary_amount_u256(&self) -> U256 {
        parse_u256(self.primary_amount()).unwrap_or(U256::ZERO)
    }

    /// Every field as an ordered `(name, value)` list, in ABI order, followed
    /// by `txHash`.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Withdraw(e) => vec![
                ("reserve", e.reserve.clone()),
                ("user", e.user.clone()),
                ("to", e.to.clone()),
                ("amount", e.amount.clone()),
                ("txHash", e.tx_hash.clone()),
            ],
            Self::Supply(e) => vec![
                ("reserve", e.reserve.clone()),
                ("user", e.user.clone()),
                ("onBehalfOf", e.on_behalf_of.clone()),
                ("amount", e.amount.clone()),
                ("referralCode", e.referral_code.clone()),
                ("txHash", e.tx_hash.clone()),
            ],
            Self::FlashLoan(e) => vec![
                ("target", e.target.clone()),
                ("initiator", e.initiator.clone()),
                ("asset", e.asset.clone()),
                ("amount", e.amount.clone()),
                ("interestRateMode", e.interest_rate_mode.clone()),
                ("premium", e.premium.clone()),
                ("referralCode", e.referral_code.clone()),
                ("txHash", e.tx_hash.clone()),
            ],
            Self::LiquidationCall(e) => vec![
                ("collateralAsset", e.collateral_asset.clone()),
                ("debtAsset", e.debt_asset.clone()),
                ("user", e.user.clone()),
                ("debtToCover", e.debt_to_cover.clone()),
                ("liquidatedCollateralAmount", e.liquidated_collateral_amount.clone()),
                ("liquidator", e.liquidator.clone()),
                ("receiveAToken", e.receive_a_token.to_string()),
                ("txHash", e.tx_hash.clone()),
            ],
        }
    }

    /// Rebuild an event of a known kind from a JSON object.
    ///
    /// Extra keys (`protocol`, `eventType`) are ignored, so both tagged
    /// payloads and bare field objects decode.
    pub fn from_value(kind: EventKind, value: serde_json::Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            EventKind::Withdraw => Self::Withdraw(serde_json::from_value(value)?),
            EventKind::Supply => Self::Supply(serde_json::from_value(value)?),
            EventKind::FlashLoan => Self::FlashLoan(serde_json::from_value(value)?),
            EventKind::LiquidationCall => Self::LiquidationCall(serde_json::from_value(value)?),
        })
    }

    /// Deterministic idempotency key: hex sha256 over the kind and the
    /// canonical JSON encoding of the event.
    pub fn dedup_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.kind().as_str().as_bytes());
        hasher.update([0u8]);
        // Struct fields serialize in declaration order, so this is stable.
        hasher.update(serde_json::to_vec(self).unwrap_or_default());
        format!("0x{}", hex::encode(hasher.finalize()))
    }
}

/// Parse a decimal string into a U256. Rejects signs, whitespace and empty input.
pub fn parse_u256(s: &str) -> Option<U256> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    U256::from_str_radix(s, 10).ok()
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn withdraw() -> DomainEvent {
        DomainEvent::Withdraw(WithdrawEvent {
            reserve: "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48".into(),
            user: "0x1111111111111111111111111111111111111111".into(),
            to: "0x2222222222222222222222222222222222222222".into(),
            amount: "1000000".into(),
            tx_hash: format!("0x{}", "ab".repeat(32)),
        })
    }

    #[test]
    fn kind_parses_legacy_spellings() {
        assert_eq!("flash-loan".parse::<EventKind>().unwrap(), EventKind::FlashLoan);
        assert_eq!("flashLoan".parse::<EventKind>().unwrap(), EventKind::FlashLoan);
        assert_eq!("liquidation-call".parse::<EventKind>().unwrap(), EventKind::LiquidationCall);
        assert_eq!("Withdraw".parse::<EventKind>().unwrap(), EventKind::Withdraw);
        assert!("borrow".parse::<EventKind>().is_err());
    }

    #[test]
    fn serializes_with_event_type_tag() {
        let json = serde_json::to_value(withdraw()).unwrap();
        assert_eq!(json["eventType"], "Withdraw");
        assert_eq!(json["amount"], "1000000");
        assert!(json.get("txHash").is_some());
    }

    #[test]
    fn from_value_ignores_extra_keys() {
        let mut json = serde_json::to_value(withdraw()).unwrap();
        json["protocol"] = PROTOCOL.into();
        let back = DomainEvent::from_value(EventKind::Withdraw, json).unwrap();
        assert_eq!(back, withdraw());
    }

    #[test]
    fn liquidation_accessors() {
        let ev = DomainEvent::LiquidationCall(LiquidationCallEvent {
            collateral_asset: "0xc0".into(),
            debt_asset: "0xd0".into(),
            user: "0xu".into(),
            debt_to_cover: "5".into(),
            liquidated_collateral_amount: "7".into(),
            liquidator: "0xl".into(),
            receive_a_token: true,
            tx_hash: "0xtx".into(),
        });
        assert_eq!(ev.primary_asset(), "0xc0");
        assert_eq!(ev.primary_amount(), "7");
        assert_eq!(ev.participants(), vec!["0xu", "0xl"]);
        assert!(ev.fields().contains(&("receiveAToken", "true".to_string())));
    }

    #[test]
    fn dedup_key_is_stable_and_distinct() {
        let a = withdraw();
        let mut b = withdraw();
        assert_eq!(a.dedup_key(), b.dedup_key());
        if let DomainEvent::Withdraw(w) = &mut b {
            w.amount = "1000001".into();
        }
        assert_ne!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn parse_u256_rejects_non_decimal() {
        assert_eq!(parse_u256("175"), Some(U256::from(175u64)));
        assert!(parse_u256("-1").is_none());
        assert!(parse_u256("1.5").is_none());
        assert!(parse_u256("").is_none());
    }
}
