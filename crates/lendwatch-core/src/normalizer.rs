//! Converts decoded chain-log arguments into typed [`DomainEvent`]s.
//!
//! The upstream listener hands over the event name and the ABI-ordered
//! argument values. Integers become canonical decimal strings via `U256`
//! (never a float), addresses are lowercased, booleans kept as booleans.

use alloy_primitives::{Address, U256};
use serde_json::Value;

use crate::error::MalformedEventError;
use crate::event::{
    DomainEvent, EventKind, FlashLoanEvent, LiquidationCallEvent, SupplyEvent, WithdrawEvent,
};

/// A single decoded argument value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogValue {
    Address(Address),
    Uint(U256),
    Bool(bool),
    /// Textual form: an address, a decimal/`0x` integer, or `true`/`false`.
    Str(String),
}

impl LogValue {
    /// Map a JSON value (as found in JSON-lines ingest files) to a `LogValue`.
    pub fn from_json(v: &Value) -> Option<Self> {
        match v {
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::String(s) => Some(Self::Str(s.clone())),
            Value::Number(n) if n.is_u64() => Some(Self::Str(n.to_string())),
            _ => None,
        }
    }
}

impl From<U256> for LogValue {
    fn from(v: U256) -> Self {
        Self::Uint(v)
    }
}

impl From<Address> for LogValue {
    fn from(v: Address) -> Self {
        Self::Address(v)
    }
}

impl From<bool> for LogValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for LogValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

/// A log as delivered by the chain listener: `(eventName, decodedArgs, txHash)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedLog {
    pub event_name: String,
    pub args: Vec<LogValue>,
    pub tx_hash: String,
}

impl DecodedLog {
    pub fn new(event_name: impl Into<String>, args: Vec<LogValue>, tx_hash: impl Into<String>) -> Self {
        Self {
            event_name: event_name.into(),
            args,
            tx_hash: tx_hash.into(),
        }
    }

    /// Parse `{"eventName": "...", "args": [...], "txHash": "0x..."}`.
    pub fn from_json(v: &Value) -> Result<Self, MalformedEventError> {
        let event_name = v
            .get("eventName")
            .and_then(Value::as_str)
            .ok_or_else(|| MalformedEventError::MissingField {
                event: "<unknown>".into(),
                field: "eventName".into(),
            })?
            .to_string();
        let tx_hash = v
            .get("txHash")
            .and_then(Value::as_str)
            .ok_or_else(|| MalformedEventError::MissingField {
                event: event_name.clone(),
                field: "txHash".into(),
            })?
            .to_string();
        let raw_args = v.get("args").and_then(Value::as_array).ok_or_else(|| {
            MalformedEventError::MissingField {
                event: event_name.clone(),
                field: "args".into(),
            }
        })?;

        let mut args = Vec::with_capacity(raw_args.len());
        for (i, raw) in raw_args.iter().enumerate() {
            let value = LogValue::from_json(raw).ok_or_else(|| MalformedEventError::WrongType {
                event: event_name.clone(),
                field: format!("args[{i}]"),
                expected: "string, unsigned number or bool",
            })?;
            args.push(value);
        }
        Ok(Self { event_name, args, tx_hash })
    }

    pub fn normalize(&self) -> Result<DomainEvent, MalformedEventError> {
        normalize(&self.event_name, &self.args, &self.tx_hash)
    }
}

/// Normalize one decoded log into a [`DomainEvent`].
pub fn normalize(
    event_name: &str,
    args: &[LogValue],
    tx_hash: &str,
) -> Result<DomainEvent, MalformedEventError> {
    let kind: EventKind = event_name
        .parse()
        .map_err(|_| MalformedEventError::UnknownEvent {
            name: event_name.to_string(),
        })?;
    let tx_hash = normalize_tx_hash(tx_hash)?;
    let a = Args { kind, args };

    let event = match kind {
        EventKind::Withdraw => DomainEvent::Withdraw(WithdrawEvent {
            reserve: a.address(0, "reserve")?,
            user: a.address(1, "user")?,
            to: a.address(2, "to")?,
            amount: a.uint(3, "amount", 256)?,
            tx_hash,
        }),
        EventKind::Supply => DomainEvent::Supply(SupplyEvent {
            reserve: a.address(0, "reserve")?,
            user: a.address(1, "user")?,
            on_behalf_of: a.address(2, "onBehalfOf")?,
            amount: a.uint(3, "amount", 256)?,
            referral_code: a.uint(4, "referralCode", 16)?,
            tx_hash,
        }),
        EventKind::FlashLoan => DomainEvent::FlashLoan(FlashLoanEvent {
            target: a.address(0, "target")?,
            initiator: a.address(1, "initiator")?,
            asset: a.address(2, "asset")?,
            amount: a.uint(3, "amount", 256)?,
            interest_rate_mode: a.uint(4, "interestRateMode", 8)?,
            premium: a.uint(5, "premium", 256)?,
            referral_code: a.uint(6, "referralCode", 16)?,
            tx_hash,
        }),
        EventKind::LiquidationCall => DomainEvent::LiquidationCall(LiquidationCallEvent {
            collateral_asset: a.address(0, "collateralAsset")?,
            debt_asset: a.address(1, "debtAsset")?,
            user: a.address(2, "user")?,
            debt_to_cover: a.uint(3, "debtToCover", 256)?,
            liquidated_collateral_amount: a.uint(4, "liquidatedCollateralAmount", 256)?,
            liquidator: a.address(5, "liquidator")?,
            receive_a_token: a.boolean(6, "receiveAToken")?,
            tx_hash,
        }),
    };
    Ok(event)
}

/// Lowercase and validate a 20-byte hex address.
pub fn normalize_address(s: &str) -> Option<String> {
    let hex = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
    if hex.len() != 40 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("0x{}", hex.to_ascii_lowercase()))
}

fn normalize_tx_hash(s: &str) -> Result<String, MalformedEventError> {
    let invalid = || MalformedEventError::InvalidTxHash { value: s.to_string() };
    let hex = s.strip_prefix("0x").ok_or_else(invalid)?;
    if hex.len() != 64 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    Ok(format!("0x{}", hex.to_ascii_lowercase()))
}

/// Positional accessor over the argument list of one event.
struct Args<'a> {
    kind: EventKind,
    args: &'a [LogValue],
}

impl Args<'_> {
    fn get(&self, idx: usize, field: &str) -> Result<&LogValue, MalformedEventError> {
        self.args.get(idx).ok_or_else(|| MalformedEventError::MissingField {
            event: self.kind.to_string(),
            field: field.to_string(),
        })
    }

    fn wrong_type(&self, field: &str, expected: &'static str) -> MalformedEventError {
        MalformedEventError::WrongType {
            event: self.kind.to_string(),
            field: field.to_string(),
            expected,
        }
    }

    fn address(&self, idx: usize, field: &str) -> Result<String, MalformedEventError> {
        match self.get(idx, field)? {
            LogValue::Address(a) => Ok(format!("0x{}", hex::encode(a.as_slice()))),
            LogValue::Str(s) => normalize_address(s).ok_or_else(|| {
                MalformedEventError::InvalidAddress {
                    event: self.kind.to_string(),
                    field: field.to_string(),
                    value: s.clone(),
                }
            }),
            _ => Err(self.wrong_type(field, "address")),
        }
    }

    fn uint(&self, idx: usize, field: &str, bits: u32) -> Result<String, MalformedEventError> {
        let value = match self.get(idx, field)? {
            LogValue::Uint(u) => *u,
            LogValue::Str(s) => parse_uint_text(s).ok_or_else(|| {
                MalformedEventError::InvalidInteger {
                    event: self.kind.to_string(),
                    field: field.to_string(),
                    value: s.clone(),
                }
            })?,
            _ => return Err(self.wrong_type(field, "unsigned integer")),
        };
        if bits < 256 && value.bit_len() > bits as usize {
            return Err(MalformedEventError::OutOfRange {
                event: self.kind.to_string(),
                field: field.to_string(),
                bits,
                value: value.to_string(),
            });
        }
        Ok(value.to_string())
    }

    fn boolean(&self, idx: usize, field: &str) -> Result<bool, MalformedEventError> {
        match self.get(idx, field)? {
            LogValue::Bool(b) => Ok(*b),
            LogValue::Str(s) if s == "true" => Ok(true),
            LogValue::Str(s) if s == "false" => Ok(false),
            _ => Err(self.wrong_type(field, "bool")),
        }
    }
}

/// Decimal or `0x`-hex unsigned integer text.
fn parse_uint_text(s: &str) -> Option<U256> {
    if let Some(hex) = s.strip_prefix("0x") {
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        return U256::from_str_radix(hex, 16).ok();
    }
    crate::event::parse_u256(s)
}

// ─── Tests ────────────────────────────────────────────────────────────────────
