//! SOFA message bodies.
//!
//! Every structured chat message travels as a plain string of the form
//! `SOFA::<Type>:<json>`. Bodies without the prefix are plain text.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SOFA_PREFIX: &str = "SOFA::";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SofaType {
    /// Not a SOFA body at all.
    None,
    Message,
    Command,
    PaymentRequest,
    Payment,
    InitRequest,
    Init,
    /// Has the prefix but names a type we don't know.
    Unknown,
}

impl SofaType {
    /// Classify a body by its prefix alone, without parsing the JSON.
    pub fn from_body(body: &str) -> Self {
        let Some(rest) = body.strip_prefix(SOFA_PREFIX) else {
            return Self::None;
        };
        let Some((name, _)) = rest.split_once(':') else {
            return Self::Unknown;
        };
        match name {
            "Message" => Self::Message,
            "Command" => Self::Command,
            "PaymentRequest" => Self::PaymentRequest,
            "Payment" => Self::Payment,
            "InitRequest" => Self::InitRequest,
            "Init" => Self::Init,
            _ => Self::Unknown,
        }
    }

    pub fn name(self) -> Option<&'static str> {
        match self {
            Self::Message => Some("Message"),
            Self::Command => Some("Command"),
            Self::PaymentRequest => Some("PaymentRequest"),
            Self::Payment => Some("Payment"),
            Self::InitRequest => Some("InitRequest"),
            Self::Init => Some("Init"),
            Self::None | Self::Unknown => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SofaError {
    #[error("unknown sofa type in body")]
    UnknownType,
    #[error("invalid {kind} payload: {source}")]
    InvalidJson {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonKind {
    Button,
    Group,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Button {
    #[serde(rename = "type")]
    pub kind: ButtonKind,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub controls: Vec<Button>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SofaMessage {
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub controls: Vec<Button>,
    #[serde(
        rename = "showKeyboard",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub show_keyboard: Option<bool>,
}

impl SofaMessage {
    /// A message that carries buttons or an explicit keyboard hint drives the
    /// control strip; anything else is just text.
    pub fn is_interactive(&self) -> bool {
        !self.controls.is_empty() || self.show_keyboard.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SofaCommand {
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SofaPaymentRequest {
    #[serde(default)]
    pub body: String,
    /// Hex-encoded wei, `0x` prefixed.
    pub value: String,
    #[serde(rename = "destinationAddress", default)]
    pub destination_address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SofaPayment {
    /// Hex-encoded wei, `0x` prefixed.
    pub value: String,
    #[serde(rename = "txHash", default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(
        rename = "fromAddress",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub from_address: Option<String>,
    #[serde(rename = "toAddress", default, skip_serializing_if = "Option::is_none")]
    pub to_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SofaInitRequest {
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SofaInit {
    #[serde(
        rename = "paymentAddress",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub payment_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl SofaInit {
    /// Answer an init request with only the fields it asked for.
    pub fn answering(
        request: &SofaInitRequest,
        payment_address: Option<&str>,
        language: Option<&str>,
    ) -> Self {
        let wants = |key: &str| request.values.iter().any(|v| v == key);
        Self {
            payment_address: payment_address
                .filter(|_| wants("paymentAddress"))
                .map(str::to_string),
            language: language.filter(|_| wants("language")).map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SofaWrapper {
    Message(SofaMessage),
    Command(SofaCommand),
    PaymentRequest(SofaPaymentRequest),
    Payment(SofaPayment),
    InitRequest(SofaInitRequest),
    Init(SofaInit),
}

impl SofaWrapper {
    pub fn sofa_type(&self) -> SofaType {
        match self {
            Self::Message(_) => SofaType::Message,
            Self::Command(_) => SofaType::Command,
            Self::PaymentRequest(_) => SofaType::PaymentRequest,
            Self::Payment(_) => SofaType::Payment,
            Self::InitRequest(_) => SofaType::InitRequest,
            Self::Init(_) => SofaType::Init,
        }
    }

    /// Human readable text carried by the payload, if any.
    pub fn text(&self) -> &str {
        match self {
            Self::Message(m) => &m.body,
            Self::Command(c) => &c.body,
            Self::PaymentRequest(r) => &r.body,
            Self::Payment(_) | Self::InitRequest(_) | Self::Init(_) => "",
        }
    }

    /// Serialize back into the `SOFA::<Type>:<json>` envelope.
    pub fn encode(&self) -> String {
        let json = match self {
            Self::Message(m) => serde_json::to_string(m),
            Self::Command(c) => serde_json::to_string(c),
            Self::PaymentRequest(r) => serde_json::to_string(r),
            Self::Payment(p) => serde_json::to_string(p),
            Self::InitRequest(r) => serde_json::to_string(r),
            Self::Init(i) => serde_json::to_string(i),
        }
        // Plain structs of strings/values always serialize.
        .unwrap_or_else(|_| "{}".to_string());
        let name = self.sofa_type().name().unwrap_or("Message");
        format!("{SOFA_PREFIX}{name}:{json}")
    }
}

/// Parse a message body.
///
/// Returns `Ok(None)` for plain (non-SOFA) text.
pub fn parse(body: &str) -> Result<Option<SofaWrapper>, SofaError> {
    let kind = SofaType::from_body(body);
    let Some(name) = kind.name() else {
        return match kind {
            SofaType::None => Ok(None),
            _ => Err(SofaError::UnknownType),
        };
    };
    // `from_body` already proved the prefix and the `<name>:` separator.
    let json = &body[SOFA_PREFIX.len() + name.len() + 1..];
    let invalid = |source| SofaError::InvalidJson { kind: name, source };
    let wrapper = match kind {
        SofaType::Message => SofaWrapper::Message(serde_json::from_str(json).map_err(invalid)?),
        SofaType::Command => SofaWrapper::Command(serde_json::from_str(json).map_err(invalid)?),
        SofaType::PaymentRequest => {
            SofaWrapper::PaymentRequest(serde_json::from_str(json).map_err(invalid)?)
        }
        SofaType::Payment => SofaWrapper::Payment(serde_json::from_str(json).map_err(invalid)?),
        SofaType::InitRequest => {
            SofaWrapper::InitRequest(serde_json::from_str(json).map_err(invalid)?)
        }
        SofaType::Init => SofaWrapper::Init(serde_json::from_str(json).map_err(invalid)?),
        SofaType::None | SofaType::Unknown => return Err(SofaError::UnknownType),
    };
    Ok(Some(wrapper))
}

/// Parse a `0x`-prefixed (or bare) hex wei amount.
pub fn parse_wei(hex: &str) -> Option<u128> {
    let digits = hex
        .strip_prefix("0x")
        .or_else(|| hex.strip_prefix("0X"))
        .unwrap_or(hex);
    if digits.is_empty() {
        return None;
    }
    u128::from_str_radix(digits, 16).ok()
}

/// Inverse of [`parse_wei`].
pub fn format_wei(wei: u128) -> String {
    format!("{wei:#x}")
}
