//! Inbound message model: addresses, trust labels, attachments, and the
//! external-content wrapper.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::session::SessionId;

/// Maximum attachments per inbound message.
pub const MAX_ATTACHMENTS: usize = 8;

/// Maximum total attachment payload per message.
pub const MAX_ATTACHMENT_BYTES: usize = 1024 * 1024;

/// Trust origin of a piece of data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    /// The paired operator of this host.
    User,
    /// Anything arriving over a channel from outside the trust boundary.
    External,
    /// Host-originated (scheduler prompts, heartbeats).
    System,
}

impl TrustLevel {
    pub fn label(&self) -> &'static str {
        match self {
            TrustLevel::User => "user",
            TrustLevel::External => "external",
            TrustLevel::System => "system",
        }
    }
}

/// Taint tag attached to stored data derived from a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaintTag {
    pub source: String,
    pub trust: TrustLevel,
    pub timestamp: DateTime<Utc>,
}

impl TaintTag {
    pub fn new(source: impl Into<String>, trust: TrustLevel) -> Self {
        Self {
            source: source.into(),
            trust,
            timestamp: Utc::now(),
        }
    }
}

/// Conversation scope of a session address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Dm,
    Channel,
    Thread,
    Group,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Dm => "dm",
            Scope::Channel => "channel",
            Scope::Thread => "thread",
            Scope::Group => "group",
        }
    }
}

/// Where a message came from: provider, scope, and provider-specific
/// identifiers. Concatenated, these form the session id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionAddress {
    pub provider: String,
    pub scope: Scope,
    pub identifiers: Vec<String>,
}

impl SessionAddress {
    pub fn new(provider: impl Into<String>, scope: Scope, identifiers: Vec<String>) -> Self {
        Self {
            provider: provider.into(),
            scope,
            identifiers,
        }
    }

    /// Derive the colon-form session id for this address.
    pub fn session_id(&self) -> Result<SessionId> {
        let mut parts = vec![self.provider.clone(), self.scope.as_str().to_string()];
        parts.extend(self.identifiers.iter().cloned());
        SessionId::parse(&parts.join(":"))
    }
}

/// A bounded attachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub media_type: String,
    pub data: Vec<u8>,
}

/// One inbound message, as handed to the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub address: SessionAddress,
    pub sender: String,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub reply_to: Option<String>,
    pub trust: TrustLevel,
}

impl InboundMessage {
    /// A channel message with external trust.
    pub fn external(
        id: impl Into<String>,
        address: SessionAddress,
        sender: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            address,
            sender: sender.into(),
            content: content.into(),
            attachments: Vec::new(),
            timestamp: Utc::now(),
            reply_to: None,
            trust: TrustLevel::External,
        }
    }

    /// A host-originated message (scheduler, heartbeat).
    pub fn system(address: SessionAddress, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            address,
            sender: "host".into(),
            content: content.into(),
            attachments: Vec::new(),
            timestamp: Utc::now(),
            reply_to: None,
            trust: TrustLevel::System,
        }
    }

    /// Enforce attachment bounds.
    pub fn validate(&self) -> Result<()> {
        if self.attachments.len() > MAX_ATTACHMENTS {
            return Err(CoreError::AttachmentLimit(format!(
                "{} attachments (max {})",
                self.attachments.len(),
                MAX_ATTACHMENTS
            )));
        }
        let total: usize = self.attachments.iter().map(|a| a.data.len()).sum();
        if total > MAX_ATTACHMENT_BYTES {
            return Err(CoreError::AttachmentLimit(format!(
                "{} attachment bytes (max {})",
                total, MAX_ATTACHMENT_BYTES
            )));
        }
        Ok(())
    }
}

/// Wrap untrusted content in the external-content marker.
///
/// The wrapper is the literal framing the model sees around every piece
/// of channel input; the canary attribute is what makes verbatim
/// exfiltration detectable on the way out.
pub fn wrap_external(content: &str, source: &str, canary: &str) -> String {
    format!(
        "<external_content trust=\"external\" source=\"{}\" canary=\"{}\">\n{}\n</external_content>",
        source, canary, content
    )
}
