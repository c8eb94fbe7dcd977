//! Typed identifiers for pages, agents, users, conversations, and approval
//! requests.
//!
//! All ID types wrap UUIDs. They're opaque on the wire (serde-transparent,
//! standard UUID text) and display as full UUID text for logging. The
//! `short()` form (first 8 hex chars) is for human-facing log lines and never
//! used as a lookup key.
//!
//! Pages and users are identified by IDs minted elsewhere (the relational
//! store / auth provider), so every type parses from arbitrary UUID text.
//! `RequestId::new()` mints time-ordered UUIDv7 for approval requests created
//! by this server.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A page identifier; one CRDT document per page.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(uuid::Uuid);

/// An agent identifier.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(uuid::Uuid);

/// A user identifier, as issued by the auth provider.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(uuid::Uuid);

/// A conversation identifier.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(uuid::Uuid);

/// An approval-request identifier (UUIDv7, minted server-side).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(uuid::Uuid);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_typed_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Create a new time-ordered ID (UUIDv7).
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            /// First 8 hex characters, for human display only.
            pub fn short(&self) -> String {
                self.0.as_simple().to_string()[..8].to_string()
            }

            /// Parse from standard UUID text (with or without hyphens).
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                uuid::Uuid::parse_str(s).map(Self)
            }

            /// The wrapped UUID.
            pub fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }
        }

        impl Default for $T {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($name, "({})"), self.0)
            }
        }

        impl std::str::FromStr for $T {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

impl_typed_id!(PageId, "PageId");
impl_typed_id!(AgentId, "AgentId");
impl_typed_id!(UserId, "UserId");
impl_typed_id!(ConversationId, "ConversationId");
impl_typed_id!(RequestId, "RequestId");
