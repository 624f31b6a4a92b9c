use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AddressError;

/// Namespace reserved for workflows registered in-process.
pub const WORKFLOW_NAMESPACE: &str = "workflow";

/// A parsed `namespace.localId` reference.
///
/// Connector namespaces may themselves be dotted paths (`web.hook.receive` has
/// namespace `web.hook` and local id `receive`). Workflow addresses keep
/// everything after the `workflow.` marker as the local id, so
/// `workflow.billing.monthly` names the workflow `billing.monthly`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
    namespace: String,
    local_id: String,
    is_workflow: bool,
}

impl Address {
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AddressError::Empty);
        }

        if let Some(ch) = trimmed.chars().find(|c| c.is_whitespace()) {
            return Err(AddressError::InvalidCharacter {
                raw: trimmed.to_string(),
                ch,
            });
        }

        let (namespace, local_id) = match trimmed.split_once('.') {
            Some((WORKFLOW_NAMESPACE, rest)) => (WORKFLOW_NAMESPACE, rest),
            Some(_) => trimmed
                .rsplit_once('.')
                .ok_or_else(|| AddressError::MissingSeparator(trimmed.to_string()))?,
            None => return Err(AddressError::MissingSeparator(trimmed.to_string())),
        };

        let has_empty_segment = namespace
            .split('.')
            .chain(local_id.split('.'))
            .any(str::is_empty);
        if has_empty_segment {
            return Err(AddressError::EmptySegment(trimmed.to_string()));
        }

        Ok(Self {
            namespace: namespace.to_string(),
            local_id: local_id.to_string(),
            is_workflow: namespace == WORKFLOW_NAMESPACE,
        })
    }

    /// Build the address of an in-process workflow.
    pub fn workflow(local_id: impl Into<String>) -> Self {
        Self {
            namespace: WORKFLOW_NAMESPACE.to_string(),
            local_id: local_id.into(),
            is_workflow: true,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn is_workflow(&self) -> bool {
        self.is_workflow
    }

    /// Project onto the key used by the workflow registry.
    ///
    /// Workflow addresses map to themselves. A connector-style address is
    /// re-homed under the workflow namespace with its full text as the local
    /// id, so registering `billing.monthly` is reachable as
    /// `workflow.billing.monthly`.
    pub fn workflow_key(&self) -> Address {
        if self.is_workflow {
            self.clone()
        } else {
            Self::workflow(self.to_string())
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.local_id)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for Address {
    type Error = AddressError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}
