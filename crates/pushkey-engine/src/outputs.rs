//! Outputs read back from state

use crate::apply::SECRET_ACCESS_KEY_ATTRIBUTE;
use crate::resource::Node;
use crate::state::StateFile;
use pushkey_core::{Error, Result};
use pushkey_secrets::SecureString;
use serde::Serialize;
use std::collections::BTreeMap;

/// Output names in display order
pub const OUTPUT_NAMES: [&str; 6] = [
    "user_arn",
    "policy_arn",
    "access_key_id",
    "secret_access_key",
    "access_key_id_parameter",
    "secret_access_key_parameter",
];

const MASK: &str = "<sensitive>";

/// A single output value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub name: &'static str,
    pub value: SecureString,
    pub sensitive: bool,
}

impl Output {
    /// Value safe for any channel: sensitive values are masked
    pub fn display_value(&self) -> &str {
        if self.sensitive {
            MASK
        } else {
            self.value.as_str()
        }
    }

    /// Unmasked value, for when the operator asked for this output by name
    pub fn reveal(&self) -> &str {
        self.value.as_str()
    }
}

/// Outputs available from a state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outputs {
    values: Vec<Output>,
}

impl Outputs {
    /// Collect every output whose resource is present in state
    pub fn from_state(state: &StateFile) -> Self {
        let values = OUTPUT_NAMES
            .into_iter()
            .filter_map(|name| read_output(state, name))
            .collect();
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&Output> {
        self.values.iter().find(|o| o.name == name)
    }

    /// Look up an output, distinguishing unknown names from absent values
    pub fn require(&self, name: &str) -> Result<&Output> {
        if !OUTPUT_NAMES.contains(&name) {
            return Err(Error::invalid_config(format!(
                "unknown output '{}'; expected one of: {}",
                name,
                OUTPUT_NAMES.join(", ")
            )));
        }
        self.get(name)
            .ok_or_else(|| Error::missing_attribute(name, "value"))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Output> {
        self.values.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Name to masked value, for JSON rendering
    pub fn masked(&self) -> BTreeMap<&'static str, MaskedOutput<'_>> {
        self.values
            .iter()
            .map(|o| {
                (
                    o.name,
                    MaskedOutput {
                        value: o.display_value(),
                        sensitive: o.sensitive,
                    },
                )
            })
            .collect()
    }
}

/// JSON shape of a masked output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MaskedOutput<'a> {
    pub value: &'a str,
    pub sensitive: bool,
}

fn read_output(state: &StateFile, name: &'static str) -> Option<Output> {
    let (value, sensitive): (SecureString, bool) = match name {
        "user_arn" => (state.get(Node::Identity)?.attr_str("arn")?.into(), false),
        "policy_arn" => (state.get(Node::Policy)?.id.as_str().into(), false),
        "access_key_id" => (state.get(Node::AccessKey)?.id.as_str().into(), true),
        "secret_access_key" => (
            state
                .get(Node::AccessKey)?
                .sensitive_attributes
                .get(SECRET_ACCESS_KEY_ATTRIBUTE)?
                .clone(),
            true,
        ),
        "access_key_id_parameter" => (
            state.get(Node::AccessKeyIdParameter)?.id.as_str().into(),
            false,
        ),
        "secret_access_key_parameter" => (
            state.get(Node::SecretAccessKeyParameter)?.id.as_str().into(),
            false,
        ),
        _ => return None,
    };
    Some(Output {
        name,
        value,
        sensitive,
    })
}
