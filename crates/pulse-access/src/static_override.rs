//! Static, id-keyed override table configured at startup.
//!
//! Grants here bypass identity lookup and the permission file, so a small set
//! of operator accounts keeps working when either is unavailable.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{bail, Result};

use crate::ADMIN_PERMISSION_KEY;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticOverride {
    grants: BTreeMap<String, BTreeSet<String>>,
}

impl StaticOverride {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(mut self, capability: &str, user_id: &str) -> Self {
        let capability = capability.trim().to_ascii_lowercase();
        let user_id = user_id.trim();
        if !capability.is_empty() && !user_id.is_empty() {
            self.grants
                .entry(capability)
                .or_default()
                .insert(user_id.to_string());
        }
        self
    }

    pub fn grant_admin(self, user_id: &str) -> Self {
        self.grant(ADMIN_PERMISSION_KEY, user_id)
    }

    /// Builds the table from admin ids plus `capability=user_id` grant specs.
    pub fn from_specs(admin_ids: &[String], grant_specs: &[String]) -> Result<Self> {
        let mut table = admin_ids
            .iter()
            .fold(Self::new(), |table, id| table.grant_admin(id));
        for spec in grant_specs {
            let (capability, user_id) = parse_grant_spec(spec)?;
            table = table.grant(capability, user_id);
        }
        Ok(table)
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        self.grants(ADMIN_PERMISSION_KEY, user_id)
    }

    pub fn grants(&self, capability: &str, user_id: &str) -> bool {
        let capability = capability.trim().to_ascii_lowercase();
        self.grants
            .get(&capability)
            .is_some_and(|ids| ids.contains(user_id.trim()))
    }
}

fn parse_grant_spec(spec: &str) -> Result<(&str, &str)> {
    let Some((capability, user_id)) = spec.split_once('=') else {
        bail!("invalid static grant '{spec}': expected <capability>=<user_id>");
    };
    let (capability, user_id) = (capability.trim(), user_id.trim());
    if capability.is_empty() || user_id.is_empty() {
        bail!("invalid static grant '{spec}': capability and user id must not be empty");
    }
    Ok((capability, user_id))
}
