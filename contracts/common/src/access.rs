//! Access Control
//!
//! Capability table checked by the pool orchestrator before dispatch.
//! Roles are a bitmask per address; there is no inheritance and no
//! ambient authority — the table is injected into the pool and every
//! privileged operation names the role it requires.

use crate::errors::{PoolError, PoolResult};
use crate::types::Address;
use crate::BTreeMap;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Capabilities an address can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum Role {
    /// Operational control: shutdown, provider registry
    Admin,
    /// Parameter control: premium override, capital injection
    Governance,
    /// May commit and finalize liquidation purchases
    Keeper,
    /// May report realized losses and trigger reinsurance
    LiquidationModule,
}

impl Role {
    /// Bitmask position for this role
    pub fn mask(&self) -> u64 {
        match self {
            Role::Admin => 1 << 0,
            Role::Governance => 1 << 1,
            Role::Keeper => 1 << 2,
            Role::LiquidationModule => 1 << 3,
        }
    }

    /// Role name for diagnostics
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Governance => "GOVERNANCE",
            Role::Keeper => "KEEPER",
            Role::LiquidationModule => "LIQUIDATION_MODULE",
        }
    }
}

/// Address-to-capability table
#[derive(Debug, Clone, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct AccessTable {
    grants: BTreeMap<Address, u64>,
}

impl AccessTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self { grants: BTreeMap::new() }
    }

    /// Create a table with one admin who also holds governance
    pub fn with_admin(admin: Address) -> Self {
        let mut table = Self::new();
        table.grant(admin, Role::Admin);
        table.grant(admin, Role::Governance);
        table
    }

    /// Grant a role to an address
    pub fn grant(&mut self, address: Address, role: Role) {
        *self.grants.entry(address).or_insert(0) |= role.mask();
    }

    /// Revoke a role from an address
    pub fn revoke(&mut self, address: Address, role: Role) {
        if let Some(mask) = self.grants.get_mut(&address) {
            *mask &= !role.mask();
            if *mask == 0 {
                self.grants.remove(&address);
            }
        }
    }

    /// Whether an address holds a role
    pub fn has_role(&self, address: &Address, role: Role) -> bool {
        self.grants
            .get(address)
            .map(|mask| mask & role.mask() != 0)
            .unwrap_or(false)
    }

    /// Reject the call unless the caller holds the role
    pub fn require_role(&self, caller: &Address, role: Role) -> PoolResult<()> {
        if !self.has_role(caller, role) {
            return Err(PoolError::Unauthorized {
                caller: *caller,
                required: role.as_str(),
            });
        }
        Ok(())
    }
}
