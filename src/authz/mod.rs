//! Authorization core - permission catalog, tiers and the policy engine
//!
//! This module implements:
//! - A closed permission catalog and a fixed tier order
//! - Effective-permission, tier and scope queries (pure, never fail)
//! - Delegation authority with a per-permission minimum-tier table
//! - The `delegate` mutation on an in-memory user, returning its audit payload

mod delegation;
mod evaluator;
mod permission;
mod tier;

pub use delegation::{delegate, DelegationEvent, DelegationPolicy, PLATFORM_RESERVED};
pub use evaluator::{
    effective_permissions, has_permission, has_tier_access, resolve_scope, PolicyEngine,
    PolicyEvaluator, Scope,
};
pub use permission::Permission;
pub use tier::AccessTier;
