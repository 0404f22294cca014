//! Permission and setting resolution.
//!
//! Read-side decisions for every protected action. Nothing here fails or
//! logs: unknown owners resolve through the cache's default instance, a
//! missing town falls back to the cell owner, and wilderness is open.
//!
//! ## Permission check
//! 1. Unowned cell: allowed.
//! 2. Environmental actor: decided by the governing [`ClaimSetting`].
//! 3. The owner: allowed.
//! 4. Anyone else: their granted rank (or `Enemy`) against the owner's
//!    required rank for the permission.
//!
//! ## Setting check
//! Owner override, else the player or spawn default. With town priority,
//! a town-overridable setting that is not already at its polarity defers
//! to the owner of the cell's town, except on spawn cells.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::claims::cache::ClaimCache;
use crate::claims::claimant::{read, Claimant};
use crate::claims::types::{CellOwnership, ClaimPermission, ClaimSetting, Rank};
use crate::metrics;

/// Who is attempting an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Player(Uuid),
    /// Non-player cause (fire, explosions, mobs), governed by a setting.
    Environment(ClaimSetting),
}

/// Can `actor` perform `permission` in `cell`?
pub fn can_perform(
    claims: &ClaimCache,
    cell: Option<&CellOwnership>,
    actor: Actor,
    permission: ClaimPermission,
) -> bool {
    let owner = cell.and_then(CellOwnership::owner_id);
    record(decide(claims, cell, owner, actor, permission))
}

/// Like [`can_perform`] but honours slice ownership at height `y`.
pub fn can_perform_at(
    claims: &ClaimCache,
    cell: Option<&CellOwnership>,
    y: i32,
    min_y: i32,
    actor: Actor,
    permission: ClaimPermission,
) -> bool {
    let owner = cell.and_then(|c| c.owner_at(y, min_y));
    record(decide(claims, cell, owner, actor, permission))
}

fn record(allowed: bool) -> bool {
    if allowed {
        metrics::inc_permission_allowed();
    } else {
        metrics::inc_permission_denied();
    }
    allowed
}

fn decide(
    claims: &ClaimCache,
    cell: Option<&CellOwnership>,
    owner: Option<Uuid>,
    actor: Actor,
    permission: ClaimPermission,
) -> bool {
    let Some(owner) = owner else {
        return true;
    };
    match actor {
        Actor::Environment(setting) => resolve_setting(
            claims,
            Some(owner),
            cell.and_then(CellOwnership::town_id),
            setting,
            false,
        ),
        Actor::Player(id) if id == owner => true,
        Actor::Player(id) => {
            let handle = claims.get_player_claim(owner);
            let player = read(&handle);
            effective_rank(&*player, id).can_perform(player.required_rank(permission))
        }
    }
}

/// Rank `actor` holds on `owner`'s land: explicit grant or `Enemy`.
pub fn effective_rank(owner: &dyn Claimant, actor: Uuid) -> Rank {
    owner.rank_of(actor)
}

/// Is `setting` enabled in `cell`? `town_priority` lets the cell's town
/// override town-overridable settings.
pub fn is_setting_enabled(
    claims: &ClaimCache,
    cell: Option<&CellOwnership>,
    setting: ClaimSetting,
    town_priority: bool,
) -> bool {
    resolve_setting(
        claims,
        cell.and_then(CellOwnership::owner_id),
        cell.and_then(CellOwnership::town_id),
        setting,
        town_priority,
    )
}

fn resolve_setting(
    claims: &ClaimCache,
    owner: Option<Uuid>,
    town: Option<Uuid>,
    setting: ClaimSetting,
    town_priority: bool,
) -> bool {
    if let Some(feature) = setting.feature() {
        if !claims.features().is_enabled(feature) {
            return true;
        }
    }
    let Some(owner) = owner else {
        return setting.spawn_default();
    };
    let value = player_setting(claims, owner, setting);
    if !town_priority
        || !setting.town_overridable()
        || value == setting.polarity()
        || claims.is_spawn(owner)
    {
        return value;
    }
    let Some(town) = town.and_then(|id| claims.get_town_claim(id)) else {
        return value;
    };
    let town_owner = read(&town).owner_id;
    resolve_setting(claims, Some(town_owner), None, setting, false)
}

/// A player's own value for `setting`: override, else spawn or player default.
pub fn player_setting(claims: &ClaimCache, player: Uuid, setting: ClaimSetting) -> bool {
    let handle = claims.get_player_claim(player);
    let value = read(&handle).setting_override(setting);
    value.unwrap_or_else(|| {
        if claims.is_spawn(player) {
            setting.spawn_default()
        } else {
            setting.player_default()
        }
    })
}

/// Permission and setting tables sent to a newly joined client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClaimSnapshot {
    pub player_id: Uuid,
    pub name: String,
    pub town_id: Option<Uuid>,
    pub chunk_count: u32,
    pub chunk_limit: u32,
    pub permissions: Vec<(ClaimPermission, Rank)>,
    pub settings: Vec<(ClaimSetting, bool)>,
    pub friends: Vec<(Uuid, Rank)>,
}

pub fn snapshot_for(claims: &ClaimCache, player_id: Uuid) -> ClaimSnapshot {
    let settings = ClaimSetting::ALL
        .into_iter()
        .map(|setting| {
            let feature_off = setting
                .feature()
                .is_some_and(|f| !claims.features().is_enabled(f));
            (setting, feature_off || player_setting(claims, player_id, setting))
        })
        .collect();

    let handle = claims.get_player_claim(player_id);
    let player = read(&handle);
    let mut friends: Vec<(Uuid, Rank)> = player
        .friends()
        .iter()
        .map(|(id, rank)| (*id, *rank))
        .collect();
    friends.sort();

    ClaimSnapshot {
        player_id,
        name: player.name(),
        town_id: player.town_id,
        chunk_count: player.chunk_count,
        chunk_limit: player.chunk_limit,
        permissions: ClaimPermission::ALL
            .into_iter()
            .map(|perm| (perm, player.required_rank(perm)))
            .collect(),
        settings,
        friends,
    }
}
