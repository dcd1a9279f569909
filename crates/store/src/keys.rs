//! Key layout shared by every replica.

pub const BANNERS: &str = "banners";
pub const SLOTS: &str = "slots";
pub const SOCIAL_GROUPS: &str = "social_groups";

/// Slot roster: scored collection, every member at +inf.
pub fn slot_banners(slot_id: &str) -> String {
    format!("slot:{slot_id}:banners")
}

/// Social groups whose scope under this slot has been seeded.
pub fn slot_scopes(slot_id: &str) -> String {
    format!("slot:{slot_id}:scopes")
}

pub fn scope_selects(slot_id: &str, social_group_id: &str) -> String {
    scope_key(slot_id, social_group_id, "selects")
}

pub fn scope_selects_total(slot_id: &str, social_group_id: &str) -> String {
    scope_key(slot_id, social_group_id, "selects_total")
}

pub fn scope_clicks(slot_id: &str, social_group_id: &str) -> String {
    scope_key(slot_id, social_group_id, "clicks")
}

pub fn scope_scores(slot_id: &str, social_group_id: &str) -> String {
    scope_key(slot_id, social_group_id, "scores")
}

fn scope_key(slot_id: &str, social_group_id: &str, suffix: &str) -> String {
    format!("slot:{slot_id}:social_group:{social_group_id}:{suffix}")
}
