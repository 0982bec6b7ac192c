//! Remap tables between the classic and current closed enumerations.
//!
//! Both formats encode "which weapons" as a bitmask with weapon *n* at bit
//! *n - 1*, but the identifier spaces are not bit-compatible: the classic
//! format numbers its last two weapons past a block of ids the current
//! format never shipped. Masks are therefore rebuilt bit by bit, never
//! copied. Key items are a plain ordinal-to-ordinal table; several classic
//! ordinals collapse onto one current value, and that loss is deliberate;
//! changing it would change what the player is handed, not just the format.

use serde::{Deserialize, Serialize};

/// Weapon identifiers of the current format.
pub mod weapon {
    pub const KNIFE: i32 = 1;
    pub const PISTOL: i32 = 2;
    pub const DUAL_PISTOLS: i32 = 3;
    pub const SHOTGUN: i32 = 4;
    pub const DOUBLE_SHOTGUN: i32 = 5;
    pub const SMG: i32 = 6;
    pub const MINIGUN: i32 = 7;
    pub const ROCKET_LAUNCHER: i32 = 8;
    pub const GRENADE_LAUNCHER: i32 = 9;
    pub const CHAINSAW: i32 = 10;
    pub const FLAMER: i32 = 11;
    pub const LASER_RIFLE: i32 = 12;
    pub const SNIPER_RIFLE: i32 = 13;
    pub const CANNON: i32 = 14;
    pub const LAST: i32 = 14;
}

/// Weapon identifiers as the classic format numbered them. Ids 10..=13, 15
/// and 17 were placeholders that never shipped there.
pub mod classic_weapon {
    pub const LASER_RIFLE: i32 = 14;
    pub const CANNON: i32 = 16;
    pub const LAST: i32 = 17;
}

/// Weapon *n* occupies bit *n - 1* of a weapon mask.
pub const fn weapon_flag(weapon: i32) -> i32 {
    1 << (weapon - 1)
}

/// Weapons the current format grants unconditionally; every rebuilt
/// give-mask starts from these.
pub const GIVE_BASELINE: i32 = weapon_flag(weapon::KNIFE) | weapon_flag(weapon::PISTOL);

/// Every bit position a current-format weapon mask may legally carry.
pub const CURRENT_MASK_RANGE: i32 = (1 << weapon::LAST) - 1;

/// Folds one classic weapon id into a current-format mask.
fn fold_weapon(mask: &mut i32, classic_id: i32) {
    match classic_id {
        classic_weapon::LASER_RIFLE => *mask |= weapon_flag(weapon::LASER_RIFLE),
        classic_weapon::CANNON => *mask |= weapon_flag(weapon::CANNON),

        // Placeholder ids with no current counterpart: dropped.
        10 | 11 | 12 | 13 | 15 | 17 => {}

        // Everything else sits at the same position in both formats.
        other => *mask |= weapon_flag(other),
    }
}

/// Rebuilds a classic weapon mask as a current-format mask, starting from
/// `baseline` and folding in every set source bit.
pub fn remap_weapon_mask(classic_mask: i32, baseline: i32) -> i32 {
    let mut mask = baseline;
    for classic_id in 1..=classic_weapon::LAST {
        if classic_mask & weapon_flag(classic_id) != 0 {
            fold_weapon(&mut mask, classic_id);
        }
    }
    mask
}

/// Key item identifiers of the current format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum KeyItem {
    BookOfAges = 0,
    WoodenCross = 1,
    IronCross = 2,
    GoldCross = 3,
    JaguarStatue = 4,
    FalconWingLeft = 5,
    FalconWingRight = 6,
    Grail = 7,
    StoneTablets = 8,
    WingedLion = 9,
    GoldenElephant = 10,
    StatueHeadA = 11,
    StatueHeadB = 12,
    StatueHeadC = 13,
    KingStatue = 14,
    CrystalSkull = 15,
}

/// Classic ordinals with no table entry fall back here.
pub const KEY_FALLBACK: KeyItem = KeyItem::KingStatue;

/// Total remap from a classic key ordinal to the current enumeration.
pub fn remap_key(classic_ordinal: i32) -> KeyItem {
    match classic_ordinal {
        // Decorative reward keys.
        4 => KeyItem::JaguarStatue,
        15 => KeyItem::StoneTablets,

        // The four element keys.
        5 => KeyItem::WoodenCross,
        6 => KeyItem::IronCross,
        7 => KeyItem::CrystalSkull,
        8 => KeyItem::GoldCross,

        // Remaining quest keys; 10 and 12 collapse deliberately, as do 9
        // and 14.
        0 => KeyItem::WoodenCross,
        1 => KeyItem::IronCross,
        2 => KeyItem::GoldCross,
        3 => KeyItem::KingStatue,
        9 => KeyItem::Grail,
        10 => KeyItem::BookOfAges,
        12 => KeyItem::BookOfAges,
        13 => KeyItem::StatueHeadC,
        14 => KeyItem::Grail,
        16 => KeyItem::StatueHeadA,
        17 => KeyItem::StatueHeadB,
        18 => KeyItem::WingedLion,
        19 => KeyItem::GoldenElephant,

        _ => KEY_FALLBACK,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn give_mask_always_contains_the_baseline() {
        for classic_mask in [0, weapon_flag(8), 0x1FFFF, weapon_flag(10) | weapon_flag(15)] {
            let mask = remap_weapon_mask(classic_mask, GIVE_BASELINE);
            assert_eq!(mask & GIVE_BASELINE, GIVE_BASELINE, "mask {classic_mask:#x}");
        }
    }

    #[test]
    fn remapped_masks_stay_in_the_current_range() {
        // Every possible classic bit set at once.
        let everything = (1 << classic_weapon::LAST) - 1;
        let mask = remap_weapon_mask(everything, GIVE_BASELINE);
        assert_eq!(mask & !CURRENT_MASK_RANGE, 0);
    }

    #[test]
    fn renumbered_weapons_move_and_placeholders_drop() {
        let classic_mask = weapon_flag(classic_weapon::LASER_RIFLE)
            | weapon_flag(classic_weapon::CANNON)
            | weapon_flag(10)
            | weapon_flag(17);
        let mask = remap_weapon_mask(classic_mask, 0);
        assert_eq!(
            mask,
            weapon_flag(weapon::LASER_RIFLE) | weapon_flag(weapon::CANNON)
        );
    }

    #[test]
    fn shared_positions_carry_through() {
        let classic_mask = weapon_flag(4) | weapon_flag(9);
        assert_eq!(remap_weapon_mask(classic_mask, 0), classic_mask);
    }

    #[test]
    fn take_masks_start_empty() {
        assert_eq!(remap_weapon_mask(0, 0), 0);
    }

    #[test]
    fn key_remap_is_total_over_i32() {
        for ordinal in -3..=25 {
            // Must never panic, and out-of-table ordinals hit the fallback.
            let key = remap_key(ordinal);
            if !(0..=19).contains(&ordinal) || ordinal == 11 {
                assert_eq!(key, KEY_FALLBACK, "ordinal {ordinal}");
            }
        }
    }

    #[test]
    fn key_collapse_pairs_are_preserved() {
        assert_eq!(remap_key(10), remap_key(12));
        assert_eq!(remap_key(9), remap_key(14));
        assert_ne!(remap_key(16), remap_key(17));
    }

    #[test]
    fn element_keys_map_to_distinct_items() {
        let elements: Vec<KeyItem> = (5..=8).map(remap_key).collect();
        for (left, key) in elements.iter().enumerate() {
            for other in elements.iter().skip(left + 1) {
                assert_ne!(key, other);
            }
        }
    }
}
