//! Deterministic per-user display colors.
//!
//! Every process derives the same color from the same `user_id`, so no
//! color ever needs to be assigned or exchanged.

/// Fixed display palette.
pub const PALETTE: [&str; 10] = [
    "#E57373", "#64B5F6", "#81C784", "#FFB74D", "#BA68C8", "#4DB6AC", "#F06292", "#7986CB",
    "#A1887F", "#FFD54F",
];

/// Hash `user_id` into [`PALETTE`].
///
/// 31-multiplier rolling hash over UTF-16 code units with i32 wrapping, so
/// browser peers computing the same hash land on the same entry.
pub fn color_for(user_id: &str) -> &'static str {
    let hash = user_id
        .encode_utf16()
        .fold(0i32, |hash, unit| (hash << 5).wrapping_sub(hash).wrapping_add(i32::from(unit)));
    let index = hash.unsigned_abs() as usize % PALETTE.len();
    PALETTE[index]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_id_same_color() {
        assert_eq!(color_for("u1"), color_for("u1"));
        assert_eq!(color_for("alice@example.com"), color_for("alice@example.com"));
    }

    #[test]
    fn color_is_from_palette() {
        for id in ["", "u1", "u2", "a-very-long-user-identifier-0123456789", "名前"] {
            assert!(PALETTE.contains(&color_for(id)));
        }
    }

    #[test]
    fn empty_id_maps_to_first_entry() {
        assert_eq!(color_for(""), PALETTE[0]);
    }

    #[test]
    fn known_values() {
        // "a" = 97, "ab" = 97 * 31 + 98 = 3105
        assert_eq!(color_for("a"), PALETTE[97 % PALETTE.len()]);
        assert_eq!(color_for("ab"), PALETTE[3105 % PALETTE.len()]);
    }

    #[test]
    fn ids_spread_over_palette() {
        let distinct: std::collections::HashSet<_> =
            (0..200).map(|i| color_for(&format!("user-{i}"))).collect();
        assert!(distinct.len() >= 8);
    }

    #[test]
    fn palette_has_at_least_eight_entries() {
        assert!(PALETTE.len() >= 8);
    }
}
