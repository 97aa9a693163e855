//! Attribute key <-> display label.
//!
//! Keys are split into words at `_` and at lower-to-upper case changes;
//! digits stay in the word they follow. The label capitalises the first
//! word and lower-cases the rest: `country_code` and `countryCode` both read
//! `Country code`.

pub fn format_attr(key: &str) -> String {
    let words = split_words(key);
    let mut out = String::with_capacity(key.len());
    for (i, word) in words.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let lower = word.to_lowercase();
        if i == 0 {
            let mut chars = lower.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str());
            }
        } else {
            out.push_str(&lower);
        }
    }
    out
}

/// Inverse of `format_attr` for snake_case keys.
pub fn unformat_attr(label: &str) -> String {
    label
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

fn split_words(key: &str) -> Vec<&str> {
    let mut words = Vec::new();
    for part in key.split('_').filter(|p| !p.is_empty()) {
        let mut start = 0;
        let mut prev_lower = false;
        for (i, c) in part.char_indices() {
            if c.is_uppercase() && prev_lower {
                words.push(&part[start..i]);
                start = i;
            }
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
        words.push(&part[start..]);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::{format_attr, unformat_attr};
    use proptest::prelude::*;

    #[test]
    fn formats_common_keys() {
        assert_eq!(format_attr("country"), "Country");
        assert_eq!(format_attr("country_code"), "Country code");
        assert_eq!(format_attr("imageDate"), "Image date");
        assert_eq!(format_attr("drivingDirection"), "Driving direction");
        assert_eq!(format_attr("panoID"), "Pano id");
        assert_eq!(format_attr("h3_index"), "H3 index");
        assert_eq!(format_attr(""), "");
    }

    #[test]
    fn unformat_joins_lowercase_words() {
        assert_eq!(unformat_attr("Country code"), "country_code");
        assert_eq!(unformat_attr("Image date"), "image_date");
        assert_eq!(unformat_attr("  Elevation "), "elevation");
    }

    proptest! {
        #[test]
        fn snake_case_round_trips(key in "[a-z][a-z0-9]{0,8}(_[a-z0-9]{1,8}){0,3}") {
            prop_assert_eq!(unformat_attr(&format_attr(&key)), key);
        }
    }
}
