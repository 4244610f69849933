use once_cell::sync::Lazy;
use rand::{distributions::Alphanumeric, Rng};
use regex::Regex;

static NON_ALNUM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("static slug pattern is valid"));

/// Lowercase ASCII alphanumerics joined by single dashes.
///
/// Returns `"product"` when nothing usable remains.
pub fn slugify(name: &str) -> String {
    let lowered = name.to_lowercase();
    let slug = NON_ALNUM.replace_all(&lowered, "-");
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "product".to_string()
    } else {
        slug.to_string()
    }
}

/// The `n`-th candidate for `base`: `base`, `base-1`, `base-2`, ...
pub fn candidate(base: &str, n: usize) -> String {
    if n == 0 {
        base.to_string()
    } else {
        format!("{}-{}", base, n)
    }
}

/// First candidate not present in `taken`.
pub fn next_free<'a>(base: &str, taken: impl IntoIterator<Item = &'a str>) -> String {
    let taken: std::collections::HashSet<&str> = taken.into_iter().collect();
    (0..)
        .map(|n| candidate(base, n))
        .find(|slug| !taken.contains(slug.as_str()))
        .unwrap_or_else(|| base.to_string())
}

/// Random uppercase alphanumeric code, used for generated SKUs and order numbers.
pub fn random_code(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(|c| (c as char).to_ascii_uppercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case("Blue Shirt", "blue-shirt")]
    #[case("  Red   Scarf!! ", "red-scarf")]
    #[case("T-Shirt (XL) / Cotton", "t-shirt-xl-cotton")]
    #[case("Café Noir", "caf-noir")]
    #[case("***", "product")]
    fn slugify_cases(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(slugify(name), expected);
    }

    #[test]
    fn next_free_skips_taken_candidates() {
        assert_eq!(next_free("blue-shirt", []), "blue-shirt");
        assert_eq!(next_free("blue-shirt", ["blue-shirt"]), "blue-shirt-1");
        assert_eq!(
            next_free("blue-shirt", ["blue-shirt", "blue-shirt-1", "blue-shirt-3"]),
            "blue-shirt-2"
        );
    }

    #[test]
    fn random_code_is_uppercase_alphanumeric() {
        let code = random_code(10);
        assert_eq!(code.len(), 10);
        assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    proptest! {
        #[test]
        fn slug_is_url_safe(name in ".{0,60}") {
            let slug = slugify(&name);
            prop_assert!(!slug.is_empty());
            prop_assert!(!slug.starts_with('-') && !slug.ends_with('-'));
            prop_assert!(!slug.contains("--"));
            prop_assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        }
    }
}
