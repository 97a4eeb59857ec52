//! Minimal English inflection for path segments.

const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("man", "men"),
    ("woman", "women"),
    ("child", "children"),
    ("mouse", "mice"),
];

const UNCOUNTABLE: &[&str] = &["data", "equipment", "information", "media", "news", "series", "sheep"];

/// Plural form of a lowercase word. Only the last `_` segment is inflected.
pub(crate) fn pluralize(word: &str) -> String {
    let (prefix, last) = word.rfind('_').map_or(("", word), |i| word.split_at(i + 1));

    if last.is_empty() || UNCOUNTABLE.contains(&last) {
        return word.to_string();
    }
    if let Some((_, plural)) = IRREGULAR.iter().find(|(singular, _)| *singular == last) {
        return format!("{prefix}{plural}");
    }

    let plural = if let Some(stem) = last.strip_suffix('y').filter(|stem| !ends_with_vowel(stem)) {
        format!("{stem}ies")
    } else if ["s", "x", "z", "ch", "sh"].iter().any(|s| last.ends_with(s)) {
        format!("{last}es")
    } else {
        format!("{last}s")
    };
    format!("{prefix}{plural}")
}

/// `Admin::UserProfile` becomes `admin/user_profile`.
pub(crate) fn underscore(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let chars: Vec<char> = name.replace("::", "/").chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev = i.checked_sub(1).map(|j| chars[j]);
            let next = chars.get(i + 1).copied();
            let boundary = prev.is_some_and(|p| p.is_ascii_lowercase() || p.is_ascii_digit())
                || (prev.is_some_and(|p| p.is_ascii_uppercase())
                    && next.is_some_and(|n| n.is_ascii_lowercase()));
            if boundary {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else if c == '-' {
            out.push('_');
        } else {
            out.push(c);
        }
    }
    out
}

fn ends_with_vowel(s: &str) -> bool {
    s.ends_with(['a', 'e', 'i', 'o', 'u'])
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("avatar", "avatars")]
    #[case("dummy", "dummies")]
    #[case("key", "keys")]
    #[case("box", "boxes")]
    #[case("match", "matches")]
    #[case("person", "people")]
    #[case("user_photo", "user_photos")]
    #[case("media", "media")]
    fn test_pluralize(#[case] word: &str, #[case] expected: &str) {
        assert_eq!(pluralize(word), expected);
    }

    #[rstest]
    #[case("Dummy", "dummy")]
    #[case("UserProfile", "user_profile")]
    #[case("Admin::HTTPRequest", "admin/http_request")]
    #[case("Photo2Thumb", "photo2_thumb")]
    fn test_underscore(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(underscore(name), expected);
    }
}
