use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

pub const SLUG_MAX_LEN: usize = 100;

/// Slug used when nothing alphanumeric survives normalization.
pub const PLACEHOLDER_SLUG: &str = "untitled";

/// Derives the global identity of a subject from its display name.
///
/// Decomposes to NFKD, folding compatibility forms such as ligatures and
/// fullwidth letters, drops combining marks, lowercases, turns every run of
/// non-alphanumerics into one hyphen and trims hyphens from both ends. The
/// result is capped at [`SLUG_MAX_LEN`] bytes on a character boundary.
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;

    for c in name.nfkd().filter(|c| !is_combining_mark(*c)) {
        if c.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_hyphen = true;
        }
    }

    if slug.len() > SLUG_MAX_LEN {
        let mut cut = SLUG_MAX_LEN;
        while !slug.is_char_boundary(cut) {
            cut -= 1;
        }
        slug.truncate(cut);
        let trimmed = slug.trim_end_matches('-').len();
        slug.truncate(trimmed);
    }

    if slug.is_empty() {
        return PLACEHOLDER_SLUG.to_string();
    }
    slug
}
