/// Name used when a title has nothing usable for a URL name
const FALLBACK_SLUG: &str = "article";

/// Longest slug produced, in bytes (slugs are ASCII)
const MAX_SLUG_LEN: usize = 128;

/// Derive a URL-safe name from a title.
///
/// Lower-cases ASCII letters and digits, folds common Latin accents,
/// and collapses every other run of characters into a single `-`.
/// Leading and trailing separators are dropped. The result only contains
/// `[a-z0-9-]` and is never empty.
///
/// # Examples
///
/// ```
/// use feedimport::util::slugify;
///
/// assert_eq!(slugify("Hello, World!"), "hello-world");
/// assert_eq!(slugify("Crème brûlée recipes"), "creme-brulee-recipes");
/// assert_eq!(slugify("???"), "article");
/// ```
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len().min(MAX_SLUG_LEN));
    let mut pending_dash = false;

    for c in title.chars().flat_map(fold_char) {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
            if slug.len() >= MAX_SLUG_LEN {
                break;
            }
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        return FALLBACK_SLUG.to_string();
    }
    slug
}

fn fold_char(c: char) -> std::iter::Take<std::array::IntoIter<char, 2>> {
    let (folded, len): ([char; 2], usize) = match c {
        'à' | 'á' | 'â' | 'ã' | 'å' | 'À' | 'Á' | 'Â' | 'Ã' | 'Å' => (['a', ' '], 1),
        'ä' | 'Ä' | 'æ' | 'Æ' => (['a', 'e'], 2),
        'ç' | 'Ç' => (['c', ' '], 1),
        'è' | 'é' | 'ê' | 'ë' | 'È' | 'É' | 'Ê' | 'Ë' => (['e', ' '], 1),
        'ì' | 'í' | 'î' | 'ï' | 'Ì' | 'Í' | 'Î' | 'Ï' => (['i', ' '], 1),
        'ñ' | 'Ñ' => (['n', ' '], 1),
        'ò' | 'ó' | 'ô' | 'õ' | 'ø' | 'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ø' => (['o', ' '], 1),
        'ö' | 'Ö' | 'œ' | 'Œ' => (['o', 'e'], 2),
        'ù' | 'ú' | 'û' | 'Ù' | 'Ú' | 'Û' => (['u', ' '], 1),
        'ü' | 'Ü' => (['u', 'e'], 2),
        'ý' | 'ÿ' | 'Ý' => (['y', ' '], 1),
        'ß' => (['s', 's'], 2),
        other => ([other, ' '], 1),
    };
    folded.into_iter().take(len)
}

/// Normalize a feed category term for storage: trimmed, `|` replaced by `_`
pub fn clean_category(term: &str) -> String {
    term.trim().replace('|', "_")
}
