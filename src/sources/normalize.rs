//! Translation of provider-native labels into the shared counter vocabulary.

/// Canonical age brackets, youngest first.
pub const AGE_BRACKETS: [&str; 7] = [
    "under-18", "18-25", "26-35", "36-45", "46-55", "56-65", "over-65",
];

pub const UNKNOWN: &str = "unknown";

/// Known site sections: (path fragment, canonical page). First match wins.
const PAGE_SECTIONS: &[(&str, &str)] = &[
    ("/eventos", "/eventos"),
    ("/parceiros", "/parceiros"),
    ("/mapa", "/mapa-turistico"),
    ("mapa-turistico", "/mapa-turistico"),
    ("/guata", "/guata-ia"),
    ("/chat", "/guata-ia"),
    ("/passaporte", "/passaporte"),
    ("/sobre", "/sobre"),
    ("/descubrams", "/descubrams"),
];

/// Bracket for an age in whole years.
pub fn age_bracket(age: u32) -> &'static str {
    match age {
        0..=17 => "under-18",
        18..=25 => "18-25",
        26..=35 => "26-35",
        36..=45 => "36-45",
        46..=55 => "46-55",
        56..=65 => "56-65",
        _ => "over-65",
    }
}

/// Maps a provider age label ("18-24", "65+", "under 18", ...) onto a bracket.
///
/// Closed ranges use their midpoint, open-ended upper labels starting at 65
/// or above land in `over-65`. Labels without numbers become `unknown`.
pub fn age_bracket_from_label(label: &str) -> &'static str {
    let lowered = label.trim().to_lowercase();
    if let Some(known) = AGE_BRACKETS.iter().find(|b| **b == lowered) {
        return *known;
    }

    let numbers: Vec<u32> = lowered
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();

    let below = lowered.contains("under")
        || lowered.contains("menor")
        || lowered.starts_with('<');
    let open_upper = lowered.ends_with('+')
        || lowered.contains("over")
        || lowered.contains("acima")
        || lowered.starts_with('>');

    match numbers.as_slice() {
        [] => UNKNOWN,
        [n, ..] if below => age_bracket(n.saturating_sub(1)),
        [n] if open_upper && *n >= 65 => "over-65",
        [n] => age_bracket(*n),
        [low, high, ..] => age_bracket(low / 2 + high / 2 + (low % 2 + high % 2) / 2),
    }
}

/// Normalizes a gender label; `None` for blanks.
pub fn gender(raw: &str) -> Option<String> {
    let lowered = collapse(raw).to_lowercase();
    let canonical = match lowered.as_str() {
        "" => return None,
        "f" | "female" | "feminino" | "mulher" | "woman" => "female",
        "m" | "male" | "masculino" | "homem" | "man" => "male",
        "other" | "outro" | "non-binary" | "nao-binario" | "não-binário" => "other",
        other => other,
    };
    Some(canonical.to_string())
}

/// Trims a place name; two-letter codes are upper-cased ("ms" -> "MS").
pub fn place(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.len() == 2 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        return Some(trimmed.to_ascii_uppercase());
    }
    Some(trimmed.to_string())
}

/// Free-text category label (travel motive): one line, lowercased.
pub fn label(raw: &str) -> Option<String> {
    let collapsed = collapse(raw);
    (!collapsed.is_empty()).then(|| collapsed.to_lowercase())
}

/// Canonical page for a logged URL or path; `None` for pages outside the known sections.
pub fn canonical_page(url: &str) -> Option<&'static str> {
    let mut path = url.trim();
    if let Some(idx) = path.find("://") {
        let rest = &path[idx + 3..];
        path = rest.find('/').map(|slash| &rest[slash..]).unwrap_or("/");
    }
    let path = path
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .to_lowercase();
    if path.is_empty() {
        return None;
    }

    PAGE_SECTIONS
        .iter()
        .find(|(fragment, _)| path.contains(fragment))
        .map(|(_, canonical)| *canonical)
}

/// Search string: lowercased, trimmed, inner whitespace collapsed; `None` when blank.
pub fn search_term(raw: &str) -> Option<String> {
    label(raw)
}

/// Trims and turns every run of whitespace, line breaks included, into one space.
fn collapse(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
