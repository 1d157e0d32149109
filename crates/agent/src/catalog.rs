//! Fixed vocabulary of the sales catalog: vehicle categories and manufacturers.

/// Category name paired with the phrases customers use for it.
pub const CAR_CATEGORIES: &[(&str, &[&str])] = &[
    ("מיני-משפחתיות", &["מיני", "קטן", "עירוני"]),
    ("היברידי", &["היברידי", "הייברידי", "חשמלי חלקי"]),
    ("קטנות", &["קטן", "קומפקטי", "חסכוני"]),
    ("משפחתיות", &["משפחתי", "סדאן", "האצ'בק"]),
    ("ג'יפונים/SUV", &["SUV", "ג'יפ", "גיפון", "קרוסאובר"]),
    ("מנהלים / יוקרה", &["יוקרה", "מנהלים", "פרימיום"]),
    ("7 מקומות ומיני וואן", &["7 מקומות", "מיני וואן", "ואן", "רב מקומות"]),
    ("מסחריות", &["מסחרי", "נותן שירות", "עבודה"]),
    ("חשמלי", &["חשמלי", "EV", "אלקטרי"]),
];

pub const MANUFACTURERS: &[&str] = &[
    "ב.מ.וו",
    "AIWAYS",
    "BMW",
    "BYD",
    "CHERY",
    "Geely",
    "Jaecoo",
    "KGM",
    "LEAP",
    "LYNK&CO",
    "MG",
    "ORA",
    "ZEEKR",
    "אאודי",
    "אופל",
    "אינפיניטי",
    "איסוזו",
    "אלפא רומיאו",
    "ב.מ.וו.",
    "ג'נסיס",
    "גנסיס",
    "דאצ'ה",
    "דאצה",
    "דונגפנג",
    "די אס",
    "די.אס",
    "הונדה",
    "וולוו",
    "טויוטה",
    "יונדאי",
    "לנד רובר",
    "לקסוס",
    "מאזדה",
    "מיצובישי",
    "מרצדס",
    "ניסאן",
    "סאנגיונג",
    "סובארו",
    "סוזוקי",
    "סיאט",
    "סיטרואן",
    "סקודה",
    "פולסטאר",
    "פולקסווגן",
    "פורד",
    "פורשה",
    "פיאט",
    "פיג'ו",
    "קאדילק",
    "קופרה",
    "קיה",
    "קרייזלר",
    "רנו",
    "שברולט",
];

/// Resolves free text to a catalog category. Exact category names win over
/// aliases; among aliases the first category in catalog order wins.
pub fn match_category(input: &str) -> Option<&'static str> {
    let needle = normalize(input);
    if needle.is_empty() {
        return None;
    }

    if let Some((name, _)) = CAR_CATEGORIES.iter().find(|(name, _)| normalize(name) == needle) {
        return Some(*name);
    }

    CAR_CATEGORIES
        .iter()
        .find(|(_, aliases)| {
            aliases.iter().any(|alias| {
                let alias = normalize(alias);
                needle == alias || needle.contains(&alias)
            })
        })
        .map(|(name, _)| *name)
}

/// Resolves free text to a manufacturer spelling from the catalog.
pub fn match_manufacturer(input: &str) -> Option<&'static str> {
    let needle = normalize(input);
    if needle.is_empty() {
        return None;
    }

    MANUFACTURERS
        .iter()
        .find(|name| normalize(name) == needle)
        .or_else(|| MANUFACTURERS.iter().find(|name| needle.contains(&normalize(name))))
        .copied()
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}
